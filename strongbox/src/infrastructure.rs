// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Concrete implementations of the domain's ports: crypto primitives, the
//! on-disk stores, cloud plumbing, configuration, and logging.

pub mod cloud;
pub mod config;
pub mod crypto;
pub mod logging;
pub mod stores;
