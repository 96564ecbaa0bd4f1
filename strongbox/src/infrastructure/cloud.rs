// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Cloud infrastructure: OAuth acquisition and the in-memory provider used
//! by tests and offline development. Concrete provider adapters (Drive,
//! Graph, S3-compatible) live outside the core and implement the domain's
//! `CloudProvider` port.

pub mod memory;
pub mod oauth;

pub use memory::MemoryProvider;
pub use oauth::{OAuthFlow, OAuthProviderConfig, PkcePair};
