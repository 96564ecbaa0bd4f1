// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Layer
//!
//! The `Vault` application service and the services it orchestrates:
//! search ranking, second-factor verification, the duress projection,
//! conflict resolution, and cloud sync.

pub mod services;
pub mod vault;

pub use vault::{
    ListFilter, ListItem, RecordPatch, UnlockOutcome, Vault, VaultOptions, DEFAULT_AUTO_LOCK_MS,
    DEFAULT_MAX_2FA_ATTEMPTS,
};
