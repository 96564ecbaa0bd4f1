// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Strongbox
//!
//! Offline-first encrypted vault for login credentials, notes, and binary
//! files, with optional chunked replication to an abstract cloud object
//! store. A single user-remembered passphrase is the root of all trust;
//! everything persisted to disk or uploaded is ciphertext.
//!
//! ## Architecture
//!
//! Two layers over the `strongbox-domain` crate:
//!
//! - **Application** (`application/`): the injectable [`Vault`] value
//!   owning the session state machine and command surface, plus the
//!   services it orchestrates (search, second factor, duress, conflict
//!   resolution, sync)
//! - **Infrastructure** (`infrastructure/`): crypto primitives, on-disk
//!   stores, OAuth plumbing, configuration, logging
//!
//! ## Quick Start
//!
//! ```no_run
//! use strongbox::application::{Vault, VaultOptions};
//! use strongbox::infrastructure::config::VaultLayout;
//!
//! # async fn demo() -> Result<(), strongbox_domain::VaultError> {
//! let vault = Vault::new(VaultOptions::new(VaultLayout::default_location()));
//! vault.init("correct horse battery staple").await?;
//! let id = vault.add_note("first note", "hello").await?;
//! let record = vault.get(id).await?;
//! assert_eq!(record.title, "first note");
//! vault.lock().await?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod infrastructure;

pub use application::{
    ListFilter, ListItem, RecordPatch, UnlockOutcome, Vault, VaultOptions,
};
pub use strongbox_domain as domain;
