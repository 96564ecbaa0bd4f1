// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sync-State Sidecar
//!
//! Plaintext JSON persistence for [`SyncState`]. The sidecar holds only
//! version counters, checksums, and conflict history; it contains no
//! secrets, so it stays readable for troubleshooting.

use std::path::PathBuf;

use strongbox_domain::entities::SyncState;
use strongbox_domain::VaultError;

/// Store for `sync_state.json`.
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(path: PathBuf) -> Self {
        SyncStateStore { path }
    }

    /// Loads the sidecar, defaulting to an empty state when absent.
    pub async fn load_or_default(&self) -> Result<SyncState, VaultError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SyncState::default()),
            Err(e) => Err(VaultError::io_error(format!(
                "read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Persists the sidecar atomically.
    pub async fn save(&self, state: &SyncState) -> Result<(), VaultError> {
        let text = serde_json::to_string_pretty(state)?;
        super::write_atomic(&self.path, text.as_bytes()).await
    }

    /// Removes the sidecar; missing is success.
    pub async fn remove(&self) -> Result<(), VaultError> {
        super::remove_idempotent(&self.path).await.map(|_| ())
    }
}
