// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vault Configuration
//!
//! The on-disk layout of a vault root and the small plaintext cloud-storage
//! config that sits next to it.
//!
//! ## Layout
//!
//! ```text
//! <vault_root>/
//!   vault.enc            encrypted index
//!   entries/<uuid>.enc   per-record envelopes
//!   files/<uuid>*.bin    file-payload chunks
//!   audit.log            append-only audit envelopes
//!   drive_token.enc      encrypted cloud tokens
//!   duress.enc           duress projection (when configured)
//!   sync_state.json      plaintext sync sidecar
//!   cloud_config.json    plaintext storage-mode config
//! ```
//!
//! The root defaults to `<home>/.strongbox` and is overridable for tests
//! and embedding shells.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use strongbox_domain::VaultError;

/// Filesystem layout of one vault.
#[derive(Debug, Clone)]
pub struct VaultLayout {
    root: PathBuf,
}

impl VaultLayout {
    /// Layout rooted at an explicit directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        VaultLayout { root: root.into() }
    }

    /// The default layout under the user's home directory.
    pub fn default_location() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        VaultLayout {
            root: home.join(".strongbox"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("vault.enc")
    }

    pub fn entries_dir(&self) -> PathBuf {
        self.root.join("entries")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.root.join("audit.log")
    }

    pub fn token_path(&self) -> PathBuf {
        self.root.join("drive_token.enc")
    }

    pub fn duress_path(&self) -> PathBuf {
        self.root.join("duress.enc")
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.root.join("sync_state.json")
    }

    pub fn cloud_config_path(&self) -> PathBuf {
        self.root.join("cloud_config.json")
    }

    /// Creates the root and its subdirectories.
    pub async fn ensure_dirs(&self) -> Result<(), VaultError> {
        for dir in [&self.root, &self.entries_dir(), &self.files_dir()] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| VaultError::io_error(format!("create {}: {}", dir.display(), e)))?;
        }
        Ok(())
    }

    /// Removes the entire vault root; missing is success.
    pub async fn remove_all(&self) -> Result<(), VaultError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::io_error(format!(
                "remove {}: {}",
                self.root.display(),
                e
            ))),
        }
    }
}

/// Where uploaded objects live in the provider's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Provider-specific app-private area, invisible in the provider UI
    #[default]
    Hidden,
    /// A named folder inside the user's normal provider namespace
    Public,
}

/// Plaintext cloud-storage configuration (`cloud_config.json`).
///
/// Switching modes never migrates already-uploaded objects; the new mode
/// only affects future uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CloudStorageConfig {
    pub mode: StorageMode,
    /// Folder name, required in `Public` mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_content_folder_name: Option<String>,
}

impl CloudStorageConfig {
    /// Validates the mode/folder pairing.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.mode == StorageMode::Public
            && self
                .public_content_folder_name
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(VaultError::invalid_config(
                "public storage mode requires a folder name",
            ));
        }
        Ok(())
    }

    /// The object-name prefix implied by the mode.
    pub fn object_prefix(&self) -> String {
        match (&self.mode, &self.public_content_folder_name) {
            (StorageMode::Public, Some(folder)) => format!("{}/", folder.trim()),
            _ => String::new(),
        }
    }

    /// Loads the config, defaulting to hidden mode when absent.
    pub async fn load_or_default(path: &Path) -> Result<Self, VaultError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let config: CloudStorageConfig = serde_json::from_str(&text)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(VaultError::io_error(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Persists the config atomically.
    pub async fn save(&self, path: &Path) -> Result<(), VaultError> {
        self.validate()?;
        let text = serde_json::to_string_pretty(self)?;
        super::stores::write_atomic(path, text.as_bytes()).await
    }
}
