// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vault Index
//!
//! The encrypted index is the vault's source of truth: one metadata entry per
//! record, the passphrase-KDF salt and parameters, the key verifier, and the
//! optional second-factor and duress sections. The index serializes to JSON
//! and travels inside a text envelope (see the index store); listing the
//! vault only ever opens this one envelope plus the per-entry encrypted
//! titles, never the per-record files.
//!
//! ## Consistency
//!
//! `entries` and the record-ciphertext files on disk are kept eventually
//! consistent by the stores: every mutation persists the record artifact
//! first and the index second, both via atomic temp-file renames. After a
//! restart the index wins; an entry pointing at a missing file is reported
//! as dormant rather than silently dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entities::record::{EntryType, Record, TotpAlgorithm};
use crate::value_objects::RecordId;
use crate::VaultError;

/// Current index schema version.
pub const INDEX_SCHEMA_VERSION: u32 = 2;

/// Passphrase-KDF salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Argon2id parameters persisted with the vault so a future parameter
/// upgrade is detectable after unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Iteration count
    pub iterations: u32,
    /// Lane count
    pub parallelism: u32,
}

impl KdfParams {
    /// Floor values accepted by the vault policy: 64 MiB, 3 iterations,
    /// single lane.
    pub const MIN_MEMORY_KIB: u32 = 64 * 1024;
    pub const MIN_ITERATIONS: u32 = 3;

    /// Validates against the policy floor.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.memory_kib < Self::MIN_MEMORY_KIB {
            return Err(VaultError::invalid_config(format!(
                "KDF memory {} KiB is below the {} KiB floor",
                self.memory_kib,
                Self::MIN_MEMORY_KIB
            )));
        }
        if self.iterations < Self::MIN_ITERATIONS {
            return Err(VaultError::invalid_config(format!(
                "KDF iterations {} is below the floor of {}",
                self.iterations,
                Self::MIN_ITERATIONS
            )));
        }
        if self.parallelism != 1 {
            return Err(VaultError::invalid_config(
                "KDF parallelism must be 1 for the single-threaded core",
            ));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams {
            memory_kib: Self::MIN_MEMORY_KIB,
            iterations: Self::MIN_ITERATIONS,
            parallelism: 1,
        }
    }
}

/// Cloud replication state of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CloudSyncStatus {
    #[default]
    None,
    Pending,
    Synced,
    Error,
}

/// Index metadata for one record.
///
/// The title is re-encrypted under the index key (a text envelope) so that
/// `list()` never has to open per-record files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Text envelope of the record title, sealed with the index key
    pub title_encrypted: String,
    pub entry_type: EntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<u32>,
    /// Provider object ids for uploaded chunks, in chunk order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_chunk_ids: Option<Vec<String>>,
    #[serde(default)]
    pub cloud_sync_status: CloudSyncStatus,
    /// Unix ms of the last successful sync for this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_synced_at: Option<u64>,
    pub created: u64,
    pub modified: u64,
}

/// Vault-level second-factor configuration.
///
/// The TOTP secret stays inside the encrypted index; backup codes are stored
/// only as salted SHA-256 digests and removed atomically on consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorConfig {
    pub enabled: bool,
    /// Base32-encoded TOTP secret
    pub secret: String,
    #[serde(default)]
    pub algorithm: TotpAlgorithm,
    #[serde(default = "TwoFactorConfig::default_digits")]
    pub digits: u32,
    #[serde(default = "TwoFactorConfig::default_period")]
    pub period: u64,
    /// Hex-encoded salted SHA-256 digests of unused backup codes
    pub backup_codes: Vec<String>,
    /// Hex-encoded salt mixed into every backup-code digest
    pub code_salt: String,
}

impl TwoFactorConfig {
    fn default_digits() -> u32 {
        6
    }

    fn default_period() -> u64 {
        30
    }
}

/// Duress section of the index.
///
/// The real session manages decoys here; `configure_duress` additionally
/// projects them into the duress sidecar, sealed under the duress KEK, so a
/// duress session can render them without ever touching the real key
/// hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuressConfig {
    /// Hex-encoded duress verifier, HKDF(duress KEK, "verifier")
    pub verifier: String,
    /// The decoy records shown to a duress session
    pub decoys: Vec<Record>,
}

/// Aggregate counters kept alongside the entry map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IndexMetadata {
    pub entry_count: u64,
    /// Unix ms vault creation time
    pub created: u64,
    /// Unix ms of the last completed sync, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<u64>,
}

/// The encrypted vault index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultIndex {
    pub schema_version: u32,
    /// Base64 of the 16-byte passphrase-KDF salt
    pub salt: String,
    /// Persisted Argon2id parameters
    pub kdf_params: KdfParams,
    /// Hex-encoded verifier, HKDF(KEK, "verifier")
    pub key_hash: String,
    pub entries: BTreeMap<RecordId, IndexEntry>,
    pub metadata: IndexMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_2fa: Option<TwoFactorConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duress: Option<DuressConfig>,
}

impl VaultIndex {
    /// Creates an empty index for a fresh vault.
    pub fn new(salt_b64: String, kdf_params: KdfParams, key_hash_hex: String, now_ms: u64) -> Self {
        VaultIndex {
            schema_version: INDEX_SCHEMA_VERSION,
            salt: salt_b64,
            kdf_params,
            key_hash: key_hash_hex,
            entries: BTreeMap::new(),
            metadata: IndexMetadata {
                entry_count: 0,
                created: now_ms,
                last_sync: None,
            },
            vault_2fa: None,
            duress: None,
        }
    }

    /// Inserts a new entry, rejecting id reuse.
    pub fn insert_entry(&mut self, id: RecordId, entry: IndexEntry) -> Result<(), VaultError> {
        if self.entries.contains_key(&id) {
            return Err(VaultError::IdCollision(id.to_string()));
        }
        self.entries.insert(id, entry);
        self.metadata.entry_count = self.entries.len() as u64;
        Ok(())
    }

    /// Replaces an existing entry.
    pub fn update_entry(&mut self, id: RecordId, entry: IndexEntry) -> Result<(), VaultError> {
        match self.entries.get_mut(&id) {
            Some(slot) => {
                *slot = entry;
                Ok(())
            }
            None => Err(VaultError::not_found(id.to_string())),
        }
    }

    /// Removes an entry; removing a missing id is a successful no-op.
    pub fn remove_entry(&mut self, id: RecordId) -> Option<IndexEntry> {
        let removed = self.entries.remove(&id);
        self.metadata.entry_count = self.entries.len() as u64;
        removed
    }

    pub fn entry(&self, id: RecordId) -> Option<&IndexEntry> {
        self.entries.get(&id)
    }

    pub fn entry_mut(&mut self, id: RecordId) -> Option<&mut IndexEntry> {
        self.entries.get_mut(&id)
    }

    /// Whether the vault requires a second factor after primary unlock.
    pub fn second_factor_enabled(&self) -> bool {
        self.vault_2fa.as_ref().map(|c| c.enabled).unwrap_or(false)
    }
}
