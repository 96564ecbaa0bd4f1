// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sync State
//!
//! Per-record version tracking for the conflict resolver. The state lives in
//! a plaintext JSON sidecar next to the vault (it contains no secrets, only
//! version counters and content checksums) and is the basis for deciding
//! which side of a record changed since the last sync.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value_objects::RecordId;

/// Version vector and checksum for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EntryVersion {
    /// Local mutation counter, bumped on every persisted change
    pub local_version: u64,
    /// Remote version observed at the last sync
    pub remote_version: u64,
    /// Unix ms of the last successful sync of this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<u64>,
    /// Hex SHA-256 of the record's canonical JSON as of the last sync.
    /// This is the change-detection baseline; local mutations bump
    /// `local_version` but never touch it.
    pub checksum: String,
}

impl EntryVersion {
    /// Whether this record has completed at least one sync.
    pub fn was_synced(&self) -> bool {
        self.last_synced_at.is_some()
    }
}

/// How local and remote state of a record disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    LocalOnly,
    RemoteOnly,
    ModifiedBoth,
    DeletedLocally,
    DeletedRemotely,
}

/// A detected per-record conflict awaiting resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: RecordId,
    pub kind: ConflictKind,
    /// Unix ms `modified` of the local copy, when it exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_modified: Option<u64>,
    /// Unix ms `modified` of the remote copy, when it exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_modified: Option<u64>,
    /// Unix ms `created` of whichever copy exists (both agree on creation)
    pub created: u64,
}

/// Resolution strategies the resolver offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    KeepLocal,
    KeepRemote,
    /// Keep whichever side has the larger `modified` timestamp
    KeepNewest,
    /// Keep both copies, duplicating one under a fresh id
    KeepBoth,
    /// Field-wise merge for Password records
    Merge,
    Delete,
    /// Leave unresolved; the conflict persists in history
    Skip,
}

/// A recorded (or deferred) resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: RecordId,
    pub kind: ConflictKind,
    pub strategy: ResolutionStrategy,
    /// Unix ms at which the resolution was applied or deferred
    pub resolved_at: u64,
}

/// The sync sidecar contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncState {
    pub entry_versions: BTreeMap<RecordId, EntryVersion>,
    /// Unix ms of the last full sync pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_full_sync: Option<u64>,
    /// Skipped and applied resolutions, oldest first
    #[serde(default)]
    pub conflict_history: Vec<Resolution>,
}

impl SyncState {
    /// Bumps the local version for a record after a persisted mutation.
    /// The checksum baseline is left alone; only `mark_synced` moves it.
    pub fn bump_local(&mut self, id: RecordId) {
        let slot = self.entry_versions.entry(id).or_default();
        slot.local_version += 1;
    }

    /// Marks a record as synced at the given remote version.
    pub fn mark_synced(&mut self, id: RecordId, remote_version: u64, checksum: String, now_ms: u64) {
        let slot = self.entry_versions.entry(id).or_default();
        slot.remote_version = remote_version;
        slot.checksum = checksum;
        slot.last_synced_at = Some(now_ms);
    }

    /// Forgets a record entirely (after deletion on both sides).
    pub fn forget(&mut self, id: RecordId) {
        self.entry_versions.remove(&id);
    }
}
