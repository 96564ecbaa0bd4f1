// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain entities: records, the vault index, audit events, and sync state.

pub mod audit_event;
pub mod record;
pub mod sync_state;
pub mod vault_index;

pub use audit_event::{AuditEvent, AuditEventKind};
pub use record::{
    EntryType, FileData, NoteData, PasswordData, Record, RecordBody, TotpAlgorithm, TotpConfig,
    MAX_NOTE_BYTES,
};
pub use sync_state::{
    Conflict, ConflictKind, EntryVersion, Resolution, ResolutionStrategy, SyncState,
};
pub use vault_index::{
    CloudSyncStatus, DuressConfig, IndexEntry, IndexMetadata, KdfParams, TwoFactorConfig,
    VaultIndex, INDEX_SCHEMA_VERSION, SALT_LEN,
};
