// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Strongbox Domain Layer
//!
//! Pure domain logic for the Strongbox encrypted vault: entities, value
//! objects, the envelope codec, and the ports the infrastructure layer
//! implements. This crate performs no I/O, owns no runtime, and depends on
//! no cipher implementation; sealing and opening envelopes is the
//! application crate's job.
//!
//! ## Architecture
//!
//! The layer follows Domain-Driven Design principles:
//!
//! - **Entities**: `Record`, `VaultIndex`, `AuditEvent`, `SyncState` carry
//!   identity and enforce their own invariants
//! - **Value Objects**: `RecordId`, `ChunkSize`, `Envelope`, `Passphrase`
//!   are immutable and validated on construction
//! - **Ports**: `CloudProvider` and `Clock` are the seams tests and
//!   provider adapters plug into
//! - **Errors**: every fallible path returns [`VaultError`]
//!
//! ## Business Rules and Invariants
//!
//! - No plaintext record persists anywhere; the envelope codec is the only
//!   at-rest representation
//! - Envelope Associated Data binds purpose, record id, and chunk index, so
//!   ciphertext cannot be replayed across contexts
//! - Note content is capped at 1 MiB; TOTP parameters are range-checked;
//!   chunk sizes are bounded
//! - Index entry ids are unique; removing a missing entry is a no-op

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
// These exports provide a clean API surface for consumers of the domain layer
pub use entities::{
    AuditEvent, AuditEventKind, CloudSyncStatus, Conflict, ConflictKind, DuressConfig, EntryType,
    EntryVersion, FileData, IndexEntry, IndexMetadata, KdfParams, NoteData, PasswordData, Record,
    RecordBody, Resolution, ResolutionStrategy, SyncState, TotpAlgorithm, TotpConfig,
    TwoFactorConfig, VaultIndex,
};
pub use error::{ProviderErrorKind, VaultError};
pub use services::{Clock, CloudProvider, ProgressFn, RemoteObject, StorageQuota, SystemClock};
pub use value_objects::{
    AlgorithmId, ChunkSize, Envelope, EnvelopeContext, Passphrase, Purpose, RecordId,
};
