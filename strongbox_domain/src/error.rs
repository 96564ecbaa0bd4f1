// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the error system for the Strongbox vault domain. It
//! categorizes failures, keeps messages actionable, and supports both
//! automated recovery decisions and human-readable diagnostics.
//!
//! ## Overview
//!
//! The error system is designed around Domain-Driven Design principles:
//!
//! - **Domain-Specific**: Errors are tailored to vault concepts (locking,
//!   passphrases, envelopes, cloud replication)
//! - **Hierarchical**: Errors are organized into logical categories for
//!   systematic handling
//! - **Actionable**: Each error provides sufficient context for debugging and
//!   recovery
//! - **Type-Safe**: Rust's type system ensures comprehensive error handling
//!
//! ## Error Categories
//!
//! #### Access Errors
//! - **Locked**: The operation needs an unlocked vault
//! - **WrongPassphrase**: Verifier mismatch during unlock
//! - **Needs2FA** / **Invalid2FA**: Second factor required or rejected
//! - **NotPermitted**: The current session may not perform this operation
//!
//! #### Data Errors
//! - **NotFound**: No such record or remote object
//! - **IdCollision**: A record id is already in use
//! - **AeadOpenFailed**: Authenticated decryption failed
//! - **ChunkCorrupt**: A specific file chunk failed to open
//! - **ChecksumMismatch**: Reassembled plaintext does not match its digest
//!
//! #### Infrastructure Errors
//! - **IoError**: Local disk failure
//! - **Provider**: Cloud object-store failure with a transient/permanent kind
//! - **ReauthRequired**: Stored tokens can no longer be refreshed
//!
//! #### Policy Errors
//! - **WeakPassphrase**: Fails the minimum passphrase policy
//! - **ConflictUnresolved**: A sync step requires an explicit user choice
//! - **InvalidConfiguration**: Malformed parameters or settings
//!
//! ## Error Recovery
//!
//! Transient provider failures (`Network`, `RateLimited`) are retried by the
//! sync layer with exponential backoff; everything else surfaces to the
//! caller. Crypto failures on user data are never converted into soft skips.

use thiserror::Error;

/// Cloud provider failure classification.
///
/// The sync layer retries `Network` and `RateLimited` locally with
/// exponential backoff up to a cap; the remaining kinds surface immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// Connectivity or transport failure
    Network,
    /// The provider rejected the stored credentials
    AuthExpired,
    /// The provider reports insufficient storage quota
    Quota,
    /// The provider asked the client to slow down
    RateLimited,
    /// The named object does not exist
    NotFound,
    /// Anything the provider adapter could not classify
    Other,
}

impl ProviderErrorKind {
    /// Whether the sync layer may retry this failure locally.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderErrorKind::Network | ProviderErrorKind::RateLimited)
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderErrorKind::Network => "network",
            ProviderErrorKind::AuthExpired => "auth_expired",
            ProviderErrorKind::Quota => "quota",
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::NotFound => "not_found",
            ProviderErrorKind::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Domain-specific errors for the vault core.
///
/// Each variant represents a specific failure mode and carries enough context
/// for the caller to decide between surfacing, retrying, and mapping to
/// success (for example `NotFound` during `destruct`).
#[derive(Error, Debug, Clone)]
pub enum VaultError {
    #[error("Vault is locked")]
    Locked,

    #[error("Wrong passphrase")]
    WrongPassphrase,

    #[error("Second factor required")]
    Needs2FA,

    #[error("Invalid second factor code")]
    Invalid2FA,

    #[error("Operation not permitted in this session")]
    NotPermitted,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Record id collision: {0}")]
    IdCollision(String),

    #[error("Authenticated decryption failed: {0}")]
    AeadOpenFailed(String),

    #[error("Chunk {0} is corrupt")]
    ChunkCorrupt(u32),

    #[error("Checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Provider error ({kind}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("Cloud re-authentication required: {0}")]
    ReauthRequired(String),

    #[error("Conflict requires user resolution: {0}")]
    ConflictUnresolved(String),

    #[error("Passphrase too weak: {0}")]
    WeakPassphrase(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl VaultError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Creates a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a new AEAD failure
    pub fn aead_open_failed(msg: impl Into<String>) -> Self {
        Self::AeadOpenFailed(msg.into())
    }

    /// Creates a new provider error
    pub fn provider(kind: ProviderErrorKind, msg: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: msg.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks if the error is recoverable by retrying locally
    pub fn is_recoverable(&self) -> bool {
        match self {
            VaultError::Provider { kind, .. } => kind.is_transient(),
            VaultError::TimeoutError(_) => true,
            _ => false,
        }
    }

    /// Checks if the error is a security-related error
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            VaultError::WrongPassphrase
                | VaultError::Invalid2FA
                | VaultError::AeadOpenFailed(_)
                | VaultError::ChunkCorrupt(_)
                | VaultError::ChecksumMismatch(_)
        )
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            VaultError::Locked => "access",
            VaultError::WrongPassphrase => "access",
            VaultError::Needs2FA => "access",
            VaultError::Invalid2FA => "access",
            VaultError::NotPermitted => "access",
            VaultError::NotFound(_) => "data",
            VaultError::AlreadyExists(_) => "data",
            VaultError::IdCollision(_) => "data",
            VaultError::AeadOpenFailed(_) => "crypto",
            VaultError::ChunkCorrupt(_) => "crypto",
            VaultError::ChecksumMismatch(_) => "integrity",
            VaultError::IoError(_) => "io",
            VaultError::Provider { .. } => "provider",
            VaultError::ReauthRequired(_) => "provider",
            VaultError::ConflictUnresolved(_) => "sync",
            VaultError::WeakPassphrase(_) => "policy",
            VaultError::InvalidConfiguration(_) => "configuration",
            VaultError::SerializationError(_) => "serialization",
            VaultError::TimeoutError(_) => "timeout",
            VaultError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::SerializationError(err.to_string())
    }
}
