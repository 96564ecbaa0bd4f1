// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Events
//!
//! Typed events appended to the encrypted audit log. Each event is sealed as
//! its own envelope, bound by Associated Data to the `audit` purpose and its
//! sequence number, so log lines cannot be reordered or transplanted.

use serde::{Deserialize, Serialize};

use crate::value_objects::RecordId;

/// Kinds of auditable vault activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    VaultCreated,
    VaultUnlocked,
    VaultUnlockedBackupCode,
    FailedUnlockAttempt,
    Failed2faAttempt,
    VaultLocked,
    EntryAccessed,
    PasswordViewed,
    PasswordCopied,
    EntryCreated,
    EntryUpdated,
    EntryDeleted,
    FileUploaded,
    PassphraseChanged,
    ReauthRequired,
}

/// One audit-log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    /// Unix ms at which the event was recorded
    pub timestamp_ms: u64,
    /// The record this event concerns, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<RecordId>,
    /// Snapshot of the record title at event time, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_snapshot: Option<String>,
}

impl AuditEvent {
    /// Creates an event without a target record.
    pub fn new(kind: AuditEventKind, timestamp_ms: u64) -> Self {
        AuditEvent {
            kind,
            timestamp_ms,
            target_id: None,
            title_snapshot: None,
        }
    }

    /// Creates an event about a specific record.
    pub fn for_record(
        kind: AuditEventKind,
        timestamp_ms: u64,
        target_id: RecordId,
        title_snapshot: impl Into<String>,
    ) -> Self {
        AuditEvent {
            kind,
            timestamp_ms,
            target_id: Some(target_id),
            title_snapshot: Some(title_snapshot.into()),
        }
    }
}
