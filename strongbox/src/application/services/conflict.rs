// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Conflict Resolver
//!
//! Detects and resolves per-record disagreements between local and remote
//! state during sync.
//!
//! Change detection compares `SHA-256(canonical_json(record))` against the
//! checksum recorded at the last sync: canonical JSON is UTF-8 with
//! recursively sorted keys and no whitespace, so the digest is stable
//! across serialization runs.
//!
//! Resolutions are applied in a deterministic order (record `created`
//! ascending, then id ascending), which makes dry runs reproducible.

use sha2::{Digest, Sha256};

use strongbox_domain::entities::record::{PasswordData, RecordBody};
use strongbox_domain::entities::{Conflict, ConflictKind, EntryVersion, Record, ResolutionStrategy};
use strongbox_domain::value_objects::RecordId;
use strongbox_domain::VaultError;

/// What the sync engine should do with a conflicted record.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionAction {
    /// Push the local copy
    KeepLocal,
    /// Adopt the remote copy locally
    KeepRemote(Record),
    /// Keep the local copy and also adopt the remote one under a fresh id
    KeepBoth(Record),
    /// Persist the merged record and push it
    Merged(Record),
    /// Delete the record on both sides
    Delete,
    /// Defer; the conflict stays in history
    Skip,
}

/// Serializes a record to canonical JSON.
///
/// serde_json maps are BTree-ordered (the `preserve_order` feature is not
/// enabled anywhere in this workspace), so value-level serialization yields
/// recursively sorted keys with no whitespace.
pub fn canonical_json(record: &Record) -> Result<String, VaultError> {
    let value = serde_json::to_value(record)?;
    Ok(serde_json::to_string(&value)?)
}

/// Hex SHA-256 of the record's canonical JSON.
pub fn record_checksum(record: &Record) -> Result<String, VaultError> {
    Ok(hex::encode(Sha256::digest(canonical_json(record)?)))
}

/// Classifies the relationship between local and remote copies.
///
/// Returns `None` when the sides agree (nothing to do) or when only one
/// side changed since the last sync (plain push/pull, not a conflict the
/// resolver needs to arbitrate).
pub fn classify(
    id: RecordId,
    local: Option<&Record>,
    remote: Option<&Record>,
    tracked: Option<&EntryVersion>,
) -> Result<Option<Conflict>, VaultError> {
    let conflict = |kind: ConflictKind| Conflict {
        id,
        kind,
        local_modified: local.map(|r| r.modified),
        remote_modified: remote.map(|r| r.modified),
        created: local.or(remote).map(|r| r.created).unwrap_or(0),
    };

    // Tracking entries exist from the first local mutation; only a record
    // that completed a sync has a meaningful baseline
    let was_synced = tracked.map(|t| t.was_synced()).unwrap_or(false);

    match (local, remote) {
        (None, None) => Ok(None),
        (Some(_), None) => Ok(Some(conflict(if was_synced {
            ConflictKind::DeletedRemotely
        } else {
            ConflictKind::LocalOnly
        }))),
        (None, Some(_)) => Ok(Some(conflict(if was_synced {
            ConflictKind::DeletedLocally
        } else {
            ConflictKind::RemoteOnly
        }))),
        (Some(local_record), Some(remote_record)) => {
            let local_sum = record_checksum(local_record)?;
            let remote_sum = record_checksum(remote_record)?;
            if local_sum == remote_sum {
                return Ok(None);
            }
            let baseline = tracked
                .filter(|t| t.was_synced())
                .map(|t| t.checksum.as_str());
            let local_changed = baseline != Some(local_sum.as_str());
            let remote_changed = baseline != Some(remote_sum.as_str());
            if local_changed && remote_changed {
                Ok(Some(conflict(ConflictKind::ModifiedBoth)))
            } else {
                // Exactly one side moved: an ordinary push or pull
                Ok(None)
            }
        }
    }
}

/// Applies a strategy to a conflict.
pub fn resolve(
    conflict: &Conflict,
    strategy: ResolutionStrategy,
    local: Option<&Record>,
    remote: Option<&Record>,
    now_ms: u64,
) -> Result<ResolutionAction, VaultError> {
    match strategy {
        ResolutionStrategy::Skip => Ok(ResolutionAction::Skip),
        ResolutionStrategy::Delete => Ok(ResolutionAction::Delete),
        ResolutionStrategy::KeepLocal => match local {
            Some(_) => Ok(ResolutionAction::KeepLocal),
            None => Ok(ResolutionAction::Delete),
        },
        ResolutionStrategy::KeepRemote => match remote {
            Some(remote_record) => Ok(ResolutionAction::KeepRemote(remote_record.clone())),
            None => Ok(ResolutionAction::Delete),
        },
        ResolutionStrategy::KeepNewest => match (local, remote) {
            (Some(l), Some(r)) => {
                if l.modified >= r.modified {
                    Ok(ResolutionAction::KeepLocal)
                } else {
                    Ok(ResolutionAction::KeepRemote(r.clone()))
                }
            }
            (Some(_), None) => Ok(ResolutionAction::KeepLocal),
            (None, Some(r)) => Ok(ResolutionAction::KeepRemote(r.clone())),
            (None, None) => Ok(ResolutionAction::Delete),
        },
        ResolutionStrategy::KeepBoth => match remote {
            Some(remote_record) => {
                let mut duplicate = remote_record.clone();
                duplicate.id = RecordId::new();
                duplicate.title = format!("{} (conflict copy)", duplicate.title);
                duplicate.touch(now_ms);
                Ok(ResolutionAction::KeepBoth(duplicate))
            }
            None => Ok(ResolutionAction::KeepLocal),
        },
        ResolutionStrategy::Merge => match (local, remote) {
            (Some(l), Some(r)) => merge_records(conflict.id, l, r, now_ms),
            _ => Err(VaultError::ConflictUnresolved(format!(
                "{}: merge needs both copies",
                conflict.id
            ))),
        },
    }
}

/// Field-wise merge for Password records.
///
/// A non-empty remote field overrides an empty local one and vice versa;
/// both sides non-empty and different for the same field defers to the
/// user with `ConflictUnresolved`.
fn merge_records(
    id: RecordId,
    local: &Record,
    remote: &Record,
    now_ms: u64,
) -> Result<ResolutionAction, VaultError> {
    let (local_data, remote_data) = match (&local.body, &remote.body) {
        (RecordBody::Password(l), RecordBody::Password(r)) => (l, r),
        _ => {
            return Err(VaultError::ConflictUnresolved(format!(
                "{}: only password records merge field-wise",
                id
            )))
        }
    };

    let mut merged_data = PasswordData::default();
    for (slot, l, r, name) in [
        (
            &mut merged_data.username,
            &local_data.username,
            &remote_data.username,
            "username",
        ),
        (
            &mut merged_data.password,
            &local_data.password,
            &remote_data.password,
            "password",
        ),
        (&mut merged_data.url, &local_data.url, &remote_data.url, "url"),
        (
            &mut merged_data.notes,
            &local_data.notes,
            &remote_data.notes,
            "notes",
        ),
        (
            &mut merged_data.category,
            &local_data.category,
            &remote_data.category,
            "category",
        ),
    ] {
        *slot = merge_field(l, r, name, id)?;
    }
    merged_data.totp = match (&local_data.totp, &remote_data.totp) {
        (Some(l), Some(r)) if l != r => {
            return Err(VaultError::ConflictUnresolved(format!(
                "{}: totp differs on both sides",
                id
            )))
        }
        (l, r) => l.clone().or_else(|| r.clone()),
    };
    merged_data.password_last_changed = local_data
        .password_last_changed
        .max(remote_data.password_last_changed);
    merged_data.password_expiry_days = local_data
        .password_expiry_days
        .or(remote_data.password_expiry_days);

    let mut merged = local.clone();
    merged.title = if local.modified >= remote.modified {
        local.title.clone()
    } else {
        remote.title.clone()
    };
    merged.favorite = local.favorite || remote.favorite;
    merged.body = RecordBody::Password(merged_data);
    merged.touch(now_ms.max(local.modified).max(remote.modified));
    Ok(ResolutionAction::Merged(merged))
}

fn merge_field(
    local: &Option<String>,
    remote: &Option<String>,
    name: &str,
    id: RecordId,
) -> Result<Option<String>, VaultError> {
    let local_value = local.as_deref().filter(|s| !s.is_empty());
    let remote_value = remote.as_deref().filter(|s| !s.is_empty());
    match (local_value, remote_value) {
        (Some(l), Some(r)) if l != r => Err(VaultError::ConflictUnresolved(format!(
            "{}: field {} differs on both sides",
            id, name
        ))),
        (Some(l), _) => Ok(Some(l.to_string())),
        (None, Some(r)) => Ok(Some(r.to_string())),
        (None, None) => Ok(None),
    }
}

/// Orders conflicts deterministically: `created` ascending, then id.
pub fn order_conflicts(conflicts: &mut [Conflict]) {
    conflicts.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
}
