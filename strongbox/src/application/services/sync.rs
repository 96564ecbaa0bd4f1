// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cloud Sync Engine
//!
//! Record-by-record replication against the abstract provider contract.
//!
//! - Password/Note records upload the entry envelope already on disk, to a
//!   stable derived name (`prefix + id + ".enc"`), with a presence check
//!   first so re-syncing an unchanged vault transfers nothing
//! - File records upload each sealed chunk separately; the provider's
//!   object ids land in the index entry's `cloud_chunk_ids` in chunk
//!   order, and a partial failure marks the record `error` for retry on
//!   the next sync
//! - The whole index file is uploaded as `vault_index_backup.enc` at the
//!   end of every pass so a new device can restore
//! - Transient provider failures retry locally with exponential backoff
//!   (3 attempts, 250 ms base, doubling)
//!
//! Conflicts are classified per record and resolved in deterministic order
//! (`created` ascending, then id) with the strategy in [`SyncOptions`];
//! unresolvable merges are deferred into the conflict history.

use std::time::Duration;

use tracing::{debug, info, warn};
use zeroize::Zeroize;

use strongbox_domain::entities::record::RecordBody;
use strongbox_domain::entities::{
    CloudSyncStatus, ConflictKind, IndexEntry, Record, Resolution, ResolutionStrategy, SyncState,
    VaultIndex,
};
use strongbox_domain::value_objects::{Envelope, EnvelopeContext, RecordId};
use strongbox_domain::{CloudProvider, ProviderErrorKind, VaultError};

use crate::application::services::conflict::{self, ResolutionAction};
use crate::infrastructure::crypto::aead;
use crate::infrastructure::stores::file_store::FileStore;
use crate::infrastructure::stores::index_store::IndexStore;
use crate::infrastructure::stores::record_store::RecordStore;

/// Fixed name of the index backup object.
pub const INDEX_BACKUP_NAME: &str = "vault_index_backup.enc";

/// Maximum backoff attempts for transient provider failures.
const BACKOFF_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Per-sync options.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Strategy applied to detected conflicts
    pub strategy: ResolutionStrategy,
    /// Classify and report only; transfer nothing
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            strategy: ResolutionStrategy::KeepNewest,
            dry_run: false,
        }
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub uploaded_records: usize,
    pub uploaded_chunks: usize,
    pub downloaded_records: usize,
    pub downloaded_chunks: usize,
    pub deleted: usize,
    pub conflicts_resolved: usize,
    pub conflicts_pending: usize,
    pub errors: Vec<String>,
}

/// Snapshot for `sync_status()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Unix ms of the last completed pass
    pub last_full_sync: Option<u64>,
    /// Records whose status is `pending` or `error`
    pub pending_records: usize,
    /// Conflicts deferred in history
    pub unresolved_conflicts: usize,
}

/// Everything a sync pass operates on. Borrowed from the vault's state
/// under its single mutex, preserving the no-interleaving contract.
pub struct SyncContext<'a> {
    pub provider: &'a dyn CloudProvider,
    pub prefix: &'a str,
    pub index: &'a mut VaultIndex,
    pub record_store: &'a RecordStore,
    pub file_store: &'a FileStore,
    pub sync_state: &'a mut SyncState,
    pub entry_key: &'a [u8; 32],
    /// Seals the index copy of titles; distinct from the entry key
    pub index_key: &'a [u8; 32],
    pub now_ms: u64,
}

/// The derived object name for a record's entry envelope.
pub fn entry_object_name(prefix: &str, id: RecordId) -> String {
    format!("{}{}.enc", prefix, id)
}

/// The derived object name for one chunk blob.
pub fn chunk_object_name(prefix: &str, id: RecordId, k: u32, chunk_count: u32) -> String {
    if chunk_count <= 1 {
        format!("{}{}.bin", prefix, id)
    } else {
        format!("{}{}_{}.bin", prefix, id, k)
    }
}

/// Retries a provider call on transient failures with exponential backoff.
pub async fn with_backoff<T, F, Fut>(mut op: F) -> Result<T, VaultError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, VaultError>>,
{
    let mut delay = BACKOFF_BASE;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_recoverable() && attempt < BACKOFF_ATTEMPTS => {
                debug!(attempt, "transient provider failure, backing off: {}", err);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Runs one full sync pass.
pub async fn run_sync(
    ctx: &mut SyncContext<'_>,
    options: &SyncOptions,
) -> Result<SyncSummary, VaultError> {
    let mut summary = SyncSummary::default();

    // Remote inventory under our prefix
    let remote_objects = with_backoff(|| ctx.provider.list(Some(ctx.prefix).filter(|p| !p.is_empty())))
        .await?;
    let mut remote_record_ids = Vec::new();
    for object in &remote_objects {
        if let Some(id) = parse_entry_object_name(ctx.prefix, &object.name) {
            remote_record_ids.push(id);
        }
    }

    // Union of local and remote ids, processed in deterministic order
    let mut all_ids: Vec<RecordId> = ctx.index.entries.keys().copied().collect();
    for id in &remote_record_ids {
        if !all_ids.contains(id) {
            all_ids.push(*id);
        }
    }
    all_ids.sort_by_key(|id| {
        (
            ctx.index.entry(*id).map(|e| e.created).unwrap_or(u64::MAX),
            *id,
        )
    });

    for id in all_ids {
        if let Err(err) = sync_one_record(ctx, options, id, &remote_record_ids, &mut summary).await
        {
            warn!(%id, "record sync failed: {}", err);
            if let Some(entry) = ctx.index.entry_mut(id) {
                entry.cloud_sync_status = CloudSyncStatus::Error;
            }
            summary.errors.push(format!("{}: {}", id, err));
        }
    }

    if !options.dry_run {
        ctx.sync_state.last_full_sync = Some(ctx.now_ms);
        ctx.index.metadata.last_sync = Some(ctx.now_ms);
    }

    info!(
        uploaded = summary.uploaded_records,
        downloaded = summary.downloaded_records,
        conflicts = summary.conflicts_resolved,
        pending = summary.conflicts_pending,
        "sync pass complete"
    );
    Ok(summary)
}

fn parse_entry_object_name(prefix: &str, name: &str) -> Option<RecordId> {
    let stripped = name.strip_prefix(prefix)?;
    let stem = stripped.strip_suffix(".enc")?;
    if stem == INDEX_BACKUP_NAME.trim_end_matches(".enc") {
        return None;
    }
    RecordId::parse(stem).ok()
}

async fn sync_one_record(
    ctx: &mut SyncContext<'_>,
    options: &SyncOptions,
    id: RecordId,
    remote_record_ids: &[RecordId],
    summary: &mut SyncSummary,
) -> Result<(), VaultError> {
    let local = match ctx.index.entry(id) {
        Some(_) => Some(ctx.record_store.load(id, ctx.entry_key).await?),
        None => None,
    };
    let remote = if remote_record_ids.contains(&id) {
        fetch_remote_record(ctx, id).await?
    } else {
        None
    };
    let tracked = ctx.sync_state.entry_versions.get(&id).cloned();

    let classified = conflict::classify(id, local.as_ref(), remote.as_ref(), tracked.as_ref())?;
    let Some(detected) = classified else {
        // Sides agree, or exactly one side moved since the last sync
        if let (Some(local_record), Some(remote_record)) = (&local, &remote) {
            let local_sum = conflict::record_checksum(local_record)?;
            let remote_sum = conflict::record_checksum(remote_record)?;
            let was_synced = tracked.as_ref().map(|t| t.was_synced()).unwrap_or(false);
            if local_sum == remote_sum {
                if !options.dry_run {
                    ensure_chunks_pushed(ctx, local_record, summary, false).await?;
                    if !was_synced {
                        ctx.sync_state.mark_synced(id, 1, local_sum, ctx.now_ms);
                        if let Some(entry) = ctx.index.entry_mut(id) {
                            entry.cloud_sync_status = CloudSyncStatus::Synced;
                            entry.cloud_synced_at = Some(ctx.now_ms);
                        }
                    }
                }
            } else if was_synced
                && tracked.as_ref().map(|t| t.checksum.as_str()) == Some(remote_sum.as_str())
            {
                // Only the local copy moved: plain push
                push_record(ctx, local_record, summary, options.dry_run, false).await?;
            } else if !options.dry_run {
                // Only the remote copy moved: plain pull
                adopt_remote(ctx, remote_record, summary).await?;
            }
        }
        return Ok(());
    };

    if options.dry_run {
        summary.conflicts_pending += 1;
        return Ok(());
    }

    let action = match conflict::resolve(
        &detected,
        options.strategy,
        local.as_ref(),
        remote.as_ref(),
        ctx.now_ms,
    ) {
        Ok(action) => action,
        Err(VaultError::ConflictUnresolved(reason)) => {
            debug!(%id, "conflict deferred: {}", reason);
            ctx.sync_state.conflict_history.push(Resolution {
                id,
                kind: detected.kind,
                strategy: ResolutionStrategy::Skip,
                resolved_at: ctx.now_ms,
            });
            summary.conflicts_pending += 1;
            return Ok(());
        }
        Err(other) => return Err(other),
    };

    if matches!(action, ResolutionAction::Skip) {
        ctx.sync_state.conflict_history.push(Resolution {
            id,
            kind: detected.kind,
            strategy: ResolutionStrategy::Skip,
            resolved_at: ctx.now_ms,
        });
        summary.conflicts_pending += 1;
        return Ok(());
    }

    match action {
        ResolutionAction::KeepLocal => {
            if let Some(local_record) = &local {
                push_record(ctx, local_record, summary, false, false).await?;
            }
        }
        ResolutionAction::KeepRemote(remote_record) => {
            adopt_remote(ctx, &remote_record, summary).await?;
        }
        ResolutionAction::KeepBoth(duplicate) => {
            if let Some(local_record) = &local {
                push_record(ctx, local_record, summary, false, false).await?;
            }
            adopt_remote(ctx, &duplicate, summary).await?;
            push_record(ctx, &duplicate, summary, false, true).await?;
        }
        ResolutionAction::Merged(merged) => {
            adopt_remote(ctx, &merged, summary).await?;
            push_record(ctx, &merged, summary, false, true).await?;
        }
        ResolutionAction::Delete => {
            delete_everywhere(ctx, id, local.as_ref(), summary).await?;
        }
        ResolutionAction::Skip => unreachable!("handled above"),
    }

    if action_kind_for_history(&detected.kind).is_some() {
        ctx.sync_state.conflict_history.push(Resolution {
            id,
            kind: detected.kind,
            strategy: options.strategy,
            resolved_at: ctx.now_ms,
        });
        summary.conflicts_resolved += 1;
    }
    Ok(())
}

/// Benign kinds (one-sided presence with no tracking) are ordinary pushes
/// and pulls; only genuine disagreements enter the history.
fn action_kind_for_history(kind: &ConflictKind) -> Option<ConflictKind> {
    match kind {
        ConflictKind::LocalOnly | ConflictKind::RemoteOnly => None,
        other => Some(*other),
    }
}

async fn fetch_remote_record(
    ctx: &SyncContext<'_>,
    id: RecordId,
) -> Result<Option<Record>, VaultError> {
    let name = entry_object_name(ctx.prefix, id);
    let Some(object_id) = with_backoff(|| ctx.provider.find_by_name(&name)).await? else {
        return Ok(None);
    };
    let bytes = with_backoff(|| ctx.provider.download_to_buffer(&object_id)).await?;
    let envelope = Envelope::from_any(&bytes)?;
    let mut plaintext = aead::open(
        ctx.entry_key,
        &EnvelopeContext::entry(*id.as_bytes()),
        &envelope,
    )?;
    let record: Record = serde_json::from_slice(&plaintext)?;
    plaintext.zeroize();
    Ok(Some(record))
}

/// Uploads a record's entry envelope (and chunks for File records), with a
/// presence check for idempotence. `force` bypasses the unchanged check
/// when the remote copy is known stale (merge results, conflict copies).
async fn push_record(
    ctx: &mut SyncContext<'_>,
    record: &Record,
    summary: &mut SyncSummary,
    dry_run: bool,
    force: bool,
) -> Result<(), VaultError> {
    if dry_run {
        return Ok(());
    }
    let checksum = conflict::record_checksum(record)?;
    let unchanged = !force
        && ctx
            .sync_state
            .entry_versions
            .get(&record.id)
            .map(|tracked| tracked.checksum == checksum && tracked.last_synced_at.is_some())
            .unwrap_or(false);

    let name = entry_object_name(ctx.prefix, record.id);
    let already_present = with_backoff(|| ctx.provider.find_by_name(&name))
        .await?
        .is_some();

    if !(unchanged && already_present) {
        let text = ctx.record_store.envelope_text(record.id).await?;
        with_backoff(|| ctx.provider.upload_bytes(&name, text.as_bytes(), None)).await?;
        summary.uploaded_records += 1;
    }

    ensure_chunks_pushed(ctx, record, summary, false).await?;

    if let Some(entry) = ctx.index.entry_mut(record.id) {
        entry.cloud_sync_status = CloudSyncStatus::Synced;
        entry.cloud_synced_at = Some(ctx.now_ms);
    }
    let remote_version = ctx
        .sync_state
        .entry_versions
        .get(&record.id)
        .map(|t| t.remote_version + 1)
        .unwrap_or(1);
    ctx.sync_state
        .mark_synced(record.id, remote_version, checksum, ctx.now_ms);
    Ok(())
}

/// Uploads any chunk blobs not yet present remotely, recording their object
/// ids in order.
async fn ensure_chunks_pushed(
    ctx: &mut SyncContext<'_>,
    record: &Record,
    summary: &mut SyncSummary,
    dry_run: bool,
) -> Result<(), VaultError> {
    let RecordBody::File(file_data) = &record.body else {
        return Ok(());
    };
    if dry_run {
        return Ok(());
    }
    let chunk_count = file_data.chunk_count;
    let already_complete = ctx
        .index
        .entry(record.id)
        .and_then(|e| e.cloud_chunk_ids.as_ref())
        .map(|ids| ids.len() as u32 == chunk_count)
        .unwrap_or(false)
        && ctx
            .index
            .entry(record.id)
            .map(|e| e.cloud_sync_status == CloudSyncStatus::Synced)
            .unwrap_or(false);
    if already_complete {
        return Ok(());
    }

    let mut chunk_ids = Vec::with_capacity(chunk_count as usize);
    for k in 0..chunk_count.max(1) {
        let name = chunk_object_name(ctx.prefix, record.id, k, chunk_count);
        let object_id = match with_backoff(|| ctx.provider.find_by_name(&name)).await? {
            Some(existing) => existing,
            None => {
                let bytes = ctx.file_store.chunk_bytes(record.id, k, chunk_count).await?;
                let uploaded =
                    with_backoff(|| ctx.provider.upload_bytes(&name, &bytes, None)).await?;
                summary.uploaded_chunks += 1;
                uploaded
            }
        };
        chunk_ids.push(object_id);
    }

    if let Some(entry) = ctx.index.entry_mut(record.id) {
        entry.cloud_chunk_ids = Some(chunk_ids);
    }
    Ok(())
}

/// Persists a remote (or merged) record locally: entry envelope, index
/// entry, and, for File records, the chunk blobs.
async fn adopt_remote(
    ctx: &mut SyncContext<'_>,
    record: &Record,
    summary: &mut SyncSummary,
) -> Result<(), VaultError> {
    ctx.record_store.save(record, ctx.entry_key).await?;
    summary.downloaded_records += 1;

    // Rebuild the index entry from the adopted record
    let title_envelope = aead::seal(
        ctx.index_key,
        &EnvelopeContext::entry(*record.id.as_bytes()),
        record.title.as_bytes(),
    )?;
    let mut entry = IndexEntry {
        title_encrypted: title_envelope.to_text(),
        entry_type: record.entry_type(),
        category: record.category().map(str::to_string),
        favorite: record.favorite,
        mime_type: None,
        file_size: None,
        chunk_count: None,
        cloud_chunk_ids: None,
        cloud_sync_status: CloudSyncStatus::Synced,
        cloud_synced_at: Some(ctx.now_ms),
        created: record.created,
        modified: record.modified,
    };

    if let RecordBody::File(file_data) = &record.body {
        entry.mime_type = Some(file_data.mime_type.clone());
        entry.file_size = Some(file_data.size);
        entry.chunk_count = Some(file_data.chunk_count);

        let mut chunk_ids = Vec::new();
        for k in 0..file_data.chunk_count.max(1) {
            let name = chunk_object_name(ctx.prefix, record.id, k, file_data.chunk_count);
            if let Some(object_id) = with_backoff(|| ctx.provider.find_by_name(&name)).await? {
                if !ctx
                    .file_store
                    .chunk_exists(record.id, k, file_data.chunk_count)
                    .await
                {
                    let bytes =
                        with_backoff(|| ctx.provider.download_to_buffer(&object_id)).await?;
                    ctx.file_store
                        .write_chunk_bytes(record.id, k, file_data.chunk_count, &bytes)
                        .await?;
                    summary.downloaded_chunks += 1;
                }
                chunk_ids.push(object_id);
            }
        }
        if chunk_ids.len() as u32 == file_data.chunk_count {
            entry.cloud_chunk_ids = Some(chunk_ids);
        } else {
            entry.cloud_sync_status = CloudSyncStatus::Error;
        }
    }

    match ctx.index.entry_mut(record.id) {
        Some(slot) => *slot = entry,
        None => ctx.index.insert_entry(record.id, entry)?,
    }

    let checksum = conflict::record_checksum(record)?;
    let remote_version = ctx
        .sync_state
        .entry_versions
        .get(&record.id)
        .map(|t| t.remote_version + 1)
        .unwrap_or(1);
    ctx.sync_state
        .mark_synced(record.id, remote_version, checksum, ctx.now_ms);
    Ok(())
}

/// Deletes a record locally and remotely (best-effort on the remote side).
async fn delete_everywhere(
    ctx: &mut SyncContext<'_>,
    id: RecordId,
    local: Option<&Record>,
    summary: &mut SyncSummary,
) -> Result<(), VaultError> {
    let chunk_count = local
        .and_then(|record| match &record.body {
            RecordBody::File(data) => Some(data.chunk_count),
            _ => None,
        })
        .or_else(|| ctx.index.entry(id).and_then(|e| e.chunk_count));

    ctx.record_store.delete(id).await?;
    if let Some(count) = chunk_count {
        ctx.file_store.delete_all(id, count).await?;
    }
    ctx.index.remove_entry(id);

    delete_remote_record(ctx.provider, ctx.prefix, id, chunk_count).await;
    ctx.sync_state.forget(id);
    summary.deleted += 1;
    Ok(())
}

/// Best-effort removal of a record's cloud artifacts; missing objects and
/// provider errors are swallowed (the next sync retries).
pub async fn delete_remote_record(
    provider: &dyn CloudProvider,
    prefix: &str,
    id: RecordId,
    chunk_count: Option<u32>,
) {
    let mut names = vec![entry_object_name(prefix, id)];
    let count = chunk_count.unwrap_or(1);
    for k in 0..count.max(1) {
        names.push(chunk_object_name(prefix, id, k, count));
    }
    for name in names {
        if let Ok(Some(object_id)) = provider.find_by_name(&name).await {
            if let Err(err) = provider.delete(&object_id).await {
                warn!(%id, %name, "best-effort cloud delete failed: {}", err);
            }
        }
    }
}

/// Uploads the index file as the fixed-name backup object.
///
/// Runs after the caller has persisted the post-sync index, so the backup
/// always carries the statuses the pass produced.
pub async fn backup_index(
    provider: &dyn CloudProvider,
    prefix: &str,
    index_store: &IndexStore,
) -> Result<(), VaultError> {
    let bytes = index_store.raw_bytes().await?;
    let name = format!("{}{}", prefix, INDEX_BACKUP_NAME);
    with_backoff(|| provider.upload_bytes(&name, &bytes, None)).await?;
    Ok(())
}

/// Downloads the index backup for a restore onto a new device.
pub async fn fetch_index_backup(
    provider: &dyn CloudProvider,
    prefix: &str,
) -> Result<Vec<u8>, VaultError> {
    let name = format!("{}{}", prefix, INDEX_BACKUP_NAME);
    let object_id = with_backoff(|| provider.find_by_name(&name))
        .await?
        .ok_or_else(|| {
            VaultError::provider(ProviderErrorKind::NotFound, format!("no {}", name))
        })?;
    with_backoff(|| provider.download_to_buffer(&object_id)).await
}

/// Fetches a single entry envelope for lazy download.
pub async fn fetch_entry_envelope(
    provider: &dyn CloudProvider,
    prefix: &str,
    id: RecordId,
) -> Result<Option<Vec<u8>>, VaultError> {
    let name = entry_object_name(prefix, id);
    match with_backoff(|| provider.find_by_name(&name)).await? {
        Some(object_id) => Ok(Some(
            with_backoff(|| provider.download_to_buffer(&object_id)).await?,
        )),
        None => Ok(None),
    }
}

/// Fetches a single chunk blob for lazy download.
pub async fn fetch_chunk(
    provider: &dyn CloudProvider,
    prefix: &str,
    id: RecordId,
    k: u32,
    chunk_count: u32,
) -> Result<Option<Vec<u8>>, VaultError> {
    let name = chunk_object_name(prefix, id, k, chunk_count);
    match with_backoff(|| provider.find_by_name(&name)).await? {
        Some(object_id) => Ok(Some(
            with_backoff(|| provider.download_to_buffer(&object_id)).await?,
        )),
        None => Ok(None),
    }
}

/// Best-effort removal of every cloud artifact under the prefix.
pub async fn destruct_remote(provider: &dyn CloudProvider, prefix: &str) {
    let listed = match provider.list(Some(prefix).filter(|p| !p.is_empty())).await {
        Ok(listed) => listed,
        Err(err) => {
            warn!("destruct: listing cloud artifacts failed: {}", err);
            return;
        }
    };
    for object in listed {
        if let Err(err) = provider.delete(&object.id).await {
            warn!(name = %object.name, "destruct: cloud delete failed: {}", err);
        }
    }
}
