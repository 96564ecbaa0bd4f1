// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vault Application Service
//!
//! The top-level `Vault` value: one injectable object owning the key
//! manager, the stores, the session state machine, and the command surface
//! an interactive shell calls. Nothing here is a process-wide singleton;
//! tests construct their own vault against a temp directory and their own
//! clock and provider.
//!
//! ## Serialization
//!
//! All state lives behind a single `tokio::sync::Mutex`. Every public
//! operation locks it for its whole duration, so operations complete one at
//! a time: a successful mutation happens-before any read that observes it,
//! and `lock()` happens-before the next key access fails with `Locked`.
//! Long-running I/O (chunk streams, cloud transfers) yields to progress
//! callbacks but never lets another vault mutation interleave.
//!
//! ## Sessions
//!
//! ```text
//! Locked --unlock(real pass)----> Real          (or PendingSecondFactor)
//! Locked --unlock(duress pass)--> Duress        (decoy view, 2FA bypassed)
//! PendingSecondFactor --verify--> Real
//! any ----lock()/idle timeout---> Locked
//! ```
//!
//! A duress session serves the configured decoys from list/get/search,
//! simulates every mutation without persisting, suppresses audit, and
//! refuses duress/2FA/passphrase configuration.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use strongbox_domain::entities::record::{
    FileData, PasswordData, RecordBody, TotpConfig,
};
use strongbox_domain::entities::vault_index::SALT_LEN;
use strongbox_domain::entities::{
    AuditEvent, AuditEventKind, CloudSyncStatus, DuressConfig, EntryType, IndexEntry, KdfParams,
    Record, VaultIndex,
};
use strongbox_domain::services::ProgressFn;
use strongbox_domain::value_objects::{ChunkSize, Envelope, EnvelopeContext, Passphrase, RecordId};
use strongbox_domain::{Clock, CloudProvider, SystemClock, VaultError};

use crate::application::services::second_factor::{self, GeneratedSecondFactor};
use crate::application::services::search::{self, RankedHit, SearchableRecord};
use crate::application::services::duress::DuressStore;
use crate::application::services::sync;
use crate::infrastructure::cloud::oauth::{OAuthFlow, OAuthProviderConfig};
use crate::infrastructure::config::{CloudStorageConfig, VaultLayout};
use crate::infrastructure::crypto::{aead, kdf, KeyManager};
use crate::infrastructure::stores::audit_log::{AuditLog, AuditReadout};
use crate::infrastructure::stores::file_store::FileStore;
use crate::infrastructure::stores::index_store::IndexStore;
use crate::infrastructure::stores::record_store::RecordStore;
use crate::infrastructure::stores::sync_state_store::SyncStateStore;
use crate::infrastructure::stores::token_store::TokenStore;

pub use crate::application::services::sync::{SyncOptions, SyncStatus, SyncSummary};

/// Default idle timeout before auto-lock (5 minutes).
pub const DEFAULT_AUTO_LOCK_MS: u64 = 5 * 60 * 1000;

/// Default cap on consecutive second-factor failures.
pub const DEFAULT_MAX_2FA_ATTEMPTS: u8 = 3;

/// Result of a primary unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Real session, fully unlocked
    Real,
    /// Decoy session
    Duress,
    /// Primary factor accepted; call `verify_second_factor`
    Needs2FA,
}

/// Construction-time options for a vault.
pub struct VaultOptions {
    pub layout: VaultLayout,
    pub chunk_size: ChunkSize,
    /// Idle auto-lock in ms; 0 disables
    pub auto_lock_ms: u64,
    pub max_2fa_attempts: u8,
    pub clock: Arc<dyn Clock>,
    pub provider: Option<Arc<dyn CloudProvider>>,
    pub oauth: Option<OAuthProviderConfig>,
}

impl VaultOptions {
    /// Defaults for the given vault root.
    pub fn new(layout: VaultLayout) -> Self {
        VaultOptions {
            layout,
            chunk_size: ChunkSize::default(),
            auto_lock_ms: DEFAULT_AUTO_LOCK_MS,
            max_2fa_attempts: DEFAULT_MAX_2FA_ATTEMPTS,
            clock: Arc::new(SystemClock),
            provider: None,
            oauth: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: ChunkSize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_auto_lock_ms(mut self, auto_lock_ms: u64) -> Self {
        self.auto_lock_ms = auto_lock_ms;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn CloudProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_oauth(mut self, oauth: OAuthProviderConfig) -> Self {
        self.oauth = Some(oauth);
        self
    }
}

/// Listing filter.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub entry_type: Option<EntryType>,
    pub category: Option<String>,
    pub favorites_only: bool,
}

/// One listing row, with the title already decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub id: RecordId,
    pub title: String,
    pub entry_type: EntryType,
    pub category: Option<String>,
    pub favorite: bool,
    pub modified: u64,
    pub cloud_sync_status: CloudSyncStatus,
}

/// Partial update for `update()`. `Some` replaces the field; for optional
/// record fields an empty string clears them.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
    /// Note content
    pub content: Option<String>,
    pub favorite: Option<bool>,
    pub totp: Option<TotpConfig>,
}

enum Session {
    Locked,
    PendingSecondFactor,
    Real,
    Duress { decoys: Vec<Record> },
}

struct VaultState {
    layout: VaultLayout,
    auto_lock_ms: u64,
    max_2fa_attempts: u8,
    clock: Arc<dyn Clock>,
    provider: Option<Arc<dyn CloudProvider>>,
    oauth: Option<OAuthProviderConfig>,

    index_store: IndexStore,
    record_store: RecordStore,
    file_store: FileStore,
    audit_log: AuditLog,
    token_store: TokenStore,
    duress_store: DuressStore,
    sync_state_store: SyncStateStore,

    keys: KeyManager,
    index: Option<VaultIndex>,
    session: Session,
    /// Events waiting for the audit key (failed unlocks happen locked)
    pending_audit: Vec<AuditEvent>,
    audit_seq: u32,
    last_activity_ms: u64,
    twofa_failures: u8,
}

/// The vault core.
pub struct Vault {
    state: Mutex<VaultState>,
}

impl Vault {
    /// Builds a vault over the given options. No I/O happens until an
    /// operation runs; no network activity happens until sync or cloud
    /// authentication is invoked.
    pub fn new(options: VaultOptions) -> Self {
        let layout = options.layout;
        let state = VaultState {
            index_store: IndexStore::new(layout.index_path()),
            record_store: RecordStore::new(layout.entries_dir()),
            file_store: FileStore::new(layout.files_dir(), options.chunk_size),
            audit_log: AuditLog::new(layout.audit_path()),
            token_store: TokenStore::new(layout.token_path()),
            duress_store: DuressStore::new(layout.duress_path()),
            sync_state_store: SyncStateStore::new(layout.sync_state_path()),
            layout,
            auto_lock_ms: options.auto_lock_ms,
            max_2fa_attempts: options.max_2fa_attempts,
            clock: options.clock,
            provider: options.provider,
            oauth: options.oauth,
            keys: KeyManager::new(),
            index: None,
            session: Session::Locked,
            pending_audit: Vec::new(),
            audit_seq: 0,
            last_activity_ms: 0,
            twofa_failures: 0,
        };
        Vault {
            state: Mutex::new(state),
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Creates a fresh vault: new salt, KDF run, empty index.
    pub async fn init(&self, passphrase: &str) -> Result<(), VaultError> {
        let mut s = self.state.lock().await;
        if s.index_store.exists().await {
            return Err(VaultError::AlreadyExists(
                s.layout.root().display().to_string(),
            ));
        }
        let passphrase = Passphrase::new_checked(passphrase)?;
        s.layout.ensure_dirs().await?;

        let salt = kdf::generate_salt();
        let params = KdfParams::default();
        let kek = kdf::derive_kek(&passphrase, &salt, &params)?;
        let key_hash = hex::encode(kdf::verifier(&kek)?.as_ref());
        let now = s.clock.now_ms();

        let index = VaultIndex::new(base64_encode(&salt), params, key_hash, now);
        s.keys.unseal(&kek)?;
        let index_key = *s.keys.index_key()?;
        s.index_store.save(&index, &index_key).await?;
        s.index = Some(index);
        s.session = Session::Real;
        s.audit_seq = 0;
        s.record_audit(AuditEvent::new(AuditEventKind::VaultCreated, now))
            .await?;
        s.last_activity_ms = now;
        info!(root = %s.layout.root().display(), "vault created");
        Ok(())
    }

    /// Attempts an unlock: real verifier first, then the duress projection.
    /// A wrong passphrase pays both checks and gets one `WrongPassphrase`.
    pub async fn unlock(&self, passphrase: &str) -> Result<UnlockOutcome, VaultError> {
        let mut s = self.state.lock().await;
        if !matches!(s.session, Session::Locked) {
            s.do_lock().await;
        }

        let salt_bytes = s.index_store.read_salt().await?;
        let candidate = Passphrase::new(passphrase);
        let kek = kdf::derive_kek(&candidate, &salt_bytes, &KdfParams::default())?;
        let index_key = kdf::derive_subkey(&kek, kdf::LABEL_INDEX)?;

        match s.index_store.load(&index_key).await {
            Ok(index) => {
                let computed = kdf::verifier(&kek)?;
                let stored = hex::decode(&index.key_hash)
                    .map_err(|_| VaultError::internal_error("stored verifier is not hex"))?;
                if !kdf::verifier_matches(computed.as_ref(), &stored) {
                    // The envelope opened but the verifier disagrees:
                    // treat exactly like a wrong passphrase
                    let now = s.clock.now_ms();
                    s.pending_audit
                        .push(AuditEvent::new(AuditEventKind::FailedUnlockAttempt, now));
                    return Err(VaultError::WrongPassphrase);
                }

                s.keys.unseal(&kek)?;
                s.index = Some(index);
                s.audit_seq = s.audit_log.count().await?;
                let now = s.clock.now_ms();
                s.last_activity_ms = now;
                s.twofa_failures = 0;

                if s
                    .index
                    .as_ref()
                    .map(|i| i.second_factor_enabled())
                    .unwrap_or(false)
                {
                    s.session = Session::PendingSecondFactor;
                    debug!("primary unlock ok, second factor required");
                    return Ok(UnlockOutcome::Needs2FA);
                }
                s.session = Session::Real;
                s.record_audit(AuditEvent::new(AuditEventKind::VaultUnlocked, now))
                    .await?;
                Ok(UnlockOutcome::Real)
            }
            Err(VaultError::AeadOpenFailed(_)) => {
                // Duress check: the projection opens only under the duress
                // passphrase's index subkey
                match s.duress_store.try_open(&index_key).await {
                    Ok(Some(decoys)) => {
                        let now = s.clock.now_ms();
                        s.session = Session::Duress { decoys };
                        s.last_activity_ms = now;
                        Ok(UnlockOutcome::Duress)
                    }
                    _ => {
                        let now = s.clock.now_ms();
                        s.pending_audit
                            .push(AuditEvent::new(AuditEventKind::FailedUnlockAttempt, now));
                        Err(VaultError::WrongPassphrase)
                    }
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Presents the second factor after `UnlockOutcome::Needs2FA`: a TOTP
    /// code or a one-shot backup code.
    pub async fn verify_second_factor(&self, code: &str) -> Result<(), VaultError> {
        let mut s = self.state.lock().await;
        if !matches!(s.session, Session::PendingSecondFactor) {
            return Err(VaultError::invalid_config("no second factor pending"));
        }
        let now = s.clock.now_ms();
        let config = s
            .index
            .as_ref()
            .and_then(|i| i.vault_2fa.clone())
            .ok_or_else(|| VaultError::internal_error("2fa pending without config"))?;

        if second_factor::verify_totp(&config, code, now / 1000)? {
            s.session = Session::Real;
            s.twofa_failures = 0;
            s.record_audit(AuditEvent::new(AuditEventKind::VaultUnlocked, now))
                .await?;
            s.last_activity_ms = now;
            return Ok(());
        }

        let mut consumed = config;
        if second_factor::verify_and_consume_backup_code(&mut consumed, code) {
            // The consumed code must be gone before the session opens
            if let Some(index) = s.index.as_mut() {
                index.vault_2fa = Some(consumed);
            }
            s.save_index().await?;
            s.session = Session::Real;
            s.twofa_failures = 0;
            s.record_audit(AuditEvent::new(
                AuditEventKind::VaultUnlockedBackupCode,
                now,
            ))
            .await?;
            s.last_activity_ms = now;
            return Ok(());
        }

        s.twofa_failures += 1;
        s.record_audit(AuditEvent::new(AuditEventKind::Failed2faAttempt, now))
            .await?;
        if s.twofa_failures >= s.max_2fa_attempts {
            warn!("second factor attempt cap reached, locking");
            s.do_lock().await;
        }
        Err(VaultError::Invalid2FA)
    }

    /// Locks the vault, wiping all key material.
    pub async fn lock(&self) -> Result<(), VaultError> {
        let mut s = self.state.lock().await;
        s.do_lock().await;
        Ok(())
    }

    /// Whether an unlocked (real or duress) session is active.
    pub async fn is_unlocked(&self) -> bool {
        let mut s = self.state.lock().await;
        s.expire_if_idle().await;
        !matches!(s.session, Session::Locked)
    }

    // ---------------------------------------------------------------------
    // Records
    // ---------------------------------------------------------------------

    /// Adds a Password record.
    pub async fn add_password(
        &self,
        title: &str,
        data: PasswordData,
    ) -> Result<RecordId, VaultError> {
        let mut s = self.begin().await?;
        if let Some(totp) = &data.totp {
            totp.validate()?;
        }
        if s.is_duress() {
            return Ok(RecordId::new());
        }
        s.require_real()?;
        let record = Record::new_password(title, data, s.clock.now_ms());
        let id = record.id;
        s.persist_new_record(record).await?;
        Ok(id)
    }

    /// Adds a Note record.
    pub async fn add_note(&self, title: &str, content: &str) -> Result<RecordId, VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            // Validation still applies so the call is indistinguishable
            Record::new_note(title, content, s.clock.now_ms())?;
            return Ok(RecordId::new());
        }
        s.require_real()?;
        let record = Record::new_note(title, content, s.clock.now_ms())?;
        let id = record.id;
        s.persist_new_record(record).await?;
        Ok(id)
    }

    /// Adds a File record, streaming the payload into encrypted chunks.
    pub async fn add_file(
        &self,
        title: &str,
        source: &Path,
        mime_type: Option<&str>,
        progress: Option<ProgressFn>,
    ) -> Result<RecordId, VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Ok(RecordId::new());
        }
        s.require_real()?;
        let generation = s.keys.generation();
        let entry_key = *s.keys.entry_key()?;
        let id = RecordId::new();

        let outcome = s
            .file_store
            .import(id, source, &entry_key, progress.as_ref())
            .await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                // Best-effort cleanup of any chunks written before failure,
                // under both the single- and multi-chunk naming schemes
                let _ = s.file_store.delete_all(id, 1).await;
                let _ = s.file_store.delete_all(id, 64).await;
                return Err(err);
            }
        };
        s.keys.ensure_generation(generation)?;

        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let mut record = Record::new_file(
            title,
            FileData {
                original_name,
                mime_type: mime_type.unwrap_or("application/octet-stream").to_string(),
                size: outcome.size,
                sha256: outcome.sha256,
                notes: None,
                chunk_count: outcome.chunk_count,
            },
            s.clock.now_ms(),
        );
        record.id = id;
        s.persist_new_record(record).await?;
        Ok(id)
    }

    /// Fetches one record.
    pub async fn get(&self, id: RecordId) -> Result<Record, VaultError> {
        let mut s = self.begin().await?;
        if let Session::Duress { decoys } = &s.session {
            return decoys
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| VaultError::not_found(id.to_string()));
        }
        s.require_real()?;
        let record = s.load_record_lazily(id).await?;
        let now = s.clock.now_ms();
        s.record_audit(AuditEvent::for_record(
            AuditEventKind::EntryAccessed,
            now,
            id,
            record.title.clone(),
        ))
        .await?;
        s.last_activity_ms = now;
        Ok(record)
    }

    /// Reveals a password value, leaving a `password_viewed` audit trace.
    pub async fn reveal_password(&self, id: RecordId) -> Result<Option<String>, VaultError> {
        let mut s = self.begin().await?;
        if let Session::Duress { decoys } = &s.session {
            return Ok(decoys.iter().find(|r| r.id == id).and_then(|r| match &r.body {
                RecordBody::Password(data) => data.password.clone(),
                _ => None,
            }));
        }
        s.require_real()?;
        let record = s.load_record_lazily(id).await?;
        let password = match &record.body {
            RecordBody::Password(data) => data.password.clone(),
            _ => None,
        };
        let now = s.clock.now_ms();
        s.record_audit(AuditEvent::for_record(
            AuditEventKind::PasswordViewed,
            now,
            id,
            record.title.clone(),
        ))
        .await?;
        Ok(password)
    }

    /// Records that a password was copied to the clipboard (the clipboard
    /// itself is the shell's concern).
    pub async fn note_password_copied(&self, id: RecordId) -> Result<(), VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Ok(());
        }
        s.require_real()?;
        let title = s.decrypt_entry_title(id).unwrap_or_default();
        let now = s.clock.now_ms();
        s.record_audit(AuditEvent::for_record(
            AuditEventKind::PasswordCopied,
            now,
            id,
            title,
        ))
        .await?;
        Ok(())
    }

    /// The current TOTP code for a password record carrying a TOTP secret.
    pub async fn totp_code(&self, id: RecordId) -> Result<Option<String>, VaultError> {
        let mut s = self.begin().await?;
        let record = if let Session::Duress { decoys } = &s.session {
            decoys
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| VaultError::not_found(id.to_string()))?
        } else {
            s.require_real()?;
            s.load_record_lazily(id).await?
        };
        let now_secs = s.clock.now_secs();
        match &record.body {
            RecordBody::Password(data) => data
                .totp
                .as_ref()
                .map(|totp| second_factor::record_totp_code(totp, now_secs))
                .transpose(),
            _ => Ok(None),
        }
    }

    /// Restores a File record's payload to `dest`.
    pub async fn get_file(
        &self,
        id: RecordId,
        dest: &Path,
        progress: Option<ProgressFn>,
    ) -> Result<(), VaultError> {
        let mut s = self.begin().await?;
        if let Session::Duress { decoys } = &s.session {
            // A decoy file restores as an empty payload
            if decoys.iter().any(|r| r.id == id) {
                tokio::fs::write(dest, b"").await.map_err(|e| {
                    VaultError::io_error(format!("write {}: {}", dest.display(), e))
                })?;
                return Ok(());
            }
            return Err(VaultError::not_found(id.to_string()));
        }
        s.require_real()?;
        let record = s.load_record_lazily(id).await?;
        let file_data = match &record.body {
            RecordBody::File(data) => data.clone(),
            _ => {
                return Err(VaultError::invalid_config(format!(
                    "{} is not a file record",
                    id
                )))
            }
        };

        let generation = s.keys.generation();
        let entry_key = *s.keys.entry_key()?;
        s.ensure_chunks_local(id, &file_data).await?;
        s.keys.ensure_generation(generation)?;
        s.file_store
            .export(
                id,
                file_data.chunk_count,
                file_data.size,
                Some(&file_data.sha256),
                dest,
                &entry_key,
                progress.as_ref(),
            )
            .await?;

        let now = s.clock.now_ms();
        s.record_audit(AuditEvent::for_record(
            AuditEventKind::EntryAccessed,
            now,
            id,
            record.title.clone(),
        ))
        .await?;
        s.last_activity_ms = now;
        Ok(())
    }

    /// Lists index entries, decrypting only titles.
    ///
    /// Entries whose title envelope fails to open are skipped (dormant) and
    /// surfaced by [`Vault::dormant_records`], never silently dropped from
    /// the vault itself.
    pub async fn list(&self, filter: Option<ListFilter>) -> Result<Vec<ListItem>, VaultError> {
        let mut s = self.begin().await?;
        let filter = filter.unwrap_or_default();

        let mut items: Vec<ListItem> = match &s.session {
            Session::Duress { decoys } => decoys
                .iter()
                .map(|record| ListItem {
                    id: record.id,
                    title: record.title.clone(),
                    entry_type: record.entry_type(),
                    category: record.category().map(str::to_string),
                    favorite: record.favorite,
                    modified: record.modified,
                    cloud_sync_status: CloudSyncStatus::None,
                })
                .collect(),
            _ => {
                s.require_real()?;
                let index = s.index.as_ref().ok_or(VaultError::Locked)?;
                let index_key = *s.keys.index_key()?;
                let mut rows = Vec::with_capacity(index.entries.len());
                let mut dormant = 0usize;
                for (id, entry) in &index.entries {
                    match decrypt_title(&index_key, *id, &entry.title_encrypted) {
                        Ok(title) => rows.push(ListItem {
                            id: *id,
                            title,
                            entry_type: entry.entry_type,
                            category: entry.category.clone(),
                            favorite: entry.favorite,
                            modified: entry.modified,
                            cloud_sync_status: entry.cloud_sync_status,
                        }),
                        Err(_) => dormant += 1,
                    }
                }
                if dormant > 0 {
                    warn!(dormant, "listing skipped undecryptable titles");
                }
                rows
            }
        };

        items.retain(|item| {
            filter
                .entry_type
                .map(|t| item.entry_type == t)
                .unwrap_or(true)
                && filter
                    .category
                    .as_deref()
                    .map(|c| item.category.as_deref() == Some(c))
                    .unwrap_or(true)
                && (!filter.favorites_only || item.favorite)
        });
        items.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.id.cmp(&b.id)));
        s.last_activity_ms = s.clock.now_ms();
        Ok(items)
    }

    /// Case-insensitive NFC-normalized title substring search.
    pub async fn search(&self, query: &str) -> Result<Vec<ListItem>, VaultError> {
        let items = self.list(None).await?;
        Ok(items
            .into_iter()
            .filter(|item| search::title_contains(&item.title, query))
            .collect())
    }

    /// Weighted fuzzy search across title, username, url, and category.
    pub async fn search_ranked(&self, query: &str) -> Result<Vec<RankedHit>, VaultError> {
        let mut s = self.begin().await?;

        let candidates: Vec<SearchableRecord> = match &s.session {
            Session::Duress { decoys } => decoys.iter().map(searchable_from_record).collect(),
            _ => {
                s.require_real()?;
                let index = s.index.as_ref().ok_or(VaultError::Locked)?;
                let index_key = *s.keys.index_key()?;
                let entry_key = *s.keys.entry_key()?;

                let ids: Vec<(RecordId, EntryType, u64, Option<String>, String)> = index
                    .entries
                    .iter()
                    .filter_map(|(id, entry)| {
                        decrypt_title(&index_key, *id, &entry.title_encrypted)
                            .ok()
                            .map(|title| {
                                (
                                    *id,
                                    entry.entry_type,
                                    entry.modified,
                                    entry.category.clone(),
                                    title,
                                )
                            })
                    })
                    .collect();

                let mut candidates = Vec::with_capacity(ids.len());
                for (id, entry_type, modified, category, title) in ids {
                    let mut candidate = SearchableRecord {
                        id,
                        title,
                        username: None,
                        url: None,
                        category,
                        modified,
                    };
                    // Username and url live only in the record body
                    if entry_type == EntryType::Password {
                        if let Ok(record) = s.record_store.load(id, &entry_key).await {
                            if let RecordBody::Password(data) = record.body {
                                candidate.username = data.username.clone();
                                candidate.url = data.url.clone();
                            }
                        }
                    }
                    candidates.push(candidate);
                }
                candidates
            }
        };

        s.last_activity_ms = s.clock.now_ms();
        Ok(search::rank(&candidates, query))
    }

    /// Applies a partial update to a record.
    pub async fn update(&self, id: RecordId, patch: RecordPatch) -> Result<Record, VaultError> {
        let mut s = self.begin().await?;
        if let Session::Duress { decoys } = &s.session {
            let mut record = decoys
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| VaultError::not_found(id.to_string()))?;
            apply_patch(&mut record, &patch, s.clock.now_ms())?;
            return Ok(record);
        }
        s.require_real()?;
        let mut record = s.load_record_lazily(id).await?;
        apply_patch(&mut record, &patch, s.clock.now_ms())?;
        s.persist_updated_record(&record).await?;
        Ok(record)
    }

    /// Flips the favorite flag, returning the new value.
    pub async fn toggle_favorite(&self, id: RecordId) -> Result<bool, VaultError> {
        let mut s = self.begin().await?;
        if let Session::Duress { decoys } = &s.session {
            return decoys
                .iter()
                .find(|r| r.id == id)
                .map(|r| !r.favorite)
                .ok_or_else(|| VaultError::not_found(id.to_string()));
        }
        s.require_real()?;
        let mut record = s.load_record_lazily(id).await?;
        record.favorite = !record.favorite;
        record.touch(s.clock.now_ms());
        let favorite = record.favorite;
        s.persist_updated_record(&record).await?;
        Ok(favorite)
    }

    /// Deletes a record: local envelope, chunks, index entry, and (best
    /// effort) cloud artifacts. Deleting a missing record succeeds.
    pub async fn delete(&self, id: RecordId) -> Result<(), VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Ok(());
        }
        s.require_real()?;

        let entry = match s.index.as_mut().and_then(|i| i.remove_entry(id)) {
            Some(entry) => entry,
            None => {
                // Idempotent: nothing in the index, clean any stray file
                let _ = s.record_store.delete(id).await?;
                return Ok(());
            }
        };
        let title = decrypt_title(
            &*s.keys.index_key()?,
            id,
            &entry.title_encrypted,
        )
        .unwrap_or_default();

        s.record_store.delete(id).await?;
        if let Some(chunk_count) = entry.chunk_count {
            s.file_store.delete_all(id, chunk_count).await?;
        }
        s.save_index().await?;

        if entry.cloud_sync_status == CloudSyncStatus::Synced {
            if let Some(provider) = s.provider.clone() {
                let prefix = s.cloud_prefix().await?;
                sync::delete_remote_record(provider.as_ref(), &prefix, id, entry.chunk_count)
                    .await;
            }
        }

        let mut sync_state = s.sync_state_store.load_or_default().await?;
        sync_state.forget(id);
        s.sync_state_store.save(&sync_state).await?;

        let now = s.clock.now_ms();
        s.record_audit(AuditEvent::for_record(
            AuditEventKind::EntryDeleted,
            now,
            id,
            title,
        ))
        .await?;
        s.last_activity_ms = now;
        Ok(())
    }

    /// Record ids the index knows but whose artifacts fail to open or are
    /// missing locally without a cloud copy.
    pub async fn dormant_records(&self) -> Result<Vec<RecordId>, VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Ok(Vec::new());
        }
        s.require_real()?;
        let index = s.index.as_ref().ok_or(VaultError::Locked)?;
        let index_key = *s.keys.index_key()?;

        let mut dormant = Vec::new();
        for (id, entry) in &index.entries {
            let title_ok = decrypt_title(&index_key, *id, &entry.title_encrypted).is_ok();
            let data_local = s.record_store.exists(*id).await;
            let data_reachable =
                data_local || entry.cloud_sync_status == CloudSyncStatus::Synced;
            if !title_ok || !data_reachable {
                dormant.push(*id);
            }
        }
        Ok(dormant)
    }

    // ---------------------------------------------------------------------
    // Second factor and duress configuration
    // ---------------------------------------------------------------------

    /// Enables the vault-level second factor, returning the plaintext
    /// backup codes exactly once.
    pub async fn configure_vault_2fa(
        &self,
        secret: Option<String>,
    ) -> Result<GeneratedSecondFactor, VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Err(VaultError::NotPermitted);
        }
        s.require_real()?;
        let generated = second_factor::generate_config(secret)?;
        if let Some(index) = s.index.as_mut() {
            index.vault_2fa = Some(generated.config.clone());
        }
        s.save_index().await?;
        s.last_activity_ms = s.clock.now_ms();
        Ok(generated)
    }

    /// Disables the vault-level second factor.
    pub async fn disable_vault_2fa(&self) -> Result<(), VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Err(VaultError::NotPermitted);
        }
        s.require_real()?;
        if let Some(index) = s.index.as_mut() {
            index.vault_2fa = None;
        }
        s.save_index().await
    }

    /// Configures the duress passphrase and its decoy view.
    pub async fn configure_duress(
        &self,
        decoys: Vec<Record>,
        duress_passphrase: &str,
    ) -> Result<(), VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Err(VaultError::NotPermitted);
        }
        s.require_real()?;

        let passphrase = Passphrase::new_checked(duress_passphrase)?;
        let (salt, params, real_key_hash) = {
            let index = s.index.as_ref().ok_or(VaultError::Locked)?;
            (
                decode_salt_b64(&index.salt)?,
                index.kdf_params,
                index.key_hash.clone(),
            )
        };

        let duress_kek = kdf::derive_kek(&passphrase, &salt, &params)?;
        let duress_verifier = hex::encode(kdf::verifier(&duress_kek)?.as_ref());
        if duress_verifier == real_key_hash {
            return Err(VaultError::invalid_config(
                "duress passphrase must differ from the master passphrase",
            ));
        }
        let duress_index_key = kdf::derive_subkey(&duress_kek, kdf::LABEL_INDEX)?;

        s.duress_store.save(&decoys, &duress_index_key).await?;
        if let Some(index) = s.index.as_mut() {
            index.duress = Some(DuressConfig {
                verifier: duress_verifier,
                decoys,
            });
        }
        s.save_index().await?;
        s.last_activity_ms = s.clock.now_ms();
        Ok(())
    }

    /// Removes the duress configuration and its projection.
    pub async fn disable_duress(&self) -> Result<(), VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Err(VaultError::NotPermitted);
        }
        s.require_real()?;
        if let Some(index) = s.index.as_mut() {
            index.duress = None;
        }
        s.duress_store.remove().await?;
        s.save_index().await
    }

    /// Changes the master passphrase, re-encrypting the index, every entry
    /// envelope, every chunk, the audit log, and stored tokens under the
    /// new key hierarchy.
    ///
    /// The duress configuration cannot survive (its projection was sealed
    /// under a KEK derived from the old salt) and is disabled; the caller
    /// re-configures duress afterwards if desired.
    pub async fn change_passphrase(&self, old: &str, new: &str) -> Result<(), VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Err(VaultError::NotPermitted);
        }
        s.require_real()?;

        let (old_salt, old_params, stored_hash) = {
            let index = s.index.as_ref().ok_or(VaultError::Locked)?;
            (
                decode_salt_b64(&index.salt)?,
                index.kdf_params,
                index.key_hash.clone(),
            )
        };

        // Verify the old passphrase against the stored verifier
        let old_kek = kdf::derive_kek(&Passphrase::new(old), &old_salt, &old_params)?;
        let stored = hex::decode(&stored_hash)
            .map_err(|_| VaultError::internal_error("stored verifier is not hex"))?;
        if !kdf::verifier_matches(kdf::verifier(&old_kek)?.as_ref(), &stored) {
            return Err(VaultError::WrongPassphrase);
        }

        let new_passphrase = Passphrase::new_checked(new)?;
        let new_salt = kdf::generate_salt();
        let new_params = KdfParams::default();
        let new_kek = kdf::derive_kek(&new_passphrase, &new_salt, &new_params)?;

        let old_entry_key = kdf::derive_subkey(&old_kek, kdf::LABEL_ENTRY)?;
        let new_entry_key = kdf::derive_subkey(&new_kek, kdf::LABEL_ENTRY)?;
        let new_index_key = kdf::derive_subkey(&new_kek, kdf::LABEL_INDEX)?;
        let old_audit_key = kdf::derive_subkey(&old_kek, kdf::LABEL_AUDIT)?;
        let new_audit_key = kdf::derive_subkey(&new_kek, kdf::LABEL_AUDIT)?;
        let old_metadata_key = kdf::derive_subkey(&old_kek, kdf::LABEL_METADATA)?;
        let new_metadata_key = kdf::derive_subkey(&new_kek, kdf::LABEL_METADATA)?;

        // Re-encrypt every record artifact, then rewrite the index fields
        let ids: Vec<(RecordId, Option<u32>)> = s
            .index
            .as_ref()
            .ok_or(VaultError::Locked)?
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.chunk_count))
            .collect();
        for (id, chunk_count) in ids {
            let record = s.record_store.load(id, &old_entry_key).await?;
            s.record_store.save(&record, &new_entry_key).await?;
            if let Some(count) = chunk_count {
                s.file_store
                    .reencrypt(id, count, &old_entry_key, &new_entry_key)
                    .await?;
            }
            let title_envelope = aead::seal(
                &new_index_key,
                &EnvelopeContext::entry(*id.as_bytes()),
                record.title.as_bytes(),
            )?;
            if let Some(entry) = s.index.as_mut().and_then(|i| i.entry_mut(id)) {
                entry.title_encrypted = title_envelope.to_text();
            }
        }

        // Audit log: rewrite every readable line under the new key
        let readout = s.audit_log.read_all(&old_audit_key).await?;
        s.audit_log.remove().await?;
        for (sequence, event) in readout.events.iter().enumerate() {
            s.audit_log
                .append(&new_audit_key, sequence as u32, event)
                .await?;
        }
        s.audit_seq = readout.events.len() as u32;

        // Stored cloud tokens move to the new metadata subkey
        if let Some(tokens) = s.token_store.load(&old_metadata_key).await? {
            s.token_store.save(&tokens, &new_metadata_key).await?;
        }

        if let Some(index) = s.index.as_mut() {
            index.salt = base64_encode(&new_salt);
            index.kdf_params = new_params;
            index.key_hash = hex::encode(kdf::verifier(&new_kek)?.as_ref());
            index.duress = None;
        }
        s.duress_store.remove().await?;

        s.keys.unseal(&new_kek)?;
        s.save_index().await?;
        let now = s.clock.now_ms();
        s.record_audit(AuditEvent::new(AuditEventKind::PassphraseChanged, now))
            .await?;
        s.last_activity_ms = now;
        info!("master passphrase changed");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Cloud
    // ---------------------------------------------------------------------

    /// Sets the cloud storage mode (`hidden` or a named public folder).
    /// Switching modes never migrates already-uploaded objects.
    pub async fn set_cloud_storage(&self, config: CloudStorageConfig) -> Result<(), VaultError> {
        let s = self.state.lock().await;
        config.save(&s.layout.cloud_config_path()).await
    }

    /// Runs the OAuth PKCE loopback flow and stores the tokens encrypted.
    pub async fn authenticate_cloud(
        &self,
        open_url: impl FnOnce(&str),
    ) -> Result<(), VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Ok(());
        }
        s.require_real()?;
        let oauth = s
            .oauth
            .clone()
            .ok_or_else(|| VaultError::invalid_config("no OAuth provider configured"))?;
        let flow = OAuthFlow::new(oauth)?;
        let clock = s.clock.clone();
        let tokens = flow.acquire(clock.as_ref(), open_url).await?;
        let metadata_key = *s.keys.metadata_key()?;
        s.token_store.save(&tokens, &metadata_key).await?;
        s.last_activity_ms = s.clock.now_ms();
        Ok(())
    }

    /// Returns a fresh access token for provider adapters, refreshing
    /// lazily when within five minutes of expiry.
    pub async fn cloud_access_token(&self) -> Result<String, VaultError> {
        let mut s = self.begin().await?;
        s.require_real()?;
        let metadata_key = *s.keys.metadata_key()?;
        let tokens = s
            .token_store
            .load(&metadata_key)
            .await?
            .ok_or_else(|| VaultError::ReauthRequired("no stored tokens".into()))?;

        let oauth = s
            .oauth
            .clone()
            .ok_or_else(|| VaultError::invalid_config("no OAuth provider configured"))?;
        let flow = OAuthFlow::new(oauth)?;
        let clock = s.clock.clone();
        match flow.ensure_fresh(clock.as_ref(), tokens).await {
            Ok((fresh, refreshed)) => {
                if refreshed {
                    s.token_store.save(&fresh, &metadata_key).await?;
                }
                Ok(fresh.access.clone())
            }
            Err(err @ VaultError::ReauthRequired(_)) => {
                let now = s.clock.now_ms();
                s.record_audit(AuditEvent::new(AuditEventKind::ReauthRequired, now))
                    .await?;
                Err(err)
            }
            Err(other) => Err(other),
        }
    }

    /// Runs one sync pass against the configured provider.
    pub async fn sync(&self, options: SyncOptions) -> Result<SyncSummary, VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Ok(SyncSummary::default());
        }
        s.require_real()?;
        let provider = s
            .provider
            .clone()
            .ok_or_else(|| VaultError::invalid_config("no cloud provider configured"))?;
        let prefix = s.cloud_prefix().await?;
        let entry_key = *s.keys.entry_key()?;
        let index_key = *s.keys.index_key()?;
        let now_ms = s.clock.now_ms();

        // Disk must match memory before the pass (the index backup uploads
        // the on-disk file)
        s.save_index().await?;
        let mut sync_state = s.sync_state_store.load_or_default().await?;

        // File records not yet fully synced, for the file_uploaded audit
        let pending_files: Vec<RecordId> = s
            .index
            .as_ref()
            .ok_or(VaultError::Locked)?
            .entries
            .iter()
            .filter(|(_, e)| {
                e.entry_type == EntryType::File && e.cloud_sync_status != CloudSyncStatus::Synced
            })
            .map(|(id, _)| *id)
            .collect();

        let summary = {
            // Split the guard once so the index (&mut) and the stores (&)
            // borrow disjoint fields
            let state = &mut *s;
            let index = state.index.as_mut().ok_or(VaultError::Locked)?;
            let mut ctx = sync::SyncContext {
                provider: provider.as_ref(),
                prefix: &prefix,
                index,
                record_store: &state.record_store,
                file_store: &state.file_store,
                sync_state: &mut sync_state,
                entry_key: &entry_key,
                index_key: &index_key,
                now_ms,
            };
            sync::run_sync(&mut ctx, &options).await?
        };

        s.sync_state_store.save(&sync_state).await?;
        s.save_index().await?;
        if !options.dry_run {
            // Backed up last so the object reflects post-sync statuses
            sync::backup_index(provider.as_ref(), &prefix, &s.index_store).await?;
        }

        // Audit uploads that completed in this pass
        for id in pending_files {
            let now_synced = s
                .index
                .as_ref()
                .and_then(|i| i.entry(id))
                .map(|e| e.cloud_sync_status == CloudSyncStatus::Synced)
                .unwrap_or(false);
            if now_synced {
                let title = s.decrypt_entry_title(id).unwrap_or_default();
                s.record_audit(AuditEvent::for_record(
                    AuditEventKind::FileUploaded,
                    now_ms,
                    id,
                    title,
                ))
                .await?;
            }
        }
        s.last_activity_ms = s.clock.now_ms();
        Ok(summary)
    }

    /// Reports replication status without touching the network.
    pub async fn sync_status(&self) -> Result<SyncStatus, VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Ok(SyncStatus::default());
        }
        s.require_real()?;
        let sync_state = s.sync_state_store.load_or_default().await?;
        let index = s.index.as_ref().ok_or(VaultError::Locked)?;
        Ok(SyncStatus {
            last_full_sync: sync_state.last_full_sync,
            pending_records: index
                .entries
                .values()
                .filter(|e| {
                    matches!(
                        e.cloud_sync_status,
                        CloudSyncStatus::Pending | CloudSyncStatus::Error
                    )
                })
                .count(),
            unresolved_conflicts: sync_state
                .conflict_history
                .iter()
                .filter(|r| {
                    r.strategy == strongbox_domain::entities::ResolutionStrategy::Skip
                })
                .count(),
        })
    }

    /// Restores the index from the cloud backup onto a fresh device, then
    /// unlocks with the supplied passphrase. Record payloads download
    /// lazily on access.
    pub async fn restore_index(&self, passphrase: &str) -> Result<UnlockOutcome, VaultError> {
        {
            let s = self.state.lock().await;
            let provider = s
                .provider
                .clone()
                .ok_or_else(|| VaultError::invalid_config("no cloud provider configured"))?;
            let prefix = s.cloud_prefix().await?;
            let bytes = sync::fetch_index_backup(provider.as_ref(), &prefix).await?;
            s.layout.ensure_dirs().await?;
            s.index_store.write_raw(&bytes).await?;
        }
        self.unlock(passphrase).await
    }

    /// Destroys the vault: local state always, cloud artifacts best-effort
    /// when a provider is configured. Missing artifacts never fail the
    /// operation.
    pub async fn destruct(&self) -> Result<(), VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Ok(());
        }
        s.require_real()?;

        if let Some(provider) = s.provider.clone() {
            let prefix = s.cloud_prefix().await?;
            sync::destruct_remote(provider.as_ref(), &prefix).await;
        }

        s.layout.remove_all().await?;
        s.keys.seal();
        s.index = None;
        s.session = Session::Locked;
        info!("vault destroyed");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Audit
    // ---------------------------------------------------------------------

    /// Reads the decrypted audit log. Corrupt lines are skipped and
    /// counted.
    pub async fn audit_events(&self) -> Result<AuditReadout, VaultError> {
        let mut s = self.begin().await?;
        if s.is_duress() {
            return Ok(AuditReadout::default());
        }
        s.require_real()?;
        let audit_key = *s.keys.audit_key()?;
        s.audit_log.read_all(&audit_key).await
    }

    async fn begin(&self) -> Result<tokio::sync::MutexGuard<'_, VaultState>, VaultError> {
        let mut s = self.state.lock().await;
        s.expire_if_idle().await;
        Ok(s)
    }
}

// -------------------------------------------------------------------------
// VaultState internals
// -------------------------------------------------------------------------

impl VaultState {
    fn is_duress(&self) -> bool {
        matches!(self.session, Session::Duress { .. })
    }

    /// Real-session gate: `Locked` when sealed, `Needs2FA` while pending.
    /// Callers handle duress before this check; a duress session reaching
    /// it is refused rather than handed sealed keys.
    fn require_real(&self) -> Result<(), VaultError> {
        match self.session {
            Session::Real => Ok(()),
            Session::PendingSecondFactor => Err(VaultError::Needs2FA),
            Session::Locked => Err(VaultError::Locked),
            Session::Duress { .. } => Err(VaultError::NotPermitted),
        }
    }

    /// Lazy auto-lock: expires the session at the next operation boundary
    /// with the same guarantees as an explicit `lock()`.
    async fn expire_if_idle(&mut self) {
        if self.auto_lock_ms == 0 || matches!(self.session, Session::Locked) {
            return;
        }
        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_activity_ms) >= self.auto_lock_ms {
            debug!("idle timeout reached, locking");
            self.do_lock().await;
        }
    }

    /// Locks unconditionally: audit (real sessions only), seal, clear.
    async fn do_lock(&mut self) {
        if matches!(
            self.session,
            Session::Real | Session::PendingSecondFactor
        ) {
            let now = self.clock.now_ms();
            let _ = self
                .record_audit(AuditEvent::new(AuditEventKind::VaultLocked, now))
                .await;
        }
        self.keys.seal();
        self.index = None;
        self.session = Session::Locked;
        self.twofa_failures = 0;
    }

    /// Appends an audit event, flushing any events that queued while the
    /// audit key was unavailable. Duress sessions record nothing.
    async fn record_audit(&mut self, event: AuditEvent) -> Result<(), VaultError> {
        if self.is_duress() {
            return Ok(());
        }
        let audit_key = match self.keys.audit_key() {
            Ok(key) => *key,
            Err(_) => {
                self.pending_audit.push(event);
                return Ok(());
            }
        };
        let queued: Vec<AuditEvent> = self.pending_audit.drain(..).collect();
        for queued_event in queued {
            self.audit_log
                .append(&audit_key, self.audit_seq, &queued_event)
                .await?;
            self.audit_seq += 1;
        }
        self.audit_log
            .append(&audit_key, self.audit_seq, &event)
            .await?;
        self.audit_seq += 1;
        Ok(())
    }

    /// Persists the in-memory index.
    async fn save_index(&mut self) -> Result<(), VaultError> {
        let index_key = *self.keys.index_key()?;
        let index = self.index.as_ref().ok_or(VaultError::Locked)?;
        self.index_store.save(index, &index_key).await
    }

    fn decrypt_entry_title(&self, id: RecordId) -> Option<String> {
        let index_key = self.keys.index_key().ok()?;
        let entry = self.index.as_ref()?.entry(id)?;
        decrypt_title(index_key, id, &entry.title_encrypted).ok()
    }

    /// The object-name prefix from the storage-mode config.
    async fn cloud_prefix(&self) -> Result<String, VaultError> {
        let config = CloudStorageConfig::load_or_default(&self.layout.cloud_config_path()).await?;
        Ok(config.object_prefix())
    }

    /// Loads a record, lazily downloading its entry envelope from the
    /// cloud when the local file is gone but the record is synced.
    async fn load_record_lazily(&mut self, id: RecordId) -> Result<Record, VaultError> {
        let entry_key = *self.keys.entry_key()?;
        let entry = self
            .index
            .as_ref()
            .ok_or(VaultError::Locked)?
            .entry(id)
            .cloned()
            .ok_or_else(|| VaultError::not_found(id.to_string()))?;

        if !self.record_store.exists(id).await {
            if entry.cloud_sync_status == CloudSyncStatus::Synced {
                if let Some(provider) = self.provider.clone() {
                    let prefix = self.cloud_prefix().await?;
                    if let Some(bytes) =
                        sync::fetch_entry_envelope(provider.as_ref(), &prefix, id).await?
                    {
                        let text = String::from_utf8_lossy(&bytes);
                        self.record_store.write_envelope_text(id, &text).await?;
                    }
                }
            }
            if !self.record_store.exists(id).await {
                // Index says it exists; its artifact is gone: dormant
                return Err(VaultError::not_found(format!(
                    "{}: record data missing (dormant)",
                    id
                )));
            }
        }
        self.record_store.load(id, &entry_key).await
    }

    /// Downloads any chunk blobs missing locally for a synced File record.
    async fn ensure_chunks_local(
        &mut self,
        id: RecordId,
        file_data: &FileData,
    ) -> Result<(), VaultError> {
        for k in 0..file_data.chunk_count.max(1) {
            if self
                .file_store
                .chunk_exists(id, k, file_data.chunk_count)
                .await
            {
                continue;
            }
            let Some(provider) = self.provider.clone() else {
                return Err(VaultError::ChunkCorrupt(k));
            };
            let prefix = self.cloud_prefix().await?;
            match sync::fetch_chunk(provider.as_ref(), &prefix, id, k, file_data.chunk_count)
                .await?
            {
                Some(bytes) => {
                    self.file_store
                        .write_chunk_bytes(id, k, file_data.chunk_count, &bytes)
                        .await?;
                }
                None => return Err(VaultError::ChunkCorrupt(k)),
            }
        }
        Ok(())
    }

    /// Inserts a freshly created record: envelope, index entry, sidecar,
    /// audit.
    async fn persist_new_record(&mut self, record: Record) -> Result<(), VaultError> {
        let entry_key = *self.keys.entry_key()?;
        let index_key = *self.keys.index_key()?;

        if self
            .index
            .as_ref()
            .ok_or(VaultError::Locked)?
            .entry(record.id)
            .is_some()
        {
            return Err(VaultError::IdCollision(record.id.to_string()));
        }

        self.record_store.save(&record, &entry_key).await?;

        let title_envelope = aead::seal(
            &index_key,
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
            cloud_sync_status: CloudSyncStatus::None,
            cloud_synced_at: None,
            created: record.created,
            modified: record.modified,
        };
        if let RecordBody::File(file_data) = &record.body {
            entry.mime_type = Some(file_data.mime_type.clone());
            entry.file_size = Some(file_data.size);
            entry.chunk_count = Some(file_data.chunk_count);
        }
        if self.provider.is_some() {
            entry.cloud_sync_status = CloudSyncStatus::Pending;
        }
        self.index
            .as_mut()
            .ok_or(VaultError::Locked)?
            .insert_entry(record.id, entry)?;
        self.save_index().await?;

        let mut sync_state = self.sync_state_store.load_or_default().await?;
        sync_state.bump_local(record.id);
        self.sync_state_store.save(&sync_state).await?;

        let now = self.clock.now_ms();
        self.record_audit(AuditEvent::for_record(
            AuditEventKind::EntryCreated,
            now,
            record.id,
            record.title.clone(),
        ))
        .await?;
        self.last_activity_ms = now;
        Ok(())
    }

    /// Persists an updated record and refreshes its index entry.
    async fn persist_updated_record(&mut self, record: &Record) -> Result<(), VaultError> {
        let entry_key = *self.keys.entry_key()?;
        let index_key = *self.keys.index_key()?;

        self.record_store.save(record, &entry_key).await?;

        let title_envelope = aead::seal(
            &index_key,
            &EnvelopeContext::entry(*record.id.as_bytes()),
            record.title.as_bytes(),
        )?;
        {
            let index = self.index.as_mut().ok_or(VaultError::Locked)?;
            let entry = index
                .entry_mut(record.id)
                .ok_or_else(|| VaultError::not_found(record.id.to_string()))?;
            entry.title_encrypted = title_envelope.to_text();
            entry.category = record.category().map(str::to_string);
            entry.favorite = record.favorite;
            entry.modified = record.modified;
            if entry.cloud_sync_status == CloudSyncStatus::Synced {
                entry.cloud_sync_status = CloudSyncStatus::Pending;
            }
        }
        self.save_index().await?;

        let mut sync_state = self.sync_state_store.load_or_default().await?;
        sync_state.bump_local(record.id);
        self.sync_state_store.save(&sync_state).await?;

        let now = self.clock.now_ms();
        self.record_audit(AuditEvent::for_record(
            AuditEventKind::EntryUpdated,
            now,
            record.id,
            record.title.clone(),
        ))
        .await?;
        self.last_activity_ms = now;
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

fn base64_encode(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.encode(bytes)
}

fn decode_salt_b64(salt: &str) -> Result<[u8; SALT_LEN], VaultError> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    let bytes = STANDARD
        .decode(salt)
        .map_err(|e| VaultError::internal_error(format!("index salt base64: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| VaultError::internal_error("index salt is not 16 bytes"))
}

fn decrypt_title(
    index_key: &[u8; 32],
    id: RecordId,
    title_encrypted: &str,
) -> Result<String, VaultError> {
    let envelope = Envelope::from_text(title_encrypted)?;
    let plaintext = aead::open(index_key, &EnvelopeContext::entry(*id.as_bytes()), &envelope)?;
    String::from_utf8(plaintext.to_vec())
        .map_err(|_| VaultError::aead_open_failed("title is not UTF-8"))
}

fn searchable_from_record(record: &Record) -> SearchableRecord {
    let (username, url) = match &record.body {
        RecordBody::Password(data) => (data.username.clone(), data.url.clone()),
        _ => (None, None),
    };
    SearchableRecord {
        id: record.id,
        title: record.title.clone(),
        username,
        url,
        category: record.category().map(str::to_string),
        modified: record.modified,
    }
}

/// Applies a patch, re-validating invariants the patch can violate.
fn apply_patch(record: &mut Record, patch: &RecordPatch, now_ms: u64) -> Result<(), VaultError> {
    if let Some(title) = &patch.title {
        record.title = title.clone();
    }
    if let Some(favorite) = patch.favorite {
        record.favorite = favorite;
    }
    match &mut record.body {
        RecordBody::Password(data) => {
            apply_optional(&mut data.username, &patch.username);
            if let Some(password) = &patch.password {
                data.password = non_empty(password);
                data.password_last_changed = Some(now_ms);
            }
            apply_optional(&mut data.url, &patch.url);
            apply_optional(&mut data.notes, &patch.notes);
            apply_optional(&mut data.category, &patch.category);
            if let Some(totp) = &patch.totp {
                totp.validate()?;
                data.totp = Some(totp.clone());
            }
        }
        RecordBody::Note(data) => {
            if let Some(content) = &patch.content {
                if content.len() > strongbox_domain::entities::MAX_NOTE_BYTES {
                    return Err(VaultError::invalid_config(
                        "note content exceeds the 1 MiB limit",
                    ));
                }
                data.content = content.clone();
            }
        }
        RecordBody::File(data) => {
            apply_optional(&mut data.notes, &patch.notes);
        }
    }
    record.touch(now_ms);
    Ok(())
}

fn apply_optional(slot: &mut Option<String>, patch: &Option<String>) {
    if let Some(value) = patch {
        *slot = non_empty(value);
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
