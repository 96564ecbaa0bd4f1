// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Store
//!
//! One text-encoded envelope per Password or Note record under
//! `entries/<uuid>.enc`, sealed with the entry subkey and bound to the
//! record id. File records also keep an entry envelope here (the record
//! metadata); their payload lives in the chunk store.

use std::path::{Path, PathBuf};

use zeroize::Zeroize;

use strongbox_domain::entities::Record;
use strongbox_domain::value_objects::{Envelope, EnvelopeContext, RecordId};
use strongbox_domain::VaultError;

use crate::infrastructure::crypto::aead;

/// Store for per-record entry envelopes.
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: PathBuf) -> Self {
        RecordStore { dir }
    }

    /// The on-disk path for a record's entry envelope.
    pub fn path_for(&self, id: RecordId) -> PathBuf {
        self.dir.join(format!("{}.enc", id))
    }

    pub async fn exists(&self, id: RecordId) -> bool {
        tokio::fs::try_exists(self.path_for(id)).await.unwrap_or(false)
    }

    /// Encrypts and persists a record atomically.
    pub async fn save(&self, record: &Record, entry_key: &[u8; 32]) -> Result<(), VaultError> {
        let mut plaintext = serde_json::to_vec(record)?;
        let envelope = aead::seal(
            entry_key,
            &EnvelopeContext::entry(*record.id.as_bytes()),
            &plaintext,
        );
        plaintext.zeroize();
        let envelope = envelope?;
        super::write_atomic(&self.path_for(record.id), envelope.to_text().as_bytes()).await
    }

    /// Loads and decrypts a record.
    pub async fn load(&self, id: RecordId, entry_key: &[u8; 32]) -> Result<Record, VaultError> {
        let text = self.envelope_text(id).await?;
        let envelope = Envelope::from_text(&text)?;
        let mut plaintext = aead::open(entry_key, &EnvelopeContext::entry(*id.as_bytes()), &envelope)?;
        let record: Record = serde_json::from_slice(&plaintext)?;
        plaintext.zeroize();
        if record.id != id {
            return Err(VaultError::aead_open_failed(
                "entry envelope carries a foreign record id",
            ));
        }
        Ok(record)
    }

    /// Removes a record's envelope; missing is success.
    ///
    /// Returns whether the file existed.
    pub async fn delete(&self, id: RecordId) -> Result<bool, VaultError> {
        super::remove_idempotent(&self.path_for(id)).await
    }

    /// The stored envelope text, exactly as uploaded to the cloud.
    pub async fn envelope_text(&self, id: RecordId) -> Result<String, VaultError> {
        let path = self.path_for(id);
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::not_found(id.to_string())
            } else {
                VaultError::io_error(format!("read {}: {}", path.display(), e))
            }
        })
    }

    /// Writes envelope text fetched from the cloud, validating it parses.
    pub async fn write_envelope_text(&self, id: RecordId, text: &str) -> Result<(), VaultError> {
        Envelope::from_text(text)?;
        super::write_atomic(&self.path_for(id), text.as_bytes()).await
    }

    /// Ids of every envelope currently on disk.
    pub async fn stored_ids(&self) -> Result<Vec<RecordId>, VaultError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => {
                return Err(VaultError::io_error(format!(
                    "read {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VaultError::io_error(e.to_string()))?
        {
            if let Some(stem) = Path::new(&entry.file_name()).file_stem() {
                if let Ok(id) = RecordId::parse(&stem.to_string_lossy()) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongbox_domain::entities::record::PasswordData;

    fn sample_record() -> Record {
        Record::new_password(
            "GH",
            PasswordData {
                username: Some("a".into()),
                password: Some("p".into()),
                ..Default::default()
            },
            1_700_000_000_000,
        )
    }

    #[tokio::test]
    async fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("entries"));
        let key = [0x21u8; 32];

        let record = sample_record();
        store.save(&record, &key).await.unwrap();
        let loaded = store.load(record.id, &key).await.unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn envelope_is_bound_to_record_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("entries"));
        let key = [0x21u8; 32];

        let record = sample_record();
        store.save(&record, &key).await.unwrap();

        // Copy record A's envelope to record B's path: opening under B's
        // context must fail.
        let other = RecordId::new();
        let text = store.envelope_text(record.id).await.unwrap();
        tokio::fs::write(store.path_for(other), &text).await.unwrap();
        assert!(matches!(
            store.load(other, &key).await,
            Err(VaultError::AeadOpenFailed(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("entries"));
        let record = sample_record();
        store.save(&record, &[0u8; 32]).await.unwrap();
        assert!(store.delete(record.id).await.unwrap());
        assert!(!store.delete(record.id).await.unwrap());
    }
}
