// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Chunk Store
//!
//! Streaming encrypt-on-write and decrypt-on-read for File payloads.
//!
//! A payload of `size` bytes occupies `ceil(size / CHUNK_SIZE)` chunks.
//! Each chunk is sealed independently with Associated Data binding the
//! record id and the 0-based chunk index; chunk buffers never all live in
//! memory at once and progress is reported in bytes.
//!
//! ## Layout
//!
//! ```text
//! files/<uuid>.bin        single-chunk payload
//! files/<uuid>_<k>.bin    chunk k of a multi-chunk payload
//! ```
//!
//! ## Failure Semantics
//!
//! Decrypt-on-read aborts at the first chunk that fails to open with
//! `ChunkCorrupt(k)` and removes the partial destination. A chunk blob that
//! fails raw envelope decode is retried as base64 text (older writes were
//! text-encoded); new writes are always raw.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use zeroize::Zeroize;

use strongbox_domain::services::ProgressFn;
use strongbox_domain::value_objects::{ChunkSize, Envelope, EnvelopeContext, RecordId};
use strongbox_domain::VaultError;

use crate::infrastructure::crypto::aead;

/// Result of importing a payload into the chunk store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Plaintext size in bytes
    pub size: u64,
    /// Hex SHA-256 of the plaintext, computed while streaming
    pub sha256: String,
    pub chunk_count: u32,
}

/// Store for encrypted file-payload chunks.
pub struct FileStore {
    dir: PathBuf,
    chunk_size: ChunkSize,
}

impl FileStore {
    pub fn new(dir: PathBuf, chunk_size: ChunkSize) -> Self {
        FileStore { dir, chunk_size }
    }

    pub fn chunk_size(&self) -> ChunkSize {
        self.chunk_size
    }

    /// The blob path for chunk `k` of a payload with `chunk_count` chunks.
    pub fn chunk_path(&self, id: RecordId, k: u32, chunk_count: u32) -> PathBuf {
        if chunk_count <= 1 {
            self.dir.join(format!("{}.bin", id))
        } else {
            self.dir.join(format!("{}_{}.bin", id, k))
        }
    }

    pub async fn chunk_exists(&self, id: RecordId, k: u32, chunk_count: u32) -> bool {
        tokio::fs::try_exists(self.chunk_path(id, k, chunk_count))
            .await
            .unwrap_or(false)
    }

    /// Encrypt-on-write: streams `source` into sealed chunks.
    ///
    /// The source is read sequentially in chunk-sized buffers; a running
    /// SHA-256 over the plaintext is returned for the File record. Progress
    /// is reported as `(bytes_done, bytes_total)` after each chunk.
    pub async fn import(
        &self,
        id: RecordId,
        source: &Path,
        entry_key: &[u8; 32],
        progress: Option<&ProgressFn>,
    ) -> Result<ImportOutcome, VaultError> {
        let mut file = tokio::fs::File::open(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::not_found(source.display().to_string())
            } else {
                VaultError::io_error(format!("open {}: {}", source.display(), e))
            }
        })?;
        let total = file
            .metadata()
            .await
            .map_err(|e| VaultError::io_error(e.to_string()))?
            .len();
        let chunk_count = self.chunk_size.chunk_count_for(total);
        debug!(%id, total, chunk_count, "importing file payload");

        let mut hasher = Sha256::new();
        let mut done = 0u64;
        for k in 0..chunk_count {
            let want = std::cmp::min(self.chunk_size.bytes() as u64, total - done) as usize;
            let mut buffer = vec![0u8; want];
            file.read_exact(&mut buffer)
                .await
                .map_err(|e| VaultError::io_error(format!("read chunk {}: {}", k, e)))?;
            hasher.update(&buffer);

            let sealed = aead::seal(entry_key, &EnvelopeContext::chunk(*id.as_bytes(), k), &buffer);
            buffer.zeroize();
            let envelope = sealed?;

            super::write_atomic(&self.chunk_path(id, k, chunk_count), &envelope.to_bytes()).await?;
            done += want as u64;
            if let Some(report) = progress {
                report(done, total);
            }
        }

        Ok(ImportOutcome {
            size: total,
            sha256: hex::encode(hasher.finalize()),
            chunk_count,
        })
    }

    /// Decrypt-on-read: streams chunks in index order into `dest`.
    ///
    /// When `expected_sha256` is given the reassembled plaintext digest is
    /// verified before the destination becomes visible. On any failure the
    /// partial output is removed and `dest` is left absent.
    #[allow(clippy::too_many_arguments)]
    pub async fn export(
        &self,
        id: RecordId,
        chunk_count: u32,
        total_size: u64,
        expected_sha256: Option<&str>,
        dest: &Path,
        entry_key: &[u8; 32],
        progress: Option<&ProgressFn>,
    ) -> Result<(), VaultError> {
        let tmp = dest.with_file_name(format!(
            "{}.partial",
            dest.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| id.to_string())
        ));
        let result = self
            .export_inner(
                id,
                chunk_count,
                total_size,
                expected_sha256,
                &tmp,
                dest,
                entry_key,
                progress,
            )
            .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn export_inner(
        &self,
        id: RecordId,
        chunk_count: u32,
        total_size: u64,
        expected_sha256: Option<&str>,
        tmp: &Path,
        dest: &Path,
        entry_key: &[u8; 32],
        progress: Option<&ProgressFn>,
    ) -> Result<(), VaultError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::io_error(e.to_string()))?;
        }
        let mut out = tokio::fs::File::create(tmp)
            .await
            .map_err(|e| VaultError::io_error(format!("create {}: {}", tmp.display(), e)))?;

        let mut hasher = Sha256::new();
        let mut done = 0u64;
        for k in 0..chunk_count {
            let mut plaintext = self.open_chunk(id, k, chunk_count, entry_key).await?;
            hasher.update(plaintext.as_slice());
            out.write_all(&plaintext)
                .await
                .map_err(|e| VaultError::io_error(format!("write chunk {}: {}", k, e)))?;
            done += plaintext.len() as u64;
            plaintext.zeroize();
            if let Some(report) = progress {
                report(done, total_size);
            }
        }
        out.flush()
            .await
            .map_err(|e| VaultError::io_error(e.to_string()))?;
        drop(out);

        if let Some(expected) = expected_sha256 {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                warn!(%id, "payload checksum mismatch after decrypt");
                return Err(VaultError::ChecksumMismatch(id.to_string()));
            }
        }

        tokio::fs::rename(tmp, dest)
            .await
            .map_err(|e| VaultError::io_error(format!("rename to {}: {}", dest.display(), e)))
    }

    /// Opens one chunk, applying the legacy text-envelope read fallback.
    async fn open_chunk(
        &self,
        id: RecordId,
        k: u32,
        chunk_count: u32,
        entry_key: &[u8; 32],
    ) -> Result<zeroize::Zeroizing<Vec<u8>>, VaultError> {
        let path = self.chunk_path(id, k, chunk_count);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| VaultError::ChunkCorrupt(k))?;
        let envelope = Envelope::from_any(&bytes).map_err(|_| VaultError::ChunkCorrupt(k))?;
        aead::open(entry_key, &EnvelopeContext::chunk(*id.as_bytes(), k), &envelope)
            .map_err(|_| VaultError::ChunkCorrupt(k))
    }

    /// Removes every chunk blob for a record; missing blobs are ignored.
    pub async fn delete_all(&self, id: RecordId, chunk_count: u32) -> Result<(), VaultError> {
        for k in 0..chunk_count.max(1) {
            super::remove_idempotent(&self.chunk_path(id, k, chunk_count)).await?;
        }
        Ok(())
    }

    /// The raw sealed bytes of one chunk, exactly as uploaded to the cloud.
    pub async fn chunk_bytes(
        &self,
        id: RecordId,
        k: u32,
        chunk_count: u32,
    ) -> Result<Vec<u8>, VaultError> {
        let path = self.chunk_path(id, k, chunk_count);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::not_found(format!("{} chunk {}", id, k))
            } else {
                VaultError::io_error(format!("read {}: {}", path.display(), e))
            }
        })
    }

    /// Writes sealed chunk bytes fetched from the cloud, validating decode.
    pub async fn write_chunk_bytes(
        &self,
        id: RecordId,
        k: u32,
        chunk_count: u32,
        bytes: &[u8],
    ) -> Result<(), VaultError> {
        Envelope::from_any(bytes).map_err(|_| VaultError::ChunkCorrupt(k))?;
        super::write_atomic(&self.chunk_path(id, k, chunk_count), bytes).await
    }

    /// Re-seals every chunk of a record under a new entry key.
    ///
    /// Used by passphrase change: chunks are processed one at a time so the
    /// whole payload never sits in memory.
    pub async fn reencrypt(
        &self,
        id: RecordId,
        chunk_count: u32,
        old_key: &[u8; 32],
        new_key: &[u8; 32],
    ) -> Result<(), VaultError> {
        for k in 0..chunk_count.max(1) {
            let mut plaintext = self.open_chunk(id, k, chunk_count, old_key).await?;
            let sealed = aead::seal(new_key, &EnvelopeContext::chunk(*id.as_bytes(), k), &plaintext);
            plaintext.zeroize();
            let envelope = sealed?;
            super::write_atomic(&self.chunk_path(id, k, chunk_count), &envelope.to_bytes()).await?;
        }
        Ok(())
    }
}
