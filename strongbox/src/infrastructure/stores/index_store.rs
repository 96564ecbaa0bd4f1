// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Index Store
//!
//! Reads and writes `vault.enc`, the encrypted vault index.
//!
//! ## File Format
//!
//! ```text
//! SALT_B64 | ENVELOPE_B64
//! ```
//!
//! A single UTF-8 line: the base64 of the 16-byte passphrase-KDF salt, a
//! literal `|`, and the text-encoded index envelope. The leading salt lets
//! unlock run the KDF before any envelope is opened. The first `|`
//! delimits, so base64 padding inside the envelope segment is unaffected.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;
use zeroize::Zeroize;

use strongbox_domain::entities::vault_index::{VaultIndex, SALT_LEN};
use strongbox_domain::value_objects::{Envelope, EnvelopeContext};
use strongbox_domain::VaultError;

use crate::infrastructure::crypto::aead;

/// Store for the encrypted vault index file.
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: PathBuf) -> Self {
        IndexStore { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Whether a vault index exists at this location.
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Reads only the salt prefix, for key derivation before unlock.
    pub async fn read_salt(&self) -> Result<[u8; SALT_LEN], VaultError> {
        let text = self.read_text().await?;
        let (salt_b64, _) = split_index_text(&text)?;
        decode_salt(salt_b64)
    }

    /// Loads and decrypts the index with the index subkey.
    pub async fn load(&self, index_key: &[u8; 32]) -> Result<VaultIndex, VaultError> {
        let text = self.read_text().await?;
        let (_, envelope_b64) = split_index_text(&text)?;
        let envelope = Envelope::from_text(envelope_b64)?;
        let mut plaintext = aead::open(index_key, &EnvelopeContext::index(), &envelope)?;
        let index: VaultIndex = serde_json::from_slice(&plaintext)?;
        plaintext.zeroize();
        debug!(entries = index.entries.len(), "index loaded");
        Ok(index)
    }

    /// Encrypts and persists the index atomically.
    ///
    /// The salt prefix is taken from the index itself, keeping the file and
    /// the encrypted copy in agreement.
    pub async fn save(&self, index: &VaultIndex, index_key: &[u8; 32]) -> Result<(), VaultError> {
        // Round-trip the stored salt to guarantee the prefix stays exactly
        // 16 decoded bytes.
        decode_salt(&index.salt)?;

        let mut plaintext = serde_json::to_vec(index)?;
        let envelope = aead::seal(index_key, &EnvelopeContext::index(), &plaintext);
        plaintext.zeroize();
        let envelope = envelope?;

        let contents = format!("{}|{}", index.salt, envelope.to_text());
        super::write_atomic(&self.path, contents.as_bytes()).await
    }

    /// The raw index file bytes, for cloud backup.
    pub async fn raw_bytes(&self) -> Result<Vec<u8>, VaultError> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::not_found("vault index")
            } else {
                VaultError::io_error(format!("read {}: {}", self.path.display(), e))
            }
        })
    }

    /// Writes raw index file bytes, for restore from a cloud backup.
    ///
    /// The bytes are validated to be a well-formed `SALT_B64|ENVELOPE_B64`
    /// document before anything is persisted.
    pub async fn write_raw(&self, bytes: &[u8]) -> Result<(), VaultError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| VaultError::aead_open_failed("index backup is not UTF-8"))?;
        let (salt_b64, envelope_b64) = split_index_text(text)?;
        decode_salt(salt_b64)?;
        Envelope::from_text(envelope_b64)?;
        super::write_atomic(&self.path, bytes).await
    }

    /// Removes the index file; missing is success.
    pub async fn remove(&self) -> Result<(), VaultError> {
        super::remove_idempotent(&self.path).await.map(|_| ())
    }

    async fn read_text(&self) -> Result<String, VaultError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::not_found("vault index")
            } else {
                VaultError::io_error(format!("read {}: {}", self.path.display(), e))
            }
        })
    }
}

fn split_index_text(text: &str) -> Result<(&str, &str), VaultError> {
    text.trim_end()
        .split_once('|')
        .ok_or_else(|| VaultError::aead_open_failed("index file has no salt delimiter"))
}

fn decode_salt(salt_b64: &str) -> Result<[u8; SALT_LEN], VaultError> {
    let bytes = BASE64
        .decode(salt_b64)
        .map_err(|e| VaultError::aead_open_failed(format!("index salt base64: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| VaultError::aead_open_failed("index salt is not 16 bytes"))
}
