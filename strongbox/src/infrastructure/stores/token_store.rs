// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Token Store
//!
//! Encrypted-at-rest storage for cloud OAuth tokens (`drive_token.enc`).
//! The token set is sealed under the metadata subkey; tokens never touch
//! disk or logs in plaintext and are zeroized in memory on drop.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use strongbox_domain::value_objects::{Envelope, EnvelopeContext};
use strongbox_domain::VaultError;

use crate::infrastructure::crypto::aead;

/// OAuth tokens for the configured cloud provider.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct TokenSet {
    pub access: String,
    pub refresh: String,
    /// Unix ms at which the access token expires
    #[zeroize(skip)]
    pub expiry_ms: u64,
}

impl TokenSet {
    /// Whether the access token is within `skew_ms` of its expiry.
    pub fn expires_within(&self, now_ms: u64, skew_ms: u64) -> bool {
        self.expiry_ms <= now_ms.saturating_add(skew_ms)
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .field("expiry_ms", &self.expiry_ms)
            .finish()
    }
}

/// Store for the encrypted token file.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        TokenStore { path }
    }

    /// Encrypts and persists the token set atomically.
    pub async fn save(&self, tokens: &TokenSet, metadata_key: &[u8; 32]) -> Result<(), VaultError> {
        let mut plaintext = serde_json::to_vec(tokens)?;
        let sealed = aead::seal(metadata_key, &EnvelopeContext::metadata(), &plaintext);
        plaintext.zeroize();
        let envelope = sealed?;
        super::write_atomic(&self.path, envelope.to_text().as_bytes()).await
    }

    /// Loads the token set, `None` when no tokens are stored.
    pub async fn load(&self, metadata_key: &[u8; 32]) -> Result<Option<TokenSet>, VaultError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VaultError::io_error(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        let envelope = Envelope::from_text(&text)?;
        let mut plaintext = aead::open(metadata_key, &EnvelopeContext::metadata(), &envelope)?;
        let tokens: TokenSet = serde_json::from_slice(&plaintext)?;
        plaintext.zeroize();
        Ok(Some(tokens))
    }

    /// Removes stored tokens; missing is success.
    pub async fn clear(&self) -> Result<(), VaultError> {
        super::remove_idempotent(&self.path).await.map(|_| ())
    }
}
