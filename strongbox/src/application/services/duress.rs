// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Duress Projection
//!
//! Storage for the decoy view a duress session renders.
//!
//! The real index keeps the duress section (verifier plus decoys) for
//! management, but a duress session must never require the real KEK. So
//! `configure_duress` projects the decoys into `duress.enc`, sealed under
//! the index subkey of the *duress* KEK (same salt, same KDF, different
//! passphrase). Unlock tries the real index first; when that fails, a
//! successful open of this projection is what makes the session a duress
//! session. The duress KEK can never decrypt real data.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use strongbox_domain::entities::Record;
use strongbox_domain::value_objects::{Envelope, EnvelopeContext};
use strongbox_domain::VaultError;

use crate::infrastructure::crypto::aead;
use crate::infrastructure::stores;

#[derive(Serialize, Deserialize)]
struct DecoyVault {
    records: Vec<Record>,
}

/// Store for the duress sidecar (`duress.enc`).
pub struct DuressStore {
    path: PathBuf,
}

impl DuressStore {
    pub fn new(path: PathBuf) -> Self {
        DuressStore { path }
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Seals the decoy set under the duress index subkey.
    pub async fn save(
        &self,
        decoys: &[Record],
        duress_index_key: &[u8; 32],
    ) -> Result<(), VaultError> {
        let mut plaintext = serde_json::to_vec(&DecoyVault {
            records: decoys.to_vec(),
        })?;
        let sealed = aead::seal(duress_index_key, &EnvelopeContext::index(), &plaintext);
        plaintext.zeroize();
        let envelope = sealed?;
        stores::write_atomic(&self.path, envelope.to_text().as_bytes()).await
    }

    /// Attempts to open the projection with a candidate duress index
    /// subkey.
    ///
    /// `Ok(None)` means no projection exists; an `AeadOpenFailed` error
    /// means the candidate passphrase is not the duress passphrase.
    pub async fn try_open(
        &self,
        duress_index_key: &[u8; 32],
    ) -> Result<Option<Vec<Record>>, VaultError> {
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
        let mut plaintext = aead::open(duress_index_key, &EnvelopeContext::index(), &envelope)?;
        let decoys: DecoyVault = serde_json::from_slice(&plaintext)?;
        plaintext.zeroize();
        Ok(Some(decoys.records))
    }

    /// Removes the projection; missing is success.
    pub async fn remove(&self) -> Result<(), VaultError> {
        stores::remove_idempotent(&self.path).await.map(|_| ())
    }
}
