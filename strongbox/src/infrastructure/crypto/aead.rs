// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # AEAD Seal and Open
//!
//! The single place ciphertext is produced or consumed. Sealing always uses
//! XChaCha20-Poly1305 with a fresh random 24-byte nonce; opening dispatches
//! on the envelope's algorithm id and also accepts AES-256-GCM blobs.
//!
//! Associated Data comes from the caller's [`EnvelopeContext`], so the same
//! key can safely seal the index, entries, chunks, and audit events without
//! any of them being substitutable for another.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use aes_gcm::Aes256Gcm;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use strongbox_domain::value_objects::envelope::{AlgorithmId, Envelope, EnvelopeContext};
use strongbox_domain::VaultError;

/// Key length for both supported algorithms.
pub const KEY_LEN: usize = 32;

/// Seals plaintext under `key`, bound to `context`.
///
/// A fresh random nonce is drawn from the OS RNG for every call; the
/// extended XChaCha20 nonce makes random nonces collision-safe per key.
pub fn seal(
    key: &[u8; KEY_LEN],
    context: &EnvelopeContext,
    plaintext: &[u8],
) -> Result<Envelope, VaultError> {
    let alg = AlgorithmId::XChaCha20Poly1305;
    let mut nonce = vec![0u8; alg.nonce_len()];
    OsRng.fill_bytes(&mut nonce);

    let aad = context.associated_data(strongbox_domain::value_objects::CURRENT_ENVELOPE_VERSION, alg);
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| VaultError::internal_error(format!("AEAD key: {}", e)))?;
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| VaultError::internal_error("AEAD seal failed"))?;

    Envelope::new(alg, nonce, ciphertext)
}

/// Opens an envelope under `key`, verifying the Associated Data implied by
/// `context`.
///
/// Any failure (wrong key, wrong context, tampered byte) surfaces as
/// `AeadOpenFailed` without exposing plaintext. The returned buffer is
/// zeroized when dropped.
pub fn open(
    key: &[u8; KEY_LEN],
    context: &EnvelopeContext,
    envelope: &Envelope,
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let aad = envelope.associated_data(context);
    let payload = Payload {
        msg: envelope.ciphertext(),
        aad: &aad,
    };

    let plaintext = match envelope.algorithm() {
        AlgorithmId::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new_from_slice(key)
                .map_err(|e| VaultError::internal_error(format!("AEAD key: {}", e)))?;
            cipher
                .decrypt(XNonce::from_slice(envelope.nonce()), payload)
                .map_err(|_| VaultError::aead_open_failed("tag verification failed"))?
        }
        AlgorithmId::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|e| VaultError::internal_error(format!("AEAD key: {}", e)))?;
            cipher
                .decrypt(aes_gcm::Nonce::from_slice(envelope.nonce()), payload)
                .map_err(|_| VaultError::aead_open_failed("tag verification failed"))?
        }
    };

    Ok(Zeroizing::new(plaintext))
}
