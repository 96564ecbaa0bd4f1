// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Key Derivation
//!
//! The key hierarchy in one module:
//!
//! ```text
//! passphrase + salt --Argon2id--> KEK (32 bytes)
//! KEK --HKDF-SHA-256(label)--> subkeys: index, entry, metadata, audit, duress
//! KEK --HKDF-SHA-256("verifier")--> key_hash (persisted in the index)
//! ```
//!
//! Argon2id runs with the parameters persisted in the index (64 MiB / 3
//! iterations / 1 lane by default) so a future parameter upgrade is
//! detectable. The verifier comparison is constant-time; callers wipe all
//! derived material on mismatch, which the `Zeroizing` return types do
//! automatically on drop.

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use strongbox_domain::entities::vault_index::{KdfParams, SALT_LEN};
use strongbox_domain::value_objects::Passphrase;
use strongbox_domain::VaultError;

/// HKDF labels for the per-purpose subkeys.
pub const LABEL_INDEX: &[u8] = b"index";
pub const LABEL_ENTRY: &[u8] = b"entry";
pub const LABEL_METADATA: &[u8] = b"metadata";
pub const LABEL_AUDIT: &[u8] = b"audit";
pub const LABEL_DURESS: &[u8] = b"duress";
/// Label for the passphrase verifier persisted in the index header.
pub const LABEL_VERIFIER: &[u8] = b"verifier";

/// Generates a fresh random passphrase-KDF salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derives the 32-byte master KEK from a passphrase with Argon2id.
pub fn derive_kek(
    passphrase: &Passphrase,
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    params.validate()?;
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| VaultError::invalid_config(format!("argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut kek = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.expose(), salt, kek.as_mut())
        .map_err(|e| VaultError::internal_error(format!("argon2: {}", e)))?;
    Ok(kek)
}

/// Derives a 32-byte subkey from the KEK for the given label.
pub fn derive_subkey(kek: &[u8; 32], label: &[u8]) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    let hkdf = Hkdf::<Sha256>::new(None, kek);
    let mut subkey = Zeroizing::new([0u8; 32]);
    hkdf.expand(label, subkey.as_mut())
        .map_err(|e| VaultError::internal_error(format!("hkdf expand: {}", e)))?;
    Ok(subkey)
}

/// Computes the passphrase verifier stored in the index.
pub fn verifier(kek: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    derive_subkey(kek, LABEL_VERIFIER)
}

/// Constant-time equality for verifier material.
pub fn verifier_matches(candidate: &[u8], stored: &[u8]) -> bool {
    if candidate.len() != stored.len() {
        return false;
    }
    candidate.ct_eq(stored).into()
}
