// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Key Manager
//!
//! Holds the derived subkeys while the vault is unlocked and nothing at any
//! other time. The manager is a two-state machine:
//!
//! - **Sealed**: no key material exists; every accessor returns `Locked`
//! - **Unsealed**: the per-purpose subkeys live in zeroizing memory
//!
//! A monotonically advancing generation counter is bumped on every seal. An
//! operation that started while unlocked records the generation it saw and
//! re-checks it before each later key access, so work racing a `lock()`
//! fails fast with `Locked` instead of ever reading stale key material.
//!
//! The KEK itself is not retained: subkeys are derived during unseal and the
//! caller's KEK buffer is wiped immediately afterwards by its `Zeroizing`
//! wrapper.

use zeroize::Zeroizing;

use strongbox_domain::VaultError;

use super::kdf;

/// The per-purpose subkeys derived from the KEK.
///
/// Each field wipes itself on drop. The duress subkey is intentionally
/// absent: duress material is derived on demand from the duress passphrase
/// and never stored.
pub struct SubKeys {
    index: Zeroizing<[u8; 32]>,
    entry: Zeroizing<[u8; 32]>,
    metadata: Zeroizing<[u8; 32]>,
    audit: Zeroizing<[u8; 32]>,
}

impl SubKeys {
    /// Derives the full subkey set from a KEK.
    pub fn derive(kek: &[u8; 32]) -> Result<Self, VaultError> {
        Ok(SubKeys {
            index: kdf::derive_subkey(kek, kdf::LABEL_INDEX)?,
            entry: kdf::derive_subkey(kek, kdf::LABEL_ENTRY)?,
            metadata: kdf::derive_subkey(kek, kdf::LABEL_METADATA)?,
            audit: kdf::derive_subkey(kek, kdf::LABEL_AUDIT)?,
        })
    }
}

enum KeyState {
    Sealed,
    Unsealed(SubKeys),
}

/// The unlock/lock state machine.
pub struct KeyManager {
    state: KeyState,
    generation: u64,
}

impl KeyManager {
    /// Creates a sealed manager.
    pub fn new() -> Self {
        KeyManager {
            state: KeyState::Sealed,
            generation: 0,
        }
    }

    /// Whether key material is currently available.
    pub fn is_unsealed(&self) -> bool {
        matches!(self.state, KeyState::Unsealed(_))
    }

    /// The current generation. Advances on every seal.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Installs subkeys derived from `kek`, entering the Unsealed state.
    pub fn unseal(&mut self, kek: &[u8; 32]) -> Result<(), VaultError> {
        self.state = KeyState::Unsealed(SubKeys::derive(kek)?);
        Ok(())
    }

    /// Wipes all key material and enters the Sealed state.
    ///
    /// Dropping the previous state zeroizes every subkey; the generation
    /// bump invalidates any in-flight operation's captured generation.
    pub fn seal(&mut self) {
        self.state = KeyState::Sealed;
        self.generation += 1;
    }

    /// Fails with `Locked` unless the manager is still in the generation the
    /// caller captured at operation start.
    pub fn ensure_generation(&self, expected: u64) -> Result<(), VaultError> {
        if !self.is_unsealed() || self.generation != expected {
            return Err(VaultError::Locked);
        }
        Ok(())
    }

    fn keys(&self) -> Result<&SubKeys, VaultError> {
        match &self.state {
            KeyState::Unsealed(keys) => Ok(keys),
            KeyState::Sealed => Err(VaultError::Locked),
        }
    }

    /// The index subkey (vault index, entry titles).
    pub fn index_key(&self) -> Result<&[u8; 32], VaultError> {
        Ok(&self.keys()?.index)
    }

    /// The entry subkey (per-record envelopes and file chunks).
    pub fn entry_key(&self) -> Result<&[u8; 32], VaultError> {
        Ok(&self.keys()?.entry)
    }

    /// The metadata subkey (stored cloud tokens).
    pub fn metadata_key(&self) -> Result<&[u8; 32], VaultError> {
        Ok(&self.keys()?.metadata)
    }

    /// The audit subkey (audit-log envelopes).
    pub fn audit_key(&self) -> Result<&[u8; 32], VaultError> {
        Ok(&self.keys()?.audit)
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}
