// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Passphrase Value Object
//!
//! Zeroizing wrapper around the user's master passphrase. The wrapper keeps
//! the plaintext out of `Debug` output and wipes the backing memory on drop;
//! the minimum-length policy lives here so `init` and `change_passphrase`
//! enforce the same rule.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::VaultError;

/// Minimum accepted passphrase length in characters.
pub const MIN_PASSPHRASE_CHARS: usize = 8;

/// A master passphrase held in zeroizing memory.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(String);

impl Passphrase {
    /// Wraps a passphrase without applying the strength policy.
    ///
    /// Use this for unlock attempts, where a short candidate must still be
    /// checked against the verifier rather than rejected up front.
    pub fn new(secret: impl Into<String>) -> Self {
        Passphrase(secret.into())
    }

    /// Wraps a passphrase, enforcing the minimum-length policy.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::WeakPassphrase` when the passphrase has fewer
    /// than [`MIN_PASSPHRASE_CHARS`] characters.
    pub fn new_checked(secret: impl Into<String>) -> Result<Self, VaultError> {
        let secret = secret.into();
        if secret.chars().count() < MIN_PASSPHRASE_CHARS {
            return Err(VaultError::WeakPassphrase(format!(
                "passphrase must be at least {} characters",
                MIN_PASSPHRASE_CHARS
            )));
        }
        Ok(Passphrase(secret))
    }

    /// The passphrase bytes, for key derivation only.
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}
