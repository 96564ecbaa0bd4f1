// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Common Test Helpers
//!
//! Shared utilities for integration and end-to-end tests.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strongbox::application::{Vault, VaultOptions};
use strongbox::infrastructure::cloud::MemoryProvider;
use strongbox::infrastructure::config::VaultLayout;
use strongbox_domain::value_objects::ChunkSize;
use strongbox_domain::{Clock, CloudProvider};

/// The passphrase used across tests.
pub const PASS: &str = "CorrectHorseBatteryStaple!";

/// A clock tests can advance by hand.
pub struct TestClock {
    ms: AtomicU64,
}

impl TestClock {
    pub fn new(start_ms: u64) -> Arc<Self> {
        Arc::new(TestClock {
            ms: AtomicU64::new(start_ms),
        })
    }

    pub fn advance_ms(&self, delta: u64) {
        self.ms.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}

/// A vault over a temp directory with defaults.
pub fn test_vault(root: &Path) -> Vault {
    Vault::new(VaultOptions::new(VaultLayout::new(root)))
}

/// A vault with an injected clock (auto-lock and timestamp tests).
pub fn test_vault_with_clock(root: &Path, clock: Arc<TestClock>, auto_lock_ms: u64) -> Vault {
    Vault::new(
        VaultOptions::new(VaultLayout::new(root))
            .with_clock(clock)
            .with_auto_lock_ms(auto_lock_ms),
    )
}

/// A vault wired to a shared in-memory provider.
pub fn test_vault_with_provider(root: &Path, provider: Arc<dyn CloudProvider>) -> Vault {
    Vault::new(
        VaultOptions::new(VaultLayout::new(root))
            .with_provider(provider)
            .with_auto_lock_ms(0),
    )
}

/// A vault with a small chunk size for multi-chunk tests.
pub fn test_vault_with_chunk_size(root: &Path, chunk_bytes: usize) -> Vault {
    Vault::new(
        VaultOptions::new(VaultLayout::new(root))
            .with_chunk_size(ChunkSize::new(chunk_bytes).expect("valid test chunk size"))
            .with_auto_lock_ms(0),
    )
}

/// A shared in-memory provider for multi-device tests.
pub fn shared_provider() -> Arc<MemoryProvider> {
    Arc::new(MemoryProvider::new())
}

/// Calculates the hex SHA-256 of a byte slice.
pub fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(data))
}

/// Deterministic pseudo-random payload for file tests.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let clock = TestClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance_ms(500);
        assert_eq!(clock.now_ms(), 1_500);
    }

    #[test]
    fn test_calculate_sha256() {
        let hash = calculate_sha256(b"test data");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, calculate_sha256(b"test data"));
    }
}
