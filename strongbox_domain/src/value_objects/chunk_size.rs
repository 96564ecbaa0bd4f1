// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Size Value Object
//!
//! Validated size of a file-payload chunk. Large File records are split into
//! chunks of at most this size; every chunk is sealed independently so a
//! payload never has to fit in memory and each provider upload stays well
//! under single-PUT limits.
//!
//! ## Constraints
//!
//! - **Minimum Size**: 64 KiB (prevents degenerate chunk counts)
//! - **Maximum Size**: 256 MiB (prevents memory exhaustion)
//! - **Default Size**: 20 MiB (balanced for disk and provider transfers)
//!
//! ## Thread Safety
//!
//! `ChunkSize` is immutable and `Copy`; once created it cannot be modified.

use crate::VaultError;
use serde::{Deserialize, Serialize};

/// Value object representing a chunk size with validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkSize {
    bytes: usize,
}

impl ChunkSize {
    /// Minimum chunk size (64 KiB)
    pub const MIN_SIZE: usize = 64 * 1024;

    /// Maximum chunk size (256 MiB) - prevents memory exhaustion
    pub const MAX_SIZE: usize = 256 * 1024 * 1024;

    /// Default chunk size (20 MiB)
    pub const DEFAULT_SIZE: usize = 20 * 1024 * 1024;

    /// Creates a new chunk size with validation.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::InvalidConfiguration` if the size is below
    /// `MIN_SIZE` or above `MAX_SIZE`.
    pub fn new(bytes: usize) -> Result<Self, VaultError> {
        if bytes < Self::MIN_SIZE {
            return Err(VaultError::InvalidConfiguration(format!(
                "Chunk size {} is below minimum of {} bytes",
                bytes,
                Self::MIN_SIZE
            )));
        }

        if bytes > Self::MAX_SIZE {
            return Err(VaultError::InvalidConfiguration(format!(
                "Chunk size {} exceeds maximum of {} bytes",
                bytes,
                Self::MAX_SIZE
            )));
        }

        Ok(ChunkSize { bytes })
    }

    /// Creates a chunk size from megabytes.
    pub fn from_mb(mb: usize) -> Result<Self, VaultError> {
        Self::new(mb * 1024 * 1024)
    }

    /// Gets the chunk size in bytes.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Number of chunks a payload of `len` bytes occupies.
    ///
    /// An empty payload still occupies one (empty) chunk so that every File
    /// record owns at least one blob on disk.
    pub fn chunk_count_for(&self, len: u64) -> u32 {
        if len == 0 {
            return 1;
        }
        len.div_ceil(self.bytes as u64) as u32
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        ChunkSize {
            bytes: Self::DEFAULT_SIZE,
        }
    }
}

impl std::fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bytes", self.bytes)
    }
}
