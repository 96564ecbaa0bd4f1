// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Identity
//!
//! Value object wrapping the UUID v4 identity of a vault record. The id is
//! the stable handle for every per-record artifact: the entry envelope file,
//! each chunk blob, the cloud object names, and the Associated Data that
//! binds ciphertext to its record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::VaultError;

/// Identity of a vault record.
///
/// Record ids are UUID v4 values. The raw 16 bytes participate in envelope
/// Associated Data, so two records can never exchange ciphertext even when
/// every other parameter matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a fresh random id.
    pub fn new() -> Self {
        RecordId(Uuid::new_v4())
    }

    /// Parses an id from its canonical hyphenated form.
    pub fn parse(s: &str) -> Result<Self, VaultError> {
        Uuid::parse_str(s)
            .map(RecordId)
            .map_err(|e| VaultError::invalid_config(format!("invalid record id {:?}: {}", s, e)))
    }

    /// The raw 16 bytes, as bound into envelope Associated Data.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// The underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RecordId {
    fn from(u: Uuid) -> Self {
        RecordId(u)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let id = RecordId::new();
        let parsed = RecordId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_garbage() {
        assert!(RecordId::parse("not-a-uuid").is_err());
    }
}
