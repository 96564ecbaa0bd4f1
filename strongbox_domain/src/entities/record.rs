// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vault Records
//!
//! The three record variants held by a vault: login credentials, free-form
//! notes, and opaque binary files. Every record carries a UUID v4 identity
//! and unix-millisecond `created` / `modified` timestamps; the File variant
//! describes a payload that lives separately as 1..N encrypted chunks.
//!
//! ## Invariants
//!
//! - Note content is capped at 1 MiB (enforced on construction and update)
//! - TOTP parameters are validated on construction: base32 secret of 16..256
//!   characters, 6..8 digits, 15..120 second period
//! - Timestamps are positive and only move forward through [`Record::touch`]

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::value_objects::RecordId;
use crate::VaultError;

/// Maximum note content size (1 MiB).
pub const MAX_NOTE_BYTES: usize = 1024 * 1024;

/// Hash algorithm for TOTP code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TotpAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

/// TOTP parameters embedded in Password records and used by the vault-level
/// second factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpConfig {
    /// Base32-encoded shared secret (RFC 4648, no padding)
    pub secret: String,
    /// Optional issuer label for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Hash algorithm, SHA-1 by default
    #[serde(default)]
    pub algorithm: TotpAlgorithm,
    /// Code length, 6 by default
    #[serde(default = "TotpConfig::default_digits")]
    pub digits: u32,
    /// Step period in seconds, 30 by default
    #[serde(default = "TotpConfig::default_period")]
    pub period: u64,
}

impl TotpConfig {
    fn default_digits() -> u32 {
        6
    }

    fn default_period() -> u64 {
        30
    }

    /// Creates a validated configuration with the RFC defaults.
    pub fn new(secret: impl Into<String>) -> Result<Self, VaultError> {
        let config = TotpConfig {
            secret: secret.into(),
            issuer: None,
            algorithm: TotpAlgorithm::Sha1,
            digits: Self::default_digits(),
            period: Self::default_period(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates every parameter range.
    pub fn validate(&self) -> Result<(), VaultError> {
        let len = self.secret.chars().count();
        if !(16..=256).contains(&len) {
            return Err(VaultError::invalid_config(format!(
                "TOTP secret must be 16..256 base32 characters, got {}",
                len
            )));
        }
        let valid_base32 = self
            .secret
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c) || c == '=');
        if !valid_base32 {
            return Err(VaultError::invalid_config(
                "TOTP secret contains non-base32 characters",
            ));
        }
        if !(6..=8).contains(&self.digits) {
            return Err(VaultError::invalid_config(format!(
                "TOTP digits must be 6..8, got {}",
                self.digits
            )));
        }
        if !(15..=120).contains(&self.period) {
            return Err(VaultError::invalid_config(format!(
                "TOTP period must be 15..120 seconds, got {}",
                self.period
            )));
        }
        Ok(())
    }
}

impl Zeroize for TotpConfig {
    fn zeroize(&mut self) {
        self.secret.zeroize();
        if let Some(issuer) = self.issuer.as_mut() {
            issuer.zeroize();
        }
    }
}

/// Variant discriminator, mirrored into index entries so listings know the
/// record type without opening entry files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Password,
    Note,
    File,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Password => write!(f, "password"),
            EntryType::Note => write!(f, "note"),
            EntryType::File => write!(f, "file"),
        }
    }
}

/// Fields specific to a login-credential record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PasswordData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp: Option<TotpConfig>,
    /// Unix ms of the last password change, when tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_last_changed: Option<u64>,
    /// Expiry policy in days, when tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_expiry_days: Option<u32>,
}

impl Zeroize for PasswordData {
    fn zeroize(&mut self) {
        for field in [
            &mut self.username,
            &mut self.password,
            &mut self.url,
            &mut self.notes,
            &mut self.category,
        ] {
            if let Some(value) = field.as_mut() {
                value.zeroize();
            }
        }
        if let Some(totp) = self.totp.as_mut() {
            totp.zeroize();
        }
    }
}

/// Fields specific to a free-form note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteData {
    pub content: String,
}

/// Fields specific to a binary-file record. The payload itself is stored
/// separately as encrypted chunks; this struct only describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// Original filename at import time
    pub original_name: String,
    pub mime_type: String,
    /// Plaintext size in bytes
    pub size: u64,
    /// Hex-encoded SHA-256 of the plaintext
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Number of encrypted chunk blobs the payload occupies
    pub chunk_count: u32,
}

/// Variant payload of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordBody {
    Password(PasswordData),
    Note(NoteData),
    File(FileData),
}

/// A single vault record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub favorite: bool,
    /// Unix ms creation time
    pub created: u64,
    /// Unix ms of the last mutation
    pub modified: u64,
    #[serde(flatten)]
    pub body: RecordBody,
}

impl Record {
    /// Creates a Password record.
    pub fn new_password(title: impl Into<String>, data: PasswordData, now_ms: u64) -> Self {
        Record {
            id: RecordId::new(),
            title: title.into(),
            favorite: false,
            created: now_ms,
            modified: now_ms,
            body: RecordBody::Password(data),
        }
    }

    /// Creates a Note record, enforcing the content cap.
    pub fn new_note(
        title: impl Into<String>,
        content: impl Into<String>,
        now_ms: u64,
    ) -> Result<Self, VaultError> {
        let content = content.into();
        if content.len() > MAX_NOTE_BYTES {
            return Err(VaultError::invalid_config(format!(
                "note content of {} bytes exceeds the {} byte limit",
                content.len(),
                MAX_NOTE_BYTES
            )));
        }
        Ok(Record {
            id: RecordId::new(),
            title: title.into(),
            favorite: false,
            created: now_ms,
            modified: now_ms,
            body: RecordBody::Note(NoteData { content }),
        })
    }

    /// Creates a File record describing an already-imported payload.
    pub fn new_file(title: impl Into<String>, data: FileData, now_ms: u64) -> Self {
        Record {
            id: RecordId::new(),
            title: title.into(),
            favorite: false,
            created: now_ms,
            modified: now_ms,
            body: RecordBody::File(data),
        }
    }

    /// The variant discriminator.
    pub fn entry_type(&self) -> EntryType {
        match self.body {
            RecordBody::Password(_) => EntryType::Password,
            RecordBody::Note(_) => EntryType::Note,
            RecordBody::File(_) => EntryType::File,
        }
    }

    /// Category, present only on Password records.
    pub fn category(&self) -> Option<&str> {
        match &self.body {
            RecordBody::Password(data) => data.category.as_deref(),
            _ => None,
        }
    }

    /// Advances `modified`, never letting it move backwards.
    pub fn touch(&mut self, now_ms: u64) {
        self.modified = self.modified.max(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_content_cap_is_enforced() {
        let big = "x".repeat(MAX_NOTE_BYTES + 1);
        assert!(matches!(
            Record::new_note("too big", big, 1),
            Err(VaultError::InvalidConfiguration(_))
        ));
        assert!(Record::new_note("ok", "hello", 1).is_ok());
    }

    #[test]
    fn totp_validation_ranges() {
        assert!(TotpConfig::new("JBSWY3DPEHPK3PXP").is_ok());
        assert!(TotpConfig::new("short").is_err());

        let mut config = TotpConfig::new("JBSWY3DPEHPK3PXP").unwrap();
        config.digits = 9;
        assert!(config.validate().is_err());
        config.digits = 8;
        config.period = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn record_serde_roundtrip_is_tagged() {
        let record = Record::new_password(
            "GH",
            PasswordData {
                username: Some("a".into()),
                password: Some("p".into()),
                ..Default::default()
            },
            42,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"password\""));
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn touch_never_rewinds() {
        let mut record = Record::new_note("n", "c", 100).unwrap();
        record.touch(50);
        assert_eq!(record.modified, 100);
        record.touch(200);
        assert_eq!(record.modified, 200);
    }
}
