// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Log
//!
//! Append-only encrypted event log. Each event is one text envelope per
//! line, sealed with the audit subkey and bound by Associated Data to the
//! `audit` purpose and its sequence number, so lines cannot be reordered,
//! dropped from the middle, or transplanted between vaults without
//! detection at read time.
//!
//! Reading tolerates damage: a line that fails to open is skipped and
//! counted instead of poisoning the whole log.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::warn;

use strongbox_domain::entities::AuditEvent;
use strongbox_domain::value_objects::{Envelope, EnvelopeContext};
use strongbox_domain::VaultError;

use crate::infrastructure::crypto::aead;

/// Result of reading the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditReadout {
    pub events: Vec<AuditEvent>,
    /// Lines that failed to decode or open
    pub corrupt: usize,
}

/// Store for the append-only audit log.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        AuditLog { path }
    }

    /// Number of lines currently in the log, which is also the next
    /// sequence number.
    pub async fn count(&self) -> Result<u32, VaultError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text.lines().filter(|l| !l.trim().is_empty()).count() as u32),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(VaultError::io_error(format!(
                "read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Appends one event with the given sequence number.
    pub async fn append(
        &self,
        audit_key: &[u8; 32],
        sequence: u32,
        event: &AuditEvent,
    ) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(event)?;
        let envelope = aead::seal(audit_key, &EnvelopeContext::audit(sequence), &plaintext)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::io_error(e.to_string()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| VaultError::io_error(format!("open {}: {}", self.path.display(), e)))?;
        file.write_all(format!("{}\n", envelope.to_text()).as_bytes())
            .await
            .map_err(|e| VaultError::io_error(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| VaultError::io_error(e.to_string()))?;
        Ok(())
    }

    /// Decrypts every line, skipping and counting corrupt entries.
    pub async fn read_all(&self, audit_key: &[u8; 32]) -> Result<AuditReadout, VaultError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AuditReadout::default())
            }
            Err(e) => {
                return Err(VaultError::io_error(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut readout = AuditReadout::default();
        for (sequence, line) in text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
        {
            let opened = Envelope::from_text(line).and_then(|envelope| {
                aead::open(audit_key, &EnvelopeContext::audit(sequence as u32), &envelope)
            });
            match opened {
                Ok(plaintext) => match serde_json::from_slice::<AuditEvent>(&plaintext) {
                    Ok(event) => readout.events.push(event),
                    Err(_) => readout.corrupt += 1,
                },
                Err(_) => {
                    warn!(sequence, "skipping corrupt audit entry");
                    readout.corrupt += 1;
                }
            }
        }
        Ok(readout)
    }

    /// Removes the log file; missing is success.
    pub async fn remove(&self) -> Result<(), VaultError> {
        super::remove_idempotent(&self.path).await.map(|_| ())
    }
}
