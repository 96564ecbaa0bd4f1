// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Envelope Codec
//!
//! Self-describing ciphertext container used for every at-rest artifact in
//! the vault: the index, per-record entry files, file chunks, audit events,
//! and stored cloud tokens.
//!
//! ## Wire Format
//!
//! ```text
//! [MAGIC(4)][VERSION(1)][ALG_ID(1)][NONCE(12|24)][CTXT_LEN(u32 BE)][CIPHERTEXT || TAG]
//! ```
//!
//! Two representations exist for the same byte string:
//!
//! - **Buffer-encoded**: the raw bytes above, used for file chunks
//! - **Text-encoded**: base64 of the raw bytes, used for the index, entry
//!   files, audit lines, and the token file
//!
//! Decoders accept both so older text-encoded chunk blobs keep opening.
//!
//! ## Associated Data
//!
//! Associated Data is never stored; both sides recompute it as
//! `MAGIC || VERSION || ALG_ID || context descriptor`, where the descriptor
//! is an explicit byte string: purpose tag, record UUID (zeroed when absent),
//! and a u32 BE slot carrying the chunk index or audit sequence number.
//! Binding the descriptor guarantees that a chunk of record A cannot be
//! substituted for one of record B, and that an index envelope cannot be
//! mistaken for an entry envelope.
//!
//! ## Error Mapping
//!
//! Every malformed-container condition maps to `AeadOpenFailed`: a tampered
//! byte must fail identically whether it landed in the header or in the
//! ciphertext body.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::VaultError;

/// Magic bytes identifying a Strongbox envelope: "SBX\0"
pub const MAGIC_BYTES: [u8; 4] = [0x53, 0x42, 0x58, 0x00];

/// Current envelope format version
///
/// Version history:
/// - Version 1: Initial format (XChaCha20-Poly1305 primary, AES-256-GCM
///   accepted on decode)
pub const CURRENT_ENVELOPE_VERSION: u8 = 1;

/// Poly1305 / GCM authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// AEAD algorithms understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmId {
    /// XChaCha20-Poly1305, 24-byte nonce. The write-side default: the
    /// extended nonce makes random nonces safe per key.
    XChaCha20Poly1305,
    /// AES-256-GCM, 12-byte nonce. Accepted on decode for compatibility.
    Aes256Gcm,
}

impl AlgorithmId {
    /// The on-wire identifier byte.
    pub fn id(&self) -> u8 {
        match self {
            AlgorithmId::XChaCha20Poly1305 => 1,
            AlgorithmId::Aes256Gcm => 2,
        }
    }

    /// Parses an identifier byte.
    pub fn from_id(id: u8) -> Result<Self, VaultError> {
        match id {
            1 => Ok(AlgorithmId::XChaCha20Poly1305),
            2 => Ok(AlgorithmId::Aes256Gcm),
            other => Err(VaultError::aead_open_failed(format!(
                "unknown algorithm id {}",
                other
            ))),
        }
    }

    /// Nonce length for this algorithm in bytes.
    pub fn nonce_len(&self) -> usize {
        match self {
            AlgorithmId::XChaCha20Poly1305 => 24,
            AlgorithmId::Aes256Gcm => 12,
        }
    }
}

impl std::fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlgorithmId::XChaCha20Poly1305 => write!(f, "XChaCha20-Poly1305"),
            AlgorithmId::Aes256Gcm => write!(f, "AES-256-GCM"),
        }
    }
}

/// The storage purpose an envelope is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// The vault index (`vault.enc`, and the duress projection)
    Index,
    /// A per-record entry file (`entries/<uuid>.enc`)
    Entry,
    /// One chunk of a File payload (`files/<uuid>[_<k>].bin`)
    Chunk,
    /// One audit-log event
    Audit,
    /// Vault metadata such as stored cloud tokens
    Metadata,
}

impl Purpose {
    /// The descriptor tag bytes for this purpose.
    pub fn tag(&self) -> &'static [u8] {
        match self {
            Purpose::Index => b"index",
            Purpose::Entry => b"entry",
            Purpose::Chunk => b"chunk",
            Purpose::Audit => b"audit",
            Purpose::Metadata => b"metadata",
        }
    }
}

/// Explicit context descriptor bound into an envelope's Associated Data.
///
/// The descriptor is recomputed on open; it never travels with the
/// ciphertext. A mismatch in any field makes the authentication tag fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeContext {
    purpose: Purpose,
    record_id: [u8; 16],
    slot: u32,
}

impl EnvelopeContext {
    /// Context for the vault index (zero record id, zero slot).
    pub fn index() -> Self {
        EnvelopeContext {
            purpose: Purpose::Index,
            record_id: [0u8; 16],
            slot: 0,
        }
    }

    /// Context for a per-record entry envelope.
    pub fn entry(record_id: [u8; 16]) -> Self {
        EnvelopeContext {
            purpose: Purpose::Entry,
            record_id,
            slot: 0,
        }
    }

    /// Context for chunk `index` (0-based) of a File payload.
    pub fn chunk(record_id: [u8; 16], index: u32) -> Self {
        EnvelopeContext {
            purpose: Purpose::Chunk,
            record_id,
            slot: index,
        }
    }

    /// Context for the audit event with the given sequence number.
    pub fn audit(sequence: u32) -> Self {
        EnvelopeContext {
            purpose: Purpose::Audit,
            record_id: [0u8; 16],
            slot: sequence,
        }
    }

    /// Context for vault metadata (stored cloud tokens).
    pub fn metadata() -> Self {
        EnvelopeContext {
            purpose: Purpose::Metadata,
            record_id: [0u8; 16],
            slot: 0,
        }
    }

    /// The serialized descriptor: purpose tag, record id, slot (u32 BE).
    pub fn descriptor(&self) -> Vec<u8> {
        let tag = self.purpose.tag();
        let mut out = Vec::with_capacity(tag.len() + 16 + 4);
        out.extend_from_slice(tag);
        out.extend_from_slice(&self.record_id);
        out.extend_from_slice(&self.slot.to_be_bytes());
        out
    }

    /// Full Associated Data for an envelope with the given header fields.
    pub fn associated_data(&self, version: u8, alg: AlgorithmId) -> Vec<u8> {
        let descriptor = self.descriptor();
        let mut aad = Vec::with_capacity(MAGIC_BYTES.len() + 2 + descriptor.len());
        aad.extend_from_slice(&MAGIC_BYTES);
        aad.push(version);
        aad.push(alg.id());
        aad.extend_from_slice(&descriptor);
        aad
    }
}

/// A sealed unit of ciphertext.
///
/// `ciphertext` always includes the trailing authentication tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    version: u8,
    alg: AlgorithmId,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Assembles an envelope from freshly produced parts.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` when the nonce length does not match the
    /// algorithm; sealing code constructs nonces from the algorithm's own
    /// length, so this only fires on programmer error.
    pub fn new(alg: AlgorithmId, nonce: Vec<u8>, ciphertext: Vec<u8>) -> Result<Self, VaultError> {
        if nonce.len() != alg.nonce_len() {
            return Err(VaultError::internal_error(format!(
                "nonce length {} does not fit {}",
                nonce.len(),
                alg
            )));
        }
        Ok(Envelope {
            version: CURRENT_ENVELOPE_VERSION,
            alg,
            nonce,
            ciphertext,
        })
    }

    /// Envelope format version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// AEAD algorithm that sealed this envelope.
    pub fn algorithm(&self) -> AlgorithmId {
        self.alg
    }

    /// The nonce bytes.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Ciphertext including the trailing tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Recomputes the Associated Data this envelope must be opened with.
    pub fn associated_data(&self, context: &EnvelopeContext) -> Vec<u8> {
        context.associated_data(self.version, self.alg)
    }

    /// Serializes to the buffer-encoded (raw) wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(MAGIC_BYTES.len() + 2 + self.nonce.len() + 4 + self.ciphertext.len());
        out.extend_from_slice(&MAGIC_BYTES);
        out.push(self.version);
        out.push(self.alg.id());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&(self.ciphertext.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Serializes to the text-encoded (base64) form.
    pub fn to_text(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    /// Parses the buffer-encoded wire form.
    ///
    /// # Errors
    ///
    /// Every malformed condition (bad magic, unknown version or algorithm,
    /// truncation, length mismatch) returns `AeadOpenFailed` so tampering
    /// anywhere in the blob fails uniformly.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        // magic + version + alg + shortest nonce + length field + tag
        let min_len = MAGIC_BYTES.len() + 2 + 12 + 4 + TAG_LEN;
        if bytes.len() < min_len {
            return Err(VaultError::aead_open_failed("envelope too short"));
        }
        if bytes[..4] != MAGIC_BYTES {
            return Err(VaultError::aead_open_failed("bad envelope magic"));
        }
        let version = bytes[4];
        if version == 0 || version > CURRENT_ENVELOPE_VERSION {
            return Err(VaultError::aead_open_failed(format!(
                "unsupported envelope version {}",
                version
            )));
        }
        let alg = AlgorithmId::from_id(bytes[5])?;
        let nonce_len = alg.nonce_len();

        let header_len = 6 + nonce_len + 4;
        if bytes.len() < header_len + TAG_LEN {
            return Err(VaultError::aead_open_failed("envelope truncated"));
        }
        let nonce = bytes[6..6 + nonce_len].to_vec();
        let len_field: [u8; 4] = bytes[6 + nonce_len..header_len]
            .try_into()
            .map_err(|_| VaultError::aead_open_failed("envelope truncated"))?;
        let ctxt_len = u32::from_be_bytes(len_field) as usize;

        let body = &bytes[header_len..];
        if ctxt_len < TAG_LEN || body.len() != ctxt_len {
            return Err(VaultError::aead_open_failed("envelope length mismatch"));
        }

        Ok(Envelope {
            version,
            alg,
            nonce,
            ciphertext: body.to_vec(),
        })
    }

    /// Parses the text-encoded (base64) form.
    pub fn from_text(text: &str) -> Result<Self, VaultError> {
        let bytes = BASE64
            .decode(text.trim())
            .map_err(|e| VaultError::aead_open_failed(format!("envelope base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Parses either representation.
    ///
    /// Raw decode is attempted first; on failure the bytes are retried as
    /// base64 text. Chunk blobs written by older versions were text-encoded,
    /// and this read fallback keeps them openable. New writes are raw.
    pub fn from_any(bytes: &[u8]) -> Result<Self, VaultError> {
        match Self::from_bytes(bytes) {
            Ok(env) => Ok(env),
            Err(raw_err) => match std::str::from_utf8(bytes) {
                Ok(text) => Self::from_text(text).map_err(|_| raw_err),
                Err(_) => Err(raw_err),
            },
        }
    }
}
