// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects: identities, validated sizes, the envelope codec, and the
//! passphrase wrapper.

pub mod chunk_size;
pub mod envelope;
pub mod passphrase;
pub mod record_id;

pub use chunk_size::ChunkSize;
pub use envelope::{
    AlgorithmId, Envelope, EnvelopeContext, Purpose, CURRENT_ENVELOPE_VERSION, MAGIC_BYTES,
    TAG_LEN,
};
pub use passphrase::{Passphrase, MIN_PASSPHRASE_CHARS};
pub use record_id::RecordId;
