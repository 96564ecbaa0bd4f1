// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Chunking Tests
//!
//! Streaming import/export of File payloads: chunk counts, checksums,
//! progress reporting, and corruption handling.

use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use strongbox_domain::entities::record::RecordBody;
use strongbox_domain::services::ProgressFn;
use strongbox_domain::VaultError;

use crate::common::{self, PASS};

const MIB: usize = 1024 * 1024;

#[tokio::test]
async fn large_file_splits_into_expected_chunks() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault_with_chunk_size(dir.path(), 10 * MIB);
    vault.init(PASS).await.unwrap();

    // 25 MiB with 10 MiB chunks: exactly three blobs
    let payload = common::patterned_bytes(25 * MIB);
    let source = dir.path().join("backup.tar");
    tokio::fs::write(&source, &payload).await.unwrap();

    let id = vault
        .add_file("server backup", &source, Some("application/x-tar"), None)
        .await
        .unwrap();

    let record = vault.get(id).await.unwrap();
    let file_data = match &record.body {
        RecordBody::File(data) => data.clone(),
        _ => panic!("expected a file record"),
    };
    assert_eq!(file_data.chunk_count, 3);
    assert_eq!(file_data.size, 25 * MIB as u64);
    assert_eq!(file_data.sha256, common::calculate_sha256(&payload));
    assert_eq!(file_data.original_name, "backup.tar");

    // Three chunk blobs exist, each within one chunk plus envelope overhead
    for k in 0..3u32 {
        let path = dir.path().join("files").join(format!("{}_{}.bin", id, k));
        let meta = tokio::fs::metadata(&path).await.unwrap();
        assert!(meta.len() < 11 * MIB as u64, "chunk {} too large", k);
    }
}

#[tokio::test]
async fn export_restores_identical_bytes() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault_with_chunk_size(dir.path(), 64 * 1024);
    vault.init(PASS).await.unwrap();

    let payload = common::patterned_bytes(200_000);
    let source = dir.path().join("source.bin");
    tokio::fs::write(&source, &payload).await.unwrap();
    let id = vault.add_file("blob", &source, None, None).await.unwrap();

    let dest = dir.path().join("restored.bin");
    vault.get_file(id, &dest, None).await.unwrap();
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), payload);
}

#[tokio::test]
async fn progress_is_reported_in_bytes() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault_with_chunk_size(dir.path(), 64 * 1024);
    vault.init(PASS).await.unwrap();

    let total = 3 * 64 * 1024 + 100;
    let source = dir.path().join("source.bin");
    tokio::fs::write(&source, common::patterned_bytes(total))
        .await
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_cb = seen.clone();
    let progress: ProgressFn = Arc::new(move |done, all| {
        seen_in_cb.lock().unwrap().push((done, all));
    });
    vault
        .add_file("blob", &source, None, Some(progress))
        .await
        .unwrap();

    let reports = seen.lock().unwrap();
    assert_eq!(reports.len(), 4);
    assert!(reports.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(reports.last().unwrap(), &(total as u64, total as u64));
}

#[tokio::test]
async fn corrupt_chunk_fails_with_its_index_and_no_destination() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault_with_chunk_size(dir.path(), 64 * 1024);
    vault.init(PASS).await.unwrap();

    let source = dir.path().join("source.bin");
    tokio::fs::write(&source, common::patterned_bytes(3 * 64 * 1024))
        .await
        .unwrap();
    let id = vault.add_file("blob", &source, None, None).await.unwrap();

    // Flip one ciphertext byte in chunk 1
    let chunk_path = dir.path().join("files").join(format!("{}_1.bin", id));
    let mut bytes = tokio::fs::read(&chunk_path).await.unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    tokio::fs::write(&chunk_path, &bytes).await.unwrap();

    let dest = dir.path().join("restored.bin");
    let err = vault.get_file(id, &dest, None).await.unwrap_err();
    assert!(matches!(err, VaultError::ChunkCorrupt(1)), "got {:?}", err);
    assert!(!dest.exists());
}

#[tokio::test]
async fn empty_file_roundtrips() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault_with_chunk_size(dir.path(), 64 * 1024);
    vault.init(PASS).await.unwrap();

    let source = dir.path().join("empty.bin");
    tokio::fs::write(&source, b"").await.unwrap();
    let id = vault.add_file("empty", &source, None, None).await.unwrap();

    let record = vault.get(id).await.unwrap();
    match &record.body {
        RecordBody::File(data) => {
            assert_eq!(data.size, 0);
            assert_eq!(data.chunk_count, 1);
        }
        _ => panic!("expected a file record"),
    }

    let dest = dir.path().join("restored.bin");
    vault.get_file(id, &dest, None).await.unwrap();
    assert_eq!(tokio::fs::read(&dest).await.unwrap().len(), 0);
}

#[tokio::test]
async fn delete_removes_chunk_blobs() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault_with_chunk_size(dir.path(), 64 * 1024);
    vault.init(PASS).await.unwrap();

    let source = dir.path().join("source.bin");
    tokio::fs::write(&source, common::patterned_bytes(2 * 64 * 1024))
        .await
        .unwrap();
    let id = vault.add_file("blob", &source, None, None).await.unwrap();

    vault.delete(id).await.unwrap();
    for k in 0..2u32 {
        assert!(!dir
            .path()
            .join("files")
            .join(format!("{}_{}.bin", id, k))
            .exists());
    }
}
