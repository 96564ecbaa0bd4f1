// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # End-to-End Vault Scenarios
//!
//! The full user journeys exercised against real on-disk state and the
//! in-memory provider: fresh-vault setup, wrong passphrases, lock cycles,
//! large files, duress, cloud replication, and corruption recovery.

use tempfile::TempDir;

use strongbox::application::vault::SyncOptions;
use strongbox::application::UnlockOutcome;
use strongbox_domain::entities::record::{PasswordData, RecordBody};
use strongbox_domain::entities::{AuditEventKind, Record};
use strongbox_domain::{CloudProvider, VaultError};

use crate::common::{self, PASS};

const MIB: usize = 1024 * 1024;

/// S1: a fresh vault rejects a wrong passphrase and audits exactly one
/// failed attempt.
#[tokio::test]
async fn s1_fresh_vault_wrong_passphrase() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());

    vault.init("CorrectHorseBatteryStaple!").await.unwrap();
    vault.lock().await.unwrap();

    assert!(matches!(
        vault.unlock("wrong").await,
        Err(VaultError::WrongPassphrase)
    ));

    vault.unlock("CorrectHorseBatteryStaple!").await.unwrap();
    let readout = vault.audit_events().await.unwrap();
    assert_eq!(
        readout
            .events
            .iter()
            .filter(|e| e.kind == AuditEventKind::FailedUnlockAttempt)
            .count(),
        1
    );
}

/// S2: a stored password record survives a lock cycle with its metadata.
#[tokio::test]
async fn s2_lock_cycle_preserves_record() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    let id = vault
        .add_password(
            "GH",
            PasswordData {
                username: Some("a".into()),
                password: Some("p".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let modified = vault.get(id).await.unwrap().modified;

    vault.lock().await.unwrap();
    vault.unlock(PASS).await.unwrap();

    let items = vault.list(None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "GH");
    assert_eq!(items[0].modified, modified);
}

/// S3: a 25 MiB file with 10 MiB chunks produces three blobs and a
/// matching source checksum.
#[tokio::test]
async fn s3_multi_chunk_file_layout() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault_with_chunk_size(dir.path(), 10 * MIB);
    vault.init(PASS).await.unwrap();

    let payload = common::patterned_bytes(25 * MIB);
    let source = dir.path().join("image.iso");
    tokio::fs::write(&source, &payload).await.unwrap();

    let id = vault.add_file("installer", &source, None, None).await.unwrap();
    let record = vault.get(id).await.unwrap();
    let file_data = match &record.body {
        RecordBody::File(data) => data.clone(),
        _ => panic!("expected file record"),
    };

    assert_eq!(file_data.chunk_count, 3);
    assert_eq!(file_data.sha256, common::calculate_sha256(&payload));
    for k in 0..3u32 {
        let blob = dir.path().join("files").join(format!("{}_{}.bin", id, k));
        assert!(blob.exists(), "missing chunk {}", k);
        assert!(tokio::fs::metadata(&blob).await.unwrap().len() < 11 * MIB as u64);
    }
}

/// S4: the duress passphrase yields exactly the configured decoys and
/// refuses sensitive configuration.
#[tokio::test]
async fn s4_duress_session_decoys() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init("real-pass-ok!").await.unwrap();

    vault.add_note("the real secret", "...").await.unwrap();
    let decoys = vec![Record::new_password(
        "Shopping",
        PasswordData {
            password: Some("decoy".into()),
            ..Default::default()
        },
        1_600_000_000_000,
    )];
    vault
        .configure_duress(decoys, "duress-pass-ok!")
        .await
        .unwrap();
    vault.lock().await.unwrap();

    assert_eq!(
        vault.unlock("duress-pass-ok!").await.unwrap(),
        UnlockOutcome::Duress
    );
    let items = vault.list(None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Shopping");

    assert!(matches!(
        vault.configure_vault_2fa(None).await,
        Err(VaultError::NotPermitted)
    ));
}

/// S5: deleting a synced record removes it from the cloud and the
/// listing, with an audit entry.
#[tokio::test]
async fn s5_delete_synced_record() {
    let dir = TempDir::new().unwrap();
    let provider = common::shared_provider();
    let vault = common::test_vault_with_provider(dir.path(), provider.clone());
    vault.init(PASS).await.unwrap();

    let id = vault.add_note("R", "payload").await.unwrap();
    vault.sync(SyncOptions::default()).await.unwrap();
    assert!(provider
        .find_by_name(&format!("{}.enc", id))
        .await
        .unwrap()
        .is_some());

    vault.delete(id).await.unwrap();
    vault.sync(SyncOptions::default()).await.unwrap();

    assert!(provider
        .find_by_name(&format!("{}.enc", id))
        .await
        .unwrap()
        .is_none());
    assert!(vault.list(None).await.unwrap().is_empty());
    let readout = vault.audit_events().await.unwrap();
    assert!(readout
        .events
        .iter()
        .any(|e| e.kind == AuditEventKind::EntryDeleted && e.target_id == Some(id)));
}

/// S6: one flipped ciphertext byte in a chunk aborts the restore with the
/// chunk's index and leaves no destination file.
#[tokio::test]
async fn s6_corrupt_chunk_detection() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault_with_chunk_size(dir.path(), 64 * 1024);
    vault.init(PASS).await.unwrap();

    let source = dir.path().join("data.bin");
    tokio::fs::write(&source, common::patterned_bytes(2 * 64 * 1024 + 17))
        .await
        .unwrap();
    let id = vault.add_file("data", &source, None, None).await.unwrap();

    let chunk_path = dir.path().join("files").join(format!("{}_1.bin", id));
    let mut bytes = tokio::fs::read(&chunk_path).await.unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x80;
    tokio::fs::write(&chunk_path, &bytes).await.unwrap();

    let dest = dir.path().join("out.bin");
    assert!(matches!(
        vault.get_file(id, &dest, None).await,
        Err(VaultError::ChunkCorrupt(1))
    ));
    assert!(!dest.exists());
}
