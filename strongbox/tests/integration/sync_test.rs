// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cloud Sync Tests
//!
//! Replication against the in-memory provider: idempotent uploads,
//! chunked file transfer, index backup/restore, deletion, conflict
//! resolution across two vaults, and destruct.

use tempfile::TempDir;

use strongbox::application::vault::{SyncOptions, SyncSummary};
use strongbox::application::RecordPatch;
use strongbox_domain::entities::record::PasswordData;
use strongbox_domain::entities::{CloudSyncStatus, ResolutionStrategy};
use strongbox_domain::CloudProvider;

use crate::common::{self, PASS};

fn default_sync() -> SyncOptions {
    SyncOptions::default()
}

#[tokio::test]
async fn first_sync_uploads_then_second_sync_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let provider = common::shared_provider();
    let vault = common::test_vault_with_provider(dir.path(), provider.clone());
    vault.init(PASS).await.unwrap();

    vault.add_note("a", "1").await.unwrap();
    vault
        .add_password("b", PasswordData::default())
        .await
        .unwrap();

    let summary = vault.sync(default_sync()).await.unwrap();
    assert_eq!(summary.uploaded_records, 2);
    assert!(summary.errors.is_empty());
    let uploads_after_first = provider.uploads();

    // No local changes: zero additional record/chunk uploads (the index
    // backup re-uploads by design)
    let summary = vault.sync(default_sync()).await.unwrap();
    assert_eq!(summary.uploaded_records, 0);
    assert_eq!(summary.uploaded_chunks, 0);
    // Only the index backup object transferred again
    assert_eq!(provider.uploads(), uploads_after_first + 1);
}

#[tokio::test]
async fn file_chunks_upload_individually_and_are_tracked() {
    let dir = TempDir::new().unwrap();
    let provider = common::shared_provider();
    let vault = strongbox::application::Vault::new(
        strongbox::application::VaultOptions::new(
            strongbox::infrastructure::config::VaultLayout::new(dir.path()),
        )
        .with_provider(provider.clone())
        .with_auto_lock_ms(0)
        .with_chunk_size(strongbox_domain::value_objects::ChunkSize::new(64 * 1024).unwrap()),
    );
    vault.init(PASS).await.unwrap();

    let source = dir.path().join("payload.bin");
    tokio::fs::write(&source, common::patterned_bytes(3 * 64 * 1024))
        .await
        .unwrap();
    let id = vault.add_file("payload", &source, None, None).await.unwrap();

    let summary = vault.sync(default_sync()).await.unwrap();
    assert_eq!(summary.uploaded_chunks, 3);

    let items = vault.list(None).await.unwrap();
    assert_eq!(items[0].cloud_sync_status, CloudSyncStatus::Synced);

    // The three chunk objects exist under their derived names
    for k in 0..3u32 {
        let name = format!("{}_{}.bin", id, k);
        assert!(provider.find_by_name(&name).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn transient_provider_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let provider = common::shared_provider();
    let vault = common::test_vault_with_provider(dir.path(), provider.clone());
    vault.init(PASS).await.unwrap();
    vault.add_note("n", "c").await.unwrap();

    provider.inject_transient_failures(2);
    let summary = vault.sync(default_sync()).await.unwrap();
    assert!(summary.errors.is_empty());
    assert_eq!(summary.uploaded_records, 1);
}

#[tokio::test]
async fn delete_removes_cloud_artifacts_best_effort() {
    let dir = TempDir::new().unwrap();
    let provider = common::shared_provider();
    let vault = common::test_vault_with_provider(dir.path(), provider.clone());
    vault.init(PASS).await.unwrap();

    let id = vault.add_note("doomed", "c").await.unwrap();
    vault.sync(default_sync()).await.unwrap();
    let name = format!("{}.enc", id);
    assert!(provider.find_by_name(&name).await.unwrap().is_some());

    vault.delete(id).await.unwrap();
    assert!(provider.find_by_name(&name).await.unwrap().is_none());
    assert!(vault.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn index_backup_restores_on_a_second_device() {
    let provider = common::shared_provider();

    // Device A creates and syncs
    let dir_a = TempDir::new().unwrap();
    let vault_a = common::test_vault_with_provider(dir_a.path(), provider.clone());
    vault_a.init(PASS).await.unwrap();
    let id = vault_a
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
    vault_a.sync(default_sync()).await.unwrap();

    // Device B restores from the backup and lazily pulls the record
    let dir_b = TempDir::new().unwrap();
    let vault_b = common::test_vault_with_provider(dir_b.path(), provider.clone());
    vault_b.restore_index(PASS).await.unwrap();

    let items = vault_b.list(None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "GH");

    let record = vault_b.get(id).await.unwrap();
    assert_eq!(record.title, "GH");
}

#[tokio::test]
async fn modified_both_resolves_by_keep_newest() {
    let provider = common::shared_provider();

    let dir_a = TempDir::new().unwrap();
    let vault_a = common::test_vault_with_provider(dir_a.path(), provider.clone());
    vault_a.init(PASS).await.unwrap();
    let id = vault_a
        .add_password("shared", PasswordData::default())
        .await
        .unwrap();
    vault_a.sync(default_sync()).await.unwrap();

    let dir_b = TempDir::new().unwrap();
    let vault_b = common::test_vault_with_provider(dir_b.path(), provider.clone());
    vault_b.restore_index(PASS).await.unwrap();
    vault_b.get(id).await.unwrap();
    vault_b.sync(default_sync()).await.unwrap();

    // Both sides diverge; B's edit is newer
    vault_a
        .update(
            id,
            RecordPatch {
                title: Some("edited on A".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    vault_b
        .update(
            id,
            RecordPatch {
                title: Some("edited on B".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    vault_b.sync(default_sync()).await.unwrap();
    let summary = vault_a.sync(default_sync()).await.unwrap();
    assert_eq!(summary.conflicts_resolved, 1);
    assert_eq!(vault_a.get(id).await.unwrap().title, "edited on B");
}

#[tokio::test]
async fn skip_strategy_defers_conflicts_into_history() {
    let provider = common::shared_provider();

    let dir_a = TempDir::new().unwrap();
    let vault_a = common::test_vault_with_provider(dir_a.path(), provider.clone());
    vault_a.init(PASS).await.unwrap();
    let id = vault_a
        .add_password("shared", PasswordData::default())
        .await
        .unwrap();
    vault_a.sync(default_sync()).await.unwrap();

    let dir_b = TempDir::new().unwrap();
    let vault_b = common::test_vault_with_provider(dir_b.path(), provider.clone());
    vault_b.restore_index(PASS).await.unwrap();
    vault_b.get(id).await.unwrap();
    vault_b.sync(default_sync()).await.unwrap();

    vault_a
        .update(
            id,
            RecordPatch {
                title: Some("A's title".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    vault_b
        .update(
            id,
            RecordPatch {
                title: Some("B's title".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    vault_b.sync(default_sync()).await.unwrap();

    let summary: SyncSummary = vault_a
        .sync(SyncOptions {
            strategy: ResolutionStrategy::Skip,
            dry_run: false,
        })
        .await
        .unwrap();
    assert_eq!(summary.conflicts_pending, 1);
    assert_eq!(summary.conflicts_resolved, 0);

    // The local copy is untouched and the status report shows the deferral
    assert_eq!(vault_a.get(id).await.unwrap().title, "A's title");
    let status = vault_a.sync_status().await.unwrap();
    assert_eq!(status.unresolved_conflicts, 1);
}

#[tokio::test]
async fn destruct_wipes_local_and_cloud() {
    let dir = TempDir::new().unwrap();
    let provider = common::shared_provider();
    let vault = common::test_vault_with_provider(dir.path(), provider.clone());
    vault.init(PASS).await.unwrap();
    vault.add_note("n", "c").await.unwrap();
    vault.sync(default_sync()).await.unwrap();
    assert!(provider.object_count() > 0);

    vault.destruct().await.unwrap();
    assert_eq!(provider.object_count(), 0);
    assert!(!dir.path().join("vault.enc").exists());

    // Destructing an already-destroyed vault cannot resurrect anything
    assert!(!vault.is_unlocked().await);
}
