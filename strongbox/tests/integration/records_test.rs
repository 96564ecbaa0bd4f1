// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Operation Tests
//!
//! Add, get, list, search, update, favorite, and delete semantics.

use tempfile::TempDir;

use strongbox::application::{ListFilter, RecordPatch};
use strongbox_domain::entities::record::{PasswordData, RecordBody};
use strongbox_domain::entities::EntryType;
use strongbox_domain::value_objects::RecordId;
use strongbox_domain::VaultError;

use crate::common::{self, PASS};

#[tokio::test]
async fn list_reads_only_index_titles() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    vault.add_note("alpha", "a").await.unwrap();
    vault
        .add_password(
            "beta",
            PasswordData {
                category: Some("work".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let items = vault.list(None).await.unwrap();
    assert_eq!(items.len(), 2);

    let notes = vault
        .list(Some(ListFilter {
            entry_type: Some(EntryType::Note),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "alpha");

    let work = vault
        .list(Some(ListFilter {
            category: Some("work".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(work.len(), 1);
    assert_eq!(work[0].title, "beta");
}

#[tokio::test]
async fn search_is_case_insensitive_substring() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    vault.add_note("GitHub Backup Codes", "...").await.unwrap();
    vault.add_note("Groceries", "...").await.unwrap();

    let hits = vault.search("github").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "GitHub Backup Codes");

    assert!(vault.search("nonexistent").await.unwrap().is_empty());
}

#[tokio::test]
async fn ranked_search_weighs_title_over_username() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    let by_title = vault
        .add_password("github", PasswordData::default())
        .await
        .unwrap();
    let by_username = vault
        .add_password(
            "forge",
            PasswordData {
                username: Some("github".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let hits = vault.search_ranked("github").await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, by_title);
    assert_eq!(hits[1].id, by_username);

    // Identical inputs produce identical rankings
    let again = vault.search_ranked("github").await.unwrap();
    let ids: Vec<RecordId> = hits.iter().map(|h| h.id).collect();
    let ids_again: Vec<RecordId> = again.iter().map(|h| h.id).collect();
    assert_eq!(ids, ids_again);
}

#[tokio::test]
async fn update_patches_fields_and_bumps_modified() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    let id = vault
        .add_password(
            "GH",
            PasswordData {
                username: Some("old-user".into()),
                password: Some("old-pass".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let before = vault.get(id).await.unwrap();

    let updated = vault
        .update(
            id,
            RecordPatch {
                title: Some("GitHub".into()),
                password: Some("new-pass".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "GitHub");
    assert!(updated.modified >= before.modified);
    match &updated.body {
        RecordBody::Password(data) => {
            assert_eq!(data.password.as_deref(), Some("new-pass"));
            assert_eq!(data.username.as_deref(), Some("old-user"));
            assert!(data.password_last_changed.is_some());
        }
        _ => panic!("variant must not change on update"),
    }

    // The listing reflects the rename
    let items = vault.list(None).await.unwrap();
    assert_eq!(items[0].title, "GitHub");
}

#[tokio::test]
async fn toggle_favorite_flips_and_persists() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    let id = vault.add_note("n", "c").await.unwrap();
    assert!(vault.toggle_favorite(id).await.unwrap());
    assert!(!vault.toggle_favorite(id).await.unwrap());

    assert!(vault.toggle_favorite(id).await.unwrap());
    let favorites = vault
        .list(Some(ListFilter {
            favorites_only: true,
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(favorites.len(), 1);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    let id = vault.add_note("n", "c").await.unwrap();
    vault.delete(id).await.unwrap();
    assert!(matches!(vault.get(id).await, Err(VaultError::NotFound(_))));

    // Deleting again, and deleting something that never existed, succeed
    vault.delete(id).await.unwrap();
    vault.delete(RecordId::new()).await.unwrap();
}

#[tokio::test]
async fn oversized_note_is_rejected() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    let big = "x".repeat(1024 * 1024 + 1);
    assert!(matches!(
        vault.add_note("too big", &big).await,
        Err(VaultError::InvalidConfiguration(_))
    ));
}

#[tokio::test]
async fn reveal_password_audits_the_view() {
    use strongbox_domain::entities::AuditEventKind;

    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    let id = vault
        .add_password(
            "GH",
            PasswordData {
                password: Some("hunter2".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        vault.reveal_password(id).await.unwrap().as_deref(),
        Some("hunter2")
    );
    let readout = vault.audit_events().await.unwrap();
    assert!(readout
        .events
        .iter()
        .any(|e| e.kind == AuditEventKind::PasswordViewed && e.target_id == Some(id)));
}

#[tokio::test]
async fn missing_record_file_is_reported_dormant_not_hidden() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    let id = vault.add_note("fragile", "c").await.unwrap();
    // Simulate artifact loss behind the vault's back
    tokio::fs::remove_file(dir.path().join("entries").join(format!("{}.enc", id)))
        .await
        .unwrap();

    // The listing still shows the entry (title lives in the index)
    assert_eq!(vault.list(None).await.unwrap().len(), 1);
    // But access surfaces instead of silently omitting
    assert!(vault.get(id).await.is_err());
    assert_eq!(vault.dormant_records().await.unwrap(), vec![id]);
}
