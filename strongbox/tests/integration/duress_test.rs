// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Duress Subsystem Tests
//!
//! The alternate passphrase path: decoy view, simulated mutations,
//! suppressed audit, and forbidden configuration.

use tempfile::TempDir;

use strongbox::application::{RecordPatch, UnlockOutcome};
use strongbox_domain::entities::record::PasswordData;
use strongbox_domain::entities::Record;
use strongbox_domain::VaultError;

use crate::common::{self, PASS};

const DURESS_PASS: &str = "a-different-duress-pass";

fn decoys() -> Vec<Record> {
    vec![
        Record::new_password(
            "Decoy Bank",
            PasswordData {
                username: Some("jdoe".into()),
                password: Some("plausible-but-fake".into()),
                ..Default::default()
            },
            1_600_000_000_000,
        ),
        Record::new_password(
            "Decoy Email",
            PasswordData {
                username: Some("jdoe@example.com".into()),
                password: Some("alsofake1".into()),
                ..Default::default()
            },
            1_600_000_100_000,
        ),
    ]
}

async fn vault_with_duress(dir: &TempDir) -> strongbox::application::Vault {
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    vault.configure_duress(decoys(), DURESS_PASS).await.unwrap();
    vault.lock().await.unwrap();
    vault
}

#[tokio::test]
async fn duress_passphrase_unlocks_into_decoy_view() {
    let dir = TempDir::new().unwrap();
    let vault = vault_with_duress(&dir).await;

    let outcome = vault.unlock(DURESS_PASS).await.unwrap();
    assert_eq!(outcome, UnlockOutcome::Duress);

    let items = vault.list(None).await.unwrap();
    assert_eq!(items.len(), 2);
    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert!(titles.contains(&"Decoy Bank"));
    assert!(titles.contains(&"Decoy Email"));

    // get and search behave like a real session, over decoys only
    let decoy_id = items[0].id;
    assert_eq!(vault.get(decoy_id).await.unwrap().id, decoy_id);
    assert_eq!(vault.search("decoy").await.unwrap().len(), 2);
}

#[tokio::test]
async fn duress_mutations_simulate_success_without_persisting() {
    let dir = TempDir::new().unwrap();
    let vault = vault_with_duress(&dir).await;
    vault.unlock(DURESS_PASS).await.unwrap();

    // Same call sequence and return types as a real session
    let fake_id = vault.add_note("new note", "content").await.unwrap();
    let decoy_id = vault.list(None).await.unwrap()[0].id;
    vault
        .update(
            decoy_id,
            RecordPatch {
                title: Some("renamed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    vault.delete(decoy_id).await.unwrap();

    // Nothing actually changed
    assert_eq!(vault.list(None).await.unwrap().len(), 2);
    assert!(matches!(
        vault.get(fake_id).await,
        Err(VaultError::NotFound(_))
    ));

    // The real vault is untouched and has no trace in the audit log
    vault.lock().await.unwrap();
    vault.unlock(PASS).await.unwrap();
    assert!(vault.list(None).await.unwrap().is_empty());
    let readout = vault.audit_events().await.unwrap();
    assert!(readout
        .events
        .iter()
        .all(|e| e.title_snapshot.as_deref() != Some("new note")));
}

#[tokio::test]
async fn duress_forbids_sensitive_configuration() {
    let dir = TempDir::new().unwrap();
    let vault = vault_with_duress(&dir).await;
    vault.unlock(DURESS_PASS).await.unwrap();

    assert!(matches!(
        vault.configure_vault_2fa(None).await,
        Err(VaultError::NotPermitted)
    ));
    assert!(matches!(
        vault.configure_duress(Vec::new(), "another-pass!").await,
        Err(VaultError::NotPermitted)
    ));
    assert!(matches!(
        vault.disable_duress().await,
        Err(VaultError::NotPermitted)
    ));
    assert!(matches!(
        vault.change_passphrase(DURESS_PASS, "NewPass123!").await,
        Err(VaultError::NotPermitted)
    ));
}

#[tokio::test]
async fn wrong_passphrase_still_fails_with_duress_configured() {
    let dir = TempDir::new().unwrap();
    let vault = vault_with_duress(&dir).await;

    assert!(matches!(
        vault.unlock("neither-passphrase").await,
        Err(VaultError::WrongPassphrase)
    ));
}

#[tokio::test]
async fn disable_duress_removes_the_alternate_path() {
    let dir = TempDir::new().unwrap();
    let vault = vault_with_duress(&dir).await;

    vault.unlock(PASS).await.unwrap();
    vault.disable_duress().await.unwrap();
    vault.lock().await.unwrap();

    assert!(matches!(
        vault.unlock(DURESS_PASS).await,
        Err(VaultError::WrongPassphrase)
    ));
}

#[tokio::test]
async fn duress_passphrase_must_differ_and_meet_policy() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();

    assert!(matches!(
        vault.configure_duress(decoys(), PASS).await,
        Err(VaultError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        vault.configure_duress(decoys(), "short").await,
        Err(VaultError::WeakPassphrase(_))
    ));
}
