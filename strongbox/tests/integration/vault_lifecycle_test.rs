// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vault Lifecycle Tests
//!
//! Init, unlock, lock, wrong-passphrase handling, auto-lock, and the
//! audit trail around them.

use tempfile::TempDir;

use strongbox::application::{RecordPatch, UnlockOutcome};
use strongbox_domain::entities::record::PasswordData;
use strongbox_domain::entities::AuditEventKind;
use strongbox_domain::VaultError;

use crate::common::{self, TestClock, PASS};

#[tokio::test]
async fn init_then_unlock_roundtrip() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());

    vault.init(PASS).await.unwrap();
    assert!(vault.is_unlocked().await);
    vault.lock().await.unwrap();
    assert!(!vault.is_unlocked().await);

    let outcome = vault.unlock(PASS).await.unwrap();
    assert_eq!(outcome, UnlockOutcome::Real);
}

#[tokio::test]
async fn init_twice_is_already_exists() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    assert!(matches!(
        vault.init(PASS).await,
        Err(VaultError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn weak_passphrase_is_rejected_at_init() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    assert!(matches!(
        vault.init("short").await,
        Err(VaultError::WeakPassphrase(_))
    ));
    // Nothing was persisted
    assert!(matches!(
        vault.unlock(PASS).await,
        Err(VaultError::NotFound(_))
    ));
}

#[tokio::test]
async fn wrong_passphrase_surfaces_and_is_audited_once() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    vault.lock().await.unwrap();

    assert!(matches!(
        vault.unlock("not the passphrase").await,
        Err(VaultError::WrongPassphrase)
    ));

    vault.unlock(PASS).await.unwrap();
    let readout = vault.audit_events().await.unwrap();
    let failed = readout
        .events
        .iter()
        .filter(|e| e.kind == AuditEventKind::FailedUnlockAttempt)
        .count();
    assert_eq!(failed, 1);
    assert!(readout
        .events
        .iter()
        .any(|e| e.kind == AuditEventKind::VaultCreated));
}

#[tokio::test]
async fn locked_vault_denies_every_operation() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    let id = vault.add_note("n", "c").await.unwrap();
    vault.lock().await.unwrap();

    assert!(matches!(vault.get(id).await, Err(VaultError::Locked)));
    assert!(matches!(vault.list(None).await, Err(VaultError::Locked)));
    assert!(matches!(
        vault.add_note("x", "y").await,
        Err(VaultError::Locked)
    ));
    assert!(matches!(
        vault.update(id, RecordPatch::default()).await,
        Err(VaultError::Locked)
    ));
    assert!(matches!(vault.delete(id).await, Err(VaultError::Locked)));
}

#[tokio::test]
async fn record_roundtrip_across_lock_cycles() {
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
    let before = vault.get(id).await.unwrap();

    vault.lock().await.unwrap();
    vault.unlock(PASS).await.unwrap();

    let after = vault.get(id).await.unwrap();
    assert_eq!(before, after);

    let items = vault.list(None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "GH");
    assert_eq!(items[0].modified, after.modified);
}

#[tokio::test]
async fn idle_timeout_locks_with_explicit_lock_semantics() {
    let dir = TempDir::new().unwrap();
    let clock = TestClock::new(1_700_000_000_000);
    let vault = common::test_vault_with_clock(dir.path(), clock.clone(), 60_000);

    vault.init(PASS).await.unwrap();
    let id = vault.add_note("n", "c").await.unwrap();

    // Just under the deadline: still unlocked
    clock.advance_ms(59_999);
    vault.get(id).await.unwrap();

    // Idle past the deadline: next operation observes Locked
    clock.advance_ms(60_001);
    assert!(matches!(vault.get(id).await, Err(VaultError::Locked)));
    assert!(!vault.is_unlocked().await);

    // Unlock works again and the auto-lock left an ordinary lock event
    vault.unlock(PASS).await.unwrap();
    let readout = vault.audit_events().await.unwrap();
    assert!(readout
        .events
        .iter()
        .any(|e| e.kind == AuditEventKind::VaultLocked));
}

#[tokio::test]
async fn zero_timeout_disables_auto_lock() {
    let dir = TempDir::new().unwrap();
    let clock = TestClock::new(1_700_000_000_000);
    let vault = common::test_vault_with_clock(dir.path(), clock.clone(), 0);

    vault.init(PASS).await.unwrap();
    clock.advance_ms(24 * 60 * 60 * 1000);
    assert!(vault.is_unlocked().await);
}

#[tokio::test]
async fn change_passphrase_reencrypts_everything() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    let id = vault
        .add_password(
            "GH",
            PasswordData {
                password: Some("p".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        vault.change_passphrase("wrong-old-pass", "NewPassphrase!").await,
        Err(VaultError::WrongPassphrase)
    ));
    vault.change_passphrase(PASS, "NewPassphrase!").await.unwrap();

    vault.lock().await.unwrap();
    assert!(matches!(
        vault.unlock(PASS).await,
        Err(VaultError::WrongPassphrase)
    ));
    vault.unlock("NewPassphrase!").await.unwrap();
    assert_eq!(vault.get(id).await.unwrap().title, "GH");

    // The audit history survived the key rotation
    let readout = vault.audit_events().await.unwrap();
    assert!(readout
        .events
        .iter()
        .any(|e| e.kind == AuditEventKind::PassphraseChanged));
    assert!(readout
        .events
        .iter()
        .any(|e| e.kind == AuditEventKind::VaultCreated));
}
