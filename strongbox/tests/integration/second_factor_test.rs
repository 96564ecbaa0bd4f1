// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vault Second-Factor Tests
//!
//! The TOTP + backup-code gate after primary unlock: happy paths, the
//! attempt cap, and backup-code single use.

use tempfile::TempDir;

use strongbox::application::services::second_factor;
use strongbox::application::UnlockOutcome;
use strongbox_domain::entities::AuditEventKind;
use strongbox_domain::entities::TwoFactorConfig;
use strongbox_domain::VaultError;

use crate::common::{self, PASS};

/// Enables 2FA and returns the config + plaintext backup codes.
async fn setup_2fa(vault: &strongbox::application::Vault) -> (TwoFactorConfig, Vec<String>) {
    let generated = vault.configure_vault_2fa(None).await.unwrap();
    (generated.config, generated.backup_codes)
}

fn current_code(config: &TwoFactorConfig) -> String {
    let now_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    second_factor::generate_totp(config, now_secs).unwrap()
}

#[tokio::test]
async fn unlock_requires_and_accepts_totp() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    let (config, _) = setup_2fa(&vault).await;
    vault.lock().await.unwrap();

    assert_eq!(
        vault.unlock(PASS).await.unwrap(),
        UnlockOutcome::Needs2FA
    );
    // The gate holds until the code arrives
    assert!(matches!(
        vault.list(None).await,
        Err(VaultError::Needs2FA)
    ));

    vault.verify_second_factor(&current_code(&config)).await.unwrap();
    assert!(vault.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn backup_code_unlocks_once_only() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    let (_, codes) = setup_2fa(&vault).await;
    let code = codes[0].clone();
    vault.lock().await.unwrap();

    vault.unlock(PASS).await.unwrap();
    vault.verify_second_factor(&code).await.unwrap();

    let readout = vault.audit_events().await.unwrap();
    assert!(readout
        .events
        .iter()
        .any(|e| e.kind == AuditEventKind::VaultUnlockedBackupCode));

    // The same code is rejected on the next unlock
    vault.lock().await.unwrap();
    vault.unlock(PASS).await.unwrap();
    assert!(matches!(
        vault.verify_second_factor(&code).await,
        Err(VaultError::Invalid2FA)
    ));

    // A different code still works
    vault.verify_second_factor(&codes[1]).await.unwrap();
    assert!(vault.list(None).await.is_ok());
}

#[tokio::test]
async fn three_failures_lock_the_vault() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    let (config, _) = setup_2fa(&vault).await;
    vault.lock().await.unwrap();

    vault.unlock(PASS).await.unwrap();
    for _ in 0..3 {
        assert!(matches!(
            vault.verify_second_factor("000000").await,
            Err(VaultError::Invalid2FA)
        ));
    }
    // The cap locked the vault entirely
    assert!(!vault.is_unlocked().await);
    assert!(matches!(
        vault.verify_second_factor("000000").await,
        Err(VaultError::InvalidConfiguration(_))
    ));

    // A fresh unlock with a valid code works, and the trail shows the
    // three failures plus the forced lock
    vault.unlock(PASS).await.unwrap();
    vault.verify_second_factor(&current_code(&config)).await.unwrap();
    let readout = vault.audit_events().await.unwrap();
    assert_eq!(
        readout
            .events
            .iter()
            .filter(|e| e.kind == AuditEventKind::Failed2faAttempt)
            .count(),
        3
    );
    assert!(readout
        .events
        .iter()
        .any(|e| e.kind == AuditEventKind::VaultLocked));
}

#[tokio::test]
async fn failed_attempts_are_audited() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    let (config, _) = setup_2fa(&vault).await;
    vault.lock().await.unwrap();

    vault.unlock(PASS).await.unwrap();
    let _ = vault.verify_second_factor("000000").await;
    vault.verify_second_factor(&current_code(&config)).await.unwrap();

    let readout = vault.audit_events().await.unwrap();
    assert_eq!(
        readout
            .events
            .iter()
            .filter(|e| e.kind == AuditEventKind::Failed2faAttempt)
            .count(),
        1
    );
}

#[tokio::test]
async fn disable_2fa_restores_plain_unlock() {
    let dir = TempDir::new().unwrap();
    let vault = common::test_vault(dir.path());
    vault.init(PASS).await.unwrap();
    let (config, _) = setup_2fa(&vault).await;
    vault.lock().await.unwrap();

    vault.unlock(PASS).await.unwrap();
    vault.verify_second_factor(&current_code(&config)).await.unwrap();
    vault.disable_vault_2fa().await.unwrap();
    vault.lock().await.unwrap();

    assert_eq!(vault.unlock(PASS).await.unwrap(), UnlockOutcome::Real);
}
