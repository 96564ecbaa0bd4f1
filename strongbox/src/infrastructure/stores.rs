// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # On-Disk Stores
//!
//! Persistence for every vault artifact. All mutating writes go through
//! [`write_atomic`]: the payload lands in `<path>.tmp` first and is renamed
//! over the target, so a crash mid-write leaves the previous contents
//! intact and a failed write removes its temp file.

pub mod audit_log;
pub mod file_store;
pub mod index_store;
pub mod record_store;
pub mod sync_state_store;
pub mod token_store;

use std::path::{Path, PathBuf};

use strongbox_domain::VaultError;

/// The temp-file sibling used by atomic writes.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `bytes` to `path` atomically (temp file + rename).
///
/// The parent directory is created if needed. On any failure the temp file
/// is removed and the target is left at its pre-write state.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| VaultError::io_error(format!("create {}: {}", parent.display(), e)))?;
    }

    let tmp = temp_path(path);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(VaultError::io_error(format!(
            "write {}: {}",
            tmp.display(),
            e
        )));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(VaultError::io_error(format!(
            "rename {} -> {}: {}",
            tmp.display(),
            path.display(),
            e
        )));
    }
    Ok(())
}

/// Removes a file, treating a missing file as success.
///
/// Returns whether the file existed.
pub async fn remove_idempotent(path: &Path) -> Result<bool, VaultError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(VaultError::io_error(format!(
            "remove {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_atomic_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("target.bin");

        write_atomic(&path, b"one").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"one");

        write_atomic(&path, b"two").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"two");

        // No temp file left behind
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        tokio::fs::write(&path, b"x").await.unwrap();
        assert!(remove_idempotent(&path).await.unwrap());
        assert!(!remove_idempotent(&path).await.unwrap());
    }
}
