// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Provider
//!
//! A complete [`CloudProvider`] held in process memory. Tests drive the
//! whole sync stack against it, and its fault injection exercises the
//! retry/backoff and partial-failure paths without a network.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use strongbox_domain::services::{CloudProvider, ProgressFn, RemoteObject, StorageQuota};
use strongbox_domain::{ProviderErrorKind, VaultError};

struct StoredObject {
    name: String,
    bytes: Vec<u8>,
    modified_at: DateTime<Utc>,
}

/// In-memory object store with fault injection.
#[derive(Default)]
pub struct MemoryProvider {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    next_id: AtomicU64,
    /// Uploads that actually transferred bytes (idempotence assertions)
    upload_count: AtomicU64,
    /// Remaining operations that fail with a transient network error
    fail_transient: AtomicU32,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>>, VaultError> {
        self.objects
            .lock()
            .map_err(|_| VaultError::internal_error("memory provider state poisoned"))
    }

    /// Makes the next `n` operations fail with a transient network error.
    pub fn inject_transient_failures(&self, n: u32) {
        self.fail_transient.store(n, Ordering::SeqCst);
    }

    /// Number of byte-transferring uploads performed so far.
    pub fn uploads(&self) -> u64 {
        self.upload_count.load(Ordering::SeqCst)
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    fn maybe_fail(&self) -> Result<(), VaultError> {
        let remaining = self.fail_transient.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_transient.store(remaining - 1, Ordering::SeqCst);
            return Err(VaultError::provider(
                ProviderErrorKind::Network,
                "injected transient failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for MemoryProvider {
    async fn upload_bytes(
        &self,
        name: &str,
        bytes: &[u8],
        progress: Option<ProgressFn>,
    ) -> Result<String, VaultError> {
        self.maybe_fail()?;
        let mut objects = self.objects()?;

        // Idempotent by name: re-uploading replaces content, keeps the id
        let existing = objects
            .iter()
            .find(|(_, obj)| obj.name == name)
            .map(|(id, _)| id.clone());
        let id = existing.unwrap_or_else(|| {
            format!("obj-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
        });

        objects.insert(
            id.clone(),
            StoredObject {
                name: name.to_string(),
                bytes: bytes.to_vec(),
                modified_at: Utc::now(),
            },
        );
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        if let Some(report) = progress {
            report(bytes.len() as u64, bytes.len() as u64);
        }
        Ok(id)
    }

    async fn download_to_buffer(&self, object_id: &str) -> Result<Vec<u8>, VaultError> {
        self.maybe_fail()?;
        let objects = self.objects()?;
        objects
            .get(object_id)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| {
                VaultError::provider(ProviderErrorKind::NotFound, object_id.to_string())
            })
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<String>, VaultError> {
        self.maybe_fail()?;
        let objects = self.objects()?;
        Ok(objects
            .iter()
            .find(|(_, obj)| obj.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn list(&self, name_prefix: Option<&str>) -> Result<Vec<RemoteObject>, VaultError> {
        self.maybe_fail()?;
        let objects = self.objects()?;
        Ok(objects
            .iter()
            .filter(|(_, obj)| {
                name_prefix
                    .map(|prefix| obj.name.starts_with(prefix))
                    .unwrap_or(true)
            })
            .map(|(id, obj)| RemoteObject {
                id: id.clone(),
                name: obj.name.clone(),
                size: obj.bytes.len() as u64,
                modified_at: obj.modified_at,
            })
            .collect())
    }

    async fn delete(&self, object_id: &str) -> Result<(), VaultError> {
        self.maybe_fail()?;
        let mut objects = self.objects()?;
        objects.remove(object_id);
        Ok(())
    }

    async fn quota(&self) -> Result<Option<StorageQuota>, VaultError> {
        let objects = self.objects()?;
        let used = objects.values().map(|obj| obj.bytes.len() as u64).sum();
        Ok(Some(StorageQuota {
            used,
            total: u64::MAX,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_is_idempotent_by_name() {
        let provider = MemoryProvider::new();
        let a = provider.upload_bytes("x.enc", b"one", None).await.unwrap();
        let b = provider.upload_bytes("x.enc", b"two", None).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.object_count(), 1);
        assert_eq!(
            provider.download_to_buffer(&a).await.unwrap(),
            b"two".to_vec()
        );
    }

    #[tokio::test]
    async fn delete_missing_succeeds() {
        let provider = MemoryProvider::new();
        provider.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let provider = MemoryProvider::new();
        provider.inject_transient_failures(1);
        let err = provider.upload_bytes("x", b"x", None).await.unwrap_err();
        assert!(err.is_recoverable());
        provider.upload_bytes("x", b"x", None).await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let provider = MemoryProvider::new();
        provider.upload_bytes("a/x.enc", b"1", None).await.unwrap();
        provider.upload_bytes("b/y.enc", b"2", None).await.unwrap();
        let listed = provider.list(Some("a/")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a/x.enc");
    }
}
