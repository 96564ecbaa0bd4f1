// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cloud Provider Port
//!
//! The narrow contract the vault core requires from an object store. The
//! core never sees provider specifics (folders, app-data areas, REST
//! shapes); adapters for concrete providers implement this trait outside the
//! core and receive nothing but ciphertext and provider-opaque names.
//!
//! ## Contract Notes
//!
//! - `upload_bytes` is idempotent by name within the provider's scope
//! - `delete` of a missing object succeeds (or returns a `NotFound` kind the
//!   destruct path maps to success)
//! - `quota` is optional; the core degrades gracefully when it is absent
//! - Transient failures should be reported as `ProviderErrorKind::Network`
//!   or `RateLimited` so the sync layer can retry with backoff

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::VaultError;

/// Progress callback: `(bytes_done, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// A remote object as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Provider-assigned opaque object id
    pub id: String,
    /// The name the object was uploaded under
    pub name: String,
    /// Stored size in bytes
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// Provider storage quota, when the provider reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageQuota {
    pub used: u64,
    pub total: u64,
}

/// Abstract object-store contract (see the module docs).
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Uploads a byte buffer under `name`, returning the object id.
    /// Idempotent by name: re-uploading the same name may overwrite or
    /// return the existing object, at the provider's discretion.
    async fn upload_bytes(
        &self,
        name: &str,
        bytes: &[u8],
        progress: Option<ProgressFn>,
    ) -> Result<String, VaultError>;

    /// Uploads from a reader of known total length.
    ///
    /// The default implementation buffers the stream and delegates to
    /// [`CloudProvider::upload_bytes`]; providers with true streaming
    /// endpoints should override it.
    async fn upload_stream(
        &self,
        name: &str,
        mut reader: Pin<&mut (dyn AsyncRead + Send)>,
        total_len: u64,
        progress: Option<ProgressFn>,
    ) -> Result<String, VaultError> {
        let mut buffer = Vec::with_capacity(total_len as usize);
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| VaultError::io_error(format!("upload stream: {}", e)))?;
        self.upload_bytes(name, &buffer, progress).await
    }

    /// Downloads a whole object into memory.
    async fn download_to_buffer(&self, object_id: &str) -> Result<Vec<u8>, VaultError>;

    /// Downloads an object into a writer, reporting progress.
    ///
    /// The default implementation buffers via
    /// [`CloudProvider::download_to_buffer`].
    async fn download_to_stream(
        &self,
        object_id: &str,
        mut writer: Pin<&mut (dyn AsyncWrite + Send)>,
        progress: Option<ProgressFn>,
    ) -> Result<(), VaultError> {
        let bytes = self.download_to_buffer(object_id).await?;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| VaultError::io_error(format!("download stream: {}", e)))?;
        if let Some(report) = progress {
            report(bytes.len() as u64, bytes.len() as u64);
        }
        Ok(())
    }

    /// Finds an object id by its upload name.
    async fn find_by_name(&self, name: &str) -> Result<Option<String>, VaultError>;

    /// Lists objects, optionally restricted to a name prefix.
    async fn list(&self, name_prefix: Option<&str>) -> Result<Vec<RemoteObject>, VaultError>;

    /// Deletes an object. Deleting a missing object is a success.
    async fn delete(&self, object_id: &str) -> Result<(), VaultError>;

    /// Reports the provider quota, when available.
    async fn quota(&self) -> Result<Option<StorageQuota>, VaultError> {
        Ok(None)
    }
}
