// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The Object Store port (`spec.md` §4.1, §4.11): blob access across the
//! three containers (source, clean, lake). One implementation wraps the
//! `object_store` crate, swapping the concrete backend (local disk for
//! tests, Azure Blob Storage in production) behind this trait.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::PipelineResult;

/// The three blob containers a document's bytes move through. Source holds
/// the raw download, Clean holds the sanitized/copied XML, Lake holds the
/// NDJSON activity records produced by Lakify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Source,
    Clean,
    Lake,
}

#[async_trait]
pub trait ObjectStoreRepository: Send + Sync {
    async fn upload_blob(&self, container: Container, blob_name: &str, bytes: Bytes) -> PipelineResult<()>;

    /// Tags used to drive `find_blobs_by_tags` garbage collection sweeps
    /// (`spec.md` §4.11): orphaned blobs are tagged with their owning
    /// document id so stale ones can be located without a full listing.
    async fn set_blob_tags(&self, container: Container, blob_name: &str, tags: &[(&str, &str)]) -> PipelineResult<()>;

    async fn download_blob(&self, container: Container, blob_name: &str) -> PipelineResult<Option<Bytes>>;

    async fn delete_blob(&self, container: Container, blob_name: &str) -> PipelineResult<()>;

    async fn delete_blobs(&self, container: Container, blob_names: &[String]) -> PipelineResult<()>;

    /// Finds blobs tagged with the given key/value pair, for cleanup sweeps
    /// over documents that no longer exist in the state store.
    async fn find_blobs_by_tags(&self, container: Container, tag_key: &str, tag_value: &str) -> PipelineResult<Vec<String>>;

    /// Server-side copy, used by `clean_valid` to copy the Source blob
    /// straight to Clean without round-tripping bytes through the worker.
    async fn start_copy_from_url(&self, from: Container, from_blob: &str, to: Container, to_blob: &str) -> PipelineResult<()>;

    async fn blob_exists(&self, container: Container, blob_name: &str) -> PipelineResult<bool>;
}
