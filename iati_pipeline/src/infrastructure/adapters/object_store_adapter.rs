// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `object_store`-backed [`ObjectStoreRepository`] (`spec.md` §4.1, §4.11):
//! one Azure Blob Storage container per [`Container`] variant, all built
//! from the same connection string.
//!
//! The `object_store` crate has no notion of blob index tags, so tagging is
//! modeled as a zero-byte marker blob at `_tags/{key}/{value}/{blob_name}`
//! within the tagged blob's own container; `find_blobs_by_tags` lists that
//! prefix. This keeps the port's tag semantics (`spec.md` §4.11's orphan
//! sweep) without depending on the Azure SDK directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::repositories::{Container, ObjectStoreRepository};

use crate::infrastructure::config::ObjectStoreConfig;

const SERVICE: &str = "object-store";

pub struct AzureObjectStoreRepository {
    stores: HashMap<Container, Arc<dyn ObjectStore>>,
}

impl AzureObjectStoreRepository {
    pub fn new(config: &ObjectStoreConfig) -> PipelineResult<Self> {
        let mut stores: HashMap<Container, Arc<dyn ObjectStore>> = HashMap::new();
        for (container, name) in [
            (Container::Source, &config.source_container),
            (Container::Clean, &config.clean_container),
            (Container::Lake, &config.lake_container),
        ] {
            let store = MicrosoftAzureBuilder::new()
                .with_conn_str(&config.connection_string)
                .with_container_name(name)
                .build()
                .map_err(|e| PipelineError::InvalidConfiguration(format!("failed to build object store for container {name}: {e}")))?;
            stores.insert(container, Arc::new(store));
        }
        Ok(Self { stores })
    }

    fn store(&self, container: Container) -> &Arc<dyn ObjectStore> {
        self.stores.get(&container).expect("every Container variant has a configured store")
    }

    fn tag_marker_path(tag_key: &str, tag_value: &str, blob_name: &str) -> Path {
        Path::from(format!("_tags/{tag_key}/{tag_value}/{blob_name}"))
    }
}

fn map_store_error(e: object_store::Error) -> PipelineError {
    PipelineError::upstream(SERVICE, e.to_string())
}

#[async_trait]
impl ObjectStoreRepository for AzureObjectStoreRepository {
    async fn upload_blob(&self, container: Container, blob_name: &str, bytes: Bytes) -> PipelineResult<()> {
        self.store(container)
            .put(&Path::from(blob_name), PutPayload::from_bytes(bytes))
            .await
            .map_err(map_store_error)?;
        Ok(())
    }

    async fn set_blob_tags(&self, container: Container, blob_name: &str, tags: &[(&str, &str)]) -> PipelineResult<()> {
        let store = self.store(container);
        for (key, value) in tags {
            let marker = Self::tag_marker_path(key, value, blob_name);
            store.put(&marker, PutPayload::from_static(b"")).await.map_err(map_store_error)?;
        }
        Ok(())
    }

    async fn download_blob(&self, container: Container, blob_name: &str) -> PipelineResult<Option<Bytes>> {
        match self.store(container).get(&Path::from(blob_name)).await {
            Ok(result) => Ok(Some(result.bytes().await.map_err(map_store_error)?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_store_error(e)),
        }
    }

    async fn delete_blob(&self, container: Container, blob_name: &str) -> PipelineResult<()> {
        match self.store(container).delete(&Path::from(blob_name)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_store_error(e)),
        }
    }

    async fn delete_blobs(&self, container: Container, blob_names: &[String]) -> PipelineResult<()> {
        for name in blob_names {
            self.delete_blob(container, name).await?;
        }
        Ok(())
    }

    async fn find_blobs_by_tags(&self, container: Container, tag_key: &str, tag_value: &str) -> PipelineResult<Vec<String>> {
        let store = self.store(container);
        let prefix = Path::from(format!("_tags/{tag_key}/{tag_value}"));
        let mut names = Vec::new();
        let mut listing = store.list(Some(&prefix));
        while let Some(meta) = listing.next().await {
            let meta = meta.map_err(map_store_error)?;
            if let Some(blob_name) = meta.location.as_ref().strip_prefix(&format!("{prefix}/")) {
                names.push(blob_name.to_string());
            }
        }
        Ok(names)
    }

    async fn start_copy_from_url(&self, from: Container, from_blob: &str, to: Container, to_blob: &str) -> PipelineResult<()> {
        if from == to {
            self.store(from).copy(&Path::from(from_blob), &Path::from(to_blob)).await.map_err(map_store_error)?;
            return Ok(());
        }
        let bytes = self
            .store(from)
            .get(&Path::from(from_blob))
            .await
            .map_err(map_store_error)?
            .bytes()
            .await
            .map_err(map_store_error)?;
        self.store(to).put(&Path::from(to_blob), PutPayload::from_bytes(bytes)).await.map_err(map_store_error)?;
        Ok(())
    }

    async fn blob_exists(&self, container: Container, blob_name: &str) -> PipelineResult<bool> {
        match self.store(container).head(&Path::from(blob_name)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_store_error(e)),
        }
    }
}
