// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Clean (`spec.md` §4.7): two cooperating sub-workers — `copy_valid`
//! server-side copies a fully valid activities file straight to `clean`,
//! `clean_invalid` re-serialises only the valid `<iati-activity>` children
//! of a partially valid file.

use std::sync::Arc;

use chrono::Utc;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use tracing::{info, warn};

use iati_pipeline_domain::entities::{Document, ValidationReport};
use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::repositories::{Container, ObjectStoreRepository, StateStoreRepository};

pub struct CleanUseCase {
    state_store: Arc<dyn StateStoreRepository>,
    object_store: Arc<dyn ObjectStoreRepository>,
}

impl CleanUseCase {
    pub fn new(state_store: Arc<dyn StateStoreRepository>, object_store: Arc<dyn ObjectStoreRepository>) -> Self {
        Self { state_store, object_store }
    }

    pub async fn valid_to_copy(&self) -> PipelineResult<Vec<(Document, ValidationReport)>> {
        self.state_store.get_valid_to_copy().await
    }

    pub async fn invalid_to_clean(&self) -> PipelineResult<Vec<(Document, ValidationReport)>> {
        self.state_store.get_invalid_to_clean().await
    }

    pub async fn copy_valid(&self, document: &Document) {
        if let Err(e) = self.state_store.claim_clean(&document.id, Utc::now()).await {
            warn!(document = %document.id, error = %e, "failed to claim clean");
            return;
        }

        let blob_name = document.hash.blob_name();
        match self.object_store.start_copy_from_url(Container::Source, &blob_name, Container::Clean, &blob_name).await {
            Ok(()) => {
                if let Err(e) = self.object_store.set_blob_tags(Container::Clean, &blob_name, &[("document_id", document.id.as_str())]).await {
                    warn!(document = %document.id, error = %e, "failed to tag clean blob");
                }
                if let Err(e) = self.state_store.complete_clean(&document.id, Utc::now()).await {
                    warn!(document = %document.id, error = %e, "failed to record clean completion");
                } else {
                    info!(document = %document.id, "copied valid document to clean");
                }
            }
            Err(e) => {
                warn!(document = %document.id, error = %e, "copy_valid failed");
                if let Err(e) = self.state_store.fail_clean(&document.id, e.to_string()).await {
                    warn!(document = %document.id, error = %e, "failed to record clean failure");
                }
            }
        }
    }

    pub async fn clean_invalid(&self, document: &Document, report: &ValidationReport) {
        if let Err(e) = self.state_store.claim_clean(&document.id, Utc::now()).await {
            warn!(document = %document.id, error = %e, "failed to claim clean");
            return;
        }

        let blob_name = document.hash.blob_name();
        let source = match self.object_store.download_blob(Container::Source, &blob_name).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!(document = %document.id, "source blob missing for clean_invalid");
                let _ = self.state_store.fail_clean(&document.id, "source blob missing".into()).await;
                return;
            }
            Err(e) => {
                warn!(document = %document.id, error = %e, "failed to download source blob");
                return;
            }
        };

        let kept_indices: std::collections::HashSet<usize> = report.activity_validity().into_iter().filter(|a| a.valid).map(|a| a.index).collect();

        match reduce_to_valid_activities(&source, &kept_indices) {
            Ok(reduced) if !reduced.is_empty() => match self.object_store.upload_blob(Container::Clean, &blob_name, reduced.into()).await {
                Ok(()) => {
                    if let Err(e) = self.object_store.set_blob_tags(Container::Clean, &blob_name, &[("document_id", document.id.as_str())]).await {
                        warn!(document = %document.id, error = %e, "failed to tag clean blob");
                    }
                    if let Err(e) = self.state_store.complete_clean(&document.id, Utc::now()).await {
                        warn!(document = %document.id, error = %e, "failed to record clean completion");
                    } else {
                        info!(document = %document.id, "cleaned invalid document to valid subset");
                    }
                }
                Err(e) => {
                    warn!(document = %document.id, error = %e, "failed to upload cleaned blob");
                    let _ = self.state_store.fail_clean(&document.id, e.to_string()).await;
                }
            },
            Ok(_) => {
                warn!(document = %document.id, "no valid activities kept");
                let _ = self.state_store.fail_clean(&document.id, "No valid activities".into()).await;
            }
            Err(e) => {
                warn!(document = %document.id, error = %e, "failed to parse source xml for clean_invalid");
                let _ = self.state_store.fail_clean(&document.id, e.to_string()).await;
            }
        }
    }
}

/// Re-serialises `source` keeping only the `<iati-activity>` children whose
/// document-order index is in `kept_indices`; preserves the root element's
/// own attributes (`spec.md` §4.7's "preserve root attributes" rule).
fn reduce_to_valid_activities(source: &[u8], kept_indices: &std::collections::HashSet<usize>) -> PipelineResult<Vec<u8>> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());

    let mut activity_index: isize = -1;
    let mut depth_in_skipped_activity: u32 = 0;
    let mut buf = Vec::new();
    let mut kept_any = false;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| PipelineError::SourceCorrupt(e.to_string()))?;
        match &event {
            Event::Eof => break,
            Event::Start(start) if start.local_name().as_ref() == b"iati-activity" => {
                activity_index += 1;
                let keep = kept_indices.contains(&(activity_index as usize));
                if keep {
                    kept_any = true;
                    write_owned(&mut writer, Event::Start(start.to_owned()))?;
                } else {
                    depth_in_skipped_activity = 1;
                }
            }
            Event::End(end) if end.local_name().as_ref() == b"iati-activity" => {
                if depth_in_skipped_activity > 0 {
                    depth_in_skipped_activity -= 1;
                } else {
                    write_owned(&mut writer, Event::End(end.to_owned()))?;
                }
            }
            _ if depth_in_skipped_activity > 0 => {
                if matches!(event, Event::Start(_)) {
                    depth_in_skipped_activity += 1;
                } else if matches!(event, Event::End(_)) {
                    depth_in_skipped_activity -= 1;
                }
            }
            other => write_owned(&mut writer, owned_event(other))?,
        }
        buf.clear();
    }

    if !kept_any {
        return Ok(Vec::new());
    }
    Ok(writer.into_inner())
}

fn owned_event<'a>(event: &Event<'a>) -> Event<'static> {
    event.clone().into_owned()
}

fn write_owned(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> PipelineResult<()> {
    writer.write_event(event).map_err(|e| PipelineError::InternalError(e.to_string()))
}

