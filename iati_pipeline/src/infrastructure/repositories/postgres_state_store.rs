// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Postgres implementation of [`StateStoreRepository`] (`spec.md` §4.1).
//!
//! Every method is a single prepared statement or a short transaction; the
//! "claim" pattern (`UPDATE ... SET <stage>_start = now() WHERE ...`) is the
//! only concurrency primitive, matching the teacher's repository-per-port
//! style (`adaptive_pipeline_domain::repositories::pipeline_repository`)
//! generalized from a single-aggregate store to this pipeline's six-stage
//! document lifecycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};

use iati_pipeline_domain::entities::{Document, Publisher, Stage, ValidationReport};
use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::repositories::{DatasetObservation, RefreshCandidate, StateStoreRepository, UpsertOutcome};
use iati_pipeline_domain::value_objects::{ContentHash, DocumentId, DownloadErrorCode, PublisherId, StageProgress};

pub struct PostgresStateStoreRepository {
    pool: PgPool,
}

impl PostgresStateStoreRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Shared query behind `get_valid_to_copy`/`get_invalid_to_clean`: both
    /// join `document` to its referenced `validation` row and differ only in
    /// the verdict predicate. Validation columns are `v_`-prefixed to avoid
    /// colliding with `document.id`/`document.publisher`.
    async fn get_clean_candidates(&self, predicate: &str) -> PipelineResult<Vec<(Document, ValidationReport)>> {
        let doc_cols = DOCUMENT_COLUMNS.split(", ").map(|c| format!("d.{c} AS {c}")).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT {doc_cols}, v.id AS v_id, v.document_id AS v_document_id, v.document_hash AS v_document_hash, \
             v.document_url AS v_document_url, v.publisher AS v_publisher, v.publisher_name AS v_publisher_name, \
             v.created AS v_created, v.valid AS v_valid, v.report AS v_report \
             FROM document d JOIN validation v ON v.id = d.validation \
             WHERE d.clean_start IS NULL AND d.clean_end IS NULL AND {predicate}"
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                let document: Document = DocumentRow::from_row(&row).map_err(db_err)?.into();
                let report = ValidationReport {
                    id: Some(row.get::<i64, _>("v_id")),
                    document_id: DocumentId::new(row.get::<String, _>("v_document_id")),
                    document_hash: ContentHash::new(row.get::<String, _>("v_document_hash")),
                    document_url: row.get::<String, _>("v_document_url"),
                    publisher: PublisherId::new(row.get::<String, _>("v_publisher")),
                    publisher_name: row.get::<String, _>("v_publisher_name"),
                    created: row.get::<DateTime<Utc>, _>("v_created"),
                    valid: row.get::<bool, _>("v_valid"),
                    report: row.get::<serde_json::Value, _>("v_report"),
                };
                Ok((document, report))
            })
            .collect()
    }
}

fn db_err(e: sqlx::Error) -> PipelineError {
    PipelineError::Database(e.to_string())
}

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    hash: String,
    url: String,
    bds_cache_url: Option<String>,
    publisher: String,
    name: String,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    modified: DateTime<Utc>,
    downloaded: Option<DateTime<Utc>>,
    download_error: Option<i16>,
    validation_request: Option<DateTime<Utc>>,
    validation_api_error: Option<i32>,
    file_schema_valid: Option<bool>,
    validation: Option<i64>,
    regenerate_validation_report: bool,
    clean_start: Option<DateTime<Utc>>,
    clean_end: Option<DateTime<Utc>>,
    clean_error: Option<String>,
    flatten_start: Option<DateTime<Utc>>,
    flatten_end: Option<DateTime<Utc>>,
    flatten_error: Option<String>,
    flattened_activities: Option<serde_json::Value>,
    lakify_start: Option<DateTime<Utc>>,
    lakify_end: Option<DateTime<Utc>>,
    lakify_error: Option<String>,
    solrize_start: Option<DateTime<Utc>>,
    solrize_end: Option<DateTime<Utc>>,
    solrize_error: Option<String>,
    last_solrize_end: Option<DateTime<Utc>>,
    solrize_reindex: bool,
}

impl From<DocumentRow> for Document {
    fn from(r: DocumentRow) -> Self {
        Document {
            id: DocumentId::new(r.id),
            hash: ContentHash::new(r.hash),
            url: r.url,
            bds_cache_url: r.bds_cache_url,
            publisher: PublisherId::new(r.publisher),
            name: r.name,
            first_seen: r.first_seen,
            last_seen: r.last_seen,
            modified: r.modified,
            downloaded: r.downloaded,
            download_error: r.download_error.map(|c| DownloadErrorCode(c as i32)),
            validation_request: r.validation_request,
            validation_api_error: r.validation_api_error,
            file_schema_valid: r.file_schema_valid,
            validation: r.validation,
            regenerate_validation_report: r.regenerate_validation_report,
            clean: StageProgress { start: r.clean_start, end: r.clean_end, error: r.clean_error },
            flatten: StageProgress { start: r.flatten_start, end: r.flatten_end, error: r.flatten_error },
            flattened_activities: r.flattened_activities,
            lakify: StageProgress { start: r.lakify_start, end: r.lakify_end, error: r.lakify_error },
            solrize: StageProgress { start: r.solrize_start, end: r.solrize_end, error: r.solrize_error },
            last_solrize_end: r.last_solrize_end,
            solrize_reindex: r.solrize_reindex,
        }
    }
}

#[derive(FromRow)]
struct PublisherRow {
    org_id: String,
    short_name: String,
    title: String,
    iati_identifier: Option<String>,
    dataset_count: i64,
    created: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    black_flag: Option<DateTime<Utc>>,
    black_flag_notified: bool,
}

impl From<PublisherRow> for Publisher {
    fn from(r: PublisherRow) -> Self {
        Publisher {
            org_id: PublisherId::new(r.org_id),
            short_name: r.short_name,
            title: r.title,
            iati_identifier: r.iati_identifier,
            dataset_count: r.dataset_count,
            created: r.created,
            last_seen: r.last_seen,
            black_flag: r.black_flag,
            black_flag_notified: r.black_flag_notified,
        }
    }
}

#[derive(FromRow)]
struct ValidationRow {
    id: i64,
    document_id: String,
    document_hash: String,
    document_url: String,
    publisher: String,
    publisher_name: String,
    created: DateTime<Utc>,
    valid: bool,
    report: serde_json::Value,
}

impl From<ValidationRow> for ValidationReport {
    fn from(r: ValidationRow) -> Self {
        ValidationReport {
            id: Some(r.id),
            document_id: DocumentId::new(r.document_id),
            document_hash: ContentHash::new(r.document_hash),
            document_url: r.document_url,
            publisher: PublisherId::new(r.publisher),
            publisher_name: r.publisher_name,
            created: r.created,
            valid: r.valid,
            report: r.report,
        }
    }
}

const DOCUMENT_COLUMNS: &str = "id, hash, url, bds_cache_url, publisher, name, first_seen, last_seen, modified, \
     downloaded, download_error, validation_request, validation_api_error, file_schema_valid, validation, \
     regenerate_validation_report, clean_start, clean_end, clean_error, flatten_start, flatten_end, flatten_error, \
     flattened_activities, lakify_start, lakify_end, lakify_error, solrize_start, solrize_end, solrize_error, \
     last_solrize_end, solrize_reindex";

#[async_trait]
impl StateStoreRepository for PostgresStateStoreRepository {
    async fn get_schema_version(&self) -> PipelineResult<Option<(String, i64)>> {
        let row = sqlx::query("SELECT number, migration FROM version LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| (r.get::<String, _>("number"), r.get::<i64, _>("migration"))))
    }

    async fn set_schema_version(&self, number: &str, migration: i64) -> PipelineResult<()> {
        sqlx::query("UPDATE version SET number = $1, migration = $2")
            .bind(number)
            .bind(migration)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_num_publishers(&self) -> PipelineResult<i64> {
        let row = sqlx::query("SELECT count(*) AS n FROM publisher").fetch_one(&self.pool).await.map_err(db_err)?;
        Ok(row.get::<i64, _>("n"))
    }

    async fn upsert_publisher_seen(&self, publisher: &Publisher) -> PipelineResult<()> {
        sqlx::query(
            "INSERT INTO publisher (org_id, short_name, title, iati_identifier, dataset_count, created, last_seen, \
             black_flag, black_flag_notified) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (org_id) DO UPDATE SET short_name = excluded.short_name, title = excluded.title, \
             iati_identifier = excluded.iati_identifier, dataset_count = excluded.dataset_count, \
             last_seen = excluded.last_seen",
        )
        .bind(publisher.org_id.as_str())
        .bind(&publisher.short_name)
        .bind(&publisher.title)
        .bind(&publisher.iati_identifier)
        .bind(publisher.dataset_count)
        .bind(publisher.created)
        .bind(publisher.last_seen)
        .bind(publisher.black_flag)
        .bind(publisher.black_flag_notified)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_publisher(&self, id: &PublisherId) -> PipelineResult<Option<Publisher>> {
        let row: Option<PublisherRow> = sqlx::query_as("SELECT * FROM publisher WHERE org_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn get_publishers_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<Vec<PublisherId>> {
        let rows = sqlx::query("SELECT org_id FROM publisher WHERE last_seen < $1")
            .bind(pass_start)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(|r| PublisherId::new(r.get::<String, _>("org_id"))).collect())
    }

    async fn remove_publishers_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<u64> {
        let result = sqlx::query("DELETE FROM publisher WHERE last_seen < $1")
            .bind(pass_start)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn get_black_flag_candidates(&self, threshold: i64, since: DateTime<Utc>) -> PipelineResult<Vec<PublisherId>> {
        let rows = sqlx::query(
            "SELECT p.org_id FROM publisher p WHERE p.black_flag IS NULL AND ( \
                SELECT count(*) FROM document d WHERE d.publisher = p.org_id AND d.file_schema_valid = false \
                AND d.validation_request > $2 \
             ) > $1",
        )
        .bind(threshold)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(|r| PublisherId::new(r.get::<String, _>("org_id"))).collect())
    }

    async fn set_black_flag(&self, id: &PublisherId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query("UPDATE publisher SET black_flag = $2, black_flag_notified = false WHERE org_id = $1")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear_black_flag(&self, id: &PublisherId) -> PipelineResult<()> {
        sqlx::query("UPDATE publisher SET black_flag = NULL, black_flag_notified = false WHERE org_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_publishers_needing_black_flag_notification(&self) -> PipelineResult<Vec<Publisher>> {
        let rows: Vec<PublisherRow> =
            sqlx::query_as("SELECT * FROM publisher WHERE black_flag IS NOT NULL AND black_flag_notified = false")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_black_flag_notified(&self, id: &PublisherId) -> PipelineResult<()> {
        sqlx::query("UPDATE publisher SET black_flag_notified = true WHERE org_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_num_documents(&self) -> PipelineResult<i64> {
        let row = sqlx::query("SELECT count(*) AS n FROM document").fetch_one(&self.pool).await.map_err(db_err)?;
        Ok(row.get::<i64, _>("n"))
    }

    async fn insert_or_update_document(&self, observation: &DatasetObservation, now: DateTime<Utc>) -> PipelineResult<UpsertOutcome> {
        let existing: Option<(String,)> = sqlx::query_as("SELECT hash FROM document WHERE id = $1")
            .bind(observation.id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match existing {
            None => {
                sqlx::query(
                    "INSERT INTO document (id, hash, url, bds_cache_url, publisher, name, first_seen, last_seen, \
                     modified, regenerate_validation_report, solrize_reindex) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $7, false, false)",
                )
                .bind(observation.id.as_str())
                .bind(observation.hash.as_str())
                .bind(&observation.url)
                .bind(&observation.bds_cache_url)
                .bind(observation.publisher.as_str())
                .bind(&observation.name)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
                Ok(UpsertOutcome::Inserted)
            }
            Some((old_hash,)) if old_hash == observation.hash.as_str() => {
                sqlx::query("UPDATE document SET url = $2, bds_cache_url = $3, name = $4, last_seen = $5 WHERE id = $1")
                    .bind(observation.id.as_str())
                    .bind(&observation.url)
                    .bind(&observation.bds_cache_url)
                    .bind(&observation.name)
                    .bind(now)
                    .execute(&self.pool)
                    .await
                    .map_err(db_err)?;
                Ok(UpsertOutcome::Unchanged)
            }
            Some((old_hash,)) => {
                // Hash changed: reset every downstream column in one statement
                // (spec.md §4.1), mirroring Document::apply_hash_change.
                sqlx::query(
                    "UPDATE document SET hash = $2, url = $3, bds_cache_url = $4, name = $5, modified = $6, \
                     last_seen = $6, downloaded = NULL, download_error = NULL, validation_request = NULL, \
                     validation_api_error = NULL, file_schema_valid = NULL, validation = NULL, \
                     regenerate_validation_report = false, clean_start = NULL, clean_end = NULL, clean_error = NULL, \
                     flatten_start = NULL, flatten_end = NULL, flatten_error = NULL, flattened_activities = NULL, \
                     lakify_start = NULL, lakify_end = NULL, lakify_error = NULL, solrize_start = NULL, \
                     solrize_end = NULL, solrize_error = NULL, last_solrize_end = NULL, solrize_reindex = false \
                     WHERE id = $1",
                )
                .bind(observation.id.as_str())
                .bind(observation.hash.as_str())
                .bind(&observation.url)
                .bind(&observation.bds_cache_url)
                .bind(&observation.name)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
                Ok(UpsertOutcome::HashChanged { old_hash: ContentHash::new(old_hash) })
            }
        }
    }

    async fn get_files_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<Vec<(DocumentId, ContentHash)>> {
        let rows = sqlx::query("SELECT id, hash FROM document WHERE last_seen < $1")
            .bind(pass_start)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| (DocumentId::new(r.get::<String, _>("id")), ContentHash::new(r.get::<String, _>("hash"))))
            .collect())
    }

    async fn remove_files_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<u64> {
        let result = sqlx::query("DELETE FROM document WHERE last_seen < $1")
            .bind(pass_start)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn get_files_from_publishers_not_seen_after(&self, pass_start: DateTime<Utc>) -> PipelineResult<Vec<(DocumentId, ContentHash)>> {
        let rows = sqlx::query(
            "SELECT d.id, d.hash FROM document d JOIN publisher p ON p.org_id = d.publisher WHERE p.last_seen < $1",
        )
        .bind(pass_start)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| (DocumentId::new(r.get::<String, _>("id")), ContentHash::new(r.get::<String, _>("hash"))))
            .collect())
    }

    async fn get_document(&self, id: &DocumentId) -> PipelineResult<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn rewind_document(&self, id: &DocumentId, from_stage: Stage) -> PipelineResult<()> {
        let sql = match from_stage {
            Stage::Download => {
                "UPDATE document SET downloaded = NULL, download_error = NULL, clean_start = NULL, clean_end = NULL, \
                 clean_error = NULL, flatten_start = NULL, flatten_end = NULL, flatten_error = NULL, \
                 flattened_activities = NULL, lakify_start = NULL, lakify_end = NULL, lakify_error = NULL, \
                 solrize_start = NULL, solrize_end = NULL, solrize_error = NULL WHERE id = $1"
            }
            Stage::Validate => {
                "UPDATE document SET validation_request = NULL, clean_start = NULL, clean_end = NULL, \
                 clean_error = NULL, flatten_start = NULL, flatten_end = NULL, flatten_error = NULL, \
                 flattened_activities = NULL, lakify_start = NULL, lakify_end = NULL, lakify_error = NULL, \
                 solrize_start = NULL, solrize_end = NULL, solrize_error = NULL WHERE id = $1"
            }
            Stage::Clean => {
                "UPDATE document SET clean_start = NULL, clean_end = NULL, clean_error = NULL, flatten_start = NULL, \
                 flatten_end = NULL, flatten_error = NULL, flattened_activities = NULL, lakify_start = NULL, \
                 lakify_end = NULL, lakify_error = NULL, solrize_start = NULL, solrize_end = NULL, \
                 solrize_error = NULL WHERE id = $1"
            }
            Stage::Flatten => {
                "UPDATE document SET flatten_start = NULL, flatten_end = NULL, flatten_error = NULL, \
                 flattened_activities = NULL, lakify_start = NULL, lakify_end = NULL, lakify_error = NULL, \
                 solrize_start = NULL, solrize_end = NULL, solrize_error = NULL WHERE id = $1"
            }
            Stage::Lakify => {
                "UPDATE document SET lakify_start = NULL, lakify_end = NULL, lakify_error = NULL, \
                 solrize_start = NULL, solrize_end = NULL, solrize_error = NULL WHERE id = $1"
            }
            Stage::Solrize => "UPDATE document SET solrize_start = NULL, solrize_end = NULL, solrize_error = NULL WHERE id = $1",
        };
        sqlx::query(sql).bind(id.as_str()).execute(&self.pool).await.map_err(db_err)?;
        Ok(())
    }

    async fn get_refresh_candidates(&self, retry_errors: bool) -> PipelineResult<Vec<RefreshCandidate>> {
        let sql = if retry_errors {
            "SELECT id, hash, bds_cache_url FROM document WHERE downloaded IS NULL"
        } else {
            "SELECT id, hash, bds_cache_url FROM document WHERE downloaded IS NULL AND download_error IS NULL"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await.map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| RefreshCandidate {
                id: DocumentId::new(r.get::<String, _>("id")),
                hash: ContentHash::new(r.get::<String, _>("hash")),
                bds_cache_url: r.get::<Option<String>, _>("bds_cache_url"),
            })
            .collect())
    }

    async fn mark_downloaded(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET downloaded = $2, download_error = NULL WHERE id = $1")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn mark_download_error(&self, id: &DocumentId, code: i32) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET download_error = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(code as i16)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_unvalidated(&self) -> PipelineResult<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document WHERE downloaded IS NOT NULL AND download_error IS NULL \
             AND hash <> '' AND (validation IS NULL OR regenerate_validation_report = true)"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn claim_validation(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET validation_request = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_file_schema_valid(&self, id: &DocumentId, valid: bool) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET file_schema_valid = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(valid)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_validation_api_error(&self, id: &DocumentId, status: i32) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET validation_api_error = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_validation_state(&self, report: &ValidationReport) -> PipelineResult<i64> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO validation (document_id, document_hash, document_url, publisher, publisher_name, created, \
             valid, report) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(report.document_id.as_str())
        .bind(report.document_hash.as_str())
        .bind(&report.document_url)
        .bind(report.publisher.as_str())
        .bind(&report.publisher_name)
        .bind(report.created)
        .bind(report.valid)
        .bind(&report.report)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE document SET validation = $2, regenerate_validation_report = false WHERE id = $1")
            .bind(report.document_id.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(id)
    }

    async fn get_validation_report(&self, id: i64) -> PipelineResult<Option<ValidationReport>> {
        let row: Option<ValidationRow> =
            sqlx::query_as("SELECT * FROM validation WHERE id = $1").bind(id).fetch_optional(&self.pool).await.map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn get_valid_to_copy(&self) -> PipelineResult<Vec<(Document, ValidationReport)>> {
        self.get_clean_candidates("v.valid = true AND v.report->>'fileType' = 'iati-activities'").await
    }

    async fn get_invalid_to_clean(&self) -> PipelineResult<Vec<(Document, ValidationReport)>> {
        self.get_clean_candidates("v.valid = false").await
    }

    async fn claim_clean(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET clean_start = $2 WHERE id = $1 AND clean_start IS NULL AND clean_end IS NULL")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn complete_clean(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET clean_end = $2, clean_error = NULL WHERE id = $1")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn fail_clean(&self, id: &DocumentId, error: String) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET clean_error = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn reset_unfinished_clean(&self) -> PipelineResult<u64> {
        let result = sqlx::query("UPDATE document SET clean_start = NULL WHERE clean_start IS NOT NULL AND clean_end IS NULL AND clean_error IS NULL")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn get_unflattened(&self) -> PipelineResult<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document WHERE clean_end IS NOT NULL AND clean_error IS NULL \
             AND flatten_start IS NULL AND flatten_end IS NULL"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn claim_flatten(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET flatten_start = $2 WHERE id = $1 AND flatten_start IS NULL AND flatten_end IS NULL")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn complete_flatten(&self, id: &DocumentId, now: DateTime<Utc>, activities: serde_json::Value) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET flatten_end = $2, flatten_error = NULL, flattened_activities = $3 WHERE id = $1")
            .bind(id.as_str())
            .bind(now)
            .bind(activities)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn fail_flatten(&self, id: &DocumentId, error: String) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET flatten_error = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn reset_unfinished_flatten(&self) -> PipelineResult<u64> {
        let result = sqlx::query("UPDATE document SET flatten_start = NULL WHERE flatten_start IS NOT NULL AND flatten_end IS NULL AND flatten_error IS NULL")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn get_unlakified(&self) -> PipelineResult<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document WHERE flatten_end IS NOT NULL AND flatten_error IS NULL \
             AND lakify_start IS NULL AND lakify_end IS NULL"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn claim_lakify(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET lakify_start = $2 WHERE id = $1 AND lakify_start IS NULL AND lakify_end IS NULL")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn complete_lakify(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET lakify_end = $2, lakify_error = NULL WHERE id = $1")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn fail_lakify(&self, id: &DocumentId, error: String) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET lakify_error = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn reset_unfinished_lakify(&self) -> PipelineResult<u64> {
        let result = sqlx::query("UPDATE document SET lakify_start = NULL WHERE lakify_start IS NOT NULL AND lakify_end IS NULL AND lakify_error IS NULL")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn get_unsolrized(&self) -> PipelineResult<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document WHERE lakify_end IS NOT NULL AND lakify_error IS NULL \
             AND (solrize_reindex = true OR (solrize_start IS NULL AND solrize_end IS NULL))"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn claim_solrize(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET solrize_start = $2 WHERE id = $1 AND solrize_start IS NULL AND solrize_end IS NULL")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn complete_solrize(&self, id: &DocumentId, now: DateTime<Utc>) -> PipelineResult<()> {
        sqlx::query(
            "UPDATE document SET solrize_end = $2, solrize_error = NULL, last_solrize_end = $2, solrize_reindex = false WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn fail_solrize(&self, id: &DocumentId, error: String) -> PipelineResult<()> {
        sqlx::query("UPDATE document SET solrize_error = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn reset_unfinished_solrize(&self) -> PipelineResult<u64> {
        let result = sqlx::query("UPDATE document SET solrize_start = NULL WHERE solrize_start IS NOT NULL AND solrize_end IS NULL AND solrize_error IS NULL")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
