// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

pub mod bulk_data_service;
pub mod object_store;
pub mod search_index;
pub mod state_store;
pub mod validation_service;

pub use bulk_data_service::{BulkDataServiceClient, DatasetEntry, IndexFetch, ReportingOrg};
pub use object_store::{Container, ObjectStoreRepository};
pub use search_index::{SearchIndexRepository, SolrRecord, ACTIVITY_CORE};
pub use state_store::{DatasetObservation, RefreshCandidate, StateStoreRepository, UpsertOutcome};
pub use validation_service::{ValidationOutcome, ValidationServiceClient};
