// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! HTTP and blob-storage adapters for the three external collaborators
//! named in `spec.md` §4.1/§4.4/§4.10/§4.11: the Bulk Data Service, the
//! validation service, the blob object store, and the Solr search index.

mod bds_client;
mod object_store_adapter;
mod solr_client;
mod validation_client;

pub use bds_client::ReqwestBulkDataServiceClient;
pub use object_store_adapter::AzureObjectStoreRepository;
pub use solr_client::SolrSearchIndexRepository;
pub use validation_client::ReqwestValidationServiceClient;
