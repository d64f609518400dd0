// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `spec.md` §4.2's state store, backed by Postgres, plus the schema
//! version gate and migration bootstrap it depends on.

pub mod schema;

mod postgres_state_store;

pub use postgres_state_store::PostgresStateStoreRepository;
