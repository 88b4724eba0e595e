//! Concurrent ingestion pipeline.
//!
//! An [`Importer`] reads records from a [`docload_source::RecordSource`] and
//! writes them through one or more [`InsertionWorker`]s, each owning a private
//! store session and either a [`BulkBuffer`] or an [`Upserter`].

pub mod bulk;
pub mod error;
pub mod inserter;
pub mod metrics;
pub mod options;
pub mod pipeline;
pub mod state;
pub mod upsert;
pub mod worker;

#[cfg(test)]
pub mod test_utils;

pub use bulk::{BULK_DOC_LIMIT, BulkBuffer, MAX_BULK_BYTES};
pub use error::{IngestError, Result};
pub use inserter::RecordInserter;
pub use options::{DEFAULT_BULK_BUFFER_SIZE, IngestOptions};
pub use pipeline::{ImportResult, Importer, RECORD_QUEUE_CAPACITY};
pub use state::RunState;
pub use upsert::{Upserter, upsert_selector};
pub use worker::{InsertionWorker, remove_blank_fields};
