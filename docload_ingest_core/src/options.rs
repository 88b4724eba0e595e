use docload_store_core::validate_field_names;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    bulk::BULK_DOC_LIMIT,
    error::{InvalidUpsertFieldsSnafu, Result},
};

pub const DEFAULT_BULK_BUFFER_SIZE: usize = 10_000;

/// Field used to match records when upserting without explicit fields.
pub const DEFAULT_UPSERT_FIELD: &str = "_id";

/// Options of an import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub num_insertion_workers: usize,
    /// Records per write call. Capped at [`BULK_DOC_LIMIT`].
    pub bulk_buffer_size: usize,
    /// Write records in input order. Forces a single insertion worker.
    pub maintain_insertion_order: bool,
    pub upsert: bool,
    /// Fields identifying the record to replace when upserting.
    pub upsert_fields: Vec<String>,
    /// Abort the run on the first rejected record.
    pub stop_on_error: bool,
    /// Write concern request, see [`docload_store_core::WriteConcernRequest`].
    pub write_concern: String,
    /// Keep writing the rest of a batch after a record is rejected.
    pub unordered: bool,
    /// Drop empty string fields before writing.
    pub ignore_blanks: bool,
    /// Drop the collection before importing.
    pub drop: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            num_insertion_workers: 1,
            bulk_buffer_size: DEFAULT_BULK_BUFFER_SIZE,
            maintain_insertion_order: false,
            upsert: false,
            upsert_fields: Vec::new(),
            stop_on_error: false,
            write_concern: "majority".to_string(),
            unordered: false,
            ignore_blanks: false,
            drop: false,
        }
    }
}

impl IngestOptions {
    /// Resolve option interactions.
    ///
    /// Upserts write one record at a time in input order, so they force
    /// `maintain_insertion_order`, which in turn forces a single worker.
    pub fn normalize(mut self) -> Result<Self> {
        if !self.upsert_fields.is_empty() {
            self.upsert = true;
        }

        if self.upsert {
            if self.upsert_fields.is_empty() {
                self.upsert_fields = vec![DEFAULT_UPSERT_FIELD.to_string()];
            }
            validate_field_names(&self.upsert_fields).context(InvalidUpsertFieldsSnafu)?;
            self.maintain_insertion_order = true;
        }

        if self.num_insertion_workers == 0 {
            self.num_insertion_workers = 1;
        }

        if self.maintain_insertion_order && self.num_insertion_workers > 1 {
            debug!(
                requested = self.num_insertion_workers,
                "maintaining insertion order: using a single insertion worker"
            );
            self.num_insertion_workers = 1;
        }

        if self.bulk_buffer_size == 0 {
            self.bulk_buffer_size = DEFAULT_BULK_BUFFER_SIZE;
        }
        self.bulk_buffer_size = self.bulk_buffer_size.min(BULK_DOC_LIMIT);

        Ok(self)
    }

    /// Whether write calls stop at the first rejected record.
    ///
    /// When errors are tolerated batches are always unordered, so one bad
    /// record does not take the rest of its batch down with it.
    pub fn ordered_writes(&self) -> bool {
        self.stop_on_error && !self.unordered
    }
}
