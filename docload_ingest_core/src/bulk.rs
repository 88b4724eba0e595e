//! Buffered bulk inserts.
//!
//! Records are accumulated until the next one would push the buffer past its
//! record or byte bounds, then written in a single `insert_many` call.

use std::{mem, sync::Arc};

use async_trait::async_trait;
use bytesize::ByteSize;
use docload_store_core::{Namespace, Record, Session, bson::Bson};
use snafu::{ResultExt, ensure};
use tracing::trace;

use crate::{
    error::{EncodeSnafu, RecordTooLargeSnafu, Result, StoreSnafu},
    inserter::RecordInserter,
    state::RunState,
};

/// Largest write call, in serialized bytes, accepted by the store.
pub const MAX_BULK_BYTES: usize = 16_790_000;

/// Largest number of records in a single write call.
pub const BULK_DOC_LIMIT: usize = 1000;

/// Batches records into `insert_many` calls on a private session.
pub struct BulkBuffer {
    session: Box<dyn Session>,
    namespace: Namespace,
    ordered: bool,
    doc_limit: usize,
    max_bytes: usize,
    records: Vec<Record>,
    byte_count: usize,
    state: Arc<RunState>,
    scratch: Vec<u8>,
}

impl BulkBuffer {
    /// Create a buffer flushing every `doc_limit` records.
    ///
    /// `doc_limit` is clamped to `1..=BULK_DOC_LIMIT`.
    pub fn new(
        session: Box<dyn Session>,
        namespace: Namespace,
        doc_limit: usize,
        ordered: bool,
        state: Arc<RunState>,
    ) -> Self {
        Self {
            session,
            namespace,
            ordered,
            doc_limit: doc_limit.clamp(1, BULK_DOC_LIMIT),
            max_bytes: MAX_BULK_BYTES,
            records: Vec::new(),
            byte_count: 0,
            state,
            scratch: Vec::new(),
        }
    }

    /// Lower the byte bound of a write call.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes.min(MAX_BULK_BYTES);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialized size of the buffered records.
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    /// Buffer a record, flushing the current batch first if it is full.
    ///
    /// The record is buffered even when that flush fails; the returned error
    /// belongs to the previous batch.
    pub async fn accept(&mut self, record: Record) -> Result<()> {
        let size = self.measure(&record)?;

        ensure!(
            size <= self.max_bytes,
            RecordTooLargeSnafu {
                id: record_id(&record),
                size: ByteSize::b(size as u64),
                limit: ByteSize::b(self.max_bytes as u64),
            }
        );

        let mut flushed = Ok(());
        if self.records.len() >= self.doc_limit || self.byte_count + size > self.max_bytes {
            flushed = self.flush().await;
        }

        self.records.push(record);
        self.byte_count += size;

        flushed
    }

    /// Write out whatever is buffered. Does nothing when the buffer is empty.
    pub async fn drain(&mut self) -> Result<()> {
        self.flush().await
    }

    fn measure(&mut self, record: &Record) -> Result<usize> {
        self.scratch.clear();
        record
            .to_writer(&mut self.scratch)
            .context(EncodeSnafu {
                id: record_id(record),
            })?;
        Ok(self.scratch.len())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }

        // the buffer is reset whatever the outcome
        let records = mem::take(&mut self.records);
        let bytes = mem::take(&mut self.byte_count);

        trace!(
            namespace = %self.namespace,
            records = records.len(),
            bytes,
            ordered = self.ordered,
            "flushing batch"
        );

        let outcome = self
            .session
            .insert_many(&self.namespace, &records, self.ordered)
            .await
            .context(StoreSnafu {
                operation: "insert_many",
                namespace: self.namespace.clone(),
            })?;

        self.state.record_write("insert_many", outcome)
    }
}

#[async_trait]
impl RecordInserter for BulkBuffer {
    async fn accept(&mut self, record: Record) -> Result<()> {
        BulkBuffer::accept(self, record).await
    }

    async fn drain(&mut self) -> Result<()> {
        BulkBuffer::drain(self).await
    }
}

fn record_id(record: &Record) -> Bson {
    record.get("_id").cloned().unwrap_or(Bson::Null)
}
