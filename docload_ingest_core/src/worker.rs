use std::sync::Arc;

use docload_store_core::{
    Namespace, Record, Session, SessionProvider, WriteConcern,
    bson::{Bson, Document},
};
use snafu::ResultExt;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    bulk::BulkBuffer,
    error::{ConnectSnafu, Result},
    inserter::RecordInserter,
    options::IngestOptions,
    state::RunState,
    upsert::Upserter,
};

/// The record queue, shared by every worker of a run.
pub type SharedRecords = Arc<Mutex<mpsc::Receiver<Record>>>;

/// Pulls records off the shared queue and writes them on a private session.
pub struct InsertionWorker {
    id: usize,
    provider: Arc<dyn SessionProvider>,
    namespace: Namespace,
    options: Arc<IngestOptions>,
    write_concern: Arc<WriteConcern>,
    state: Arc<RunState>,
}

impl InsertionWorker {
    pub fn new(
        id: usize,
        provider: Arc<dyn SessionProvider>,
        namespace: Namespace,
        options: Arc<IngestOptions>,
        write_concern: Arc<WriteConcern>,
        state: Arc<RunState>,
    ) -> Self {
        Self {
            id,
            provider,
            namespace,
            options,
            write_concern,
            state,
        }
    }

    /// Run until the queue is closed and drained, or `ct` is cancelled.
    ///
    /// On cancellation the worker returns immediately and whatever it has
    /// buffered is not written.
    pub async fn run(self, records: SharedRecords, ct: CancellationToken) -> Result<()> {
        let mut session = self.provider.connect().await.context(ConnectSnafu)?;
        session.configure(&self.write_concern);

        let mut inserter = self.inserter(session);
        debug!(worker = self.id, "insertion worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = ct.cancelled() => {
                    debug!(worker = self.id, "insertion worker cancelled");
                    return Ok(());
                }
                next = next_record(&records) => next,
            };

            let Some(mut record) = next else {
                break;
            };

            if ct.is_cancelled() {
                return Ok(());
            }

            if self.options.ignore_blanks {
                remove_blank_fields(&mut record);
            }

            self.filter_ingest_error(inserter.accept(record).await)?;
        }

        if ct.is_cancelled() {
            return Ok(());
        }

        self.filter_ingest_error(inserter.drain().await)?;
        debug!(worker = self.id, "insertion worker done");

        Ok(())
    }

    fn inserter(&self, session: Box<dyn Session>) -> Box<dyn RecordInserter> {
        if self.options.upsert {
            Box::new(Upserter::new(
                session,
                self.namespace.clone(),
                self.options.upsert_fields.clone(),
                self.state.clone(),
            ))
        } else {
            Box::new(BulkBuffer::new(
                session,
                self.namespace.clone(),
                self.options.bulk_buffer_size,
                self.options.ordered_writes(),
                self.state.clone(),
            ))
        }
    }

    /// Apply the stop-on-error policy. Connection errors are always fatal.
    fn filter_ingest_error(&self, result: Result<()>) -> Result<()> {
        let Err(err) = result else {
            return Ok(());
        };

        if self.options.stop_on_error || err.is_connection_error() {
            return Err(err);
        }

        warn!(worker = self.id, err = %snafu::Report::from_error(&err), "skipping rejected records");
        self.state.add_skipped(err.failed_records());

        Ok(())
    }
}

async fn next_record(records: &Mutex<mpsc::Receiver<Record>>) -> Option<Record> {
    records.lock().await.recv().await
}

/// Remove empty string fields, and documents left empty by their removal.
pub fn remove_blank_fields(doc: &mut Document) {
    let mut blank = Vec::new();

    for (key, value) in doc.iter_mut() {
        match value {
            Bson::String(s) if s.is_empty() => blank.push(key.clone()),
            Bson::Document(child) => {
                remove_blank_fields(child);
                if child.is_empty() {
                    blank.push(key.clone());
                }
            }
            _ => {}
        }
    }

    for key in blank {
        doc.remove(&key);
    }
}
