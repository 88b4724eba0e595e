use std::sync::atomic::{AtomicU64, Ordering};

use docload_observability::KeyValue;
use docload_store_core::{Namespace, WriteOutcome};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    error::{IngestError, Result, WriteRejectedSnafu},
    metrics::IngestionMetrics,
};

/// State shared by every task of a run.
///
/// Tasks never touch each other's data; this is the only shared mutable state
/// besides the record queue and the cancellation token.
pub struct RunState {
    inserted: AtomicU64,
    first_error: Mutex<Option<IngestError>>,
    metrics: IngestionMetrics,
    attributes: Vec<KeyValue>,
}

impl RunState {
    pub fn new(namespace: &Namespace) -> Self {
        Self {
            inserted: AtomicU64::new(0),
            first_error: Mutex::new(None),
            metrics: IngestionMetrics::default(),
            attributes: vec![KeyValue::new("namespace", namespace.to_string())],
        }
    }

    /// Number of records acknowledged by the store so far.
    pub fn inserted(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }

    pub fn add_inserted(&self, count: u64) {
        self.inserted.fetch_add(count, Ordering::Relaxed);
        self.metrics.records.add(count, &self.attributes);
    }

    pub fn add_skipped(&self, count: u64) {
        self.metrics.skipped.add(count, &self.attributes);
    }

    /// Account for the outcome of one write call.
    ///
    /// Acknowledged records are counted even when others were rejected.
    pub fn record_write(&self, operation: &'static str, outcome: WriteOutcome) -> Result<()> {
        self.metrics.batches.add(1, &self.attributes);
        self.add_inserted(outcome.acknowledged);

        if outcome.is_success() {
            return Ok(());
        }

        WriteRejectedSnafu {
            operation,
            acknowledged: outcome.acknowledged,
            failures: outcome.failures,
        }
        .fail()
    }

    /// Keep `error` if no error was recorded yet. Returns whether it was kept.
    pub async fn try_set_first_error(&self, error: IngestError) -> bool {
        let mut first_error = self.first_error.lock().await;

        if first_error.is_some() {
            debug!(err = %error, "ignoring error after the first");
            return false;
        }

        *first_error = Some(error);
        true
    }

    pub async fn take_error(&self) -> Option<IngestError> {
        self.first_error.lock().await.take()
    }
}
