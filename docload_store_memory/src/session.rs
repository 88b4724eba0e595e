use std::sync::Arc;

use async_trait::async_trait;
use docload_store_core::{
    Namespace, Record, Result, Session, WriteConcern, WriteFailure, WriteFailureKind,
    WriteOutcome,
};
use tokio::sync::RwLock;
use tracing::trace;

use crate::store::{Faults, MemoryStoreState, WriteCall, WriteKind};

/// Session handed out by [`crate::InMemoryStore`].
pub struct InMemorySession {
    state: Arc<RwLock<MemoryStoreState>>,
    faults: Faults,
    write_concern: Option<WriteConcern>,
}

impl InMemorySession {
    pub(crate) fn new(state: Arc<RwLock<MemoryStoreState>>, faults: Faults) -> Self {
        Self {
            state,
            faults,
            write_concern: None,
        }
    }

    fn call(&self, kind: WriteKind, namespace: &Namespace, records: usize, ordered: bool) -> WriteCall {
        WriteCall {
            kind,
            namespace: namespace.clone(),
            records,
            ordered,
            write_concern: self.write_concern.clone(),
        }
    }

    async fn delay(&self) {
        if let Some(delay) = self.faults.write_delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Append the write concern timeout failure when the store is configured to report it.
    fn finish(&self, mut outcome: WriteOutcome) -> WriteOutcome {
        let wants_timeout = self
            .write_concern
            .as_ref()
            .and_then(WriteConcern::timeout)
            .is_some();

        if self.faults.write_concern_timeout && wants_timeout {
            outcome.failures.push(WriteFailure::new(
                None,
                WriteFailureKind::WriteConcernTimeout.code().unwrap_or_default(),
                "waiting for replication timed out",
            ));
        }

        outcome
    }
}

#[async_trait]
impl Session for InMemorySession {
    fn configure(&mut self, write_concern: &WriteConcern) {
        self.write_concern = Some(write_concern.clone());
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        records: &[Record],
        ordered: bool,
    ) -> Result<WriteOutcome> {
        self.delay().await;

        let mut state = self.state.write().await;
        state.begin_write(
            self.call(WriteKind::InsertMany, namespace, records.len(), ordered),
            &self.faults,
        )?;

        let outcome = state.insert_many(namespace, records, ordered, &self.faults);
        trace!(
            %namespace,
            records = records.len(),
            acknowledged = outcome.acknowledged,
            "insert_many"
        );

        Ok(self.finish(outcome))
    }

    async fn insert_one(&self, namespace: &Namespace, record: &Record) -> Result<WriteOutcome> {
        self.delay().await;

        let mut state = self.state.write().await;
        state.begin_write(self.call(WriteKind::InsertOne, namespace, 1, true), &self.faults)?;

        let outcome = state.insert_many(namespace, std::slice::from_ref(record), true, &self.faults);

        Ok(self.finish(outcome))
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        selector: Record,
        record: &Record,
    ) -> Result<WriteOutcome> {
        self.delay().await;

        let mut state = self.state.write().await;
        state.begin_write(self.call(WriteKind::Upsert, namespace, 1, true), &self.faults)?;

        let outcome = state.upsert(namespace, &selector, record, &self.faults);

        Ok(self.finish(outcome))
    }

    async fn drop_collection(&self, namespace: &Namespace) -> Result<()> {
        self.state.write().await.drop_collection(namespace)
    }
}
