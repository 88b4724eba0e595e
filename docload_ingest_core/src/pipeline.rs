//! Wires a record source to a pool of insertion workers.
//!
//! The source runs as the producer task and feeds a small bounded queue; the
//! worker pool runs as the consumer task. The run ends once both tasks have
//! reported. A failing worker cancels the run, which stops the producer and
//! every other worker. A failing source only closes the queue, so workers
//! still write what they already hold.

use std::sync::Arc;

use docload_source::RecordSource;
use docload_store_core::{Namespace, Record, SessionProvider, WriteConcern, WriteConcernRequest};
use snafu::ResultExt;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::{
        ConnectSnafu, DropCollectionSnafu, IngestError, InternalSnafu, Result, SourceSnafu,
        TopologySnafu, WriteConcernSnafu,
    },
    options::IngestOptions,
    state::RunState,
    worker::InsertionWorker,
};

/// Capacity of the queue between the record source and the workers.
pub const RECORD_QUEUE_CAPACITY: usize = 16;

/// Number of tasks reporting completion: the producer and the worker pool.
const PIPELINE_PARTIES: usize = 2;

/// Outcome of an import run.
///
/// `inserted` is reported even when the run failed; records written before
/// the failure are not rolled back.
#[derive(Debug)]
pub struct ImportResult {
    pub inserted: u64,
    pub error: Option<IngestError>,
}

impl ImportResult {
    pub fn into_result(self) -> Result<u64> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.inserted),
        }
    }
}

/// Imports records into one collection.
pub struct Importer {
    provider: Arc<dyn SessionProvider>,
    namespace: Namespace,
    options: IngestOptions,
}

impl Importer {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        namespace: Namespace,
        options: IngestOptions,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            namespace,
            options: options.normalize()?,
        })
    }

    /// The options in effect, after normalization.
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Import every record of `source`.
    pub async fn run<S>(&self, source: S, ct: CancellationToken) -> ImportResult
    where
        S: RecordSource + 'static,
    {
        let state = Arc::new(RunState::new(&self.namespace));
        let error = self.run_pipeline(source, &state, ct).await.err();
        let inserted = state.inserted();

        match &error {
            None => info!(namespace = %self.namespace, inserted, "import finished"),
            Some(err) => info!(namespace = %self.namespace, inserted, err = %err, "import failed"),
        }

        ImportResult { inserted, error }
    }

    async fn run_pipeline<S>(
        &self,
        source: S,
        state: &Arc<RunState>,
        ct: CancellationToken,
    ) -> Result<()>
    where
        S: RecordSource + 'static,
    {
        let write_concern = Arc::new(self.resolve_write_concern().await?);

        if self.options.drop {
            self.drop_collection().await?;
        }

        info!(
            namespace = %self.namespace,
            workers = self.options.num_insertion_workers,
            batch_size = self.options.bulk_buffer_size,
            write_concern = %write_concern,
            "starting import"
        );

        let ct = ct.child_token();
        let _ct_guard = ct.clone().drop_guard();

        let (record_tx, record_rx) = mpsc::channel(RECORD_QUEUE_CAPACITY);
        let (done_tx, mut done_rx) = mpsc::channel(PIPELINE_PARTIES);

        tokio::spawn({
            let done_tx = done_tx.clone();
            let ct = ct.clone();
            async move {
                let _ = done_tx.send(produce(source, record_tx, ct).await).await;
            }
        });

        let options = Arc::new(self.options.clone());
        let workers = (0..options.num_insertion_workers)
            .map(|id| {
                InsertionWorker::new(
                    id,
                    self.provider.clone(),
                    self.namespace.clone(),
                    options.clone(),
                    write_concern.clone(),
                    state.clone(),
                )
            })
            .collect::<Vec<_>>();

        tokio::spawn({
            let ct = ct.clone();
            async move {
                let _ = done_tx.send(consume(workers, record_rx, ct).await).await;
            }
        });

        for _ in 0..PIPELINE_PARTIES {
            let Some(result) = done_rx.recv().await else {
                state
                    .try_set_first_error(IngestError::Internal {
                        message: "pipeline task exited without reporting".to_string(),
                    })
                    .await;
                break;
            };

            if let Err(err) = result {
                state.try_set_first_error(err).await;
            }
        }

        match state.take_error().await {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn resolve_write_concern(&self) -> Result<WriteConcern> {
        let request: WriteConcernRequest = self
            .options
            .write_concern
            .parse()
            .context(WriteConcernSnafu)?;

        let topology = self.provider.topology().await.context(TopologySnafu)?;
        let write_concern = WriteConcern::resolve(&request, topology).context(WriteConcernSnafu)?;

        debug!(%topology, %write_concern, "resolved write concern");

        Ok(write_concern)
    }

    async fn drop_collection(&self) -> Result<()> {
        let session = self.provider.connect().await.context(ConnectSnafu)?;

        match session.drop_collection(&self.namespace).await {
            Ok(()) => {
                info!(namespace = %self.namespace, "dropped collection");
                Ok(())
            }
            Err(err) if err.is_namespace_not_found() => {
                debug!(namespace = %self.namespace, "collection to drop does not exist");
                Ok(())
            }
            Err(err) => Err(err).context(DropCollectionSnafu {
                namespace: self.namespace.clone(),
            }),
        }
    }
}

/// Move records from the source into the queue until the source is exhausted.
///
/// Dropping the sender on return closes the queue.
async fn produce<S>(
    mut source: S,
    records: mpsc::Sender<Record>,
    ct: CancellationToken,
) -> Result<()>
where
    S: RecordSource,
{
    let mut produced: u64 = 0;

    loop {
        let next = tokio::select! {
            _ = ct.cancelled() => return Ok(()),
            next = source.next_record() => next.context(SourceSnafu)?,
        };

        let Some(record) = next else {
            break;
        };

        tokio::select! {
            _ = ct.cancelled() => return Ok(()),
            sent = records.send(record) => {
                if sent.is_err() {
                    debug!(produced, "all insertion workers exited");
                    return Ok(());
                }
            }
        }

        produced += 1;
    }

    debug!(produced, "record source exhausted");

    Ok(())
}

/// Run the workers to completion, cancelling the run on the first failure.
async fn consume(
    workers: Vec<InsertionWorker>,
    records: mpsc::Receiver<Record>,
    ct: CancellationToken,
) -> Result<()> {
    let records = Arc::new(Mutex::new(records));
    let mut tasks = JoinSet::new();

    for worker in workers {
        tasks.spawn(worker.run(records.clone(), ct.clone()));
    }

    let mut first_error = None;

    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap_or_else(|err| {
            InternalSnafu {
                message: format!("insertion worker failed: {err}"),
            }
            .fail()
        });

        let Err(err) = result else {
            continue;
        };

        ct.cancel();

        if first_error.is_none() {
            first_error = Some(err);
        } else {
            debug!(err = %err, "ignoring worker error after the first");
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
