use std::mem;

use docload_store_core::Record;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::{DecoderSnafu, Result};

/// Capacity of the channel between the decoding thread and the async reader.
const DECODED_CAPACITY: usize = 16;

type DecodeFn = Box<dyn FnOnce(&DecoderSink) -> Result<()> + Send>;

/// Runs a synchronous decoder on a blocking thread and yields its records.
///
/// The thread is started on the first call to [`BlockingDecoder::next`].
/// Dropping the decoder closes the channel, and the decoding thread stops at
/// its next emitted record.
pub(crate) struct BlockingDecoder {
    state: DecoderState,
}

enum DecoderState {
    Pending(DecodeFn),
    Running {
        rx: mpsc::Receiver<Result<Record>>,
        task: JoinHandle<()>,
    },
    Finished,
}

/// Handle used by the decoding thread to hand records over.
pub(crate) struct DecoderSink {
    tx: mpsc::Sender<Result<Record>>,
}

impl DecoderSink {
    /// Send a record, blocking while the channel is full.
    ///
    /// Returns `false` once the reader is gone; the decoder should stop.
    pub fn emit(&self, record: Record) -> bool {
        self.tx.blocking_send(Ok(record)).is_ok()
    }
}

impl BlockingDecoder {
    pub fn new(decode: impl FnOnce(&DecoderSink) -> Result<()> + Send + 'static) -> Self {
        Self {
            state: DecoderState::Pending(Box::new(decode)),
        }
    }

    pub async fn next(&mut self) -> Result<Option<Record>> {
        if let DecoderState::Pending(_) = self.state {
            self.start();
        }

        let received = match &mut self.state {
            DecoderState::Running { rx, .. } => rx.recv().await,
            _ => return Ok(None),
        };

        match received {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(err)) => {
                self.state = DecoderState::Finished;
                Err(err)
            }
            None => self.join().await,
        }
    }

    fn start(&mut self) {
        let DecoderState::Pending(decode) = mem::replace(&mut self.state, DecoderState::Finished)
        else {
            return;
        };

        let (tx, rx) = mpsc::channel(DECODED_CAPACITY);
        let task = tokio::task::spawn_blocking(move || {
            let sink = DecoderSink { tx };
            if let Err(err) = decode(&sink) {
                let _ = sink.tx.blocking_send(Err(err));
            }
        });

        self.state = DecoderState::Running { rx, task };
    }

    async fn join(&mut self) -> Result<Option<Record>> {
        if let DecoderState::Running { task, .. } =
            mem::replace(&mut self.state, DecoderState::Finished)
        {
            if let Err(err) = task.await {
                return DecoderSnafu {
                    message: err.to_string(),
                }
                .fail();
            }
        }

        Ok(None)
    }
}
