use async_trait::async_trait;
use docload_store_core::Record;

use crate::error::Result;

/// Turns accepted records into write calls on a worker's private session.
///
/// Each worker picks one implementation at startup: [`crate::BulkBuffer`] for
/// plain inserts, [`crate::Upserter`] when upserting.
#[async_trait]
pub trait RecordInserter: Send {
    /// Take ownership of a record. It may be written now or buffered.
    ///
    /// An error may come from an earlier buffered batch.
    async fn accept(&mut self, record: Record) -> Result<()>;

    /// Write out anything still buffered.
    async fn drain(&mut self) -> Result<()>;
}
