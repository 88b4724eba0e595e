use async_trait::async_trait;

use crate::{Namespace, Record, Result, TopologyKind, WriteConcern, WriteOutcome};

/// Factory for store sessions.
///
/// Each insertion worker opens its own session, sessions are never shared.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Open a new session. Fails with a connection error if the store cannot be reached.
    async fn connect(&self) -> Result<Box<dyn Session>>;

    /// Detect the kind of deployment the provider is connected to.
    async fn topology(&self) -> Result<TopologyKind>;
}

/// A private connection to the store.
#[async_trait]
pub trait Session: Send + Sync {
    /// Apply the resolved write concern to every subsequent write on this session.
    fn configure(&mut self, write_concern: &WriteConcern);

    /// Insert a batch of records in a single write call.
    ///
    /// When `ordered` is set the store stops at the first failing record;
    /// otherwise it attempts every record and reports each failure.
    async fn insert_many(
        &self,
        namespace: &Namespace,
        records: &[Record],
        ordered: bool,
    ) -> Result<WriteOutcome>;

    /// Insert a single record.
    async fn insert_one(&self, namespace: &Namespace, record: &Record) -> Result<WriteOutcome>;

    /// Replace the record matching `selector`, or insert it if nothing matches.
    async fn upsert(
        &self,
        namespace: &Namespace,
        selector: Record,
        record: &Record,
    ) -> Result<WriteOutcome>;

    /// Drop a collection. Fails with `NamespaceNotFound` if it does not exist.
    async fn drop_collection(&self, namespace: &Namespace) -> Result<()>;
}
