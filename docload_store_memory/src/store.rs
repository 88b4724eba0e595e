use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use docload_store_core::{
    Namespace, Record, Result, Session, SessionProvider, StoreError, TopologyKind, WriteConcern,
    WriteFailure, WriteFailureKind, WriteOutcome,
    bson::{Bson, Document, oid::ObjectId},
    get_path,
};
use tokio::sync::RwLock;

use crate::session::InMemorySession;

/// Server error code returned when a replacement tries to change `_id`.
const IMMUTABLE_FIELD: i32 = 66;

/// Rejects a record with a message, like a collection validator would.
pub type Validator = Arc<dyn Fn(&Record) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    InsertMany,
    InsertOne,
    Upsert,
}

/// A write call received by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub kind: WriteKind,
    pub namespace: Namespace,
    /// Number of records sent in the call.
    pub records: usize,
    pub ordered: bool,
    /// Write concern of the session that issued the call.
    pub write_concern: Option<WriteConcern>,
}

#[derive(Clone, Default)]
pub(crate) struct Faults {
    pub refuse_connections: bool,
    pub lose_connection_after: Option<usize>,
    pub write_concern_timeout: bool,
    pub write_delay: Option<Duration>,
    pub validator: Option<Validator>,
}

#[derive(Debug, Default)]
struct CollectionData {
    records: Vec<Record>,
    /// Unique index on `_id`, keyed by the relaxed extended JSON of the id.
    ids: HashSet<String>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryStoreState {
    collections: HashMap<Namespace, CollectionData>,
    write_calls: Vec<WriteCall>,
    write_attempts: usize,
    sessions_opened: usize,
}

/// In-memory store that hands out [`InMemorySession`]s.
///
/// Clones share the same data.
#[derive(Clone)]
pub struct InMemoryStore {
    topology: TopologyKind,
    faults: Faults,
    state: Arc<RwLock<MemoryStoreState>>,
}

impl InMemoryStore {
    /// Create an empty standalone store.
    pub fn new() -> Self {
        Self {
            topology: TopologyKind::Standalone,
            faults: Faults::default(),
            state: Arc::new(RwLock::new(MemoryStoreState::default())),
        }
    }

    pub fn with_topology(mut self, topology: TopologyKind) -> Self {
        self.topology = topology;
        self
    }

    /// Refuse every connection attempt.
    pub fn with_refused_connections(mut self) -> Self {
        self.faults.refuse_connections = true;
        self
    }

    /// Fail every write call after the first `writes` with a connection error.
    pub fn with_connection_lost_after(mut self, writes: usize) -> Self {
        self.faults.lose_connection_after = Some(writes);
        self
    }

    /// Report a write concern timeout on every write issued by a session whose
    /// write concern carries a timeout. Records are still applied.
    pub fn with_write_concern_timeout(mut self) -> Self {
        self.faults.write_concern_timeout = true;
        self
    }

    /// Delay every write call.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.faults.write_delay = Some(delay);
        self
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&Record) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.faults.validator = Some(Arc::new(validator));
        self
    }

    /// Insert records directly, bypassing sessions and write accounting.
    pub async fn seed(&self, namespace: &Namespace, records: Vec<Record>) -> WriteOutcome {
        let mut state = self.state.write().await;
        let collection = state.collections.entry(namespace.clone()).or_default();
        let mut outcome = WriteOutcome::default();

        for (index, record) in records.into_iter().enumerate() {
            match collection.insert(namespace, record) {
                Ok(()) => outcome.acknowledged += 1,
                Err(failure) => outcome.failures.push(failure.at(index)),
            }
        }

        outcome
    }

    /// All records of a collection, in insertion order.
    pub async fn records(&self, namespace: &Namespace) -> Vec<Record> {
        let state = self.state.read().await;
        state
            .collections
            .get(namespace)
            .map(|collection| collection.records.clone())
            .unwrap_or_default()
    }

    pub async fn count(&self, namespace: &Namespace) -> usize {
        let state = self.state.read().await;
        state
            .collections
            .get(namespace)
            .map_or(0, |collection| collection.records.len())
    }

    pub async fn write_calls(&self) -> Vec<WriteCall> {
        self.state.read().await.write_calls.clone()
    }

    /// Sizes of the `insert_many` calls received, in order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        let state = self.state.read().await;
        state
            .write_calls
            .iter()
            .filter(|call| call.kind == WriteKind::InsertMany)
            .map(|call| call.records)
            .collect()
    }

    pub async fn sessions_opened(&self) -> usize {
        self.state.read().await.sessions_opened
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for InMemoryStore {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        if self.faults.refuse_connections {
            return Err(StoreError::Connection {
                message: "connection refused".to_string(),
            });
        }

        self.state.write().await.sessions_opened += 1;

        Ok(Box::new(InMemorySession::new(
            self.state.clone(),
            self.faults.clone(),
        )))
    }

    async fn topology(&self) -> Result<TopologyKind> {
        if self.faults.refuse_connections {
            return Err(StoreError::Connection {
                message: "connection refused".to_string(),
            });
        }

        Ok(self.topology)
    }
}

impl MemoryStoreState {
    /// Account for a write call, failing it if the connection is configured to drop.
    pub(crate) fn begin_write(&mut self, call: WriteCall, faults: &Faults) -> Result<()> {
        self.write_attempts += 1;

        if let Some(limit) = faults.lose_connection_after {
            if self.write_attempts > limit {
                return Err(StoreError::Connection {
                    message: "connection reset by peer".to_string(),
                });
            }
        }

        self.write_calls.push(call);
        Ok(())
    }

    pub(crate) fn insert_many(
        &mut self,
        namespace: &Namespace,
        records: &[Record],
        ordered: bool,
        faults: &Faults,
    ) -> WriteOutcome {
        let collection = self.collections.entry(namespace.clone()).or_default();
        let mut outcome = WriteOutcome::default();

        for (index, record) in records.iter().enumerate() {
            let result = validate(record, faults)
                .and_then(|()| collection.insert(namespace, record.clone()));

            match result {
                Ok(()) => outcome.acknowledged += 1,
                Err(failure) => {
                    outcome.failures.push(failure.at(index));
                    if ordered {
                        break;
                    }
                }
            }
        }

        outcome
    }

    pub(crate) fn upsert(
        &mut self,
        namespace: &Namespace,
        selector: &Record,
        record: &Record,
        faults: &Faults,
    ) -> WriteOutcome {
        let collection = self.collections.entry(namespace.clone()).or_default();

        let result = validate(record, faults).and_then(|()| {
            match collection
                .records
                .iter()
                .position(|existing| matches_selector(existing, selector))
            {
                Some(position) => collection.replace(position, record.clone()),
                None => {
                    let mut inserted = record.clone();
                    if let (false, Some(id)) = (inserted.contains_key("_id"), selector.get("_id")) {
                        inserted = with_id(id.clone(), inserted);
                    }
                    collection.insert(namespace, inserted)
                }
            }
        });

        match result {
            Ok(()) => WriteOutcome::success(1),
            Err(failure) => WriteOutcome {
                acknowledged: 0,
                failures: vec![failure.at(0)],
            },
        }
    }

    pub(crate) fn drop_collection(&mut self, namespace: &Namespace) -> Result<()> {
        match self.collections.remove(namespace) {
            Some(_) => Ok(()),
            None => Err(StoreError::NamespaceNotFound {
                namespace: namespace.clone(),
            }),
        }
    }
}

impl CollectionData {
    fn insert(&mut self, namespace: &Namespace, record: Record) -> Result<(), WriteFailure> {
        let record = if record.contains_key("_id") {
            record
        } else {
            with_id(Bson::ObjectId(ObjectId::new()), record)
        };

        let id = record.get("_id").cloned().unwrap_or(Bson::Null);
        let key = id.clone().into_relaxed_extjson().to_string();

        if !self.ids.insert(key) {
            return Err(WriteFailure::new(
                None,
                WriteFailureKind::DuplicateKey.code().unwrap_or_default(),
                format!(
                    "E11000 duplicate key error collection: {namespace} index: _id_ dup key: {{ _id: {id} }}"
                ),
            ));
        }

        self.records.push(record);
        Ok(())
    }

    fn replace(&mut self, position: usize, replacement: Record) -> Result<(), WriteFailure> {
        let existing_id = self.records[position].get("_id").cloned();
        let new_id = replacement.get("_id").cloned();

        let replacement = match (new_id, existing_id) {
            (Some(new_id), Some(existing_id)) if new_id != existing_id => {
                return Err(WriteFailure::new(
                    None,
                    IMMUTABLE_FIELD,
                    "the (immutable) field '_id' was found to have been altered",
                ));
            }
            (None, Some(existing_id)) => with_id(existing_id, replacement),
            _ => replacement,
        };

        self.records[position] = replacement;
        Ok(())
    }
}

trait FailureAt {
    fn at(self, index: usize) -> WriteFailure;
}

impl FailureAt for WriteFailure {
    fn at(mut self, index: usize) -> WriteFailure {
        self.index = Some(index);
        self
    }
}

fn validate(record: &Record, faults: &Faults) -> Result<(), WriteFailure> {
    let Some(validator) = &faults.validator else {
        return Ok(());
    };

    match validator(record) {
        Some(message) => Err(WriteFailure::new(
            None,
            WriteFailureKind::Validation.code().unwrap_or_default(),
            format!("Document failed validation: {message}"),
        )),
        None => Ok(()),
    }
}

fn matches_selector(record: &Record, selector: &Record) -> bool {
    selector
        .iter()
        .all(|(path, expected)| match get_path(record, path) {
            Some(value) => value == expected,
            None => *expected == Bson::Null,
        })
}

/// Returns the record with `_id` as its first field.
fn with_id(id: Bson, record: Record) -> Record {
    let mut doc = Document::new();
    doc.insert("_id", id);
    for (key, value) in record {
        if key != "_id" {
            doc.insert(key, value);
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use docload_store_core::bson::doc;

    use super::*;

    fn namespace() -> Namespace {
        Namespace::new("test", "memory").unwrap()
    }

    #[tokio::test]
    async fn test_seed_and_duplicate_ids() {
        let store = InMemoryStore::new();
        let ns = namespace();

        let outcome = store
            .seed(&ns, vec![doc! { "_id": 1 }, doc! { "_id": 2 }, doc! { "_id": 1 }])
            .await;

        assert_eq!(outcome.acknowledged, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, Some(2));
        assert_eq!(outcome.failures[0].kind, WriteFailureKind::DuplicateKey);
        assert_eq!(store.count(&ns).await, 2);
    }

    #[tokio::test]
    async fn test_generated_ids_are_first() {
        let store = InMemoryStore::new();
        let ns = namespace();

        store.seed(&ns, vec![doc! { "name": "a" }]).await;

        let records = store.records(&ns).await;
        let first_key = records[0].keys().next().map(String::as_str);
        assert_eq!(first_key, Some("_id"));
        assert!(matches!(records[0].get("_id"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn test_ordered_insert_stops_at_first_failure() {
        let ns = namespace();
        let mut state = MemoryStoreState::default();
        let records = vec![doc! { "_id": 1 }, doc! { "_id": 1 }, doc! { "_id": 2 }];

        let outcome = state.insert_many(&ns, &records, true, &Faults::default());
        assert_eq!(outcome.acknowledged, 1);
        assert_eq!(outcome.failures.len(), 1);

        let mut state = MemoryStoreState::default();
        let outcome = state.insert_many(&ns, &records, false, &Faults::default());
        assert_eq!(outcome.acknowledged, 2);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[test]
    fn test_upsert_replaces_matching_record() {
        let ns = namespace();
        let mut state = MemoryStoreState::default();
        let faults = Faults::default();

        let outcome = state.upsert(&ns, &doc! { "a": 1 }, &doc! { "a": 1, "b": 1 }, &faults);
        assert!(outcome.is_success());

        let outcome = state.upsert(&ns, &doc! { "a": 1 }, &doc! { "a": 1, "b": 2 }, &faults);
        assert!(outcome.is_success());

        let records = &state.collections[&ns].records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_i32("b").unwrap(), 2);
    }

    #[test]
    fn test_upsert_takes_id_from_selector() {
        let ns = namespace();
        let mut state = MemoryStoreState::default();

        state.upsert(&ns, &doc! { "_id": 7 }, &doc! { "x": 1 }, &Faults::default());

        let records = &state.collections[&ns].records;
        assert_eq!(records[0], doc! { "_id": 7, "x": 1 });
    }

    #[test]
    fn test_validator_rejects_records() {
        let ns = namespace();
        let mut state = MemoryStoreState::default();
        let faults = Faults {
            validator: Some(Arc::new(|record: &Record| {
                (!record.contains_key("name")).then(|| "name is required".to_string())
            })),
            ..Faults::default()
        };

        let records = vec![doc! { "name": "a" }, doc! { "other": 1 }];
        let outcome = state.insert_many(&ns, &records, false, &faults);

        assert_eq!(outcome.acknowledged, 1);
        assert_eq!(outcome.failures[0].kind, WriteFailureKind::Validation);
        assert_eq!(outcome.failures[0].index, Some(1));
    }

    #[tokio::test]
    async fn test_refused_connections() {
        let store = InMemoryStore::new().with_refused_connections();
        let err = store.connect().await.err().expect("connect should fail");
        assert!(err.is_connection_error());
    }
}
