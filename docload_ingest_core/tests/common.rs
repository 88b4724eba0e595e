#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use docload_ingest_core::{Importer, IngestOptions};
use docload_source::{RecordSource, Result as SourceResult};
use docload_store_core::{Namespace, Record, bson::doc};
use docload_store_memory::InMemoryStore;

pub fn test_namespace() -> Namespace {
    Namespace::new("test", "pipeline").expect("valid namespace")
}

pub fn create_importer(store: &InMemoryStore, options: IngestOptions) -> Importer {
    Importer::new(Arc::new(store.clone()), test_namespace(), options).expect("valid options")
}

/// Records with `_id` 0, 1, 2, ...
pub fn numbered_records(count: usize) -> Vec<Record> {
    (0..count as i32)
        .map(|id| doc! { "_id": id, "value": format!("value-{id}") })
        .collect()
}

/// A source that never runs out of records.
#[derive(Default)]
pub struct EndlessSource {
    next_id: i64,
}

#[async_trait]
impl RecordSource for EndlessSource {
    async fn next_record(&mut self) -> SourceResult<Option<Record>> {
        let id = self.next_id;
        self.next_id += 1;
        Ok(Some(doc! { "_id": id }))
    }
}
