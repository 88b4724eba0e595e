use std::sync::Arc;

use async_trait::async_trait;
use docload_store_core::{Namespace, Record, Session, bson::Bson, get_path};
use snafu::ResultExt;

use crate::{
    error::{Result, StoreSnafu},
    inserter::RecordInserter,
    state::RunState,
};

/// Build the selector matching `record` on the upsert `fields`.
///
/// Fields may be dotted paths. Missing fields select `null`. Returns `None`
/// when there are no fields or none of them is present in the record, in
/// which case the record is inserted as is.
pub fn upsert_selector(fields: &[String], record: &Record) -> Option<Record> {
    let mut selector = Record::new();
    let mut found = false;

    for field in fields {
        let value = match get_path(record, field) {
            Some(value) => {
                found = true;
                value.clone()
            }
            None => Bson::Null,
        };
        selector.insert(field.clone(), value);
    }

    found.then_some(selector)
}

/// Writes each record immediately, replacing the record matching its selector.
pub struct Upserter {
    session: Box<dyn Session>,
    namespace: Namespace,
    fields: Vec<String>,
    state: Arc<RunState>,
}

impl Upserter {
    pub fn new(
        session: Box<dyn Session>,
        namespace: Namespace,
        fields: Vec<String>,
        state: Arc<RunState>,
    ) -> Self {
        Self {
            session,
            namespace,
            fields,
            state,
        }
    }
}

#[async_trait]
impl RecordInserter for Upserter {
    async fn accept(&mut self, record: Record) -> Result<()> {
        match upsert_selector(&self.fields, &record) {
            None => {
                let outcome = self
                    .session
                    .insert_one(&self.namespace, &record)
                    .await
                    .context(StoreSnafu {
                        operation: "insert_one",
                        namespace: self.namespace.clone(),
                    })?;
                self.state.record_write("insert_one", outcome)
            }
            Some(selector) => {
                let outcome = self
                    .session
                    .upsert(&self.namespace, selector, &record)
                    .await
                    .context(StoreSnafu {
                        operation: "upsert",
                        namespace: self.namespace.clone(),
                    })?;
                self.state.record_write("upsert", outcome)
            }
        }
    }

    /// Nothing is ever buffered.
    async fn drain(&mut self) -> Result<()> {
        Ok(())
    }
}
