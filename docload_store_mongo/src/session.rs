use async_trait::async_trait;
use docload_store_core::{
    Namespace, Record, Result, Session, StoreError, WriteConcern, WriteOutcome,
};
use mongodb::{
    Client, Collection,
    options::{
        InsertManyOptions, InsertOneOptions, ReplaceOptions, WriteConcern as DriverWriteConcern,
    },
};

use crate::convert::{
    from_driver, is_namespace_not_found, outcome_from_error, to_driver_write_concern,
};

/// A private MongoDB client.
pub struct MongoSession {
    client: Client,
    write_concern: Option<DriverWriteConcern>,
}

impl MongoSession {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            write_concern: None,
        }
    }

    fn collection(&self, namespace: &Namespace) -> Collection<Record> {
        self.client
            .database(namespace.database())
            .collection(namespace.collection())
    }
}

#[async_trait]
impl Session for MongoSession {
    fn configure(&mut self, write_concern: &WriteConcern) {
        self.write_concern = Some(to_driver_write_concern(write_concern));
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        records: &[Record],
        ordered: bool,
    ) -> Result<WriteOutcome> {
        let options = InsertManyOptions::builder()
            .ordered(ordered)
            .write_concern(self.write_concern.clone())
            .build();

        match self.collection(namespace).insert_many(records, options).await {
            Ok(result) => Ok(WriteOutcome::success(result.inserted_ids.len() as u64)),
            Err(err) => outcome_from_error(err, records.len(), ordered),
        }
    }

    async fn insert_one(&self, namespace: &Namespace, record: &Record) -> Result<WriteOutcome> {
        let options = InsertOneOptions::builder()
            .write_concern(self.write_concern.clone())
            .build();

        match self.collection(namespace).insert_one(record, options).await {
            Ok(_) => Ok(WriteOutcome::success(1)),
            Err(err) => outcome_from_error(err, 1, true),
        }
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        selector: Record,
        record: &Record,
    ) -> Result<WriteOutcome> {
        let options = ReplaceOptions::builder()
            .upsert(true)
            .write_concern(self.write_concern.clone())
            .build();

        match self
            .collection(namespace)
            .replace_one(selector, record, options)
            .await
        {
            Ok(_) => Ok(WriteOutcome::success(1)),
            Err(err) => outcome_from_error(err, 1, true),
        }
    }

    async fn drop_collection(&self, namespace: &Namespace) -> Result<()> {
        self.collection(namespace)
            .drop(None)
            .await
            .map_err(|err| {
                if is_namespace_not_found(&err) {
                    StoreError::NamespaceNotFound {
                        namespace: namespace.clone(),
                    }
                } else {
                    from_driver(err)
                }
            })
    }
}
