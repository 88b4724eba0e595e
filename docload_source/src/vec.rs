use std::collections::VecDeque;

use async_trait::async_trait;
use docload_store_core::Record;

use crate::{
    RecordSource,
    error::{Result, SourceError},
};

/// Yields records held in memory.
#[derive(Debug, Default)]
pub struct VecSource {
    items: VecDeque<Result<Record>>,
}

impl VecSource {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            items: records.into_iter().map(Ok).collect(),
        }
    }

    /// Fail with `error` once the records queued so far have been read.
    pub fn then_fail(mut self, error: SourceError) -> Self {
        self.items.push_back(Err(error));
        self
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl RecordSource for VecSource {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        self.items.pop_front().transpose()
    }
}

#[cfg(test)]
mod tests {
    use docload_store_core::bson::doc;

    use super::*;

    #[tokio::test]
    async fn test_records_then_error() {
        let mut source = VecSource::new(vec![doc! { "a": 1 }]).then_fail(SourceError::NotAnArray);

        assert_eq!(source.next_record().await.unwrap(), Some(doc! { "a": 1 }));
        assert!(source.next_record().await.is_err());
        assert_eq!(source.next_record().await.unwrap(), None);
        assert_eq!(source.remaining(), 0);
    }
}
