//! Record sources feeding the import pipeline.
//!
//! Decoding is synchronous and runs on a blocking thread; records are handed
//! to the async side through a small bounded channel.

use async_trait::async_trait;
use docload_store_core::Record;

mod decoder;
pub mod delimited;
pub mod error;
pub mod json;
pub mod vec;

pub use self::{
    delimited::{CsvOptions, CsvSource, Delimiter, parse_field_list, read_field_file},
    error::{Result, SourceError},
    json::{JsonOptions, JsonSource, MAX_JSON_ARRAY_BYTES},
    vec::VecSource,
};

/// A finite sequence of decoded records.
#[async_trait]
pub trait RecordSource: Send {
    /// Returns the next record, or `None` once the input is exhausted.
    ///
    /// After an error the source is exhausted.
    async fn next_record(&mut self) -> Result<Option<Record>>;
}

#[async_trait]
impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        (**self).next_record().await
    }
}
