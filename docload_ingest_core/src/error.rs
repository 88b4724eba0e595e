use bytesize::ByteSize;
use docload_source::SourceError;
use docload_store_core::{
    ErrorKind, FieldNameError, Namespace, StoreError, WriteConcernError, WriteFailure,
    WriteFailureKind,
    bson::{self, Bson},
};
use snafu::Snafu;

/// Ingestion error types.
///
/// Only the first fatal error of a run is reported to the caller.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    /// A session could not be opened.
    #[snafu(display("failed to connect to the store"))]
    Connect { source: StoreError },
    #[snafu(display("failed to detect the store topology"))]
    Topology { source: StoreError },
    /// The requested write concern is invalid or not supported by the topology.
    #[snafu(display("invalid write concern"))]
    WriteConcern { source: WriteConcernError },
    #[snafu(display("failed to drop collection {namespace}"))]
    DropCollection {
        namespace: Namespace,
        source: StoreError,
    },
    #[snafu(display("failed to serialize record {id}"))]
    Encode { id: Bson, source: bson::ser::Error },
    /// The record can never fit in a write call.
    #[snafu(display("record {id} is {size}, larger than the {limit} write limit"))]
    RecordTooLarge {
        id: Bson,
        size: ByteSize,
        limit: ByteSize,
    },
    /// The write call did not complete.
    #[snafu(display("{operation} on {namespace} failed"))]
    Store {
        operation: &'static str,
        namespace: Namespace,
        source: StoreError,
    },
    /// The store rejected some of the records of a write call.
    #[snafu(display(
        "{operation} rejected {} record(s), {acknowledged} acknowledged: {}",
        failures.len(),
        failures.first().map(ToString::to_string).unwrap_or_default()
    ))]
    WriteRejected {
        operation: &'static str,
        acknowledged: u64,
        failures: Vec<WriteFailure>,
    },
    #[snafu(display("failed to read records"))]
    Source { source: SourceError },
    #[snafu(display("invalid upsert fields"))]
    InvalidUpsertFields { source: FieldNameError },
    #[snafu(display("internal error: {message}"))]
    Internal { message: String },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

impl IngestError {
    /// Whether the store could not be reached. These errors are always fatal.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connect { .. } => true,
            Self::Topology { source }
            | Self::DropCollection { source, .. }
            | Self::Store { source, .. } => source.is_connection_error(),
            _ => false,
        }
    }

    /// Classification of the first write failure, for rejected writes.
    pub fn failure_kind(&self) -> Option<WriteFailureKind> {
        match self {
            Self::WriteRejected { failures, .. } => failures.first().map(|failure| failure.kind),
            _ => None,
        }
    }

    /// Number of records affected by a write error.
    pub fn failed_records(&self) -> u64 {
        match self {
            Self::WriteRejected { failures, .. } => failures.len() as u64,
            _ => 1,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. } => ErrorKind::Connection,
            Self::Topology { source }
            | Self::DropCollection { source, .. }
            | Self::Store { source, .. } => source.kind(),
            Self::WriteConcern { source } => source.kind(),
            Self::Encode { .. } | Self::RecordTooLarge { .. } => ErrorKind::Validation,
            Self::WriteRejected { .. } => match self.failure_kind() {
                Some(WriteFailureKind::DuplicateKey) => ErrorKind::Conflict,
                Some(WriteFailureKind::Validation) => ErrorKind::Validation,
                Some(WriteFailureKind::WriteConcernTimeout) => ErrorKind::Temporary,
                _ => ErrorKind::Internal,
            },
            Self::Source { source } => source.kind(),
            Self::InvalidUpsertFields { .. } => ErrorKind::Configuration,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}
