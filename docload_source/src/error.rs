use std::path::PathBuf;

use bytesize::ByteSize;
use docload_store_core::{ErrorKind, FieldNameError};
use snafu::Snafu;

/// Errors produced while decoding input records.
///
/// Record numbers start at 1 and count decoded records, not input lines.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    #[snafu(display("failed to open {}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to read input"))]
    Io { source: std::io::Error },
    #[snafu(display("record {record}: invalid JSON"))]
    Json {
        record: u64,
        source: serde_json::Error,
    },
    #[snafu(display("record {record}: invalid extended JSON: {message}"))]
    ExtendedJson { record: u64, message: String },
    #[snafu(display("record {record}: expected a JSON object, found {found}"))]
    NotADocument { record: u64, found: &'static str },
    #[snafu(display("input is not a JSON array"))]
    NotAnArray,
    #[snafu(display("JSON array input is larger than {limit}"))]
    ArrayTooLarge { limit: ByteSize },
    #[snafu(display("record {record}: malformed delimited input"))]
    Csv { record: u64, source: csv::Error },
    #[snafu(display("invalid field names"))]
    InvalidFields { source: FieldNameError },
    #[snafu(display("no field names: expected a header line or a field list"))]
    MissingFields,
    #[snafu(display("decoder stopped unexpectedly: {message}"))]
    Decoder { message: String },
}

pub type Result<T, E = SourceError> = std::result::Result<T, E>;

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            Self::Open { .. } | Self::Io { .. } | Self::Decoder { .. } => ErrorKind::Internal,
            Self::InvalidFields { .. } | Self::MissingFields => ErrorKind::Configuration,
            Self::Json { .. }
            | Self::ExtendedJson { .. }
            | Self::NotADocument { .. }
            | Self::NotAnArray
            | Self::ArrayTooLarge { .. }
            | Self::Csv { .. } => ErrorKind::Validation,
        }
    }

    /// The number of the record that failed to decode, when known.
    pub fn record(&self) -> Option<u64> {
        match self {
            Self::Json { record, .. }
            | Self::ExtendedJson { record, .. }
            | Self::NotADocument { record, .. }
            | Self::Csv { record, .. } => Some(*record),
            _ => None,
        }
    }
}
