use docload_ingest_core::IngestError;
use docload_source::SourceError;
use docload_store_core::{ErrorKind, NamespaceError, StoreError};
use snafu::Snafu;

/// CLI error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Invalid {name} argument: {message}"))]
    InvalidArgument { name: &'static str, message: String },
    #[snafu(display("Invalid namespace"))]
    InvalidNamespace { source: NamespaceError },
    #[snafu(display("Failed to open input"))]
    Source { source: SourceError },
    #[snafu(display("Invalid connection string"))]
    Store { source: StoreError },
    #[snafu(display("Import failed"))]
    Import { source: IngestError },
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::InvalidNamespace { .. } => {
                ErrorKind::Configuration
            }
            Self::Source { source } => source.kind(),
            Self::Store { source } => source.kind(),
            Self::Import { source } => source.kind(),
        }
    }
}
