use snafu::Snafu;

use crate::{ErrorKind, Namespace};

/// Errors returned by storage sessions when a call cannot complete.
///
/// Records rejected by the store are not errors at this level, they are
/// reported in [`crate::WriteOutcome::failures`].
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The store cannot be reached, or the connection was lost.
    #[snafu(display("connection error: {message}"))]
    Connection { message: String },
    /// The call did not complete within its deadline.
    #[snafu(display("operation timed out: {message}"))]
    Timeout { message: String },
    /// The client settings are invalid, like a malformed connection string.
    #[snafu(display("invalid store configuration: {message}"))]
    InvalidConfiguration { message: String },
    #[snafu(display("namespace not found: {namespace}"))]
    NamespaceNotFound { namespace: Namespace },
    #[snafu(display("store error: {message}"))]
    Internal { message: String },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Temporary,
            Self::InvalidConfiguration { .. } => ErrorKind::Configuration,
            Self::NamespaceNotFound { .. } => ErrorKind::NotFound,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_namespace_not_found(&self) -> bool {
        matches!(self, Self::NamespaceNotFound { .. })
    }
}
