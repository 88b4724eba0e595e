/// Categories of errors for classification and handling.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration, needs user fix
    Configuration,

    /// Invalid input, user error
    Validation,

    /// Resource missing
    NotFound,

    /// The store rejected a record because it conflicts with existing data
    Conflict,

    /// The store cannot be reached
    Connection,

    /// Timeouts and transient store failures
    Temporary,

    /// Bugs, system errors
    Internal,
}

impl ErrorKind {
    /// Whether this error is retryable.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Temporary | Self::Connection)
    }

    /// Standard exit code for this error category.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Configuration => 78, // EX_CONFIG
            Self::Validation => 65,    // EX_DATAERR
            Self::NotFound => 66,      // EX_NOINPUT
            Self::Connection => 69,    // EX_UNAVAILABLE
            Self::Temporary => 75,     // EX_TEMPFAIL
            Self::Conflict | Self::Internal => 70,
        }
    }
}
