use std::fmt;

/// Server error codes reported for duplicate key violations.
const DUPLICATE_KEY_CODES: [i32; 3] = [11000, 11001, 12582];
/// Server error code for documents rejected by a collection validator.
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
/// Server error code for a write concern that could not be satisfied in time.
const WRITE_CONCERN_TIMEOUT: i32 = 64;

/// Classified reason the store rejected a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailureKind {
    DuplicateKey,
    Validation,
    WriteConcernTimeout,
    Other,
}

impl WriteFailureKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            code if DUPLICATE_KEY_CODES.contains(&code) => Self::DuplicateKey,
            DOCUMENT_VALIDATION_FAILURE => Self::Validation,
            WRITE_CONCERN_TIMEOUT => Self::WriteConcernTimeout,
            _ => Self::Other,
        }
    }

    /// The server error code that corresponds to this kind, when there is one.
    pub fn code(self) -> Option<i32> {
        match self {
            Self::DuplicateKey => Some(DUPLICATE_KEY_CODES[0]),
            Self::Validation => Some(DOCUMENT_VALIDATION_FAILURE),
            Self::WriteConcernTimeout => Some(WRITE_CONCERN_TIMEOUT),
            Self::Other => None,
        }
    }
}

/// A single failure reported by the store for one write call.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    /// Position of the failing record in the write call.
    ///
    /// `None` for failures that apply to the whole call, like a write
    /// concern timeout.
    pub index: Option<usize>,
    pub kind: WriteFailureKind,
    pub code: Option<i32>,
    pub message: String,
}

/// Result of a write call that reached the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    /// Number of records the store accepted.
    pub acknowledged: u64,
    /// Records (or whole-call conditions) the store rejected.
    pub failures: Vec<WriteFailure>,
}

impl WriteFailure {
    pub fn new(index: Option<usize>, code: i32, message: impl Into<String>) -> Self {
        Self {
            index,
            kind: WriteFailureKind::from_code(code),
            code: Some(code),
            message: message.into(),
        }
    }
}

impl WriteOutcome {
    pub fn success(acknowledged: u64) -> Self {
        Self {
            acknowledged,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "record {index}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
