//! Storage client abstractions used by the import pipeline.
//!
//! The pipeline never talks to a database directly. It goes through the
//! [`SessionProvider`] and [`Session`] traits defined here, which are
//! implemented by the in-memory store (tests, dry runs) and by the MongoDB
//! adapter.

pub mod error;
pub mod error_kind;
pub mod namespace;
pub mod outcome;
pub mod record;
pub mod session;
pub mod topology;
pub mod write_concern;

pub use bson;

pub use error::{Result, StoreError};
pub use error_kind::ErrorKind;
pub use namespace::{Namespace, NamespaceError};
pub use outcome::{WriteFailure, WriteFailureKind, WriteOutcome};
pub use record::{FieldNameError, Record, get_path, validate_field_names};
pub use session::{Session, SessionProvider};
pub use topology::TopologyKind;
pub use write_concern::{WriteConcern, WriteConcernError, WriteConcernRequest, WriteMode};
