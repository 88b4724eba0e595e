//! In-memory implementation of the store traits.
//!
//! Suitable for tests and dry runs. Collections keep a unique index on `_id`
//! so duplicate key failures behave like a real server, and the store records
//! every write call it receives so tests can assert on batching.

mod session;
mod store;

pub use self::{
    session::InMemorySession,
    store::{InMemoryStore, Validator, WriteCall, WriteKind},
};
