use docload_store_core::{
    Result, StoreError, TopologyKind, WriteConcern, WriteFailure, WriteMode, WriteOutcome,
    bson::Document,
};
use mongodb::{
    error::{Error, ErrorKind, WriteFailure as DriverWriteFailure},
    options::{Acknowledgment, WriteConcern as DriverWriteConcern},
};

const NAMESPACE_NOT_FOUND: i32 = 26;
const MAX_TIME_MS_EXPIRED: i32 = 50;

/// Router processes answer `hello` with this message.
const ROUTER_MESSAGE: &str = "isdbgrid";

/// Classify a deployment from its `hello` response.
pub fn topology_from_hello(hello: &Document) -> TopologyKind {
    if hello.get_str("msg").is_ok_and(|msg| msg == ROUTER_MESSAGE) {
        TopologyKind::Sharded
    } else if hello.contains_key("setName") {
        TopologyKind::ReplicaSet
    } else {
        TopologyKind::Standalone
    }
}

pub(crate) fn to_driver_write_concern(write_concern: &WriteConcern) -> DriverWriteConcern {
    match write_concern {
        WriteConcern::Unacknowledged => DriverWriteConcern::builder()
            .w(Acknowledgment::Nodes(0))
            .build(),
        WriteConcern::Acknowledged {
            w,
            journal,
            timeout,
        } => {
            let w = match w {
                WriteMode::Nodes(n) => Acknowledgment::Nodes(*n),
                WriteMode::Majority => Acknowledgment::Majority,
                WriteMode::Tag(tag) => Acknowledgment::Custom(tag.clone()),
            };

            DriverWriteConcern::builder()
                .w(w)
                .journal(journal.then_some(true))
                .w_timeout(*timeout)
                .build()
        }
    }
}

/// Turn a failed write of `attempted` records into the records it rejected.
///
/// Errors that do not describe rejected records are returned as errors.
pub(crate) fn outcome_from_error(err: Error, attempted: usize, ordered: bool) -> Result<WriteOutcome> {
    match err.kind.as_ref() {
        ErrorKind::BulkWrite(failure) => {
            let mut failures: Vec<WriteFailure> = failure
                .write_errors
                .iter()
                .flatten()
                .map(|error| WriteFailure::new(Some(error.index), error.code, error.message.clone()))
                .collect();

            // an ordered write stops at its first failure
            let acknowledged = match failures.iter().filter_map(|failure| failure.index).min() {
                None => attempted,
                Some(first) if ordered => first,
                Some(_) => attempted.saturating_sub(failures.len()),
            };

            if let Some(error) = &failure.write_concern_error {
                failures.push(WriteFailure::new(None, error.code, error.message.clone()));
            }

            Ok(WriteOutcome {
                acknowledged: acknowledged as u64,
                failures,
            })
        }
        ErrorKind::Write(DriverWriteFailure::WriteError(error)) => Ok(WriteOutcome {
            acknowledged: 0,
            failures: vec![WriteFailure::new(Some(0), error.code, error.message.clone())],
        }),
        // the record was written but not replicated in time
        ErrorKind::Write(DriverWriteFailure::WriteConcernError(error)) => Ok(WriteOutcome {
            acknowledged: attempted as u64,
            failures: vec![WriteFailure::new(None, error.code, error.message.clone())],
        }),
        _ => Err(from_driver(err)),
    }
}

pub(crate) fn from_driver(err: Error) -> StoreError {
    let message = err.to_string();

    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::Authentication { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => StoreError::Connection { message },
        ErrorKind::InvalidArgument { .. } => StoreError::InvalidConfiguration { message },
        ErrorKind::Command(error) if error.code == MAX_TIME_MS_EXPIRED => {
            StoreError::Timeout { message }
        }
        _ => StoreError::Internal { message },
    }
}

pub(crate) fn is_namespace_not_found(err: &Error) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::Command(error) if error.code == NAMESPACE_NOT_FOUND)
}
