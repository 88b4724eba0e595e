//! Write concern requests and their resolution against the store topology.
//!
//! A request is what the user asked for (`"majority"`, `"2"`,
//! `{"w": 1, "j": true, "wtimeout": 500}`). It is resolved once per run
//! against the detected [`TopologyKind`] into a [`WriteConcern`] that every
//! session applies to its writes.

use std::{fmt, str::FromStr, time::Duration};

use serde_json::Value;
use snafu::{Snafu, ensure};
use tracing::debug;

use crate::{ErrorKind, TopologyKind};

const MAJORITY: &str = "majority";

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum WriteConcernError {
    #[snafu(display("invalid write concern document: {message}"))]
    InvalidJson { message: String },
    #[snafu(display("write concern document must be an object"))]
    NotAnObject,
    #[snafu(display("unknown write concern field {field:?}"))]
    UnknownField { field: String },
    #[snafu(display("invalid write concern value for {field}: {message}"))]
    InvalidValue { field: &'static str, message: String },
    #[snafu(display("write concern w can not be negative: {w}"))]
    NegativeW { w: i64 },
    #[snafu(display("journaling requires an acknowledged write concern"))]
    JournalWithoutAcknowledgment,
    #[snafu(display("write concern mode {mode:?} is not supported on a {topology}"))]
    IncompatibleTopology {
        mode: String,
        topology: TopologyKind,
    },
}

impl WriteConcernError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// How many nodes must acknowledge a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    Nodes(u32),
    Majority,
    /// A named tag set configured on the replica set.
    Tag(String),
}

/// The durability requested by the user, before topology resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConcernRequest {
    pub w: WriteMode,
    pub journal: bool,
    pub timeout: Option<Duration>,
}

/// A write concern resolved against the connected topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteConcern {
    Unacknowledged,
    Acknowledged {
        w: WriteMode,
        journal: bool,
        timeout: Option<Duration>,
    },
}

impl Default for WriteConcernRequest {
    fn default() -> Self {
        Self {
            w: WriteMode::Majority,
            journal: false,
            timeout: None,
        }
    }
}

impl FromStr for WriteConcernRequest {
    type Err = WriteConcernError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.is_empty() {
            return Ok(Self::default());
        }

        if s.starts_with('{') {
            return parse_document(s);
        }

        Ok(Self {
            w: parse_mode(s)?,
            ..Self::default()
        })
    }
}

impl WriteConcern {
    /// Resolve a request for the given topology.
    ///
    /// Standalone servers only ever acknowledge with `w: 1`, numeric modes are
    /// lowered accordingly while named tag sets are rejected.
    pub fn resolve(
        request: &WriteConcernRequest,
        topology: TopologyKind,
    ) -> Result<Self, WriteConcernError> {
        if request.w == WriteMode::Nodes(0) {
            ensure!(!request.journal, JournalWithoutAcknowledgmentSnafu);
            return Ok(Self::Unacknowledged);
        }

        let w = match (topology, &request.w) {
            (TopologyKind::Standalone, WriteMode::Tag(mode)) => {
                return IncompatibleTopologySnafu {
                    mode: mode.clone(),
                    topology,
                }
                .fail();
            }
            (TopologyKind::Standalone, w) => {
                if *w != WriteMode::Nodes(1) {
                    debug!(requested = %w, "standalone server: setting write concern w to 1");
                }
                WriteMode::Nodes(1)
            }
            (_, w) => w.clone(),
        };

        Ok(Self::Acknowledged {
            w,
            journal: request.journal,
            timeout: request.timeout,
        })
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged { .. })
    }

    /// Per-write timeout for replication acknowledgment, if any.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Self::Unacknowledged => None,
            Self::Acknowledged { timeout, .. } => *timeout,
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes(n) => write!(f, "{n}"),
            Self::Majority => f.write_str(MAJORITY),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

impl fmt::Display for WriteConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unacknowledged => f.write_str("unacknowledged"),
            Self::Acknowledged {
                w,
                journal,
                timeout,
            } => {
                write!(f, "w={w}")?;
                if *journal {
                    f.write_str(" j=true")?;
                }
                if let Some(timeout) = timeout {
                    write!(f, " wtimeout={}ms", timeout.as_millis())?;
                }
                Ok(())
            }
        }
    }
}

fn parse_mode(s: &str) -> Result<WriteMode, WriteConcernError> {
    if s == MAJORITY {
        return Ok(WriteMode::Majority);
    }

    match s.parse::<i64>() {
        Ok(w) => nodes(w),
        Err(_) => Ok(WriteMode::Tag(s.to_string())),
    }
}

fn nodes(w: i64) -> Result<WriteMode, WriteConcernError> {
    ensure!(w >= 0, NegativeWSnafu { w });
    let w = u32::try_from(w).map_err(|_| WriteConcernError::InvalidValue {
        field: "w",
        message: format!("{w} is out of range"),
    })?;
    Ok(WriteMode::Nodes(w))
}

fn parse_document(s: &str) -> Result<WriteConcernRequest, WriteConcernError> {
    let value: Value = serde_json::from_str(s).map_err(|err| WriteConcernError::InvalidJson {
        message: err.to_string(),
    })?;

    let Value::Object(fields) = value else {
        return NotAnObjectSnafu.fail();
    };

    let mut request = WriteConcernRequest::default();

    for (field, value) in fields {
        match field.as_str() {
            "w" => {
                request.w = match value {
                    Value::Number(n) => match n.as_i64() {
                        Some(w) => nodes(w)?,
                        None => {
                            return InvalidValueSnafu {
                                field: "w",
                                message: format!("{n} is not an integer"),
                            }
                            .fail();
                        }
                    },
                    Value::String(mode) => parse_mode(&mode)?,
                    other => {
                        return InvalidValueSnafu {
                            field: "w",
                            message: format!("expected a number or a string, found {other}"),
                        }
                        .fail();
                    }
                };
            }
            "j" => request.journal |= parse_flag("j", &value)?,
            // fsync is an alias for journaling on modern servers
            "fsync" => request.journal |= parse_flag("fsync", &value)?,
            "wtimeout" | "wtimeoutMS" => {
                let millis = value.as_u64().ok_or_else(|| WriteConcernError::InvalidValue {
                    field: "wtimeout",
                    message: format!("expected a non-negative integer, found {value}"),
                })?;
                request.timeout = (millis > 0).then(|| Duration::from_millis(millis));
            }
            _ => return UnknownFieldSnafu { field }.fail(),
        }
    }

    Ok(request)
}

fn parse_flag(field: &'static str, value: &Value) -> Result<bool, WriteConcernError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|n| n != 0.0)),
        other => InvalidValueSnafu {
            field,
            message: format!("expected a boolean, found {other}"),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(s: &str) -> WriteConcernRequest {
        s.parse().expect("valid write concern")
    }

    #[test]
    fn test_parse_simple_forms() {
        assert_eq!(request(""), WriteConcernRequest::default());
        assert_eq!(request("majority").w, WriteMode::Majority);
        assert_eq!(request("2").w, WriteMode::Nodes(2));
        assert_eq!(request("dc1").w, WriteMode::Tag("dc1".to_string()));
        assert_eq!(
            "-1".parse::<WriteConcernRequest>(),
            Err(WriteConcernError::NegativeW { w: -1 })
        );
    }

    #[test]
    fn test_parse_document() {
        let req = request(r#"{"w": 3, "j": true, "wtimeout": 500}"#);
        assert_eq!(req.w, WriteMode::Nodes(3));
        assert!(req.journal);
        assert_eq!(req.timeout, Some(Duration::from_millis(500)));

        let req = request(r#"{"w": "majority", "fsync": 1}"#);
        assert_eq!(req.w, WriteMode::Majority);
        assert!(req.journal);

        assert!(matches!(
            "{w: 1}".parse::<WriteConcernRequest>(),
            Err(WriteConcernError::InvalidJson { .. })
        ));
        assert!(matches!(
            r#"{"x": 1}"#.parse::<WriteConcernRequest>(),
            Err(WriteConcernError::UnknownField { .. })
        ));
        assert!(matches!(
            r#"{"w": 1.5}"#.parse::<WriteConcernRequest>(),
            Err(WriteConcernError::InvalidValue { field: "w", .. })
        ));
        assert_eq!(
            r#"{"w": -2}"#.parse::<WriteConcernRequest>(),
            Err(WriteConcernError::NegativeW { w: -2 })
        );
    }

    #[test]
    fn test_resolve_unacknowledged() {
        let wc = WriteConcern::resolve(&request("0"), TopologyKind::ReplicaSet).unwrap();
        assert_eq!(wc, WriteConcern::Unacknowledged);
        assert!(!wc.is_acknowledged());

        let err = WriteConcern::resolve(&request(r#"{"w": 0, "j": true}"#), TopologyKind::Standalone)
            .unwrap_err();
        assert_eq!(err, WriteConcernError::JournalWithoutAcknowledgment);
    }

    #[test]
    fn test_resolve_standalone_lowers_w() {
        let wc = WriteConcern::resolve(
            &request(r#"{"w": "majority", "wtimeout": 100}"#),
            TopologyKind::Standalone,
        )
        .unwrap();
        assert_eq!(
            wc,
            WriteConcern::Acknowledged {
                w: WriteMode::Nodes(1),
                journal: false,
                timeout: Some(Duration::from_millis(100)),
            }
        );
        assert_eq!(wc.to_string(), "w=1 wtimeout=100ms");
    }

    #[test]
    fn test_resolve_tag_on_standalone_fails() {
        let err = WriteConcern::resolve(&request("dc1"), TopologyKind::Standalone).unwrap_err();
        assert!(matches!(err, WriteConcernError::IncompatibleTopology { .. }));

        let wc = WriteConcern::resolve(&request("dc1"), TopologyKind::ReplicaSet).unwrap();
        assert_eq!(wc.to_string(), "w=dc1");
    }

    #[test]
    fn test_resolve_keeps_request_on_clusters() {
        let wc = WriteConcern::resolve(&request("majority"), TopologyKind::Sharded).unwrap();
        assert_eq!(
            wc,
            WriteConcern::Acknowledged {
                w: WriteMode::Majority,
                journal: false,
                timeout: None,
            }
        );
    }
}
