use std::fmt;

use snafu::{Snafu, ensure};

const INVALID_DATABASE_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '\0'];

/// Errors returned when validating a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum NamespaceError {
    #[snafu(display("{resource} name cannot be empty"))]
    Empty { resource: &'static str },
    #[snafu(display("database name {name:?} contains an invalid character"))]
    InvalidDatabaseName { name: String },
    #[snafu(display("collection name {name:?} contains an invalid character"))]
    InvalidCollectionName { name: String },
    #[snafu(display("collection name {name:?} cannot start with 'system.'"))]
    SystemCollection { name: String },
}

/// The target of an import: a database and a collection in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    /// Creates a validated namespace.
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self, NamespaceError> {
        let database = database.into();
        let collection = collection.into();

        ensure!(
            !database.is_empty(),
            EmptySnafu {
                resource: "database"
            }
        );
        ensure!(
            !database.contains(INVALID_DATABASE_CHARS),
            InvalidDatabaseNameSnafu { name: database }
        );
        ensure!(
            !collection.is_empty(),
            EmptySnafu {
                resource: "collection"
            }
        );
        ensure!(
            !collection.contains(['$', '\0']),
            InvalidCollectionNameSnafu { name: collection }
        );
        ensure!(
            !collection.starts_with("system."),
            SystemCollectionSnafu { name: collection }
        );

        Ok(Self {
            database,
            collection,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}
