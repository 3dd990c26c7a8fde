//! SQLite collection storage bootstrap.
//!
//! # Responsibility
//! - Open and configure SQLite connections holding one deck collection.
//! - Bring the collection schema up to the version this build understands.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - No deck/card/note access happens before the schema is current.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failure to open or upgrade a collection.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The collection was written by a newer build than this one.
    CollectionTooNew { found: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "collection storage error: {err}"),
            Self::CollectionTooNew { found, supported } => write!(
                f,
                "collection uses schema {found} but this build reads up to {supported}; upgrade subdeck to open it"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::CollectionTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
