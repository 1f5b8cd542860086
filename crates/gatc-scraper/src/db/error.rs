//! Database error types.

use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error reported by SeaORM or the driver underneath it.
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// Connection settings could not be turned into a URL.
    #[error("Invalid connection settings: {0}")]
    Connection(String),

    /// A write was refused before reaching the database.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidRecord { field: &'static str, reason: String },
}
