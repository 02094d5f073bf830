//! Errors shared by the lobit crates
//!
//! Raised by configuration loading, schema setup and the release queries.
//! Service crates wrap this type in their own taxonomies.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Root folder, config file or database file could not be accessed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML or an unusable setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// No release, page or index record with the given id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected value, e.g. a release date that is not `YYYY-MM-DD`
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
