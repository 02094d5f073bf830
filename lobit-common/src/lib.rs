//! # lobit Common Library
//!
//! Shared code for the lobit release archive services:
//! - Error type
//! - Bootstrap configuration loading and root folder resolution
//! - Database schema and row models

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
