//! # Stemforge Common Library
//!
//! Shared code for the Stemforge services including:
//! - Error types (`Error`, `Result`)
//! - Configuration loading and storage root resolution
//! - Database initialization and schema
//! - Timestamp helpers (RFC3339 round-tripping)

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
