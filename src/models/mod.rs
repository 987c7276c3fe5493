//! Data models for the connection provider.
//!
//! This module re-exports all model types used throughout the crate.

pub mod query;
pub mod transaction;

// Re-export commonly used types
pub use query::{QueryParam, QueryResult, RawResult, Row};
pub use transaction::{AccessMode, IsolationLevel, TransactionSettings};
