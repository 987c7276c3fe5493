//! Database layer.
//!
//! This module provides:
//! - The pooled client contract and its sqlx implementation
//! - The connection provider and its physical-connection tracker
//! - Logical connections with query execution and row streaming
//! - Transaction command text and result normalization
//! - Parameter binding and row decoding

pub mod client;
pub mod command;
pub mod connection;
pub mod params;
pub mod pg;
pub mod provider;
pub mod result;
pub mod tracker;
pub mod transaction;
pub mod types;

pub use client::{ReservedClient, SqlClient};
pub use connection::PooledConnection;
pub use pg::PgClient;
pub use provider::{BACKEND_PID_QUERY, ConnectionProvider, OnCreateConnection};
pub use result::interpret;
pub use tracker::ConnectionTracker;
