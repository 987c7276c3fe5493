//! PostgreSQL connection provider library.
//!
//! Adapts a pooled sqlx client to a query builder's connection contract:
//! logical connections over pooled physical ones, normalized query results,
//! transaction control and a one-time hook per physical connection.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{ClientConstructionArgs, ClientOptions, CloseOptions, Config, ProviderConfig};
pub use db::{ConnectionProvider, OnCreateConnection, PooledConnection};
pub use error::{DbError, DbResult};
pub use models::{QueryParam, QueryResult, TransactionSettings};
