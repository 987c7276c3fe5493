//! Pooled client contract.
//!
//! The provider drives the underlying pool through two traits:
//! - [`SqlClient`]: the pool itself (reserve a connection, close the pool)
//! - [`ReservedClient`]: one reserved physical connection (raw query, release, discard)
//!
//! [`PgClient`](super::pg::PgClient) implements them on top of sqlx. Any other
//! pool can be plugged in through [`ProviderConfig::with_client`](crate::config::ProviderConfig::with_client).

use crate::config::CloseOptions;
use crate::error::DbResult;
use crate::models::{QueryParam, RawResult};
use async_trait::async_trait;

/// A pool of physical connections.
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Reserve a physical connection for exclusive use.
    ///
    /// Pool exhaustion and connection establishment failures are returned as-is.
    async fn reserve(&self) -> DbResult<Box<dyn ReservedClient>>;

    /// Close the pool, waiting for in-flight work per the pool's own contract.
    async fn close(&self, options: &CloseOptions) -> DbResult<()>;
}

/// A physical connection reserved from a [`SqlClient`].
#[async_trait]
pub trait ReservedClient: Send {
    /// Execute already-compiled SQL with positional parameters.
    async fn raw_query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<RawResult>;

    /// Hand the connection back to the pool. Does not close it.
    fn release(self: Box<Self>);

    /// Close the connection instead of returning it, for when its session
    /// state is unknown. Pools that cannot close a single connection release it.
    fn discard(self: Box<Self>) {
        self.release();
    }
}
