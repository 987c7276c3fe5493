//! Logical connection handle.
//!
//! A [`PooledConnection`] wraps exactly one physical connection reserved from
//! the pool. Commands issued through one handle run in submission order.
//!
//! # Usage
//!
//! ```ignore
//! let mut conn = provider.acquire_connection().await?;
//! let result = conn.execute_query("select * from person where id = $1", &[1.into()]).await?;
//! provider.release_connection(conn);
//! ```
//!
//! Releasing consumes the handle. A handle dropped without being released
//! still returns its physical connection to the pool, with a warning.

use crate::db::client::ReservedClient;
use crate::db::result::interpret;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryResult};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tracing::{debug, warn};

pub struct PooledConnection {
    inner: Option<Box<dyn ReservedClient>>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("released", &self.inner.is_none())
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    pub fn new(inner: Box<dyn ReservedClient>) -> Self {
        Self { inner: Some(inner) }
    }

    fn client(&mut self) -> DbResult<&mut Box<dyn ReservedClient>> {
        self.inner.as_mut().ok_or_else(|| {
            DbError::connection(
                "Connection has already been released",
                "Acquire a new connection from the provider",
            )
        })
    }

    /// Execute compiled SQL and normalize its result.
    pub async fn execute_query(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        debug!(sql = %sql, params = params.len(), "Executing query");
        let raw = self.client()?.raw_query(sql, params).await?;
        Ok(interpret(raw))
    }

    /// Execute compiled SQL and yield its rows one at a time.
    ///
    /// The query runs to completion before the stream is returned; each item
    /// is a single-row batch, in result order. Calling again re-executes.
    pub async fn stream_query(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<BoxStream<'static, QueryResult>> {
        let result = self.execute_query(sql, params).await?;
        let batches = result.rows.into_iter().map(|row| QueryResult {
            rows: vec![row],
            num_affected_rows: None,
        });
        Ok(futures_util::stream::iter(batches).boxed())
    }

    /// Return the physical connection to the pool without closing it.
    pub fn release(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }

    /// Close the physical connection rather than pool it.
    pub fn discard(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.discard();
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            warn!("Connection released via Drop - consider using explicit release()");
            inner.release();
        }
    }
}
