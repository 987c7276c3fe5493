//! Shared test fixtures: an in-memory pooled client that records every
//! statement and reports a configurable backend PID.

#![allow(dead_code)]

use async_trait::async_trait;
use pgpool_provider::config::CloseOptions;
use pgpool_provider::db::command::command_tag;
use pgpool_provider::db::{BACKEND_PID_QUERY, OnCreateConnection, PooledConnection};
use pgpool_provider::db::{ReservedClient, SqlClient};
use pgpool_provider::error::{DbError, DbResult};
use pgpool_provider::models::{QueryParam, RawResult};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct StubState {
    executed: Vec<(i32, String)>,
    pid: Option<i32>,
    pid_value: Option<serde_json::Value>,
    responses: HashMap<String, RawResult>,
    failing: HashSet<String>,
    reserves: usize,
    releases: usize,
    discards: usize,
    closes: Vec<CloseOptions>,
}

/// Pooled client double. Each reservation is served by the "physical
/// connection" whose PID is current at reservation time.
#[derive(Clone, Default)]
pub struct StubClient {
    state: Arc<Mutex<StubState>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::with_pid(Some(1000))
    }

    /// `None` makes the backend PID query fail, as on an engine without it.
    pub fn with_pid(pid: Option<i32>) -> Self {
        let client = Self::default();
        client.set_pid(pid);
        client
    }

    pub fn set_pid(&self, pid: Option<i32>) {
        self.state.lock().unwrap().pid = pid;
    }

    /// Override the value the PID query returns in its `pid` column.
    pub fn set_pid_value(&self, value: serde_json::Value) {
        self.state.lock().unwrap().pid_value = Some(value);
    }

    pub fn respond(&self, sql: &str, result: RawResult) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(sql.to_string(), result);
    }

    pub fn fail_on(&self, sql: &str) {
        self.state.lock().unwrap().failing.insert(sql.to_string());
    }

    /// Every statement executed, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .executed
            .iter()
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// Statements executed, excluding backend PID queries.
    pub fn statements(&self) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|sql| sql != BACKEND_PID_QUERY)
            .collect()
    }

    pub fn executed_on(&self, pid: i32) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .executed
            .iter()
            .filter(|(p, _)| *p == pid)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    pub fn pid_queries(&self) -> usize {
        self.executed()
            .iter()
            .filter(|sql| *sql == BACKEND_PID_QUERY)
            .count()
    }

    pub fn reserves(&self) -> usize {
        self.state.lock().unwrap().reserves
    }

    pub fn releases(&self) -> usize {
        self.state.lock().unwrap().releases
    }

    pub fn discards(&self) -> usize {
        self.state.lock().unwrap().discards
    }

    pub fn closes(&self) -> Vec<CloseOptions> {
        self.state.lock().unwrap().closes.clone()
    }
}

#[async_trait]
impl SqlClient for StubClient {
    async fn reserve(&self) -> DbResult<Box<dyn ReservedClient>> {
        let mut state = self.state.lock().unwrap();
        state.reserves += 1;
        Ok(Box::new(StubConnection {
            pid: state.pid,
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self, options: &CloseOptions) -> DbResult<()> {
        self.state.lock().unwrap().closes.push(*options);
        Ok(())
    }
}

struct StubConnection {
    pid: Option<i32>,
    state: Arc<Mutex<StubState>>,
}

#[async_trait]
impl ReservedClient for StubConnection {
    async fn raw_query(&mut self, sql: &str, _params: &[QueryParam]) -> DbResult<RawResult> {
        let mut state = self.state.lock().unwrap();
        state.executed.push((self.pid.unwrap_or(0), sql.to_string()));

        if sql == BACKEND_PID_QUERY {
            return match self.pid {
                Some(pid) => {
                    let value = state.pid_value.clone().unwrap_or_else(|| json!(pid));
                    let row = json!({ "pid": value }).as_object().cloned().unwrap();
                    Ok(RawResult::rows(vec![row]).with_command("SELECT", Some(1)))
                }
                None => Err(DbError::database(
                    "function pg_backend_pid() does not exist",
                    Some("42883".to_string()),
                    "No such function",
                )),
            };
        }

        if state.failing.contains(sql) {
            return Err(DbError::database(
                format!("statement failed: {sql}"),
                Some("40001".to_string()),
                "Retry the transaction",
            ));
        }

        Ok(state.responses.get(sql).cloned().unwrap_or_else(|| RawResult {
            rows: Vec::new(),
            command: command_tag(sql),
            count: Some(0),
        }))
    }

    fn release(self: Box<Self>) {
        self.state.lock().unwrap().releases += 1;
    }

    fn discard(self: Box<Self>) {
        self.state.lock().unwrap().discards += 1;
    }
}

/// Hook that counts its invocations and runs `sql` on the new connection.
#[derive(Default)]
pub struct CountingHook {
    pub calls: AtomicUsize,
    pub sql: Option<String>,
    pub fail: bool,
}

impl CountingHook {
    pub fn running(sql: &str) -> Self {
        Self {
            sql: Some(sql.to_string()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OnCreateConnection for CountingHook {
    async fn on_create_connection(&self, connection: &mut PooledConnection) -> DbResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(sql) = &self.sql {
            connection.execute_query(sql, &[]).await?;
        }
        if self.fail {
            return Err(DbError::database("hook failed", None, "Fix the hook"));
        }
        Ok(())
    }
}

pub fn row(value: serde_json::Value) -> pgpool_provider::models::Row {
    value.as_object().cloned().unwrap()
}
