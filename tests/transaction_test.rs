//! Integration tests for transaction control through the provider.

mod common;

use common::StubClient;
use pgpool_provider::config::ProviderConfig;
use pgpool_provider::db::ConnectionProvider;
use pgpool_provider::error::DbError;
use pgpool_provider::models::{AccessMode, IsolationLevel, RawResult, TransactionSettings};
use std::sync::Arc;

fn provider(client: &StubClient) -> ConnectionProvider {
    let provider =
        ConnectionProvider::new(ProviderConfig::new().with_client(Arc::new(client.clone())));
    provider.init().unwrap();
    provider
}

#[tokio::test]
async fn test_committed_transaction_issues_exact_statements() {
    let client = StubClient::new();
    let mutation = "update person set first_name = $1 where id = $2";
    client.respond(
        mutation,
        RawResult::default().with_command("UPDATE", Some(1)),
    );
    let provider = provider(&client);

    let settings = TransactionSettings::new()
        .with_isolation_level(IsolationLevel::Serializable)
        .with_access_mode(AccessMode::ReadWrite);

    let mut conn = provider.acquire_connection().await.unwrap();
    provider.begin_transaction(&mut conn, &settings).await.unwrap();
    let result = conn
        .execute_query(mutation, &["Jennifer".into(), 1i64.into()])
        .await
        .unwrap();
    provider.commit_transaction(&mut conn).await.unwrap();
    provider.release_connection(conn);

    assert_eq!(result.num_affected_rows, Some(1));
    assert_eq!(
        client.executed(),
        vec![
            "start transaction isolation level serializable read write",
            mutation,
            "commit",
        ]
    );
}

#[tokio::test]
async fn test_plain_begin_and_rollback() {
    let client = StubClient::new();
    let provider = provider(&client);

    let mut conn = provider.acquire_connection().await.unwrap();
    provider
        .begin_transaction(&mut conn, &TransactionSettings::default())
        .await
        .unwrap();
    conn.execute_query("delete from pet", &[]).await.unwrap();
    provider.rollback_transaction(&mut conn).await.unwrap();
    provider.release_connection(conn);

    assert_eq!(client.executed(), vec!["begin", "delete from pet", "rollback"]);
}

#[tokio::test]
async fn test_access_mode_only() {
    let client = StubClient::new();
    let provider = provider(&client);

    let mut conn = provider.acquire_connection().await.unwrap();
    let settings = TransactionSettings::new().with_access_mode(AccessMode::ReadOnly);
    provider.begin_transaction(&mut conn, &settings).await.unwrap();
    provider.release_connection(conn);

    assert_eq!(client.executed(), vec!["start transaction read only"]);
}

#[tokio::test]
async fn test_failed_commit_propagates_engine_error() {
    let client = StubClient::new();
    client.fail_on("commit");
    let provider = provider(&client);

    let mut conn = provider.acquire_connection().await.unwrap();
    provider
        .begin_transaction(&mut conn, &TransactionSettings::default())
        .await
        .unwrap();
    let err = provider.commit_transaction(&mut conn).await.unwrap_err();
    provider.release_connection(conn);

    assert!(matches!(err, DbError::Database { .. }));
    assert_eq!(err.sql_state().as_deref(), Some("40001"));
}

#[tokio::test]
async fn test_savepoints() {
    let client = StubClient::new();
    let provider = provider(&client);

    let mut conn = provider.acquire_connection().await.unwrap();
    provider
        .begin_transaction(&mut conn, &TransactionSettings::default())
        .await
        .unwrap();
    provider.savepoint(&mut conn, "before_pets").await.unwrap();
    provider
        .rollback_to_savepoint(&mut conn, "before_pets")
        .await
        .unwrap();
    provider
        .release_savepoint(&mut conn, "before_pets")
        .await
        .unwrap();
    provider.commit_transaction(&mut conn).await.unwrap();

    let err = provider.savepoint(&mut conn, "").await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
    provider.release_connection(conn);

    assert_eq!(
        client.executed(),
        vec![
            "begin",
            "savepoint \"before_pets\"",
            "rollback to savepoint \"before_pets\"",
            "release savepoint \"before_pets\"",
            "commit",
        ]
    );
}
