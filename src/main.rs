//! pgpool-provider - Main entry point.
//!
//! Runs one statement through the connection provider and prints the result
//! as JSON on stdout. Logs go to stderr.

use clap::Parser;
use futures_util::StreamExt;
use pgpool_provider::config::Config;
use pgpool_provider::db::{ConnectionProvider, PooledConnection};
use pgpool_provider::error::DbResult;
use pgpool_provider::models::QueryParam;
use std::io::Write;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Execute the statement, printing either one document or one line per row.
async fn run_statement(
    connection: &mut PooledConnection,
    config: &Config,
    params: &[QueryParam],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    if config.stream {
        let mut rows = connection.stream_query(&config.sql, params).await?;
        while let Some(batch) = rows.next().await {
            for row in &batch.rows {
                writeln!(stdout, "{}", serde_json::to_string(row)?)?;
            }
        }
    } else {
        let result = connection.execute_query(&config.sql, params).await?;
        writeln!(stdout, "{}", serde_json::to_string_pretty(&result)?)?;
    }
    Ok(())
}

async fn run(
    provider: &ConnectionProvider,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = config.query_params();
    let mut connection = provider.acquire_connection().await?;

    if !config.transaction {
        let result = run_statement(&mut connection, config, &params).await;
        provider.release_connection(connection);
        return result;
    }

    if let Err(e) = provider
        .begin_transaction(&mut connection, &config.transaction_settings())
        .await
    {
        provider.release_connection(connection);
        return Err(e.into());
    }

    let result = run_statement(&mut connection, config, &params).await;
    let finish: DbResult<()> = match &result {
        Ok(()) => provider.commit_transaction(&mut connection).await,
        Err(_) => provider.rollback_transaction(&mut connection).await,
    };
    provider.release_connection(connection);

    if let Err(e) = &finish {
        if result.is_err() {
            warn!(error = %e, "Rollback failed");
        }
    }
    result?;
    finish?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!("Starting pgpool-provider v{}", env!("CARGO_PKG_VERSION"));

    let provider = ConnectionProvider::new(config.provider_config());
    provider.init()?;

    let result = run(&provider, &config).await;

    if let Err(e) = provider.destroy().await {
        warn!(error = %e, "Failed to close pool");
    }

    if let Err(e) = result {
        error!(error = %e, "Statement failed");
        return Err(e);
    }

    info!("Done");
    Ok(())
}
