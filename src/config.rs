//! Configuration handling for the connection provider.
//!
//! This module provides:
//! - [`ClientOptions`]: tuning options for the underlying pooled client
//! - [`ClientConstructionArgs`]: the resolved arguments the client is built from
//! - [`ProviderConfig`]: everything a [`ConnectionProvider`](crate::db::ConnectionProvider) needs
//! - [`Config`]: CLI arguments and environment variables for the binary

use crate::db::client::SqlClient;
use crate::db::provider::OnCreateConnection;
use crate::models::{AccessMode, IsolationLevel, TransactionSettings};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Tracking entries older than this are presumed to belong to a recycled
/// connection, unless the pool's max lifetime says otherwise.
pub const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(60 * 60);

/// Minimum time between two prune passes over the connection tracker.
pub const TRACKER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Callback invoked by the pooled client on connection events.
pub type ConnectionCallback = Arc<dyn Fn() + Send + Sync>;

/// TLS negotiation mode for new connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl From<SslMode> for sqlx::postgres::PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => Self::Disable,
            SslMode::Prefer => Self::Prefer,
            SslMode::Require => Self::Require,
            SslMode::VerifyCa => Self::VerifyCa,
            SslMode::VerifyFull => Self::VerifyFull,
        }
    }
}

/// Options for the underlying pooled client.
///
/// Callbacks are shared by reference: cloning the options keeps the same
/// callback instances and equality compares them by identity.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Connection URL. Overridden by a top-level URL when both are given.
    pub url: Option<String>,
    /// Maximum connections in pool (default: 10)
    pub max_connections: Option<u32>,
    /// Idle timeout in seconds (default: none)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub connect_timeout_secs: Option<u64>,
    /// Maximum lifetime of a physical connection in seconds
    pub max_lifetime_secs: Option<u64>,
    /// Whether to use prepared statements (default: true)
    pub prepare: Option<bool>,
    /// Decode `int8` columns as JSON numbers instead of strings (default: false)
    pub wide_integers: Option<bool>,
    pub ssl_mode: Option<SslMode>,
    /// Server runtime parameters sent at connection startup.
    pub parameters: BTreeMap<String, String>,
    #[serde(skip)]
    pub on_connect: Option<ConnectionCallback>,
    #[serde(skip)]
    pub on_close: Option<ConnectionCallback>,
}

impl ClientOptions {
    /// Get max_connections with default value.
    pub fn max_connections_or_default(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    /// Get connect_timeout with default value.
    pub fn connect_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_secs.map(Duration::from_secs)
    }

    /// Get prepare with default value.
    pub fn prepare_or_default(&self) -> bool {
        self.prepare.unwrap_or(true)
    }

    /// Get wide_integers with default value.
    pub fn wide_integers_or_default(&self) -> bool {
        self.wide_integers.unwrap_or(false)
    }

    /// Validate options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == Some(0) {
            return Err("max_connections must be greater than 0".to_string());
        }
        if self.connect_timeout_secs == Some(0) {
            return Err("connect_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn with_max_lifetime_secs(mut self, secs: u64) -> Self {
        self.max_lifetime_secs = Some(secs);
        self
    }

    pub fn with_on_connect(mut self, callback: ConnectionCallback) -> Self {
        self.on_connect = Some(callback);
        self
    }

    pub fn with_on_close(mut self, callback: ConnectionCallback) -> Self {
        self.on_close = Some(callback);
        self
    }
}

fn same_callback(a: &Option<ConnectionCallback>, b: &Option<ConnectionCallback>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

impl PartialEq for ClientOptions {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.max_connections == other.max_connections
            && self.idle_timeout_secs == other.idle_timeout_secs
            && self.connect_timeout_secs == other.connect_timeout_secs
            && self.max_lifetime_secs == other.max_lifetime_secs
            && self.prepare == other.prepare
            && self.wide_integers == other.wide_integers
            && self.ssl_mode == other.ssl_mode
            && self.parameters == other.parameters
            && same_callback(&self.on_connect, &other.on_connect)
            && same_callback(&self.on_close, &other.on_close)
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("url", &self.url.as_deref().map(redact_url))
            .field("max_connections", &self.max_connections)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .field("prepare", &self.prepare)
            .field("wide_integers", &self.wide_integers)
            .field("ssl_mode", &self.ssl_mode)
            .field("parameters", &self.parameters)
            .field("on_connect", &self.on_connect.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Mask the password of a connection URL so it can be logged.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}

/// Arguments the pooled client is constructed from.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientConstructionArgs {
    /// A bare connection URL.
    Url(String),
    /// Full options; `url` is set whenever a URL is known.
    Options(ClientOptions),
    /// Nothing configured; the client falls back to its environment defaults.
    Empty,
}

impl ClientConstructionArgs {
    /// Resolve a top-level URL and client options into construction arguments.
    ///
    /// The top-level URL always takes precedence over `options.url`.
    pub fn resolve(url: Option<&str>, options: Option<&ClientOptions>) -> Self {
        match (url, options) {
            (Some(url), None) => Self::Url(url.to_string()),
            (Some(url), Some(options)) => Self::Options(ClientOptions {
                url: Some(url.to_string()),
                ..options.clone()
            }),
            (None, Some(options)) => Self::Options(options.clone()),
            (None, None) => Self::Empty,
        }
    }

    /// The URL the client will connect to, if one is known.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Options(options) => options.url.as_deref(),
            Self::Empty => None,
        }
    }
}

/// Options applied when the pool is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CloseOptions {
    /// Seconds to wait for in-flight work before giving up on a graceful close.
    pub timeout_secs: Option<u64>,
}

impl CloseOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Configuration of a [`ConnectionProvider`](crate::db::ConnectionProvider).
#[derive(Clone, Default)]
pub struct ProviderConfig {
    /// Pre-built client; when set, `url` and `client_options` are not used.
    pub client: Option<Arc<dyn SqlClient>>,
    pub url: Option<String>,
    pub client_options: Option<ClientOptions>,
    /// Runs once per physical connection, on its first observed acquisition.
    pub on_create_connection: Option<Arc<dyn OnCreateConnection>>,
    pub close_options: Option<CloseOptions>,
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: Arc<dyn SqlClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_client_options(mut self, options: ClientOptions) -> Self {
        self.client_options = Some(options);
        self
    }

    pub fn with_on_create_connection(mut self, hook: Arc<dyn OnCreateConnection>) -> Self {
        self.on_create_connection = Some(hook);
        self
    }

    pub fn with_close_options(mut self, options: CloseOptions) -> Self {
        self.close_options = Some(options);
        self
    }

    /// Resolve the construction arguments for the pooled client.
    pub fn client_args(&self) -> ClientConstructionArgs {
        ClientConstructionArgs::resolve(self.url.as_deref(), self.client_options.as_ref())
    }

    /// How long a physical connection is remembered after it was last seen.
    pub fn connection_ttl(&self) -> Duration {
        self.client_options
            .as_ref()
            .and_then(ClientOptions::max_lifetime)
            .unwrap_or(DEFAULT_CONNECTION_TTL)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client", &self.client.is_some())
            .field("url", &self.url.as_deref().map(redact_url))
            .field("client_options", &self.client_options)
            .field("on_create_connection", &self.on_create_connection.is_some())
            .field("close_options", &self.close_options)
            .finish()
    }
}

/// CLI configuration for the `pgpool-provider` binary.
#[derive(Debug, Parser)]
#[command(name = "pgpool-provider")]
#[command(version, about = "Run a statement through the pooled connection provider")]
pub struct Config {
    /// Statement to execute
    pub sql: String,

    /// Positional parameter, as a JSON value (repeatable)
    #[arg(long = "param", value_name = "JSON")]
    pub params: Vec<String>,

    /// Connection URL (falls back to PG* environment variables when unset)
    #[arg(long, env = "DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum connections in pool
    #[arg(long, env = "PGPOOL_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Idle timeout in seconds
    #[arg(long, env = "PGPOOL_IDLE_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    /// Connection acquire timeout in seconds
    #[arg(long, env = "PGPOOL_CONNECT_TIMEOUT")]
    pub connect_timeout: Option<u64>,

    /// Maximum lifetime of a physical connection in seconds
    #[arg(long, env = "PGPOOL_MAX_LIFETIME")]
    pub max_lifetime: Option<u64>,

    /// Disable prepared statements
    #[arg(long)]
    pub no_prepare: bool,

    /// Decode int8 columns as JSON numbers
    #[arg(long)]
    pub wide_integers: bool,

    #[arg(long, value_enum, env = "PGPOOL_SSL_MODE")]
    pub ssl_mode: Option<SslMode>,

    /// Seconds to wait for a graceful pool close
    #[arg(long, env = "PGPOOL_CLOSE_TIMEOUT")]
    pub close_timeout: Option<u64>,

    /// Run the statement inside a transaction
    #[arg(long)]
    pub transaction: bool,

    #[arg(long, value_enum, requires = "transaction")]
    pub isolation_level: Option<IsolationLevel>,

    #[arg(long, value_enum, requires = "transaction")]
    pub access_mode: Option<AccessMode>,

    /// Print one JSON line per row instead of a single result document
    #[arg(long)]
    pub stream: bool,

    /// Log level
    #[arg(long, default_value = "info", env = "PGPOOL_LOG_LEVEL")]
    pub log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "PGPOOL_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Client options from the CLI, or `None` when no pool flag was given.
    pub fn client_options(&self) -> Option<ClientOptions> {
        let options = ClientOptions {
            max_connections: self.max_connections,
            idle_timeout_secs: self.idle_timeout,
            connect_timeout_secs: self.connect_timeout,
            max_lifetime_secs: self.max_lifetime,
            prepare: self.no_prepare.then_some(false),
            wide_integers: self.wide_integers.then_some(true),
            ssl_mode: self.ssl_mode,
            ..ClientOptions::default()
        };
        (options != ClientOptions::default()).then_some(options)
    }

    pub fn provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new();
        config.url = self.url.clone();
        config.client_options = self.client_options();
        config.close_options = self.close_timeout.map(|secs| CloseOptions {
            timeout_secs: Some(secs),
        });
        config
    }

    pub fn transaction_settings(&self) -> TransactionSettings {
        TransactionSettings {
            isolation_level: self.isolation_level,
            access_mode: self.access_mode,
        }
    }

    /// Parse `--param` values as JSON; bare words that are not JSON become strings.
    pub fn query_params(&self) -> Vec<crate::models::QueryParam> {
        self.params
            .iter()
            .map(|raw| match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(value) => value.into(),
                Err(_) => crate::models::QueryParam::String(raw.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback() -> ConnectionCallback {
        Arc::new(|| {})
    }

    #[test]
    fn test_resolve_url_only() {
        let args = ClientConstructionArgs::resolve(Some("postgres://db/app"), None);
        assert_eq!(args, ClientConstructionArgs::Url("postgres://db/app".into()));
    }

    #[test]
    fn test_resolve_top_level_url_wins() {
        let options = ClientOptions::default()
            .with_url("postgres://embedded/other")
            .with_max_connections(4);
        let args = ClientConstructionArgs::resolve(Some("postgres://db/app"), Some(&options));
        match args {
            ClientConstructionArgs::Options(resolved) => {
                assert_eq!(resolved.url.as_deref(), Some("postgres://db/app"));
                assert_eq!(resolved.max_connections, Some(4));
            }
            other => panic!("expected options, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_inserts_url_when_options_have_none() {
        let options = ClientOptions::default().with_max_connections(2);
        let args = ClientConstructionArgs::resolve(Some("postgres://db/app"), Some(&options));
        assert_eq!(args.url(), Some("postgres://db/app"));
    }

    #[test]
    fn test_resolve_options_verbatim_keeps_callback_identity() {
        let on_connect = callback();
        let options = ClientOptions::default()
            .with_url("postgres://embedded/app")
            .with_on_connect(on_connect.clone());
        let args = ClientConstructionArgs::resolve(None, Some(&options));
        match args {
            ClientConstructionArgs::Options(resolved) => {
                assert_eq!(resolved, options);
                assert!(Arc::ptr_eq(resolved.on_connect.as_ref().unwrap(), &on_connect));
            }
            other => panic!("expected options, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_override_keeps_callback_identity() {
        let on_close = callback();
        let options = ClientOptions::default().with_on_close(on_close.clone());
        let args = ClientConstructionArgs::resolve(Some("postgres://db/app"), Some(&options));
        let ClientConstructionArgs::Options(resolved) = args else {
            panic!("expected options");
        };
        assert!(Arc::ptr_eq(resolved.on_close.as_ref().unwrap(), &on_close));
    }

    #[test]
    fn test_resolve_empty() {
        assert_eq!(
            ClientConstructionArgs::resolve(None, None),
            ClientConstructionArgs::Empty
        );
        assert_eq!(ClientConstructionArgs::Empty.url(), None);
    }

    #[test]
    fn test_options_equality_compares_callbacks_by_identity() {
        let a = ClientOptions::default().with_on_connect(callback());
        let b = ClientOptions::default().with_on_connect(callback());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_options_validate() {
        assert!(ClientOptions::default().validate().is_ok());
        assert!(
            ClientOptions::default()
                .with_max_connections(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_options_deserialize() {
        let options: ClientOptions = serde_json::from_value(serde_json::json!({
            "url": "postgres://db/app",
            "max_connections": 5,
            "prepare": false,
            "ssl_mode": "verify-full",
            "parameters": {"application_name": "api"}
        }))
        .unwrap();
        assert_eq!(options.max_connections_or_default(), 5);
        assert!(!options.prepare_or_default());
        assert_eq!(options.ssl_mode, Some(SslMode::VerifyFull));
        assert_eq!(options.parameters["application_name"], "api");
    }

    #[test]
    fn test_debug_redacts_password() {
        let options = ClientOptions::default().with_url("postgres://user:secret@db/app");
        let debug = format!("{:?}", options);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_connection_ttl_defaults_to_one_hour() {
        assert_eq!(ProviderConfig::new().connection_ttl(), DEFAULT_CONNECTION_TTL);
        let config = ProviderConfig::new()
            .with_client_options(ClientOptions::default().with_max_lifetime_secs(90));
        assert_eq!(config.connection_ttl(), Duration::from_secs(90));
    }

    #[test]
    fn test_cli_without_pool_flags_has_no_client_options() {
        let config = Config::parse_from(["pgpool-provider", "select 1"]);
        assert!(config.client_options().is_none());
        assert!(!matches!(
            config.provider_config().client_args(),
            ClientConstructionArgs::Options(_)
        ));
    }

    #[test]
    fn test_cli_transaction_flags() {
        let config = Config::parse_from([
            "pgpool-provider",
            "update t set x = 1",
            "--url",
            "postgres://db/app",
            "--transaction",
            "--isolation-level",
            "serializable",
            "--access-mode",
            "read-write",
            "--max-connections",
            "3",
        ]);
        let settings = config.transaction_settings();
        assert_eq!(settings.isolation_level, Some(IsolationLevel::Serializable));
        assert_eq!(settings.access_mode, Some(AccessMode::ReadWrite));
        assert_eq!(config.client_options().unwrap().max_connections, Some(3));
        assert_eq!(config.provider_config().client_args().url(), Some("postgres://db/app"));
    }

    #[test]
    fn test_cli_params_parse_as_json() {
        let config = Config::parse_from([
            "pgpool-provider",
            "select $1, $2",
            "--param",
            "7",
            "--param",
            "plain",
        ]);
        assert_eq!(
            config.query_params(),
            vec![
                crate::models::QueryParam::Int(7),
                crate::models::QueryParam::String("plain".into())
            ]
        );
    }
}
