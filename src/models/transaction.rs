//! Transaction settings.

use serde::{Deserialize, Serialize};

/// Transaction isolation levels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum IsolationLevel {
    #[serde(rename = "read uncommitted")]
    #[value(name = "read-uncommitted")]
    ReadUncommitted,
    #[serde(rename = "read committed")]
    #[value(name = "read-committed")]
    ReadCommitted,
    #[serde(rename = "repeatable read")]
    #[value(name = "repeatable-read")]
    RepeatableRead,
    #[serde(rename = "serializable")]
    Serializable,
}

impl IsolationLevel {
    /// SQL text of the level, as used after `isolation level`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "read uncommitted",
            Self::ReadCommitted => "read committed",
            Self::RepeatableRead => "repeatable read",
            Self::Serializable => "serializable",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Transaction access modes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum AccessMode {
    #[serde(rename = "read write")]
    #[value(name = "read-write")]
    ReadWrite,
    #[serde(rename = "read only")]
    #[value(name = "read-only")]
    ReadOnly,
}

impl AccessMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadWrite => "read write",
            Self::ReadOnly => "read only",
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Settings for starting a transaction. Both fields are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<IsolationLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<AccessMode>,
}

impl TransactionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = Some(mode);
        self
    }
}
