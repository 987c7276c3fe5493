//! Transaction command text.
//!
//! Builds the exact statements the provider issues for transaction control.

use crate::error::{DbError, DbResult};
use crate::models::TransactionSettings;

pub const COMMIT: &str = "commit";
pub const ROLLBACK: &str = "rollback";

/// Build the statement that opens a transaction.
///
/// Values come from closed enumerations, so no quoting is needed.
pub fn build_begin_command(settings: &TransactionSettings) -> String {
    match (settings.isolation_level, settings.access_mode) {
        (None, None) => "begin".to_string(),
        (Some(level), None) => format!("start transaction isolation level {level}"),
        (None, Some(mode)) => format!("start transaction {mode}"),
        (Some(level), Some(mode)) => {
            format!("start transaction isolation level {level} {mode}")
        }
    }
}

/// Quote a savepoint name as an SQL identifier.
fn quote_identifier(name: &str) -> DbResult<String> {
    if name.is_empty() {
        return Err(DbError::invalid_input("Savepoint name cannot be empty"));
    }
    if name.contains('\0') {
        return Err(DbError::invalid_input(
            "Savepoint name cannot contain NUL characters",
        ));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

pub fn build_savepoint_command(name: &str) -> DbResult<String> {
    Ok(format!("savepoint {}", quote_identifier(name)?))
}

pub fn build_rollback_to_savepoint_command(name: &str) -> DbResult<String> {
    Ok(format!("rollback to savepoint {}", quote_identifier(name)?))
}

pub fn build_release_savepoint_command(name: &str) -> DbResult<String> {
    Ok(format!("release savepoint {}", quote_identifier(name)?))
}
