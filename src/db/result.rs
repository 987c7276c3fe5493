//! Raw result normalization.

use crate::models::{QueryResult, RawResult};

/// Command tags whose row count is reported as `num_affected_rows`.
const MUTATION_COMMANDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE"];

/// Normalize a raw result.
///
/// Rows always pass through. The affected-row count is only kept for
/// mutation commands that reported one.
pub fn interpret<R>(raw: RawResult<R>) -> QueryResult<R> {
    let is_mutation = raw
        .command
        .as_deref()
        .is_some_and(|cmd| MUTATION_COMMANDS.iter().any(|m| cmd.eq_ignore_ascii_case(m)));

    QueryResult {
        rows: raw.rows,
        num_affected_rows: if is_mutation { raw.count } else { None },
    }
}
