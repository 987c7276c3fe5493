//! Command tag inference.
//!
//! sqlx reports how many rows a statement touched but not the statement's
//! command tag, so the tag is recovered from the SQL text: the first keyword
//! of the first statement. For `WITH` queries the tag is the first top-level
//! `SELECT`, `INSERT`, `UPDATE`, `DELETE`, `MERGE` or `VALUES` following the
//! CTE list, which is what PostgreSQL reports.
//!
//! Uses the [sqlparser](https://docs.rs/sqlparser/) tokenizer with the
//! PostgreSQL dialect, so comments, string literals, dollar quotes and quoted
//! identifiers never leak keywords.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

const CTE_BODY_COMMANDS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "VALUES"];

/// Statements `PREPARE` accepts, and therefore the only ones whose parameter
/// types the server can report without executing anything.
const PREPARABLE_COMMANDS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "VALUES", "TABLE"];

/// One statement of a SQL string: its unquoted words at parenthesis depth
/// zero, uppercased.
#[derive(Debug, Default)]
struct Statement {
    words: Vec<String>,
    has_tokens: bool,
}

impl Statement {
    fn command(&self) -> Option<String> {
        let first = self.words.first()?;
        if first != "WITH" {
            return Some(first.clone());
        }
        self.words
            .iter()
            .find(|w| CTE_BODY_COMMANDS.contains(&w.as_str()))
            .cloned()
    }
}

/// Tokenize `sql` into non-empty statements. `None` when the text does not
/// tokenize, e.g. an unterminated literal.
fn statements(sql: &str) -> Option<Vec<Statement>> {
    let tokens = Tokenizer::new(&PostgreSqlDialect {}, sql).tokenize().ok()?;

    let mut statements = vec![Statement::default()];
    let mut depth = 0usize;
    for token in tokens {
        if matches!(token, Token::SemiColon) && depth == 0 {
            statements.push(Statement::default());
            continue;
        }
        let Some(current) = statements.last_mut() else {
            continue;
        };
        match token {
            Token::Whitespace(_) | Token::EOF => continue,
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(word) if depth == 0 && word.quote_style.is_none() => {
                current.words.push(word.value.to_ascii_uppercase());
            }
            _ => {}
        }
        current.has_tokens = true;
    }

    statements.retain(|s| s.has_tokens);
    Some(statements)
}

/// Infer the command tag of the first statement in `sql`, uppercased.
pub fn command_tag(sql: &str) -> Option<String> {
    statements(sql)?.first()?.command()
}

/// Whether `sql` is exactly one statement the server can prepare on its own.
pub(crate) fn is_preparable(sql: &str) -> bool {
    match statements(sql).as_deref() {
        Some([statement]) => statement
            .command()
            .is_some_and(|command| PREPARABLE_COMMANDS.contains(&command.as_str())),
        _ => false,
    }
}
