// SPDX-License-Identifier: Apache-2.0

//! Statement classification for T-SQL batches
//!
//! Decides whether a raw batch must be read as result sets or executed for
//! its rows-affected counts. The batch is parsed with `MsSqlDialect`; when
//! the parser rejects it, a token scan classifies each `;`-separated
//! statement by its leading keyword.

use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::MsSqlDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Token, Tokenizer};

const ROW_KEYWORDS: &[&str] = &["SELECT", "WITH", "EXEC", "EXECUTE", "VALUES"];
const DML_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE"];

/// Leading keyword of one statement and whether it carries an OUTPUT clause
#[derive(Debug, PartialEq)]
struct StatementShape {
    leading: String,
    has_output: bool,
}

impl StatementShape {
    fn is_dml_with_output(&self) -> bool {
        self.has_output && DML_KEYWORDS.contains(&self.leading.as_str())
    }

    fn returns_rows(&self) -> bool {
        ROW_KEYWORDS.contains(&self.leading.as_str()) || self.is_dml_with_output()
    }
}

/// Parses `sql` and reports whether any statement produces a result set.
///
/// Fails when the batch is outside what the parser understands; callers fall
/// back to [`scan_returns_rows`].
pub fn returns_rows(sql: &str) -> Result<bool, ParserError> {
    let statements = Parser::parse_sql(&MsSqlDialect {}, sql)?;
    if statements.iter().any(statement_returns_rows) {
        return Ok(true);
    }
    Ok(statement_shapes(sql)
        .map(|shapes| shapes.iter().any(StatementShape::is_dml_with_output))
        .unwrap_or(false))
}

/// Keyword-level classification, used when the batch does not parse.
pub fn scan_returns_rows(sql: &str) -> bool {
    match statement_shapes(sql) {
        Some(shapes) => shapes.iter().any(StatementShape::returns_rows),
        None => is_select_prefix(sql),
    }
}

/// Whether the first keyword after any leading comments starts a query.
pub fn is_select_prefix(sql: &str) -> bool {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(' || c == ';');
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            break;
        }
    }

    let first = rest
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    ROW_KEYWORDS.contains(&first.as_str())
}

fn statement_returns_rows(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => {
            !matches!(query.body.as_ref(), SetExpr::Insert(_) | SetExpr::Update(_))
        }
        Statement::Execute { .. } => true,
        _ => false,
    }
}

/// Splits the token stream on `;` and summarizes each statement. Comments,
/// string literals and quoted identifiers never count as keywords.
fn statement_shapes(sql: &str) -> Option<Vec<StatementShape>> {
    let tokens = Tokenizer::new(&MsSqlDialect {}, sql).tokenize().ok()?;

    let shapes = tokens
        .split(|token| matches!(token, Token::SemiColon))
        .filter_map(|statement| {
            let mut words = statement.iter().filter_map(|token| match token {
                Token::Word(word) if word.quote_style.is_none() => Some(word.value.as_str()),
                _ => None,
            });
            let leading = words.next()?.to_ascii_uppercase();
            let has_output = words.any(|w| w.eq_ignore_ascii_case("OUTPUT"));
            Some(StatementShape {
                leading,
                has_output,
            })
        })
        .collect();
    Some(shapes)
}
