//! Statement analysis
//!
//! Best-effort inspection of raw statement text. Nothing here parses SQL: a
//! statement is judged by its leading keyword only, and leading comments or
//! multi-statement payloads get no special treatment.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Keywords whose statements return rows
const READ_KEYWORDS: [&str; 2] = ["select", "pragma"];

/// Keywords whose target table is snapshotted before review
const MUTATING_KEYWORDS: [&str; 5] = ["update", "delete", "insert", "truncate", "drop"];

/// Leading identifier of a token: quoted with `"`, `[]` or backticks, or
/// bare and optionally schema-qualified
static IDENT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:"([^"]+)"|\[([^\]]+)\]|`([^`]+)`|([a-z_][a-z0-9_$]*(?:\.[a-z_][a-z0-9_$]*)?))"#)
        .expect("identifier pattern is valid")
});

/// Read/write classification of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    pub fn is_read(self) -> bool {
        self == StatementKind::Read
    }
}

/// Classify by leading keyword, case-insensitive
pub fn classify(sql: &str) -> StatementKind {
    let lowered = sql.trim().to_lowercase();
    if READ_KEYWORDS.iter().any(|kw| lowered.starts_with(kw)) {
        StatementKind::Read
    } else {
        StatementKind::Write
    }
}

/// Extract the table a mutating statement targets.
///
/// `insert into X` yields `X`; `update X`, `delete X`, `truncate X` and
/// `drop X` yield the token right after the keyword. Every other shape
/// yields `None`. The result is lowercased and unquoted.
pub fn target_table(sql: &str) -> Option<String> {
    let lowered = sql.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    let keyword = *tokens.first()?;
    if !MUTATING_KEYWORDS.contains(&keyword) {
        return None;
    }

    let raw = if keyword == "insert" {
        if tokens.len() > 2 && tokens[1] == "into" {
            tokens[2]
        } else {
            return None;
        }
    } else {
        tokens.get(1).copied()?
    };

    let captures = IDENT_PREFIX.captures(raw)?;
    captures
        .iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().to_string())
}
