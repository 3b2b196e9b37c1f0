//! Text command parser.
//!
//! Decodes one line of relayed traffic into typed commands. The relay
//! forwards INSERT statements only; anything else is reported as
//! `NotInsert` and skipped by the listener. Field values are carried
//! verbatim (quotes included) as opaque bytes; rendering them for the
//! downstream store is the store client's concern.
//!
//! Accepted shape, keywords case-insensitive:
//!
//! ```text
//! INSERT INTO <table> [(col, ...)] VALUES (v1, v2, ...) [, (v1, ...)] [;]
//! ```

use crate::relay::command::{Command, Row};
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Blank line
    Empty,
    /// Not an INSERT statement; skipped, not an error condition upstream
    NotInsert,
    /// INSERT without a usable table name
    MissingTable,
    /// INSERT without a VALUES clause
    MissingValues,
    /// A `()` tuple with no values
    EmptyTuple,
    /// Unbalanced parenthesis or unterminated quoted string
    Unterminated,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty command"),
            ParseError::NotInsert => write!(f, "not an insert statement"),
            ParseError::MissingTable => write!(f, "missing table name"),
            ParseError::MissingValues => write!(f, "missing values clause"),
            ParseError::EmptyTuple => write!(f, "empty value tuple"),
            ParseError::Unterminated => write!(f, "unterminated tuple or string"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse one line into commands, one per VALUES tuple, all bound for
/// the same target.
pub fn parse_line(line: &str) -> Result<Vec<Command>, ParseError> {
    let s = line.trim().trim_end_matches(';').trim_end();
    if s.is_empty() {
        return Err(ParseError::Empty);
    }

    let rest = strip_keyword(s, "insert").ok_or(ParseError::NotInsert)?;
    let rest = strip_keyword(rest, "into").ok_or(ParseError::MissingTable)?;
    let (table, rest) = take_ident(rest).ok_or(ParseError::MissingTable)?;

    // Optional column list; column names never contain parentheses.
    let mut rest = rest.trim_start();
    if let Some(after_open) = rest.strip_prefix('(') {
        let close = after_open.find(')').ok_or(ParseError::Unterminated)?;
        rest = &after_open[close + 1..];
    }

    let mut rest = strip_keyword(rest, "values").ok_or(ParseError::MissingValues)?;

    let mut commands = Vec::new();
    loop {
        let tuple_start = rest.trim_start();
        if !tuple_start.starts_with('(') {
            break;
        }
        let (row, remainder) = parse_tuple(tuple_start)?;
        commands.push(Command::new(table, row));

        let remainder = remainder.trim_start();
        rest = remainder.strip_prefix(',').unwrap_or(remainder);
    }

    if commands.is_empty() {
        return Err(ParseError::MissingValues);
    }
    Ok(commands)
}

/// Strip a leading keyword (case-insensitive), requiring a boundary
/// after it.
fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let s = s.trim_start();
    if s.len() < keyword.len() {
        return None;
    }
    let (head, rest) = s.split_at(keyword.len());
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() || c == '(' => Some(rest),
        Some(_) => None,
    }
}

/// Take a leading identifier (letters, digits, `_`, `.`, `$`, `"`).
fn take_ident(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '"')))
        .unwrap_or(s.len());
    if end == 0 {
        None
    } else {
        Some((&s[..end], &s[end..]))
    }
}

/// Parse one parenthesized tuple starting at `s[0] == '('`. Splits on
/// top-level commas, respecting single-quoted strings (with `''`
/// escapes) and nested parentheses. Returns the row and the remainder
/// after the closing parenthesis.
fn parse_tuple(s: &str) -> Result<(Row, &str), ParseError> {
    debug_assert!(s.starts_with('('), "Precondition: tuple must start at '('");

    let mut fields: Vec<Bytes> = Vec::new();
    let mut field_start = 1;
    let mut depth = 1usize;
    let mut in_quote = false;

    for (i, c) in s.char_indices().skip(1) {
        if in_quote {
            if c == '\'' {
                // A doubled quote reads as close-then-reopen, which is
                // exactly how '' escapes scan.
                in_quote = false;
            }
            continue;
        }
        match c {
            '\'' => in_quote = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    push_field(&mut fields, &s[field_start..i]);
                    if fields.len() == 1 && fields[0].is_empty() {
                        return Err(ParseError::EmptyTuple);
                    }
                    return Ok((Row::new(fields), &s[i + 1..]));
                }
            }
            ',' if depth == 1 => {
                push_field(&mut fields, &s[field_start..i]);
                field_start = i + 1;
            }
            _ => {}
        }
    }
    Err(ParseError::Unterminated)
}

fn push_field(fields: &mut Vec<Bytes>, raw: &str) {
    fields.push(Bytes::copy_from_slice(raw.trim().as_bytes()));
}
