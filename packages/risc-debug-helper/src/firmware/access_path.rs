//! Parsing of C-style access paths: `*s_ptr->matrix[2][i + 1].x`.

use crate::error::SymbolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexExpr {
    Literal(u64),
    /// Another access path whose current value is the index.
    Path(String),
    Add(Box<IndexExpr>, Box<IndexExpr>),
    Sub(Box<IndexExpr>, Box<IndexExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Member(String),
    Arrow(String),
    Index(IndexExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPath {
    /// Leading `*`s; applied to the final value.
    pub dereferences: usize,
    pub root: String,
    pub steps: Vec<Step>,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

impl AccessPath {
    pub fn parse(text: &str) -> Result<Self, SymbolError> {
        let malformed = || SymbolError::MalformedPath(text.to_string());
        let trimmed = text.trim();
        let dereferences = trimmed.chars().take_while(|&c| c == '*').count();
        let mut rest = &trimmed[dereferences..];

        let (root, tail) = split_ident(rest);
        if root.is_empty() {
            return Err(malformed());
        }
        rest = tail;

        let mut steps = Vec::new();
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix("->") {
                let (name, tail) = split_ident(tail);
                if name.is_empty() {
                    return Err(malformed());
                }
                steps.push(Step::Arrow(name.to_string()));
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix('.') {
                let (name, tail) = split_ident(tail);
                if name.is_empty() {
                    return Err(malformed());
                }
                steps.push(Step::Member(name.to_string()));
                rest = tail;
            } else if rest.starts_with('[') {
                let close = matching_bracket(rest).ok_or_else(malformed)?;
                let inner = rest[1..close].trim();
                if inner.is_empty() {
                    return Err(malformed());
                }
                steps.push(Step::Index(parse_index(inner).ok_or_else(malformed)?));
                rest = &rest[close + 1..];
            } else {
                return Err(malformed());
            }
        }

        Ok(Self {
            dereferences,
            root: root.to_string(),
            steps,
        })
    }
}

fn split_ident(text: &str) -> (&str, &str) {
    let end = text
        .char_indices()
        .find(|&(_, c)| !is_ident_char(c))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text.split_at(end)
}

/// Position of the `]` closing the `[` at the start of `text`.
fn matching_bracket(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// `term (('+' | '-') term)*`, left to right. A term is a literal or an access path.
fn parse_index(inner: &str) -> Option<IndexExpr> {
    let mut depth = 0usize;
    let mut split = None;
    let bytes = inner.as_bytes();
    // the last top-level operator binds loosest
    for (i, c) in inner.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '+' if depth == 0 => split = Some(i),
            '-' if depth == 0 && bytes.get(i + 1) != Some(&b'>') => split = Some(i),
            _ => {}
        }
    }
    let Some(at) = split else {
        return parse_term(inner);
    };
    let lhs = Box::new(parse_index(inner[..at].trim())?);
    let rhs = Box::new(parse_term(inner[at + 1..].trim())?);
    match bytes[at] {
        b'+' => Some(IndexExpr::Add(lhs, rhs)),
        _ => Some(IndexExpr::Sub(lhs, rhs)),
    }
}

fn parse_term(term: &str) -> Option<IndexExpr> {
    if term.is_empty() {
        return None;
    }
    let literal = match term.strip_prefix("0x").or_else(|| term.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => term.parse::<u64>().ok(),
    };
    match literal {
        Some(value) => Some(IndexExpr::Literal(value)),
        None if term.chars().any(char::is_whitespace) => None,
        None => Some(IndexExpr::Path(term.to_string())),
    }
}
