//! Character whitelist, comment stripping, and tokenization

use crate::ast::CompareOp;
use crate::error::QueryError;

/// A lexical token with the byte offset where it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    Text(String),
    Number(String),
    Op(CompareOp),
    Dot,
    LParen,
    RParen,
    And,
    Or,
    Not,
}

impl TokenKind {
    /// Human-readable form for error messages
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier {name:?}"),
            TokenKind::Text(text) => format!("literal {text:?}"),
            TokenKind::Number(number) => format!("number {number}"),
            TokenKind::Op(op) => format!("operator {}", op.as_sql()),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::And => "AND".to_string(),
            TokenKind::Or => "OR".to_string(),
            TokenKind::Not => "NOT".to_string(),
        }
    }
}

/// Whether `c` may appear anywhere in a query
fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_ascii_whitespace()
        || matches!(
            c,
            '.' | '_' | '=' | '\'' | '"' | '(' | ')' | '<' | '>' | '!' | '/' | ':' | '-'
        )
}

/// Reject the whole input if any character falls outside the whitelist
pub(crate) fn check_whitelist(input: &str) -> Result<(), QueryError> {
    match input.char_indices().find(|(_, c)| !is_allowed(*c)) {
        Some((offset, ch)) => Err(QueryError::InvalidCharacter { ch, offset }),
        None => Ok(()),
    }
}

/// Drop the first `--` outside a literal and everything after it
pub(crate) fn strip_comment(input: &str) -> &str {
    let bytes = input.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'-' && bytes.get(i + 1) == Some(&b'-') => return &input[..i],
            None => {}
        }
        i += 1;
    }
    input
}

/// Split a whitelisted, comment-free query into tokens
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;

        let kind = match b {
            b if b.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            b'(' => {
                i += 1;
                TokenKind::LParen
            }
            b')' => {
                i += 1;
                TokenKind::RParen
            }
            b'.' => {
                i += 1;
                TokenKind::Dot
            }
            b'=' => {
                i += 1;
                TokenKind::Op(CompareOp::Eq)
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                TokenKind::Op(CompareOp::Ne)
            }
            b'<' => match bytes.get(i + 1) {
                Some(b'=') => {
                    i += 2;
                    TokenKind::Op(CompareOp::Le)
                }
                Some(b'>') => {
                    i += 2;
                    TokenKind::Op(CompareOp::Ne)
                }
                _ => {
                    i += 1;
                    TokenKind::Op(CompareOp::Lt)
                }
            },
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    TokenKind::Op(CompareOp::Ge)
                } else {
                    i += 1;
                    TokenKind::Op(CompareOp::Gt)
                }
            }
            b'\'' | b'"' => {
                let end = bytes[i + 1..]
                    .iter()
                    .position(|c| *c == b)
                    .map(|p| i + 1 + p)
                    .ok_or(QueryError::UnterminatedLiteral { offset: start })?;
                let text = input[i + 1..end].trim().to_string();
                i = end + 1;
                TokenKind::Text(text)
            }
            b if b.is_ascii_digit()
                || (b == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) =>
            {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if bytes.get(i) == Some(&b'.') && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
                {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                TokenKind::Number(input[start..i].to_string())
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let word = &input[start..i];
                if word.eq_ignore_ascii_case("and") {
                    TokenKind::And
                } else if word.eq_ignore_ascii_case("or") {
                    TokenKind::Or
                } else if word.eq_ignore_ascii_case("not") {
                    TokenKind::Not
                } else {
                    TokenKind::Ident(word.to_string())
                }
            }
            _ => {
                let found = input[start..].chars().next().unwrap_or_default();
                return Err(QueryError::UnexpectedToken {
                    found: format!("{found:?}"),
                    offset: start,
                    expected: "a field, literal, operator or parenthesis",
                });
            }
        };

        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    Ok(tokens)
}
