//! Recursive-descent parser
//!
//! ```text
//! expr       := and ( "OR" and )*
//! and        := unary ( "AND" unary )*
//! unary      := "NOT" unary | primary
//! primary    := "(" expr ")" | comparison
//! comparison := field op literal
//! field      := column | "meta" "." key
//! ```

use crate::ast::{Column, Field, Filter, Literal};
use crate::error::QueryError;
use crate::lexer::{self, Token, TokenKind};

/// Deepest nesting of parentheses and NOTs accepted
pub const MAX_DEPTH: usize = 64;

/// Parse a query into a [`Filter`]
///
/// Runs the character whitelist over the whole input, drops a trailing `--`
/// comment, then parses what remains.
pub fn parse(input: &str) -> Result<Filter, QueryError> {
    lexer::check_whitelist(input)?;
    let tokens = lexer::tokenize(lexer::strip_comment(input))?;
    if tokens.is_empty() {
        return Err(QueryError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let filter = parser.expr()?;
    match parser.peek() {
        None => Ok(filter),
        Some(token) => Err(QueryError::UnexpectedToken {
            found: token.kind.describe(),
            offset: token.offset,
            expected: "AND, OR or end of query",
        }),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, QueryError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(QueryError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn descend(&mut self) -> Result<(), QueryError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(QueryError::TooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Filter, QueryError> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and()?;
            lhs = Filter::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Filter, QueryError> {
        let mut lhs = self.unary()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.unary()?;
            lhs = Filter::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Filter, QueryError> {
        let Some(offset) = self
            .peek()
            .filter(|t| t.kind == TokenKind::Not)
            .map(|t| t.offset)
        else {
            return self.primary();
        };
        self.pos += 1;

        self.descend()?;
        let inner = self.unary()?;
        self.depth -= 1;
        if inner.references_meta() {
            return Err(QueryError::NegatedMeta { offset });
        }
        Ok(Filter::Not(Box::new(inner)))
    }

    fn primary(&mut self) -> Result<Filter, QueryError> {
        if self.eat(&TokenKind::LParen) {
            self.descend()?;
            let inner = self.expr()?;
            let close = self.next("')'")?;
            if close.kind != TokenKind::RParen {
                return Err(QueryError::UnexpectedToken {
                    found: close.kind.describe(),
                    offset: close.offset,
                    expected: "')'",
                });
            }
            self.depth -= 1;
            return Ok(Filter::Group(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Filter, QueryError> {
        let field = self.field()?;

        let token = self.next("a comparison operator")?;
        let TokenKind::Op(op) = token.kind else {
            return Err(QueryError::UnexpectedToken {
                found: token.kind.describe(),
                offset: token.offset,
                expected: "a comparison operator",
            });
        };

        let token = self.next("a literal")?;
        let value = match token.kind {
            TokenKind::Text(text) => Literal::Text(text),
            TokenKind::Number(number) => Literal::Number(number),
            other => {
                return Err(QueryError::UnexpectedToken {
                    found: other.describe(),
                    offset: token.offset,
                    expected: "a quoted literal or number",
                });
            }
        };

        Ok(Filter::Compare { field, op, value })
    }

    fn field(&mut self) -> Result<Field, QueryError> {
        let token = self.next("a field")?;
        let TokenKind::Ident(name) = token.kind else {
            return Err(QueryError::UnexpectedToken {
                found: token.kind.describe(),
                offset: token.offset,
                expected: "a field",
            });
        };

        if name == "meta" {
            let dot = self.next("'.' after meta")?;
            if dot.kind != TokenKind::Dot {
                return Err(QueryError::UnexpectedToken {
                    found: dot.kind.describe(),
                    offset: dot.offset,
                    expected: "'.' after meta",
                });
            }
            let key = self.next("a meta key")?;
            return match key.kind {
                TokenKind::Ident(key) => Ok(Field::Meta(key)),
                other => Err(QueryError::UnexpectedToken {
                    found: other.describe(),
                    offset: key.offset,
                    expected: "a meta key",
                }),
            };
        }

        Column::from_name(&name)
            .map(Field::Column)
            .ok_or(QueryError::UnknownField {
                field: name,
                offset: token.offset,
            })
    }
}
