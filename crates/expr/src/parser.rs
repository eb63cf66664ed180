//! Pratt parser turning a token stream into an [`Expr`] tree.
//!
//! Precedence, loosest to tightest:
//! `or` < `and` < `not` < comparisons/`in` < `+ -` < `* / %` <
//! unary `-` < postfix (`.field`, `[index]`, call).

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ExprError;
use crate::token::{tokenize, Spanned, Token};

/// Recursion cap. Each syntactic nesting level costs several frames in
/// the precedence ladder, so this bounds user nesting at roughly 40
/// levels while keeping hostile inputs from blowing the stack.
pub(crate) const MAX_DEPTH: usize = 384;

pub(crate) fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ExprError::Parse {
            pos: 0,
            message: "empty expression".to_string(),
        });
    }
    let mut parser = Parser {
        tokens,
        cursor: 0,
        source_len: source.len(),
    };
    let expr = parser.parse_or(0)?;
    if let Some(extra) = parser.peek() {
        return Err(ExprError::Parse {
            pos: extra.pos,
            message: format!("unexpected trailing token {:?}", extra.token),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    source_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let t = self.tokens.get(self.cursor).cloned();
        if t.is_some() {
            self.cursor += 1;
        }
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().map(|s| &s.token) == Some(expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<usize, ExprError> {
        match self.advance() {
            Some(s) if s.token == expected => Ok(s.pos),
            Some(s) => Err(ExprError::Parse {
                pos: s.pos,
                message: format!("expected {what}, found {:?}", s.token),
            }),
            None => Err(self.eof(what)),
        }
    }

    fn eof(&self, what: &str) -> ExprError {
        ExprError::Parse {
            pos: self.source_len,
            message: format!("expected {what}, found end of expression"),
        }
    }

    fn check_depth(&self, depth: usize) -> Result<(), ExprError> {
        if depth >= MAX_DEPTH {
            Err(ExprError::DepthExceeded)
        } else {
            Ok(())
        }
    }

    // ── Precedence ladder ───────────────────────────────────────

    fn parse_or(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let mut lhs = self.parse_and(depth + 1)?;
        while let Some(s) = self.peek() {
            if s.token != Token::Or {
                break;
            }
            let pos = s.pos;
            self.cursor += 1;
            let rhs = self.parse_and(depth + 1)?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let mut lhs = self.parse_not(depth + 1)?;
        while let Some(s) = self.peek() {
            if s.token != Token::And {
                break;
            }
            let pos = s.pos;
            self.cursor += 1;
            let rhs = self.parse_not(depth + 1)?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        if let Some(s) = self.peek() {
            if s.token == Token::Not {
                let pos = s.pos;
                self.cursor += 1;
                let operand = self.parse_not(depth + 1)?;
                return Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                    pos,
                });
            }
        }
        self.parse_comparison(depth + 1)
    }

    fn parse_comparison(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let lhs = self.parse_additive(depth + 1)?;
        let op = match self.peek().map(|s| (&s.token, s.pos)) {
            Some((Token::Eq, p)) => Some((BinaryOp::Eq, p)),
            Some((Token::Ne, p)) => Some((BinaryOp::Ne, p)),
            Some((Token::Lt, p)) => Some((BinaryOp::Lt, p)),
            Some((Token::Le, p)) => Some((BinaryOp::Le, p)),
            Some((Token::Gt, p)) => Some((BinaryOp::Gt, p)),
            Some((Token::Ge, p)) => Some((BinaryOp::Ge, p)),
            Some((Token::In, p)) => Some((BinaryOp::In, p)),
            _ => None,
        };
        match op {
            Some((op, pos)) => {
                self.cursor += 1;
                let rhs = self.parse_additive(depth + 1)?;
                // Comparisons do not chain: `a < b < c` is rejected.
                if let Some(s) = self.peek() {
                    if matches!(
                        s.token,
                        Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge | Token::In
                    ) {
                        return Err(ExprError::Parse {
                            pos: s.pos,
                            message: "comparisons cannot be chained".to_string(),
                        });
                    }
                }
                Ok(Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    pos,
                })
            }
            None => Ok(lhs),
        }
    }

    fn parse_additive(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let mut lhs = self.parse_multiplicative(depth + 1)?;
        loop {
            let op = match self.peek().map(|s| (&s.token, s.pos)) {
                Some((Token::Plus, p)) => Some((BinaryOp::Add, p)),
                Some((Token::Minus, p)) => Some((BinaryOp::Sub, p)),
                _ => None,
            };
            match op {
                Some((op, pos)) => {
                    self.cursor += 1;
                    let rhs = self.parse_multiplicative(depth + 1)?;
                    lhs = Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        pos,
                    };
                }
                None => return Ok(lhs),
            }
        }
    }

    fn parse_multiplicative(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let mut lhs = self.parse_unary(depth + 1)?;
        loop {
            let op = match self.peek().map(|s| (&s.token, s.pos)) {
                Some((Token::Star, p)) => Some((BinaryOp::Mul, p)),
                Some((Token::Slash, p)) => Some((BinaryOp::Div, p)),
                Some((Token::Percent, p)) => Some((BinaryOp::Rem, p)),
                _ => None,
            };
            match op {
                Some((op, pos)) => {
                    self.cursor += 1;
                    let rhs = self.parse_unary(depth + 1)?;
                    lhs = Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        pos,
                    };
                }
                None => return Ok(lhs),
            }
        }
    }

    fn parse_unary(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        if let Some(s) = self.peek() {
            if s.token == Token::Minus {
                let pos = s.pos;
                self.cursor += 1;
                let operand = self.parse_unary(depth + 1)?;
                return Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    pos,
                });
            }
        }
        self.parse_postfix(depth + 1)
    }

    fn parse_postfix(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let mut expr = self.parse_primary(depth + 1)?;
        loop {
            match self.peek().map(|s| (&s.token, s.pos)) {
                Some((Token::Dot, pos)) => {
                    self.cursor += 1;
                    let field = match self.advance() {
                        Some(Spanned { token: Token::Ident(name), .. }) => name,
                        Some(s) => {
                            return Err(ExprError::Parse {
                                pos: s.pos,
                                message: format!("expected field name after '.', found {:?}", s.token),
                            })
                        }
                        None => return Err(self.eof("field name after '.'")),
                    };
                    expr = Expr::Field {
                        base: Box::new(expr),
                        field,
                        pos,
                    };
                }
                Some((Token::LBracket, pos)) => {
                    self.cursor += 1;
                    let index = self.parse_or(depth + 1)?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                        pos,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let spanned = self.advance().ok_or_else(|| self.eof("expression"))?;
        match spanned.token {
            Token::Null => Ok(Expr::Null),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Float(f) => Ok(Expr::Float(f)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) => {
                // `name(...)` is a call, bare `name` an environment root.
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.parse_or(depth + 1)?);
                            if self.eat(&Token::Comma) {
                                continue;
                            }
                            self.expect(Token::RParen, "')' or ','")?;
                            break;
                        }
                    }
                    Ok(Expr::Call {
                        name,
                        args,
                        pos: spanned.pos,
                    })
                } else {
                    Ok(Expr::Ident {
                        name,
                        pos: spanned.pos,
                    })
                }
            }
            Token::LParen => {
                let inner = self.parse_or(depth + 1)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(ExprError::Parse {
                pos: spanned.pos,
                message: format!("unexpected token {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_over_or() {
        // a or b and c  ≡  a or (b and c)
        let expr = parse("a or b and c").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Or, rhs, .. } => match *rhs {
                Expr::Binary { op: BinaryOp::And, .. } => {}
                other => panic!("expected and on rhs, got {other:?}"),
            },
            other => panic!("expected or at root, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        // 1 + 2 * 3  ≡  1 + (2 * 3)
        let expr = parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => match *rhs {
                Expr::Binary { op: BinaryOp::Mul, .. } => {}
                other => panic!("expected mul on rhs, got {other:?}"),
            },
            other => panic!("expected add at root, got {other:?}"),
        }
    }

    #[test]
    fn field_and_index_access() {
        let expr = parse(r#"event.details["code"]"#).unwrap();
        match expr {
            Expr::Index { base, .. } => match *base {
                Expr::Field { ref field, .. } => assert_eq!(field, "details"),
                other => panic!("expected field base, got {other:?}"),
            },
            other => panic!("expected index at root, got {other:?}"),
        }
    }

    #[test]
    fn call_with_args() {
        let expr = parse(r#"contains(event.tags, "cross_border")"#).unwrap();
        match expr {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "contains");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn malformed_expressions_rejected() {
        assert!(parse("amount >").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("").is_err());
        assert!(parse("a < b < c").is_err());
    }

    #[test]
    fn depth_limit_enforced() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse(&deep), Err(ExprError::DepthExceeded));
    }
}
