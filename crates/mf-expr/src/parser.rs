//! Expression parser using Pratt parsing (precedence climbing).
//!
//! Binding powers, lowest to highest: `+ -`, `* /`, unary `-`, `^`.
//! `^` is right-associative, so `-a^2` parses as `-(a^2)`.

use std::ops::Range;

use logos::Logos;

use crate::ast::{BinOp, Expr, Func};
use crate::error::{ExprError, ExprResult};
use crate::lexer::Token;

const PREFIX_BP: u8 = 5;

/// Parse rule text into an expression tree.
pub fn parse(source: &str) -> ExprResult<Expr> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expr(0)?;
    if let Some((token, span)) = parser.peek() {
        return Err(ExprError::Parse {
            message: format!("unexpected trailing token '{token}'"),
            offset: span.start,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(source: &str) -> ExprResult<Self> {
        let mut lexer = Token::lexer(source);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next() {
            match token {
                Ok(token) => tokens.push((token, lexer.span())),
                Err(()) => {
                    return Err(ExprError::Parse {
                        message: format!("unrecognized input '{}'", lexer.slice()),
                        offset: lexer.span().start,
                    });
                }
            }
        }
        if tokens.is_empty() {
            return Err(ExprError::Parse {
                message: "empty expression".to_string(),
                offset: 0,
            });
        }
        Ok(Self {
            tokens,
            pos: 0,
            end: source.len(),
        })
    }

    fn peek(&self) -> Option<(&Token, Range<usize>)> {
        self.tokens.get(self.pos).map(|(t, s)| (t, s.clone()))
    }

    fn advance(&mut self) -> Option<(Token, Range<usize>)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn error_here(&self, message: impl Into<String>) -> ExprError {
        let offset = self.peek().map(|(_, s)| s.start).unwrap_or(self.end);
        ExprError::Parse {
            message: message.into(),
            offset,
        }
    }

    fn expect(&mut self, expected: Token) -> ExprResult<()> {
        match self.peek() {
            Some((token, _)) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some((token, _)) => {
                let message = format!("expected '{expected}', found '{token}'");
                Err(self.error_here(message))
            }
            None => Err(self.error_here(format!("expected '{expected}', found end of input"))),
        }
    }

    fn expr(&mut self, min_bp: u8) -> ExprResult<Expr> {
        let mut lhs = self.prefix()?;

        loop {
            let op = match self.peek() {
                Some((Token::Plus, _)) => BinOp::Add,
                Some((Token::Minus, _)) => BinOp::Sub,
                Some((Token::Star, _)) => BinOp::Mul,
                Some((Token::Slash, _)) => BinOp::Div,
                Some((Token::Caret, _)) => BinOp::Pow,
                _ => break,
            };
            let (l_bp, r_bp) = infix_binding_power(op);
            if l_bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(r_bp)?;
            lhs = Expr::binary(op, lhs, rhs);
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> ExprResult<Expr> {
        let Some((token, span)) = self.advance() else {
            return Err(self.error_here("unexpected end of input"));
        };
        match token {
            Token::Number(v) => Ok(Expr::Num(v)),
            Token::Ident(name) => {
                if matches!(self.peek(), Some((Token::LParen, _))) {
                    self.call(name, span.start)
                } else {
                    Ok(Expr::Sym(name))
                }
            }
            Token::Minus => Ok(Expr::Neg(Box::new(self.expr(PREFIX_BP)?))),
            Token::Plus => self.expr(PREFIX_BP),
            Token::LParen => {
                let inner = self.expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(ExprError::Parse {
                message: format!("unexpected token '{other}'"),
                offset: span.start,
            }),
        }
    }

    fn call(&mut self, name: String, offset: usize) -> ExprResult<Expr> {
        let func = Func::from_name(&name).ok_or_else(|| ExprError::Parse {
            message: format!("unknown function '{name}'"),
            offset,
        })?;
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if !matches!(self.peek(), Some((Token::RParen, _))) {
            loop {
                args.push(self.expr(0)?);
                if matches!(self.peek(), Some((Token::Comma, _))) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        if args.len() != func.arity() {
            return Err(ExprError::Parse {
                message: format!(
                    "function '{}' takes {} argument(s), got {}",
                    func.name(),
                    func.arity(),
                    args.len()
                ),
                offset,
            });
        }
        Ok(Expr::Call { func, args })
    }
}

fn infix_binding_power(op: BinOp) -> (u8, u8) {
    match op {
        BinOp::Add | BinOp::Sub => (1, 2),
        BinOp::Mul | BinOp::Div => (3, 4),
        BinOp::Pow => (7, 6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Expr {
        Expr::Num(v)
    }

    #[test]
    fn parses_precedence() {
        let expr = parse("a + b * c").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinOp::Add,
                Expr::sym("a"),
                Expr::binary(BinOp::Mul, Expr::sym("b"), Expr::sym("c"))
            )
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        let expr = parse("a - b - c").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinOp::Sub,
                Expr::binary(BinOp::Sub, Expr::sym("a"), Expr::sym("b")),
                Expr::sym("c")
            )
        );
    }

    #[test]
    fn unary_minus_binds_looser_than_power() {
        let expr = parse("-x^2").unwrap();
        assert_eq!(
            expr,
            Expr::Neg(Box::new(Expr::binary(BinOp::Pow, Expr::sym("x"), num(2.0))))
        );
    }

    #[test]
    fn unary_plus_is_dropped() {
        assert_eq!(parse("+k").unwrap(), Expr::sym("k"));
    }

    #[test]
    fn parses_function_calls() {
        let expr = parse("max(0, a - b)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                func: Func::Max,
                args: vec![
                    num(0.0),
                    Expr::binary(BinOp::Sub, Expr::sym("a"), Expr::sym("b"))
                ],
            }
        );
    }

    #[test]
    fn rejects_unknown_function() {
        let err = parse("foo(a)").unwrap_err();
        assert!(matches!(err, ExprError::Parse { offset: 0, .. }));
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(parse("exp(a, b)").is_err());
        assert!(parse("pow(a)").is_err());
    }

    #[test]
    fn rejects_trailing_tokens() {
        let err = parse("a b").unwrap_err();
        assert_eq!(
            err,
            ExprError::Parse {
                message: "unexpected trailing token 'b'".to_string(),
                offset: 2,
            }
        );
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(parse("(a + b").is_err());
        assert!(parse("a + b)").is_err());
    }

    #[test]
    fn rejects_overflowing_literal() {
        let err = parse("k * 1e999").unwrap_err();
        assert_eq!(
            err,
            ExprError::Parse {
                message: "unrecognized input '1e999'".to_string(),
                offset: 4,
            }
        );
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse("   ").is_err());
    }

    #[test]
    fn rejects_dangling_operator() {
        let err = parse("a *").unwrap_err();
        assert_eq!(
            err,
            ExprError::Parse {
                message: "unexpected end of input".to_string(),
                offset: 3,
            }
        );
    }
}
