//! Recursive-descent formula parser
//!
//! ```text
//! expr    := sign? term (('+' | '-') term)*
//! term    := power (('*' | '/') power)*
//! power   := primary ('^' primary)*
//! primary := number | identifier | name '(' args ')' | '(' expr ')'
//! args    := expr (',' expr)*
//! sign    := '+' | '-'
//! ```
//!
//! A sign is only accepted where an expression starts: at the beginning of the
//! formula, after `(` and after `,`. An operator directly after another
//! operator is malformed, so `2 * -3` must be written `2 * (-3)`.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{FormulaError, Result};
use crate::functions::Function;
use crate::lexer::{tokenize, Spanned, Token};

/// Parse a formula into an expression tree
pub fn parse(formula: &str) -> Result<Expr> {
    if formula.trim().is_empty() {
        return Err(FormulaError::EmptyFormula);
    }

    let tokens = tokenize(formula)?;
    let end = formula.chars().count();
    let mut parser = Parser {
        tokens,
        pos: 0,
        end,
    };

    let expr = parser.expr()?;
    if let Some(extra) = parser.peek() {
        return Err(FormulaError::malformed(
            extra.position,
            format!("unexpected {}", extra.token.describe()),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Character length of the formula, reported for errors at end of input
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.peek().map(|s| s.position).unwrap_or(self.end)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(s) if s.token == expected => Ok(()),
            Some(s) => Err(FormulaError::malformed(
                s.position,
                format!(
                    "expected {}, found {}",
                    expected.describe(),
                    s.token.describe()
                ),
            )),
            None => Err(FormulaError::malformed(
                self.end,
                format!("expected {}, found end of formula", expected.describe()),
            )),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let sign = match self.peek_token() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Plus) => Some(UnaryOp::Plus),
            _ => None,
        };
        if sign.is_some() {
            self.advance();
        }

        let first = self.term()?;
        let mut left = match sign {
            Some(op) => Expr::unary(op, first),
            None => first,
        };

        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.power()?;

        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.power()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn power(&mut self) -> Result<Expr> {
        let mut left = self.primary()?;

        while let Some(Token::Caret) = self.peek_token() {
            self.advance();
            let right = self.primary()?;
            left = Expr::binary(BinaryOp::Pow, left, right);
        }

        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr> {
        let position = self.position();
        let Some(spanned) = self.advance() else {
            return Err(FormulaError::malformed(
                position,
                "unexpected end of formula",
            ));
        };

        match spanned.token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Identifier(id) => Ok(Expr::Metric(id)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            },
            Token::Name(name) => self.call(name, spanned.position),
            other if other.is_operator() => Err(FormulaError::malformed(
                spanned.position,
                format!("operator {} follows another operator", other.describe()),
            )),
            other => Err(FormulaError::malformed(
                spanned.position,
                format!("unexpected {}", other.describe()),
            )),
        }
    }

    fn call(&mut self, name: String, position: usize) -> Result<Expr> {
        if self.peek_token() != Some(&Token::LParen) {
            return Err(FormulaError::malformed(
                position,
                format!("'{}' is not a metric identifier or function call", name),
            ));
        }
        let function = Function::from_name(&name).ok_or(FormulaError::UnknownFunction(name))?;
        self.advance();

        let mut args = Vec::new();
        if self.peek_token() == Some(&Token::RParen) {
            self.advance();
        } else {
            loop {
                args.push(self.expr()?);
                match self.advance() {
                    Some(Spanned {
                        token: Token::Comma,
                        ..
                    }) => continue,
                    Some(Spanned {
                        token: Token::RParen,
                        ..
                    }) => break,
                    Some(s) => {
                        return Err(FormulaError::malformed(
                            s.position,
                            format!("expected ',' or ')', found {}", s.token.describe()),
                        ))
                    },
                    None => {
                        return Err(FormulaError::malformed(
                            self.end,
                            format!("unclosed call to {}", function.name()),
                        ))
                    },
                }
            }
        }

        function.check_arity(args.len())?;
        Ok(Expr::call(function, args))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn render(formula: &str) -> String {
        parse(formula).unwrap().to_string()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(render("1 + 2 * 3"), "(1 + (2 * 3))");
        assert_eq!(render("2 * 3 ^ 2"), "(2 * (3 ^ 2))");
        assert_eq!(render("(1 + 2) * 3"), "((1 + 2) * 3)");
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(render("8 - 3 - 1"), "((8 - 3) - 1)");
        assert_eq!(render("8 / 4 / 2"), "((8 / 4) / 2)");
        assert_eq!(render("2 ^ 3 ^ 2"), "((2 ^ 3) ^ 2)");
    }

    #[test]
    fn test_leading_sign() {
        assert_eq!(render("-a.b.c + 1"), "((-a.b.c) + 1)");
        assert_eq!(render("2 * (-3)"), "(2 * (-3))");
        assert_eq!(render("max(-1, +2)"), "max((-1), 2)");
    }

    #[test]
    fn test_nested_calls() {
        assert_eq!(
            render("max(abs(a.b.c - 10), sqrt(a.b.d), 3)"),
            "max(abs((a.b.c - 10)), sqrt(a.b.d), 3)"
        );
    }

    #[test]
    fn test_doubled_operator() {
        let err = parse("a.b.c * / 2").unwrap_err();
        assert!(matches!(
            err,
            FormulaError::MalformedExpression { position: 8, .. }
        ));
        assert!(parse("2 * -3").is_err());
        assert!(parse("1 ++ 2").is_err());
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert!(matches!(
            parse("((1 + 2)"),
            Err(FormulaError::MalformedExpression { .. })
        ));
        assert!(matches!(
            parse("(1 + 2))"),
            Err(FormulaError::MalformedExpression { position: 7, .. })
        ));
    }

    #[test]
    fn test_function_errors() {
        assert_eq!(
            parse("round(1)"),
            Err(FormulaError::UnknownFunction("round".to_string()))
        );
        assert!(matches!(
            parse("min(1)"),
            Err(FormulaError::ArityMismatch { got: 1, .. })
        ));
        assert!(matches!(
            parse("abs()"),
            Err(FormulaError::ArityMismatch { got: 0, .. })
        ));
    }

    #[test]
    fn test_bare_name_rejected() {
        assert!(matches!(
            parse("speed + 1"),
            Err(FormulaError::MalformedExpression { position: 0, .. })
        ));
    }

    #[test]
    fn test_empty() {
        assert_eq!(parse(""), Err(FormulaError::EmptyFormula));
        assert_eq!(parse("  \t "), Err(FormulaError::EmptyFormula));
        assert!(parse("()").is_err());
    }

    #[test]
    fn test_trailing_operator() {
        assert!(matches!(
            parse("1 +"),
            Err(FormulaError::MalformedExpression { position: 3, .. })
        ));
    }
}
