//! Recursive-descent parser.
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, `== !=`, `< <= > >=`,
//! `+ -`, `* / %`, prefix `- + !`, `^` (right associative), primary.

use crate::ast::{BinaryOp, Function, LogicalOp, Node, UnaryOp};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{tokenize, Token, TokenKind};

/// Deepest nesting accepted before the parser gives up.
const MAX_DEPTH: usize = 200;

/// Parses expression text into a syntax tree.
pub(crate) fn parse(input: &str) -> ParseResult<Node> {
    let tokens = tokenize(input)?;
    if tokens.len() == 1 {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser {
        tokens,
        cursor: 0,
        depth: 0,
    };
    let node = parser.ternary()?;

    let trailing = parser.peek();
    match trailing.kind {
        TokenKind::Eof => Ok(node),
        TokenKind::RParen => Err(ParseError::UnbalancedParenthesis {
            position: trailing.position,
        }),
        _ => Err(ParseError::UnexpectedToken {
            found: trailing.text.clone(),
            expected: "operator or end of input",
            position: trailing.position,
        }),
    }
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token list always ends with Eof and the cursor never passes it.
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            ParseError::UnexpectedEnd {
                expected,
                position: token.position,
            }
        } else {
            ParseError::UnexpectedToken {
                found: token.text.clone(),
                expected,
                position: token.position,
            }
        }
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep {
                position: self.peek().position,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn ternary(&mut self) -> ParseResult<Node> {
        self.enter()?;
        let condition = self.logical_or()?;
        let node = if self.eat(TokenKind::Question) {
            let then_branch = self.ternary()?;
            if !self.eat(TokenKind::Colon) {
                return Err(self.unexpected(TokenKind::Colon.describe()));
            }
            let else_branch = self.ternary()?;
            Node::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            }
        } else {
            condition
        };
        self.leave();
        Ok(node)
    }

    fn logical_or(&mut self) -> ParseResult<Node> {
        let mut lhs = self.logical_and()?;
        while self.eat(TokenKind::OrOr) {
            let rhs = self.logical_and()?;
            lhs = Node::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> ParseResult<Node> {
        let mut lhs = self.equality()?;
        while self.eat(TokenKind::AndAnd) {
            let rhs = self.equality()?;
            lhs = Node::Logical {
                op: LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> ParseResult<Node> {
        self.binary_level(Self::comparison, |kind| match kind {
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::Ne => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn comparison(&mut self) -> ParseResult<Node> {
        self.binary_level(Self::additive, |kind| match kind {
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Le => Some(BinaryOp::Le),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn additive(&mut self) -> ParseResult<Node> {
        self.binary_level(Self::multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> ParseResult<Node> {
        self.binary_level(Self::unary, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    /// One left-associative precedence level.
    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> ParseResult<Node>,
        operator: fn(TokenKind) -> Option<BinaryOp>,
    ) -> ParseResult<Node> {
        let mut lhs = next(self)?;
        while let Some(op) = operator(self.peek().kind) {
            self.advance();
            let rhs = next(self)?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> ParseResult<Node> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Plus => None,
            _ => return self.power(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary()?;
        self.leave();
        Ok(match op {
            Some(op) => Node::Unary {
                op,
                operand: Box::new(operand),
            },
            None => operand,
        })
    }

    fn power(&mut self) -> ParseResult<Node> {
        let base = self.primary()?;
        if self.eat(TokenKind::Caret) {
            self.enter()?;
            // Right associative, and the exponent may carry its own sign: 2^-1.
            let exponent = self.unary()?;
            self.leave();
            return Ok(Node::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> ParseResult<Node> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Node::Number(value))
            }
            TokenKind::Ident => {
                self.advance();
                if self.peek().kind == TokenKind::LParen {
                    self.call(&token)
                } else {
                    Ok(Node::Variable {
                        name: token.text,
                        position: token.position,
                    })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.ternary()?;
                if !self.eat(TokenKind::RParen) {
                    if self.peek().kind == TokenKind::Eof {
                        return Err(ParseError::UnbalancedParenthesis {
                            position: token.position,
                        });
                    }
                    return Err(self.unexpected(TokenKind::RParen.describe()));
                }
                Ok(inner)
            }
            TokenKind::RParen => Err(ParseError::UnbalancedParenthesis {
                position: token.position,
            }),
            _ => Err(self.unexpected("number, identifier or '('")),
        }
    }

    fn call(&mut self, name: &Token) -> ParseResult<Node> {
        let function = Function::lookup(&name.text).ok_or_else(|| ParseError::UnknownFunction {
            name: name.text.clone(),
            position: name.position,
        })?;

        let open = self.advance();
        let mut args = Vec::new();
        if !self.eat(TokenKind::RParen) {
            loop {
                args.push(self.ternary()?);
                if self.eat(TokenKind::Comma) {
                    continue;
                }
                if self.eat(TokenKind::RParen) {
                    break;
                }
                if self.peek().kind == TokenKind::Eof {
                    return Err(ParseError::UnbalancedParenthesis {
                        position: open.position,
                    });
                }
                return Err(self.unexpected("',' or ')'"));
            }
        }

        if !function.arity().accepts(args.len()) {
            return Err(ParseError::WrongArity {
                name: name.text.clone(),
                expected: function.arity().describe(),
                found: args.len(),
                position: name.position,
            });
        }

        if function == Function::If {
            let mut args = args.clone().into_iter();
            if let (Some(condition), Some(then_branch), Some(else_branch)) =
                (args.next(), args.next(), args.next())
            {
                return Ok(Node::Conditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                });
            }
        }

        Ok(Node::Call { function, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Box<Node> {
        Box::new(Node::Number(v))
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        let node = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            node,
            Node::Binary {
                op: BinaryOp::Add,
                lhs: num(1.0),
                rhs: Box::new(Node::Binary {
                    op: BinaryOp::Mul,
                    lhs: num(2.0),
                    rhs: num(3.0),
                }),
            }
        );
    }

    #[test]
    fn test_power_is_right_associative_and_beats_negation() {
        let node = parse("-2^3^2").unwrap();
        assert_eq!(
            node,
            Node::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(Node::Binary {
                    op: BinaryOp::Pow,
                    lhs: num(2.0),
                    rhs: Box::new(Node::Binary {
                        op: BinaryOp::Pow,
                        lhs: num(3.0),
                        rhs: num(2.0),
                    }),
                }),
            }
        );
    }

    #[test]
    fn test_if_becomes_conditional() {
        let node = parse("if(1, 2, 3)").unwrap();
        assert!(matches!(node, Node::Conditional { .. }));
    }

    #[test]
    fn test_unclosed_parenthesis_points_at_opening() {
        assert_eq!(
            parse("(x + (y * 2)").unwrap_err(),
            ParseError::UnbalancedParenthesis { position: 0 }
        );
        assert_eq!(
            parse("max(x, 2").unwrap_err(),
            ParseError::UnbalancedParenthesis { position: 3 }
        );
    }

    #[test]
    fn test_stray_closing_parenthesis() {
        assert_eq!(
            parse("x + 1)").unwrap_err(),
            ParseError::UnbalancedParenthesis { position: 5 }
        );
    }

    #[test]
    fn test_unknown_function_and_arity() {
        assert_eq!(
            parse("2 * sine(x)").unwrap_err(),
            ParseError::UnknownFunction {
                name: "sine".into(),
                position: 4
            }
        );
        assert!(matches!(
            parse("clamp(x, 1)").unwrap_err(),
            ParseError::WrongArity { found: 2, position: 0, .. }
        ));
    }

    #[test]
    fn test_empty_and_dangling_operator() {
        assert_eq!(parse("   ").unwrap_err(), ParseError::Empty);
        assert_eq!(
            parse("x +").unwrap_err(),
            ParseError::UnexpectedEnd {
                expected: "number, identifier or '('",
                position: 3
            }
        );
        assert!(matches!(
            parse("x y").unwrap_err(),
            ParseError::UnexpectedToken { position: 2, .. }
        ));
    }

    #[test]
    fn test_ternary_missing_colon() {
        assert!(matches!(
            parse("x > 0 ? 1").unwrap_err(),
            ParseError::UnexpectedEnd { expected: "':'", .. }
        ));
    }

    #[test]
    fn test_deep_nesting_is_an_error_not_a_crash() {
        let text = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(matches!(parse(&text).unwrap_err(), ParseError::TooDeep { .. }));
    }
}
