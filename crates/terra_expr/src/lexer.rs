//! Tokenizer for expression text.
//!
//! Positions are character offsets so diagnostics line up with what the
//! author typed, even when the text contains non-ASCII characters.

use crate::error::{ParseError, ParseResult};

/// Token kinds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Ident,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    Question,
    Colon,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Eof,
}

impl TokenKind {
    /// Short description used in "expected" messages.
    pub(crate) const fn describe(self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Ident => "identifier",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::Comma => "','",
            Self::Colon => "':'",
            Self::Eof => "end of input",
            _ => "operator",
        }
    }
}

/// A token with its source text and character position.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) text: String,
    pub(crate) position: usize,
}

/// Splits the whole input into tokens, ending with `Eof`.
pub(crate) fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;

        if c.is_ascii_digit() || (c == '.' && chars.get(pos + 1).is_some_and(char::is_ascii_digit)) {
            pos = scan_number(&chars, pos);
            let text: String = chars[start..pos].iter().collect();
            let value = text.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                text: text.clone(),
                position: start,
            })?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                text,
                position: start,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while pos < chars.len() && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text: chars[start..pos].iter().collect(),
                position: start,
            });
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let (kind, width) = match (c, next) {
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('^', _) => (TokenKind::Caret, 1),
            ('?', _) => (TokenKind::Question, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('>', _) => (TokenKind::Gt, 1),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::Ne, 2),
            ('!', _) => (TokenKind::Bang, 1),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            _ => return Err(ParseError::UnexpectedCharacter { ch: c, position: start }),
        };
        pos += width;
        tokens.push(Token {
            kind,
            text: chars[start..pos].iter().collect(),
            position: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        position: chars.len(),
    });
    Ok(tokens)
}

/// Consumes `digits [. digits] [e [+-] digits]` and returns the end offset.
///
/// The exponent is only taken when digits follow it, so `2e` lexes as the
/// number `2` followed by the identifier `e`.
fn scan_number(chars: &[char], mut pos: usize) -> usize {
    let digits = |chars: &[char], mut p: usize| {
        while p < chars.len() && chars[p].is_ascii_digit() {
            p += 1;
        }
        p
    };

    pos = digits(chars, pos);
    if chars.get(pos) == Some(&'.') {
        pos = digits(chars, pos + 1);
    }
    if matches!(chars.get(pos), Some('e' | 'E')) {
        let mut exp = pos + 1;
        if matches!(chars.get(exp), Some('+' | '-')) {
            exp += 1;
        }
        if chars.get(exp).is_some_and(char::is_ascii_digit) {
            pos = digits(chars, exp);
        }
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 .5 2.5e-3 4E2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(0.5),
                TokenKind::Number(0.0025),
                TokenKind::Number(400.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_dangling_exponent_is_identifier() {
        assert_eq!(
            kinds("2e"),
            vec![TokenKind::Number(2.0), TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("a<=b&&c!=d||!e"),
            vec![
                TokenKind::Ident,
                TokenKind::Le,
                TokenKind::Ident,
                TokenKind::AndAnd,
                TokenKind::Ident,
                TokenKind::Ne,
                TokenKind::Ident,
                TokenKind::OrOr,
                TokenKind::Bang,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_are_char_offsets() {
        let tokens = tokenize("é + x").unwrap_err();
        assert_eq!(tokens, ParseError::UnexpectedCharacter { ch: 'é', position: 0 });

        let tokens = tokenize("x  +   y").unwrap();
        assert_eq!(tokens[1].position, 3);
        assert_eq!(tokens[2].position, 7);
        assert_eq!(tokens[3].position, 8);
    }

    #[test]
    fn test_single_equals_rejected() {
        assert_eq!(
            tokenize("x = 1").unwrap_err(),
            ParseError::UnexpectedCharacter { ch: '=', position: 2 }
        );
    }
}
