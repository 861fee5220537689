//! # Expression Error Types
//!
//! Compile-time failures carry the character position of the offending
//! token. Runtime failures are small, cheap to construct and never panic.

use thiserror::Error;

/// Errors raised while compiling expression text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The text contains no tokens.
    #[error("empty expression")]
    Empty,

    /// A character that starts no token.
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter {
        /// The offending character.
        ch: char,
        /// Character offset (0-based).
        position: usize,
    },

    /// A numeric literal that does not parse.
    #[error("invalid number `{text}` at position {position}")]
    InvalidNumber {
        /// The literal as written.
        text: String,
        /// Character offset (0-based).
        position: usize,
    },

    /// A token that does not fit the grammar here.
    #[error("unexpected `{found}` at position {position}, expected {expected}")]
    UnexpectedToken {
        /// The token as written.
        found: String,
        /// What the parser was looking for.
        expected: &'static str,
        /// Character offset (0-based).
        position: usize,
    },

    /// Input ended in the middle of an expression.
    #[error("unexpected end of input at position {position}, expected {expected}")]
    UnexpectedEnd {
        /// What the parser was looking for.
        expected: &'static str,
        /// Character offset of the end of input.
        position: usize,
    },

    /// An opening parenthesis without its closing partner, or the reverse.
    #[error("unbalanced parenthesis at position {position}")]
    UnbalancedParenthesis {
        /// Character offset of the unmatched parenthesis.
        position: usize,
    },

    /// A call to a function that does not exist.
    #[error("unknown function `{name}` at position {position}")]
    UnknownFunction {
        /// Function name as written.
        name: String,
        /// Character offset (0-based).
        position: usize,
    },

    /// A call with the wrong number of arguments.
    #[error("function `{name}` takes {expected} argument(s), got {found} at position {position}")]
    WrongArity {
        /// Function name.
        name: String,
        /// Human-readable accepted arity (e.g. `2` or `2..=8`).
        expected: String,
        /// Number of arguments supplied.
        found: usize,
        /// Character offset of the function name.
        position: usize,
    },

    /// An identifier the scope does not define.
    #[error("unknown variable `{name}` at position {position}")]
    UnknownVariable {
        /// Variable name as written.
        name: String,
        /// Character offset (0-based).
        position: usize,
    },

    /// Nesting deeper than the parser accepts.
    #[error("expression nested too deeply at position {position}")]
    TooDeep {
        /// Character offset where the limit was hit.
        position: usize,
    },
}

impl ParseError {
    /// Character offset of the problem, if the error has one.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Empty => None,
            Self::UnexpectedCharacter { position, .. }
            | Self::InvalidNumber { position, .. }
            | Self::UnexpectedToken { position, .. }
            | Self::UnexpectedEnd { position, .. }
            | Self::UnbalancedParenthesis { position }
            | Self::UnknownFunction { position, .. }
            | Self::WrongArity { position, .. }
            | Self::UnknownVariable { position, .. }
            | Self::TooDeep { position } => Some(*position),
        }
    }
}

/// Errors raised while declaring a scope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The name is already declared as a variable or constant.
    #[error("`{0}` is declared twice")]
    Duplicate(String),

    /// The name collides with a built-in constant or function.
    #[error("`{0}` is reserved")]
    Reserved(String),

    /// The name is not a valid identifier.
    #[error("`{0}` is not a valid identifier")]
    InvalidName(String),

    /// A constant defined as NaN or an infinity.
    #[error("constant `{0}` is not finite")]
    NonFiniteConstant(String),
}

/// Errors raised while evaluating a compiled expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// `/`, `%` or `mod` with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,

    /// An operation produced NaN or an infinity.
    #[error("non-finite result {value}")]
    NonFinite {
        /// The offending value.
        value: f64,
    },

    /// A named binding is missing.
    #[error("undefined variable `{name}`")]
    UndefinedVariable {
        /// The missing name.
        name: String,
    },

    /// Fewer slot values than the expression's scope declares.
    #[error("expected {expected} variable slot(s), got {found}")]
    SlotCountMismatch {
        /// Slots declared by the scope.
        expected: usize,
        /// Slots supplied.
        found: usize,
    },
}

/// Result type for compilation.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_position() {
        let err = ParseError::UnknownFunction {
            name: "sine".into(),
            position: 4,
        };
        assert_eq!(err.to_string(), "unknown function `sine` at position 4");
        assert_eq!(err.position(), Some(4));
        assert_eq!(ParseError::Empty.position(), None);
    }
}
