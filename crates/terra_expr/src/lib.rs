//! # TERRA Expression Engine
//!
//! Compiles terrain formulas such as `64 + 12 * hills - abs(y - 64) / 4`
//! into a compact stack program and evaluates them per sample point.
//!
//! ## Design Principles
//!
//! 1. **Compile once**: parse, resolve and fold at load time
//! 2. **Pure evaluation**: same program + same slot values = same bits
//! 3. **No panics**: division by zero and NaN are reported as [`EvalError`]
//! 4. **Leaf crate**: knows nothing about chunks, noise or biomes
//!
//! ## Grammar
//!
//! Precedence, lowest first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | 1 | `c ? a : b` (right associative) |
//! | 2 | `\|\|` |
//! | 3 | `&&` |
//! | 4 | `==` `!=` |
//! | 5 | `<` `<=` `>` `>=` |
//! | 6 | `+` `-` |
//! | 7 | `*` `/` `%` |
//! | 8 | prefix `-` `+` `!` |
//! | 9 | `^` (right associative, so `-2^2 = -4`) |
//!
//! Non-zero is true; comparisons and logic yield `1` or `0`. `&&`, `||`,
//! `?:` and `if(c, a, b)` only evaluate the branch they take.
//!
//! ## Example
//!
//! ```
//! use terra_expr::{Evaluator, Expression, Scope};
//!
//! let mut scope = Scope::with_variables(["x", "y", "z"]).unwrap();
//! scope.add_constant("sea", 62.0).unwrap();
//!
//! let density = Expression::compile("sea - y + 4 * sin(x / 10)", &scope).unwrap();
//! let mut evaluator = Evaluator::new();
//! assert_eq!(density.evaluate_with(&mut evaluator, &[0.0, 60.0, 0.0]), Ok(2.0));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

mod ast;
mod compiler;
pub mod error;
mod expression;
mod lexer;
mod parser;
mod program;

pub use compiler::Scope;
pub use error::{EvalError, EvalResult, ParseError, ParseResult, ScopeError};
pub use expression::Expression;
pub use program::Evaluator;

/// Names of every built-in function.
#[must_use]
pub fn function_names() -> impl Iterator<Item = &'static str> {
    ast::Function::ALL.iter().map(|(name, _)| *name)
}
