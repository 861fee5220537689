//! # Compiled Expressions
//!
//! [`Expression`] is the public face of the engine: compile once from text,
//! then evaluate as many times as needed from any number of threads.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::compiler::{compile_closed, compile_open, Scope};
use crate::error::{EvalError, EvalResult, ParseResult};
use crate::parser::parse;
use crate::program::{Evaluator, Program};

/// A compiled expression.
///
/// Immutable and cheap to clone; every clone shares the same program.
/// Evaluation is a pure function of the slot values.
///
/// # Example
///
/// ```
/// use terra_expr::{Expression, Scope};
///
/// let scope = Scope::with_variables(["x", "z"]).unwrap();
/// let expr = Expression::compile("64 + 8 * sin(x / 16) * cos(z / 16)", &scope).unwrap();
/// assert_eq!(expr.evaluate(&[0.0, 0.0]), Ok(64.0));
/// ```
#[derive(Clone)]
pub struct Expression {
    source: Arc<str>,
    variables: Arc<[String]>,
    program: Arc<Program>,
}

impl Expression {
    /// Compiles `text` against a closed scope.
    ///
    /// # Arguments
    ///
    /// * `text` - Expression source
    /// * `scope` - Variables (slot order) and named constants
    ///
    /// # Errors
    ///
    /// Returns a positioned [`ParseError`](crate::ParseError) for malformed
    /// text, unknown functions, wrong arity or identifiers the scope does
    /// not define.
    pub fn compile(text: &str, scope: &Scope) -> ParseResult<Self> {
        let program = compile_closed(parse(text)?, scope)?;
        Ok(Self {
            source: Arc::from(text),
            variables: Arc::from(scope.variables()),
            program: Arc::new(program),
        })
    }

    /// Compiles `text`, treating every unknown identifier as a variable.
    ///
    /// Slots are assigned in order of first appearance; see
    /// [`Expression::variables`].
    ///
    /// # Errors
    ///
    /// Returns a positioned [`ParseError`](crate::ParseError) for malformed text.
    pub fn parse(text: &str) -> ParseResult<Self> {
        let mut discovered = Vec::new();
        let program = compile_open(parse(text)?, &mut discovered)?;
        Ok(Self {
            source: Arc::from(text),
            variables: Arc::from(discovered),
            program: Arc::new(program),
        })
    }

    /// Evaluates with slot values in scope order.
    ///
    /// Allocates a scratch stack; use [`Expression::evaluate_with`] on hot paths.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] on division by zero, a non-finite value or too
    /// few slots.
    pub fn evaluate(&self, slots: &[f64]) -> EvalResult<f64> {
        let mut evaluator = Evaluator::with_capacity(self.program.max_stack);
        self.evaluate_with(&mut evaluator, slots)
    }

    /// Evaluates reusing the evaluator's stack.
    ///
    /// # Errors
    ///
    /// Same as [`Expression::evaluate`].
    #[inline]
    pub fn evaluate_with(&self, evaluator: &mut Evaluator, slots: &[f64]) -> EvalResult<f64> {
        self.program.run(evaluator.stack(), slots)
    }

    /// Evaluates with named bindings.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::UndefinedVariable`] for the first variable
    /// missing from `bindings`, otherwise as [`Expression::evaluate`].
    pub fn evaluate_map(&self, bindings: &HashMap<String, f64>) -> EvalResult<f64> {
        let slots = self
            .variables
            .iter()
            .map(|name| {
                bindings
                    .get(name)
                    .copied()
                    .ok_or_else(|| EvalError::UndefinedVariable { name: name.clone() })
            })
            .collect::<EvalResult<Vec<f64>>>()?;
        self.evaluate(&slots)
    }

    /// The text this expression was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names in slot order.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The value, if the whole expression folded to a constant.
    #[must_use]
    pub fn as_constant(&self) -> Option<f64> {
        self.program.as_constant()
    }

    /// Number of operations in the compiled program.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.program.ops.len()
    }

    /// Stack depth the program needs.
    #[must_use]
    pub fn max_stack(&self) -> usize {
        self.program.max_stack
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .field("variables", &self.variables)
            .field("ops", &self.program.ops.len())
            .finish()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
