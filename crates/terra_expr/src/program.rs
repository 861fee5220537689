//! # Stack Program
//!
//! The compiled form of an expression: a flat list of postfix operations
//! with forward jumps for the lazy branches (`?:`, `if`, `&&`, `||`).
//!
//! ## Hot Path
//!
//! [`Evaluator`] owns the value stack. Its capacity is grown to the
//! program's pre-computed maximum depth once, after which evaluation does
//! not touch the allocator.

use crate::ast::{truthy, BinaryOp, Function, UnaryOp, MAX_ARGS};
use crate::error::{EvalError, EvalResult};

/// One postfix operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Op {
    Const(f64),
    Load(usize),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Call { function: Function, argc: usize },
    /// Pops the condition; jumps when it is false.
    JumpIfFalse(usize),
    Jump(usize),
}

/// A compiled, immutable program.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Program {
    pub(crate) ops: Box<[Op]>,
    pub(crate) max_stack: usize,
    pub(crate) slot_count: usize,
}

impl Program {
    /// Returns the value if the program is a single constant.
    pub(crate) fn as_constant(&self) -> Option<f64> {
        match &*self.ops {
            [Op::Const(value)] => Some(*value),
            _ => None,
        }
    }

    /// Runs the program against `slots`.
    pub(crate) fn run(&self, stack: &mut Vec<f64>, slots: &[f64]) -> EvalResult<f64> {
        if slots.len() < self.slot_count {
            return Err(EvalError::SlotCountMismatch {
                expected: self.slot_count,
                found: slots.len(),
            });
        }

        stack.clear();
        if stack.capacity() < self.max_stack {
            stack.reserve(self.max_stack);
        }

        let mut pc = 0;
        while pc < self.ops.len() {
            match self.ops[pc] {
                Op::Const(value) => stack.push(value),
                Op::Load(slot) => {
                    let value = slots[slot];
                    if !value.is_finite() {
                        return Err(EvalError::NonFinite { value });
                    }
                    stack.push(value);
                }
                Op::Unary(op) => {
                    let value = pop(stack);
                    stack.push(op.apply(value)?);
                }
                Op::Binary(op) => {
                    let rhs = pop(stack);
                    let lhs = pop(stack);
                    stack.push(op.apply(lhs, rhs)?);
                }
                Op::Call { function, argc } => {
                    let mut args = [0.0; MAX_ARGS];
                    let argc = argc.min(MAX_ARGS);
                    for arg in args[..argc].iter_mut().rev() {
                        *arg = pop(stack);
                    }
                    stack.push(function.apply(&args[..argc])?);
                }
                Op::JumpIfFalse(target) => {
                    if !truthy(pop(stack)) {
                        pc = target;
                        continue;
                    }
                }
                Op::Jump(target) => {
                    pc = target;
                    continue;
                }
            }
            pc += 1;
        }

        let result = pop(stack);
        if result.is_finite() {
            Ok(result)
        } else {
            Err(EvalError::NonFinite { value: result })
        }
    }
}

/// Pops a value. Well-formed programs never underflow; if one did, the NaN
/// surfaces as [`EvalError::NonFinite`] instead of a panic.
#[inline]
fn pop(stack: &mut Vec<f64>) -> f64 {
    debug_assert!(!stack.is_empty(), "stack underflow in compiled program");
    stack.pop().unwrap_or(f64::NAN)
}

/// Reusable evaluation scratch space.
///
/// Keep one per worker thread (or per chunk) and pass it to
/// [`Expression::evaluate_with`](crate::Expression::evaluate_with).
#[derive(Debug, Default)]
pub struct Evaluator {
    stack: Vec<f64>,
}

impl Evaluator {
    /// Creates an evaluator with an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an evaluator with room for `depth` values.
    #[must_use]
    pub fn with_capacity(depth: usize) -> Self {
        Self {
            stack: Vec::with_capacity(depth),
        }
    }

    pub(crate) fn stack(&mut self) -> &mut Vec<f64> {
        &mut self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_skips_untaken_branch() {
        // 0 ? 1/0 : 7
        let program = Program {
            ops: vec![
                Op::Const(0.0),
                Op::JumpIfFalse(6),
                Op::Const(1.0),
                Op::Const(0.0),
                Op::Binary(BinaryOp::Div),
                Op::Jump(7),
                Op::Const(7.0),
            ]
            .into_boxed_slice(),
            max_stack: 2,
            slot_count: 0,
        };
        let mut stack = Vec::new();
        assert_eq!(program.run(&mut stack, &[]), Ok(7.0));
    }

    #[test]
    fn test_missing_slots_reported() {
        let program = Program {
            ops: vec![Op::Load(2)].into_boxed_slice(),
            max_stack: 1,
            slot_count: 3,
        };
        let mut stack = Vec::new();
        assert_eq!(
            program.run(&mut stack, &[1.0]),
            Err(EvalError::SlotCountMismatch {
                expected: 3,
                found: 1
            })
        );
    }

    #[test]
    fn test_non_finite_binding_rejected() {
        let program = Program {
            ops: vec![Op::Load(0)].into_boxed_slice(),
            max_stack: 1,
            slot_count: 1,
        };
        let mut stack = Vec::new();
        assert!(matches!(
            program.run(&mut stack, &[f64::NAN]),
            Err(EvalError::NonFinite { .. })
        ));
    }
}
