//! # Compiler
//!
//! Turns a syntax tree into a [`Program`]:
//!
//! 1. **Resolve** identifiers against a [`Scope`] (variables become slots,
//!    constants become numbers).
//! 2. **Fold** constant sub-expressions. Folding goes through the same
//!    arithmetic as the evaluator and gives up on anything that would fail,
//!    so runtime errors are never hidden.
//! 3. **Emit** postfix operations, tracking the maximum stack depth.

use std::collections::HashMap;

use crate::ast::{bool_value, truthy, LogicalOp, Node, UnaryOp};
use crate::error::{ParseError, ParseResult, ScopeError};
use crate::program::{Op, Program};

/// Built-in constants, available in every scope.
const BUILTIN_CONSTANTS: [(&str, f64); 2] = [("pi", std::f64::consts::PI), ("e", std::f64::consts::E)];

fn builtin_constant(name: &str) -> Option<f64> {
    BUILTIN_CONSTANTS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, value)| *value)
}

/// The names an expression may reference.
///
/// Variables are assigned slots in declaration order; the slice passed to
/// [`Expression::evaluate`](crate::Expression::evaluate) must follow the
/// same order. Constants are substituted at compile time.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    variables: Vec<String>,
    constants: HashMap<String, f64>,
}

impl Scope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope declaring `names` as variables, in order.
    ///
    /// # Errors
    ///
    /// Returns error on a duplicate, reserved or malformed name.
    pub fn with_variables<I, S>(names: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut scope = Self::new();
        for name in names {
            scope.add_variable(name.as_ref())?;
        }
        Ok(scope)
    }

    /// Declares a variable and returns its slot.
    ///
    /// # Errors
    ///
    /// Returns error on a duplicate, reserved or malformed name.
    pub fn add_variable(&mut self, name: &str) -> Result<usize, ScopeError> {
        self.check_new_name(name)?;
        self.variables.push(name.to_string());
        Ok(self.variables.len() - 1)
    }

    /// Declares a named constant.
    ///
    /// # Errors
    ///
    /// Returns error on a duplicate, reserved or malformed name, or a
    /// non-finite value.
    pub fn add_constant(&mut self, name: &str, value: f64) -> Result<(), ScopeError> {
        self.check_new_name(name)?;
        if !value.is_finite() {
            return Err(ScopeError::NonFiniteConstant(name.to_string()));
        }
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    /// Returns the slot of a variable.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    /// Returns the value of a constant.
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<f64> {
        self.constants.get(name).copied()
    }

    /// Declared variables in slot order.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Number of variable slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns true if no variables are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn check_new_name(&self, name: &str) -> Result<(), ScopeError> {
        let mut chars = name.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(ScopeError::InvalidName(name.to_string()));
        }
        if builtin_constant(name).is_some() {
            return Err(ScopeError::Reserved(name.to_string()));
        }
        if self.slot(name).is_some() || self.constants.contains_key(name) {
            return Err(ScopeError::Duplicate(name.to_string()));
        }
        Ok(())
    }
}

/// Compiles against a closed scope: unknown identifiers are errors.
pub(crate) fn compile_closed(node: Node, scope: &Scope) -> ParseResult<Program> {
    let resolved = resolve(node, &mut |name, position| {
        if let Some(value) = scope.constant(name).or_else(|| builtin_constant(name)) {
            Ok(Node::Number(value))
        } else if let Some(slot) = scope.slot(name) {
            Ok(Node::Slot(slot))
        } else {
            Err(ParseError::UnknownVariable {
                name: name.to_string(),
                position,
            })
        }
    })?;
    Ok(emit(&fold(resolved), scope.len()))
}

/// Compiles against an open scope: unknown identifiers become new variables,
/// appended to `discovered` in order of first use.
pub(crate) fn compile_open(node: Node, discovered: &mut Vec<String>) -> ParseResult<Program> {
    let resolved = resolve(node, &mut |name, _| {
        if let Some(value) = builtin_constant(name) {
            return Ok(Node::Number(value));
        }
        let slot = match discovered.iter().position(|v| v == name) {
            Some(slot) => slot,
            None => {
                discovered.push(name.to_string());
                discovered.len() - 1
            }
        };
        Ok(Node::Slot(slot))
    })?;
    Ok(emit(&fold(resolved), discovered.len()))
}

fn resolve(
    node: Node,
    lookup: &mut dyn FnMut(&str, usize) -> ParseResult<Node>,
) -> ParseResult<Node> {
    Ok(match node {
        Node::Variable { name, position } => lookup(&name, position)?,
        Node::Unary { op, operand } => Node::Unary {
            op,
            operand: Box::new(resolve(*operand, lookup)?),
        },
        Node::Binary { op, lhs, rhs } => Node::Binary {
            op,
            lhs: Box::new(resolve(*lhs, lookup)?),
            rhs: Box::new(resolve(*rhs, lookup)?),
        },
        Node::Logical { op, lhs, rhs } => Node::Logical {
            op,
            lhs: Box::new(resolve(*lhs, lookup)?),
            rhs: Box::new(resolve(*rhs, lookup)?),
        },
        Node::Conditional {
            condition,
            then_branch,
            else_branch,
        } => Node::Conditional {
            condition: Box::new(resolve(*condition, lookup)?),
            then_branch: Box::new(resolve(*then_branch, lookup)?),
            else_branch: Box::new(resolve(*else_branch, lookup)?),
        },
        Node::Call { function, args } => Node::Call {
            function,
            args: args
                .into_iter()
                .map(|arg| resolve(arg, lookup))
                .collect::<ParseResult<Vec<_>>>()?,
        },
        other @ (Node::Number(_) | Node::Slot(_)) => other,
    })
}

/// Normalizes a node to 0/1, folding when it is already a number.
fn truthy_of(node: Node) -> Node {
    match node {
        Node::Number(value) => Node::Number(bool_value(truthy(value))),
        other => Node::Unary {
            op: UnaryOp::Truthy,
            operand: Box::new(other),
        },
    }
}

fn fold(node: Node) -> Node {
    match node {
        Node::Unary { op, operand } => {
            let operand = fold(*operand);
            if let Node::Number(value) = operand {
                if let Ok(result) = op.apply(value) {
                    return Node::Number(result);
                }
            }
            Node::Unary {
                op,
                operand: Box::new(operand),
            }
        }
        Node::Binary { op, lhs, rhs } => {
            let lhs = fold(*lhs);
            let rhs = fold(*rhs);
            if let (Node::Number(a), Node::Number(b)) = (&lhs, &rhs) {
                if let Ok(result) = op.apply(*a, *b) {
                    return Node::Number(result);
                }
            }
            Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }
        }
        Node::Logical { op, lhs, rhs } => {
            let lhs = fold(*lhs);
            let rhs = fold(*rhs);
            match (op, &lhs) {
                (LogicalOp::And, Node::Number(a)) if !truthy(*a) => Node::Number(0.0),
                (LogicalOp::Or, Node::Number(a)) if truthy(*a) => Node::Number(1.0),
                (_, Node::Number(_)) => truthy_of(rhs),
                _ => Node::Logical {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            }
        }
        Node::Conditional {
            condition,
            then_branch,
            else_branch,
        } => match fold(*condition) {
            Node::Number(value) if truthy(value) => fold(*then_branch),
            Node::Number(_) => fold(*else_branch),
            condition => Node::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(fold(*then_branch)),
                else_branch: Box::new(fold(*else_branch)),
            },
        },
        Node::Call { function, args } => {
            let args: Vec<Node> = args.into_iter().map(fold).collect();
            let constants: Option<Vec<f64>> = args
                .iter()
                .map(|arg| match arg {
                    Node::Number(value) => Some(*value),
                    _ => None,
                })
                .collect();
            if let Some(values) = constants {
                if let Ok(result) = function.apply(&values) {
                    return Node::Number(result);
                }
            }
            Node::Call { function, args }
        }
        other => other,
    }
}

struct Emitter {
    ops: Vec<Op>,
    depth: usize,
    max_depth: usize,
}

impl Emitter {
    fn push(&mut self, op: Op) {
        match op {
            Op::Const(_) | Op::Load(_) => self.depth += 1,
            Op::Binary(_) | Op::JumpIfFalse(_) => self.depth -= 1,
            Op::Call { argc, .. } => self.depth = self.depth + 1 - argc,
            Op::Unary(_) | Op::Jump(_) => {}
        }
        self.max_depth = self.max_depth.max(self.depth);
        self.ops.push(op);
    }

    /// Emits a jump with a placeholder target and returns its index.
    fn push_jump(&mut self, op: Op) -> usize {
        self.push(op);
        self.ops.len() - 1
    }

    fn patch(&mut self, at: usize) {
        let target = self.ops.len();
        match &mut self.ops[at] {
            Op::JumpIfFalse(t) | Op::Jump(t) => *t = target,
            _ => debug_assert!(false, "patching a non-jump"),
        }
    }

    fn emit(&mut self, node: &Node) {
        match node {
            Node::Number(value) => self.push(Op::Const(*value)),
            Node::Slot(slot) => self.push(Op::Load(*slot)),
            // Resolution replaced every variable; an unresolved one is NaN at run time.
            Node::Variable { .. } => self.push(Op::Const(f64::NAN)),
            Node::Unary { op, operand } => {
                self.emit(operand);
                self.push(Op::Unary(*op));
            }
            Node::Binary { op, lhs, rhs } => {
                self.emit(lhs);
                self.emit(rhs);
                self.push(Op::Binary(*op));
            }
            Node::Call { function, args } => {
                for arg in args {
                    self.emit(arg);
                }
                self.push(Op::Call {
                    function: *function,
                    argc: args.len(),
                });
            }
            Node::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.emit(condition);
                let to_else = self.push_jump(Op::JumpIfFalse(0));
                self.emit(then_branch);
                let to_end = self.push_jump(Op::Jump(0));
                self.depth -= 1;
                self.patch(to_else);
                self.emit(else_branch);
                self.patch(to_end);
            }
            Node::Logical { op, lhs, rhs } => {
                self.emit(lhs);
                let to_short = self.push_jump(Op::JumpIfFalse(0));
                match op {
                    LogicalOp::And => {
                        self.emit(rhs);
                        self.push(Op::Unary(UnaryOp::Truthy));
                        let to_end = self.push_jump(Op::Jump(0));
                        self.depth -= 1;
                        self.patch(to_short);
                        self.push(Op::Const(0.0));
                        self.patch(to_end);
                    }
                    LogicalOp::Or => {
                        self.push(Op::Const(1.0));
                        let to_end = self.push_jump(Op::Jump(0));
                        self.depth -= 1;
                        self.patch(to_short);
                        self.emit(rhs);
                        self.push(Op::Unary(UnaryOp::Truthy));
                        self.patch(to_end);
                    }
                }
            }
        }
    }
}

fn emit(node: &Node, slot_count: usize) -> Program {
    let mut emitter = Emitter {
        ops: Vec::new(),
        depth: 0,
        max_depth: 0,
    };
    emitter.emit(node);
    Program {
        ops: emitter.ops.into_boxed_slice(),
        max_stack: emitter.max_depth,
        slot_count,
    }
}
