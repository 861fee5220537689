//! Syntax tree and the arithmetic shared by folding and evaluation.
//!
//! Every operator and built-in function is applied through the methods in
//! this module, so a constant folded at compile time produces exactly the
//! bits the evaluator would have produced at run time.

use crate::error::{EvalError, EvalResult};

/// Prefix operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
    /// Normalizes any value to `0` or `1`. Produced by the compiler only.
    Truthy,
}

impl UnaryOp {
    #[inline]
    pub(crate) fn apply(self, value: f64) -> EvalResult<f64> {
        Ok(match self {
            Self::Neg => -value,
            Self::Not => bool_value(!truthy(value)),
            Self::Truthy => bool_value(truthy(value)),
        })
    }
}

/// Infix operators that always evaluate both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    #[inline]
    pub(crate) fn apply(self, a: f64, b: f64) -> EvalResult<f64> {
        let value = match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => {
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                a / b
            }
            Self::Rem => {
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                a % b
            }
            Self::Pow => a.powf(b),
            Self::Lt => bool_value(a < b),
            Self::Le => bool_value(a <= b),
            Self::Gt => bool_value(a > b),
            Self::Ge => bool_value(a >= b),
            #[allow(clippy::float_cmp)]
            Self::Eq => bool_value(a == b),
            #[allow(clippy::float_cmp)]
            Self::Ne => bool_value(a != b),
        };
        finite(value)
    }
}

/// Short-circuiting operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
}

/// Accepted argument counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Arity {
    Exact(usize),
    Range(usize, usize),
}

impl Arity {
    pub(crate) const fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(n) => count == n,
            Self::Range(min, max) => count >= min && count <= max,
        }
    }

    pub(crate) fn describe(self) -> String {
        match self {
            Self::Exact(n) => n.to_string(),
            Self::Range(min, max) => format!("{min}..={max}"),
        }
    }
}

/// Most arguments any built-in accepts.
pub(crate) const MAX_ARGS: usize = 8;

/// Built-in functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Sqrt,
    Cbrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Trunc,
    Sign,
    Exp,
    Ln,
    Log2,
    Log10,
    Fract,
    Atan2,
    Pow,
    Min,
    Max,
    Hypot,
    Step,
    Mod,
    Clamp,
    Lerp,
    Smoothstep,
    /// Lazy conditional. Compiled like the ternary operator, never applied.
    If,
}

impl Function {
    /// Every built-in with its source name.
    pub(crate) const ALL: [(&'static str, Self); 33] = [
        ("sin", Self::Sin),
        ("cos", Self::Cos),
        ("tan", Self::Tan),
        ("asin", Self::Asin),
        ("acos", Self::Acos),
        ("atan", Self::Atan),
        ("sinh", Self::Sinh),
        ("cosh", Self::Cosh),
        ("tanh", Self::Tanh),
        ("sqrt", Self::Sqrt),
        ("cbrt", Self::Cbrt),
        ("abs", Self::Abs),
        ("floor", Self::Floor),
        ("ceil", Self::Ceil),
        ("round", Self::Round),
        ("trunc", Self::Trunc),
        ("sign", Self::Sign),
        ("exp", Self::Exp),
        ("ln", Self::Ln),
        ("log2", Self::Log2),
        ("log10", Self::Log10),
        ("fract", Self::Fract),
        ("atan2", Self::Atan2),
        ("pow", Self::Pow),
        ("min", Self::Min),
        ("max", Self::Max),
        ("hypot", Self::Hypot),
        ("step", Self::Step),
        ("mod", Self::Mod),
        ("clamp", Self::Clamp),
        ("lerp", Self::Lerp),
        ("smoothstep", Self::Smoothstep),
        ("if", Self::If),
    ];

    pub(crate) fn lookup(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, function)| *function)
    }

    pub(crate) const fn arity(self) -> Arity {
        match self {
            Self::Atan2 | Self::Pow | Self::Hypot | Self::Step | Self::Mod => Arity::Exact(2),
            Self::Min | Self::Max => Arity::Range(2, MAX_ARGS),
            Self::Clamp | Self::Lerp | Self::Smoothstep | Self::If => Arity::Exact(3),
            _ => Arity::Exact(1),
        }
    }

    /// Applies the function to already-evaluated arguments.
    ///
    /// `args.len()` has been checked against [`Function::arity`] at compile time.
    pub(crate) fn apply(self, args: &[f64]) -> EvalResult<f64> {
        let a = args.first().copied().unwrap_or(0.0);
        let b = args.get(1).copied().unwrap_or(0.0);
        let c = args.get(2).copied().unwrap_or(0.0);

        let value = match self {
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Asin => a.asin(),
            Self::Acos => a.acos(),
            Self::Atan => a.atan(),
            Self::Sinh => a.sinh(),
            Self::Cosh => a.cosh(),
            Self::Tanh => a.tanh(),
            Self::Sqrt => a.sqrt(),
            Self::Cbrt => a.cbrt(),
            Self::Abs => a.abs(),
            Self::Floor => a.floor(),
            Self::Ceil => a.ceil(),
            Self::Round => a.round(),
            Self::Trunc => a.trunc(),
            Self::Sign => {
                if a > 0.0 {
                    1.0
                } else if a < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Log2 => a.log2(),
            Self::Log10 => a.log10(),
            Self::Fract => a - a.floor(),
            Self::Atan2 => a.atan2(b),
            Self::Pow => a.powf(b),
            Self::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Hypot => a.hypot(b),
            Self::Step => bool_value(b >= a),
            Self::Mod => {
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                a.rem_euclid(b)
            }
            // `f64::clamp` panics when min > max; this never does.
            Self::Clamp => a.max(b).min(c),
            Self::Lerp => a + (b - a) * c,
            Self::Smoothstep => {
                let span = b - a;
                if span == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                let t = ((c - a) / span).max(0.0).min(1.0);
                t * t * (3.0 - 2.0 * t)
            }
            Self::If => {
                if truthy(a) {
                    b
                } else {
                    c
                }
            }
        };
        finite(value)
    }
}

/// Parsed syntax tree.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    Number(f64),
    /// Identifier before scope resolution.
    Variable { name: String, position: usize },
    /// Resolved variable slot.
    Slot(usize),
    Unary { op: UnaryOp, operand: Box<Node> },
    Binary { op: BinaryOp, lhs: Box<Node>, rhs: Box<Node> },
    Logical { op: LogicalOp, lhs: Box<Node>, rhs: Box<Node> },
    Conditional { condition: Box<Node>, then_branch: Box<Node>, else_branch: Box<Node> },
    Call { function: Function, args: Vec<Node> },
}

/// Non-zero is true.
#[inline]
pub(crate) fn truthy(value: f64) -> bool {
    value != 0.0
}

#[inline]
pub(crate) fn bool_value(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

#[inline]
pub(crate) fn finite(value: f64) -> EvalResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite { value })
    }
}
