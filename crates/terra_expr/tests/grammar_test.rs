//! # Grammar and Evaluation Tests
//!
//! Exercises the public API end to end: precedence, lazy branches,
//! runtime error policy, diagnostics and thread-safe reuse.

use std::thread;

use terra_expr::{EvalError, Evaluator, Expression, ParseError, Scope};

fn eval(text: &str) -> f64 {
    Expression::parse(text)
        .unwrap_or_else(|e| panic!("{text}: {e}"))
        .evaluate(&[])
        .unwrap_or_else(|e| panic!("{text}: {e}"))
}

fn eval_x(text: &str, x: f64) -> Result<f64, EvalError> {
    let scope = Scope::with_variables(["x"]).unwrap();
    Expression::compile(text, &scope).unwrap().evaluate(&[x])
}

#[test]
fn test_operator_precedence() {
    let cases = [
        ("2 + 3 * 4", 14.0),
        ("(2 + 3) * 4", 20.0),
        ("10 - 4 - 3", 3.0),
        ("7 % 3", 1.0),
        ("-2^2", -4.0),
        ("2^-1", 0.5),
        ("2^3^2", 512.0),
        ("1 < 2 == 1", 1.0),
        ("1 || 0 && 0", 1.0),
        ("0 ? 1 : 0 ? 2 : 3", 3.0),
        ("!0 + !!5", 2.0),
        ("1e2 + .5", 100.5),
        ("+3", 3.0),
    ];
    for (text, expected) in cases {
        assert!((eval(text) - expected).abs() < 1e-12, "{text}");
    }
}

#[test]
fn test_builtin_functions() {
    let cases = [
        ("max(1, 5, 3, -2)", 5.0),
        ("min(4, 2)", 2.0),
        ("clamp(15, 0, 10)", 10.0),
        ("lerp(0, 10, 0.25)", 2.5),
        ("smoothstep(0, 1, 0.5)", 0.5),
        ("step(0.5, 0.7)", 1.0),
        ("mod(-1, 16)", 15.0),
        ("hypot(3, 4)", 5.0),
        ("sign(-3)", -1.0),
        ("fract(2.75)", 0.75),
        ("floor(-1.5) + ceil(1.2)", 0.0),
        ("cos(pi)", -1.0),
        ("ln(e)", 1.0),
    ];
    for (text, expected) in cases {
        assert!((eval(text) - expected).abs() < 1e-12, "{text}");
    }
}

#[test]
fn test_untaken_branches_are_not_evaluated() {
    assert_eq!(eval_x("x != 0 ? 1 / x : 0", 0.0), Ok(0.0));
    assert_eq!(eval_x("x != 0 && 1 / x > 1", 0.0), Ok(0.0));
    assert_eq!(eval_x("x == 0 || 1 / x > 0", 0.0), Ok(1.0));
    assert_eq!(eval_x("if(x, 1 / x, 42)", 0.0), Ok(42.0));
    assert_eq!(eval_x("if(x, 1 / x, 42)", 4.0), Ok(0.25));
}

#[test]
fn test_runtime_errors() {
    assert_eq!(eval_x("1 / x", 0.0), Err(EvalError::DivisionByZero));
    assert_eq!(eval_x("x % 0", 3.0), Err(EvalError::DivisionByZero));
    assert!(matches!(eval_x("sqrt(x)", -1.0), Err(EvalError::NonFinite { .. })));
    assert!(matches!(eval_x("x ^ 2000", 10.0), Err(EvalError::NonFinite { .. })));

    // Constant sub-expressions that fail are left for run time.
    let expr = Expression::parse("ln(0)").unwrap();
    assert_eq!(expr.as_constant(), None);
    assert!(matches!(expr.evaluate(&[]), Err(EvalError::NonFinite { .. })));
}

#[test]
fn test_diagnostics_carry_positions() {
    let cases: [(&str, usize); 6] = [
        ("x + * 2", 4),
        ("x + @", 4),
        ("sin(x", 3),
        ("foo(1) + x", 0),
        ("1 + pow(1)", 4),
        ("(x))", 3),
    ];
    for (text, position) in cases {
        let err = Expression::parse(text).unwrap_err();
        assert_eq!(err.position(), Some(position), "{text}: {err}");
    }
    assert!(matches!(
        Expression::parse("x + @").unwrap_err(),
        ParseError::UnexpectedCharacter { ch: '@', .. }
    ));
}

#[test]
fn test_closed_scope_rejects_unknown_names() {
    let scope = Scope::with_variables(["x", "y", "z"]).unwrap();
    let err = Expression::compile("y - height", &scope).unwrap_err();
    assert_eq!(
        err,
        ParseError::UnknownVariable {
            name: "height".into(),
            position: 4
        }
    );
}

#[test]
fn test_evaluation_is_pure_across_threads() {
    let scope = Scope::with_variables(["x", "y", "z"]).unwrap();
    let expr = Expression::compile(
        "64 + 8 * sin(x / 16) * cos(z / 16) - y + (y < 20 ? 3 : 0)",
        &scope,
    )
    .unwrap();

    let reference: Vec<f64> = (0..1_000)
        .map(|i| {
            let i = f64::from(i);
            expr.evaluate(&[i, i * 0.25, -i]).unwrap()
        })
        .collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let expr = expr.clone();
            thread::spawn(move || {
                let mut evaluator = Evaluator::new();
                (0..1_000)
                    .map(|i| {
                        let i = f64::from(i);
                        expr.evaluate_with(&mut evaluator, &[i, i * 0.25, -i]).unwrap()
                    })
                    .collect::<Vec<f64>>()
            })
        })
        .collect();

    for handle in handles {
        let values = handle.join().unwrap();
        assert!(values
            .iter()
            .zip(&reference)
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }
}

#[test]
fn test_folding_shrinks_programs() {
    let folded = Expression::parse("2 * pi * 10 + x").unwrap();
    // Const, Load, Add
    assert_eq!(folded.op_count(), 3);
    assert_eq!(folded.variables(), ["x".to_string()]);
}
