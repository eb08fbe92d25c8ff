//! Schemer - a tree-walking interpreter for a small, lexically scoped Scheme.
//!
//! The pipeline has three stages:
//!
//! 1. The reader (`reader`) turns program text into syntax trees (`syntax`).
//! 2. The parser (`parser`) turns syntax trees into expression trees
//!    (`expr`), resolving in head position whether a name is a reserved
//!    form, a primitive operator, or an ordinary application. Bindings
//!    shadow reserved and primitive names, so the parser consults the
//!    current environment.
//! 3. The evaluator (`eval`) walks the expression tree against a chain of
//!    binding frames (`env`) and produces runtime values (`value`).
//!
//! The value universe covers exact integers and rationals (kept in lowest
//! terms), booleans, strings, symbols, mutable pairs, the empty list,
//! first-class procedures with captured environments, `#<void>`, and a
//! termination marker that tells the REPL (`repl`) to stop.
//!
//! ```scheme
//! scm> (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))
//! scm> (fact 5)
//! 120
//! scm> (+ 1/2 1/3)
//! 5/6
//! ```

use std::fmt;

/// Failure raised anywhere in the parse/eval pipeline.
///
/// Parse-time and eval-time failures share this single channel. The
/// evaluator never catches; the REPL catches exactly once per top-level
/// form, reports, and resumes reading.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Malformed syntactic form: wrong shape for a reserved form, a bad
    /// binding list, dotted-pair misuse inside `quote`, unreadable input.
    BadForm(String),
    /// Reference to a name with no binding and no primitive meaning.
    UnboundVariable(String),
    /// Wrong value kind for an operator, including application of a
    /// non-procedure.
    TypeError(String),
    /// Wrong number of arguments for a procedure or operator.
    ArityError {
        expected: usize,
        got: usize,
        /// Operator or form the count was checked against, when known.
        form: Option<String>,
    },
    DivisionByZero,
    /// 64-bit arithmetic left the representable range.
    Overflow(&'static str),
    /// Remaining evaluation failures (e.g. the `expt` domain errors).
    EvalError(String),
}

impl RuntimeError {
    /// Create an `ArityError` without form context.
    pub fn arity_error(expected: usize, got: usize) -> Self {
        RuntimeError::ArityError {
            expected,
            got,
            form: None,
        }
    }

    /// Attach form context to an `ArityError`; other variants pass through.
    pub fn in_form(self, form: &str) -> Self {
        match self {
            RuntimeError::ArityError { expected, got, .. } => RuntimeError::ArityError {
                expected,
                got,
                form: Some(form.to_string()),
            },
            other => other,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuntimeError::BadForm(msg) => write!(f, "bad form: {msg}"),
            RuntimeError::UnboundVariable(name) => write!(f, "unbound variable: {name}"),
            RuntimeError::TypeError(msg) => write!(f, "type error: {msg}"),
            RuntimeError::ArityError {
                expected,
                got,
                form: Some(form),
            } => write!(
                f,
                "arity error: {form} expected {expected} argument(s), got {got}"
            ),
            RuntimeError::ArityError {
                expected,
                got,
                form: None,
            } => write!(f, "arity error: expected {expected} argument(s), got {got}"),
            RuntimeError::DivisionByZero => write!(f, "division by zero"),
            RuntimeError::Overflow(op) => write!(f, "integer overflow in {op}"),
            RuntimeError::EvalError(msg) => write!(f, "{msg}"),
        }
    }
}

pub mod env;
pub mod eval;
pub mod expr;
pub mod ops;
pub mod parser;
pub mod reader;
pub mod repl;
pub mod syntax;
pub mod value;
