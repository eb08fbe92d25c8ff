//! The read-eval-print loop.
//!
//! One iteration reads a complete form (growing the buffer across lines
//! when a list or string is still open), parses and evaluates it in the
//! persistent global environment, then prints under the policy below.
//! Every [`RuntimeError`] is caught here, reported, and the loop resumes;
//! the terminate value or end of input stops it with a clean exit.
//!
//! Printing policy for the value of a top-level form:
//!
//! - void prints nothing - unless the form is syntactically an explicit
//!   `void` invocation (looking through `begin` tails, both `if`
//!   branches and `cond` clause tails), which prints `#<void>`;
//! - any other value prints nothing when the form is syntactically a
//!   `display` invocation (same look-through), since the `display`
//!   already wrote;
//! - otherwise the value's textual form prints on its own line.
//!
//! When stdin is a terminal the loop prompts with `scm> ` and prints the
//! error's own message before the `RuntimeError` line.

use std::io::{self, BufRead, IsTerminal, Write};

use crate::RuntimeError;
use crate::env::Env;
use crate::eval::eval;
use crate::expr::Expr;
use crate::ops::PrimOp;
use crate::parser::parse;
use crate::reader::{ReadResult, read_syntax};
use crate::value::Value;

/// True when the expression is an explicit `void` invocation, looking
/// through begin tails, if branches, and cond clause tails.
fn is_explicit_void_call(expr: &Expr) -> bool {
    match expr {
        Expr::VoidLit | Expr::Prim { op: PrimOp::MakeVoid, .. } => true,
        Expr::Apply { rator, .. } => matches!(rator.as_ref(), Expr::Var(name) if name == "void"),
        Expr::Begin(exprs) => exprs.last().is_some_and(is_explicit_void_call),
        Expr::If { then, alt, .. } => is_explicit_void_call(then) || is_explicit_void_call(alt),
        Expr::Cond(clauses) => clauses
            .iter()
            .any(|clause| clause.body.last().is_some_and(is_explicit_void_call)),
        _ => false,
    }
}

/// True when the expression is a `display` invocation, with the same
/// look-through as [`is_explicit_void_call`].
fn is_display_call(expr: &Expr) -> bool {
    match expr {
        Expr::Prim { op: PrimOp::Display, .. } => true,
        Expr::Apply { rator, .. } => matches!(rator.as_ref(), Expr::Var(name) if name == "display"),
        Expr::Begin(exprs) => exprs.last().is_some_and(is_display_call),
        Expr::If { then, alt, .. } => is_display_call(then) || is_display_call(alt),
        Expr::Cond(clauses) => clauses
            .iter()
            .any(|clause| clause.body.last().is_some_and(is_display_call)),
        _ => false,
    }
}

/// Text to print for a top-level result, or `None` for silence.
fn render_result(expr: &Expr, value: &Value) -> Option<String> {
    match value {
        Value::Void => is_explicit_void_call(expr).then(|| value.to_string()),
        _ if is_display_call(expr) => None,
        _ => Some(value.to_string()),
    }
}

fn report(err: &RuntimeError, interactive: bool) {
    if interactive {
        println!("{err}");
    }
    println!("RuntimeError");
}

/// Run the loop over stdin/stdout until `(exit)` or end of input.
pub fn run() {
    let interactive = io::stdin().is_terminal();
    let mut input = io::stdin().lock();
    let mut env = Env::empty();
    let mut buffer = String::new();

    loop {
        // assemble one complete form, reading lines as needed
        let (stx, consumed) = loop {
            match read_syntax(&buffer) {
                ReadResult::Form(stx, consumed) => break (stx, consumed),
                ReadResult::Empty => {
                    buffer.clear();
                    if interactive {
                        print!("scm> ");
                        let _ = io::stdout().flush();
                    }
                    if !read_more(&mut input, &mut buffer) {
                        return; // end of input
                    }
                }
                ReadResult::Incomplete => {
                    let _ = io::stdout().flush();
                    if !read_more(&mut input, &mut buffer) {
                        report(
                            &RuntimeError::BadForm("unexpected end of input".into()),
                            interactive,
                        );
                        return;
                    }
                }
                ReadResult::Malformed(msg) => {
                    buffer.clear();
                    report(&RuntimeError::BadForm(msg), interactive);
                }
            }
        };
        buffer.drain(..consumed);

        let outcome = parse(&stx, &env).and_then(|expr| {
            let value = eval(&expr, &mut env)?;
            Ok((expr, value))
        });
        match outcome {
            Ok((_, Value::Terminate)) => return,
            Ok((expr, value)) => {
                if let Some(text) = render_result(&expr, &value) {
                    println!("{text}");
                }
            }
            Err(err) => report(&err, interactive),
        }
    }
}

/// Append one line of input; false at end of input.
fn read_more(input: &mut impl BufRead, buffer: &mut String) -> bool {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => {
            buffer.push_str(&line);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_all;

    /// Parse and evaluate one source form in a fresh environment, then
    /// apply the printing policy.
    fn rendered(src: &str) -> Option<String> {
        let mut env = Env::empty();
        rendered_in(src, &mut env)
    }

    fn rendered_in(src: &str, env: &mut Env) -> Option<String> {
        let forms = read_all(src).unwrap();
        let mut last = None;
        for form in &forms {
            let expr = parse(form, env).unwrap();
            let value = eval(&expr, env).unwrap();
            last = Some(render_result(&expr, &value));
        }
        last.unwrap()
    }

    #[test]
    fn test_plain_values_print() {
        assert_eq!(rendered("42"), Some("42".to_string()));
        assert_eq!(rendered("(+ 1 2)"), Some("3".to_string()));
        assert_eq!(rendered("'(1 . 2)"), Some("(1 . 2)".to_string()));
        assert_eq!(rendered("(lambda (x) x)"), Some("#<procedure>".to_string()));
        assert_eq!(rendered("\"hi\""), Some("\"hi\"".to_string()));
    }

    #[test]
    fn test_silent_void_results() {
        // define, set!, and friends return void and print nothing
        assert_eq!(rendered("(define x 1)"), None);
        assert_eq!(rendered("(begin)"), None);
        assert_eq!(rendered("(cond (#f 1))"), None);
        let mut env = Env::empty();
        assert_eq!(rendered_in("(define x 1)", &mut env), None);
        assert_eq!(rendered_in("(set! x 2)", &mut env), None);
        assert_eq!(rendered_in("x", &mut env), Some("2".to_string()));
    }

    #[test]
    fn test_explicit_void_prints() {
        assert_eq!(rendered("(void)"), Some("#<void>".to_string()));
        assert_eq!(rendered("(void 1 2)"), Some("#<void>".to_string()));
        // recognized through begin tails, if branches, cond tails
        assert_eq!(rendered("(begin 1 (void))"), Some("#<void>".to_string()));
        assert_eq!(rendered("(if #t (void) 1)"), Some("#<void>".to_string()));
        assert_eq!(rendered("(if #f (void) 1)"), Some("1".to_string()));
        assert_eq!(
            rendered("(cond (#t (void)) (else 1))"),
            Some("#<void>".to_string())
        );
        // a void that is not an explicit invocation stays silent
        assert_eq!(rendered("(begin (void) 1 (define y 2))"), None);
    }

    #[test]
    fn test_display_results_stay_silent() {
        // display returns void: silent by the void rule already
        assert_eq!(rendered("(display 1)"), None);
        assert_eq!(rendered("(begin 0 (display 1))"), None);

        // a shadowed display returning a real value is still silent,
        // because the form is syntactically a display call
        let mut env = Env::empty();
        assert_eq!(rendered_in("(define display (lambda (x) x))", &mut env), None);
        assert_eq!(rendered_in("(display 7)", &mut env), None);
    }

    #[test]
    fn test_void_shadowing_policy() {
        // (void) with void shadowed is an Apply of the user's binding;
        // its non-void result follows the ordinary rules
        let mut env = Env::empty();
        assert_eq!(rendered_in("(define void (lambda () 5))", &mut env), None);
        assert_eq!(rendered_in("(void)", &mut env), Some("5".to_string()));
    }
}
