//! The tree-walking evaluator.
//!
//! Evaluation is naive recursion on the host stack against an [`Env`]
//! chain. The `&mut Env` parameter is a handle, not the chain itself:
//! `define` replaces the caller's handle with an extended chain, which is
//! how a binding becomes visible to the forms that follow it in the same
//! body (and to the REPL's next iteration), while closures keep the
//! handle they captured.

use std::rc::Rc;

use crate::RuntimeError;
use crate::env::Env;
use crate::expr::{CondClause, Expr};
use crate::ops::{self, find_primitive};
use crate::syntax::Syntax;
use crate::value::{Procedure, Value};

pub fn eval(expr: &Expr, env: &mut Env) -> Result<Value, RuntimeError> {
    match expr {
        Expr::Fixnum(n) => Ok(Value::Integer(*n)),
        Expr::RationalLit(num, den) => Value::ratio(*num, *den),
        Expr::StringLit(s) => Ok(Value::string(s)),
        Expr::True => Ok(Value::Boolean(true)),
        Expr::False => Ok(Value::Boolean(false)),
        Expr::VoidLit => Ok(Value::Void),
        Expr::ExitLit => Ok(Value::Terminate),
        Expr::Var(name) => eval_var(name, env),
        Expr::Quote(stx) => quote_value(stx),
        Expr::If { cond, then, alt } => {
            if eval(cond, env)?.is_false() {
                eval(alt, env)
            } else {
                eval(then, env)
            }
        }
        Expr::Cond(clauses) => eval_cond(clauses, env),
        Expr::Begin(exprs) => eval_begin(exprs, env),
        Expr::And(exprs) => eval_and(exprs, env),
        Expr::Or(exprs) => eval_or(exprs, env),
        Expr::Lambda(lambda) => Ok(Value::Procedure(Rc::new(Procedure {
            lambda: Rc::clone(lambda),
            env: env.clone(),
        }))),
        Expr::Apply { rator, rands } => {
            let procedure = eval(rator, env)?;
            let args = eval_args(rands, env)?;
            apply_procedure(&procedure, &args)
        }
        Expr::Define { name, expr } => eval_define(name, expr, env),
        Expr::Set { name, expr } => eval_set(name, expr, env),
        Expr::Let { bindings, body } => eval_let(bindings, body, env),
        Expr::Letrec { bindings, body } => eval_letrec(bindings, body, env),
        Expr::Prim { op, args } => {
            let values = eval_args(args, env)?;
            ops::apply(*op, &values)
        }
    }
}

fn eval_args(exprs: &[Expr], env: &mut Env) -> Result<Vec<Value>, RuntimeError> {
    exprs.iter().map(|expr| eval(expr, env)).collect()
}

fn eval_var(name: &str, env: &Env) -> Result<Value, RuntimeError> {
    if name.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == '@') {
        return Err(RuntimeError::BadForm(format!("invalid variable name: {name}")));
    }
    if let Some(value) = env.find(name) {
        return Ok(value);
    }
    // An unshadowed primitive name in value position becomes a
    // first-class procedure for it.
    match find_primitive(name) {
        Some(spec) => Ok(Value::Primitive(spec.op)),
        None => Err(RuntimeError::UnboundVariable(name.to_string())),
    }
}

/// Convert quoted syntax to a value. Lists right-fold into pairs; the
/// dotted form `(a ... . b)` needs its single `.` second-to-last.
pub fn quote_value(stx: &Syntax) -> Result<Value, RuntimeError> {
    match stx {
        Syntax::Integer(n) => Ok(Value::Integer(*n)),
        Syntax::Rational(num, den) => Value::ratio(*num, *den),
        Syntax::Boolean(b) => Ok(Value::Boolean(*b)),
        Syntax::String(s) => Ok(Value::string(s)),
        Syntax::Symbol(s) => Ok(Value::symbol(s)),
        Syntax::List(items) => quote_list(items),
    }
}

fn quote_list(items: &[Syntax]) -> Result<Value, RuntimeError> {
    let dots: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, stx)| stx.as_symbol() == Some("."))
        .map(|(i, _)| i)
        .collect();

    let (elements, tail) = match dots.as_slice() {
        [] => (items, None),
        [dot] if items.len() >= 3 && *dot == items.len() - 2 => {
            (&items[..items.len() - 2], items.last())
        }
        _ => {
            return Err(RuntimeError::BadForm(format!(
                "malformed dotted list in quote: {}",
                Syntax::List(items.to_vec())
            )));
        }
    };

    let mut value = match tail {
        Some(tail) => quote_value(tail)?,
        None => Value::Null,
    };
    for element in elements.iter().rev() {
        value = Value::cons(quote_value(element)?, value);
    }
    Ok(value)
}

fn eval_cond(clauses: &[CondClause], env: &mut Env) -> Result<Value, RuntimeError> {
    for clause in clauses {
        let test_value = match &clause.test {
            None => Value::Void, // else: taken unconditionally, body never empty
            Some(test) => {
                let value = eval(test, env)?;
                if value.is_false() {
                    continue;
                }
                value
            }
        };
        // a clause with only a test yields the test's value
        let mut result = test_value;
        for expr in &clause.body {
            result = eval(expr, env)?;
        }
        return Ok(result);
    }
    Ok(Value::Void)
}

/// `begin` with the letrec discipline for its leading definitions: slots
/// for all of them are established first, then initialized in order, so
/// sibling definitions can be mutually recursive.
fn eval_begin(exprs: &[Expr], env: &mut Env) -> Result<Value, RuntimeError> {
    let leading = exprs
        .iter()
        .take_while(|expr| matches!(expr, Expr::Define { .. }))
        .count();
    if leading > 0 {
        for expr in &exprs[..leading] {
            if let Expr::Define { name, .. } = expr {
                *env = env.extend(name.clone(), Value::Void);
            }
        }
        for expr in &exprs[..leading] {
            if let Expr::Define { name, expr } = expr {
                let value = eval(expr, env)?;
                env.modify(name, value);
            }
        }
    }
    let mut result = Value::Void;
    for expr in &exprs[leading..] {
        result = eval(expr, env)?;
    }
    Ok(result)
}

fn eval_and(exprs: &[Expr], env: &mut Env) -> Result<Value, RuntimeError> {
    let mut last = Value::Boolean(true);
    for expr in exprs {
        last = eval(expr, env)?;
        if last.is_false() {
            return Ok(Value::Boolean(false));
        }
    }
    Ok(last)
}

fn eval_or(exprs: &[Expr], env: &mut Env) -> Result<Value, RuntimeError> {
    for expr in exprs {
        let value = eval(expr, env)?;
        if !value.is_false() {
            return Ok(value);
        }
    }
    Ok(Value::Boolean(false))
}

fn eval_define(name: &str, expr: &Expr, env: &mut Env) -> Result<Value, RuntimeError> {
    // Extend first so the right-hand side can see the name it defines,
    // then back-patch the slot.
    *env = env.extend(name, Value::Void);
    let value = eval(expr, env)?;
    env.modify(name, value);
    Ok(Value::Void)
}

fn eval_set(name: &str, expr: &Expr, env: &mut Env) -> Result<Value, RuntimeError> {
    if !env.is_bound(name) {
        return Err(RuntimeError::UnboundVariable(name.to_string()));
    }
    let value = eval(expr, env)?;
    env.modify(name, value);
    Ok(Value::Void)
}

fn eval_let(
    bindings: &[(String, Expr)],
    body: &Expr,
    env: &mut Env,
) -> Result<Value, RuntimeError> {
    // all right-hand sides see the enclosing scope, then the names bind
    // simultaneously
    let mut values = Vec::with_capacity(bindings.len());
    for (_, rhs) in bindings {
        values.push(eval(rhs, env)?);
    }
    let mut inner = env.clone();
    for ((name, _), value) in bindings.iter().zip(values) {
        inner = inner.extend(name.clone(), value);
    }
    eval(body, &mut inner)
}

fn eval_letrec(
    bindings: &[(String, Expr)],
    body: &Expr,
    env: &mut Env,
) -> Result<Value, RuntimeError> {
    let mut inner = env.clone();
    for (name, _) in bindings {
        inner = inner.extend(name.clone(), Value::Void);
    }
    for (name, rhs) in bindings {
        let value = eval(rhs, &mut inner)?;
        inner.modify(name, value);
    }
    eval(body, &mut inner)
}

/// Apply a procedure value to evaluated arguments.
pub fn apply_procedure(procedure: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
    match procedure {
        Value::Procedure(closure) => {
            let lambda = &closure.lambda;
            let fixed = if lambda.variadic {
                lambda.params.len() - 1
            } else {
                lambda.params.len()
            };
            if args.len() < fixed || (!lambda.variadic && args.len() != fixed) {
                return Err(RuntimeError::arity_error(fixed, args.len()));
            }

            let mut call_env = closure.env.clone();
            for (param, arg) in lambda.params.iter().take(fixed).zip(args.iter()) {
                call_env = call_env.extend(param.clone(), arg.clone());
            }
            if lambda.variadic {
                let rest = Value::list_from(&args[fixed..]);
                call_env = call_env.extend(lambda.params[fixed].clone(), rest);
            }
            eval(&lambda.body, &mut call_env)
        }
        Value::Primitive(op) => ops::apply(*op, args),
        other => Err(RuntimeError::TypeError(format!(
            "attempt to apply a non-procedure: {other}"
        ))),
    }
}
