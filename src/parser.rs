//! Syntax → expression translation.
//!
//! Head-position dispatch for a list `(op ...)`:
//!
//! 1. `op` bound in the current environment → ordinary application
//!    (bindings shadow reserved and primitive names);
//! 2. `op` a reserved form → that form's expression shape;
//! 3. `op` a primitive name → the matching operator variant, with exact
//!    arities enforced right here;
//! 4. anything else → free application, resolved at eval time.
//!
//! The parser threads a parse-time environment: binding forms extend it
//! with placeholder bindings before their sub-expressions are parsed, so
//! that shadowing is decided lexically. Those placeholder frames are
//! dropped when parsing finishes; only evaluation writes real bindings.

use std::rc::Rc;

use crate::RuntimeError;
use crate::env::Env;
use crate::expr::{CondClause, Expr, Lambda};
use crate::ops::{Arity, PrimOp, PrimSpec, Reserved, find_primitive, find_reserved};
use crate::syntax::Syntax;
use crate::value::Value;

/// Translate one syntax tree against the current environment.
pub fn parse(stx: &Syntax, env: &Env) -> Result<Expr, RuntimeError> {
    match stx {
        Syntax::Integer(n) => Ok(Expr::Fixnum(*n)),
        Syntax::Rational(num, den) => Ok(Expr::RationalLit(*num, *den)),
        Syntax::Boolean(true) => Ok(Expr::True),
        Syntax::Boolean(false) => Ok(Expr::False),
        Syntax::String(s) => Ok(Expr::StringLit(s.clone())),
        Syntax::Symbol(s) => Ok(Expr::Var(s.clone())),
        Syntax::List(items) => parse_list(items, env),
    }
}

fn parse_list(items: &[Syntax], env: &Env) -> Result<Expr, RuntimeError> {
    let Some((head, operands)) = items.split_first() else {
        // () quotes itself into the empty list
        return Ok(Expr::Quote(Syntax::List(Vec::new())));
    };
    let Some(op) = head.as_symbol() else {
        return parse_apply(head, operands, env);
    };
    if env.is_bound(op) {
        return parse_apply(head, operands, env);
    }
    if let Some(word) = find_reserved(op) {
        return parse_reserved(word, operands, env);
    }
    if let Some(spec) = find_primitive(op) {
        return parse_primitive(spec, operands, env);
    }
    parse_apply(head, operands, env)
}

fn parse_apply(head: &Syntax, operands: &[Syntax], env: &Env) -> Result<Expr, RuntimeError> {
    Ok(Expr::Apply {
        rator: Box::new(parse(head, env)?),
        rands: parse_all(operands, env)?,
    })
}

fn parse_all(items: &[Syntax], env: &Env) -> Result<Vec<Expr>, RuntimeError> {
    items.iter().map(|stx| parse(stx, env)).collect()
}

/// Parse a body or `begin` sequence. Each `define`d name becomes visible
/// to the forms after it (and its own right-hand side saw it already),
/// so later occurrences resolve to the binding rather than a primitive.
fn parse_sequence(items: &[Syntax], env: &Env) -> Result<Vec<Expr>, RuntimeError> {
    let mut scope = env.clone();
    let mut exprs = Vec::with_capacity(items.len());
    for item in items {
        let expr = parse(item, &scope)?;
        if let Expr::Define { name, .. } = &expr {
            scope = scope.extend(name.clone(), Value::Void);
        }
        exprs.push(expr);
    }
    Ok(exprs)
}

/// A body of one form is that form; more forms wrap in `begin`.
fn parse_body(items: &[Syntax], env: &Env) -> Result<Expr, RuntimeError> {
    match items {
        [] => Err(RuntimeError::BadForm("empty body".into())),
        [single] => parse(single, env),
        many => Ok(Expr::Begin(parse_sequence(many, env)?)),
    }
}

fn parse_reserved(word: Reserved, operands: &[Syntax], env: &Env) -> Result<Expr, RuntimeError> {
    match word {
        Reserved::If => {
            let [cond, then, alt] = operands else {
                return Err(RuntimeError::BadForm(format!(
                    "if expects 3 operands, got {}",
                    operands.len()
                )));
            };
            Ok(Expr::If {
                cond: Box::new(parse(cond, env)?),
                then: Box::new(parse(then, env)?),
                alt: Box::new(parse(alt, env)?),
            })
        }
        Reserved::Begin => Ok(Expr::Begin(parse_sequence(operands, env)?)),
        Reserved::Quote => {
            let [quoted] = operands else {
                return Err(RuntimeError::BadForm(format!(
                    "quote expects 1 operand, got {}",
                    operands.len()
                )));
            };
            Ok(Expr::Quote(quoted.clone()))
        }
        Reserved::Lambda => {
            if operands.len() < 2 {
                return Err(RuntimeError::BadForm(
                    "lambda expects a parameter list and a body".into(),
                ));
            }
            let Syntax::List(param_items) = &operands[0] else {
                return Err(RuntimeError::BadForm("lambda parameters must be a list".into()));
            };
            let lambda = parse_lambda(param_items, &operands[1..], env)?;
            Ok(Expr::Lambda(Rc::new(lambda)))
        }
        Reserved::Define => parse_define(operands, env),
        Reserved::Set => {
            let [target, rhs] = operands else {
                return Err(RuntimeError::BadForm(format!(
                    "set! expects 2 operands, got {}",
                    operands.len()
                )));
            };
            let Some(name) = target.as_symbol() else {
                return Err(RuntimeError::BadForm("set! expects a symbol target".into()));
            };
            Ok(Expr::Set {
                name: name.to_string(),
                expr: Box::new(parse(rhs, env)?),
            })
        }
        Reserved::Let => parse_let_form(operands, env, false),
        Reserved::Letrec => parse_let_form(operands, env, true),
        Reserved::Cond => parse_cond(operands, env),
        Reserved::And => Ok(Expr::And(parse_all(operands, env)?)),
        Reserved::Or => Ok(Expr::Or(parse_all(operands, env)?)),
    }
}

/// Parse a parameter list and body into a [`Lambda`]. A trailing `...`
/// marks the procedure variadic; the symbol before it is the
/// rest-parameter.
fn parse_lambda(
    param_items: &[Syntax],
    body_items: &[Syntax],
    env: &Env,
) -> Result<Lambda, RuntimeError> {
    let (params, variadic) = parse_params(param_items)?;
    let mut body_env = env.clone();
    for name in &params {
        body_env = body_env.extend(name.clone(), Value::Void);
    }
    let body = parse_body(body_items, &body_env)?;
    Ok(Lambda {
        params,
        variadic,
        body,
    })
}

fn parse_params(items: &[Syntax]) -> Result<(Vec<String>, bool), RuntimeError> {
    let mut params = Vec::new();
    let mut variadic = false;
    for (i, item) in items.iter().enumerate() {
        let Some(name) = item.as_symbol() else {
            return Err(RuntimeError::BadForm("parameter must be a symbol".into()));
        };
        if name == "..." {
            if i + 1 != items.len() {
                return Err(RuntimeError::BadForm("... must end the parameter list".into()));
            }
            if params.is_empty() {
                return Err(RuntimeError::BadForm(
                    "... needs a preceding rest-parameter name".into(),
                ));
            }
            variadic = true;
        } else {
            params.push(name.to_string());
        }
    }
    Ok((params, variadic))
}

fn parse_define(operands: &[Syntax], env: &Env) -> Result<Expr, RuntimeError> {
    match operands {
        // (define name expr)
        [Syntax::Symbol(name), rhs] => {
            reject_reserved_target(name)?;
            // the right-hand side can see the name it is defining
            let rhs_env = env.extend(name.clone(), Value::Void);
            Ok(Expr::Define {
                name: name.clone(),
                expr: Box::new(parse(rhs, &rhs_env)?),
            })
        }
        // (define (name params...) body...) => (define name (lambda ...))
        [Syntax::List(signature), body @ ..] if !body.is_empty() => {
            let Some((name_stx, param_items)) = signature.split_first() else {
                return Err(RuntimeError::BadForm(
                    "define signature needs a name".into(),
                ));
            };
            let Some(name) = name_stx.as_symbol() else {
                return Err(RuntimeError::BadForm("define expects a symbol name".into()));
            };
            reject_reserved_target(name)?;
            let rhs_env = env.extend(name, Value::Void);
            let lambda = parse_lambda(param_items, body, &rhs_env)?;
            Ok(Expr::Define {
                name: name.to_string(),
                expr: Box::new(Expr::Lambda(Rc::new(lambda))),
            })
        }
        [_, _] => Err(RuntimeError::BadForm(
            "define expects a symbol or signature list".into(),
        )),
        _ => Err(RuntimeError::BadForm(format!(
            "define expects 2 operands, got {}",
            operands.len()
        ))),
    }
}

/// Reserved-form names cannot be redefined. Primitive names can: the
/// binding then shadows the operator.
fn reject_reserved_target(name: &str) -> Result<(), RuntimeError> {
    if find_reserved(name).is_some() {
        return Err(RuntimeError::BadForm(format!(
            "cannot redefine reserved form {name}"
        )));
    }
    Ok(())
}

fn parse_let_form(operands: &[Syntax], env: &Env, recursive: bool) -> Result<Expr, RuntimeError> {
    let form = if recursive { "letrec" } else { "let" };
    if operands.len() < 2 {
        return Err(RuntimeError::BadForm(format!(
            "{form} expects bindings and a body"
        )));
    }
    let Syntax::List(binding_items) = &operands[0] else {
        return Err(RuntimeError::BadForm(format!(
            "{form} bindings must be a list"
        )));
    };

    let mut raw = Vec::with_capacity(binding_items.len());
    for binding in binding_items {
        let Syntax::List(pair) = binding else {
            return Err(RuntimeError::BadForm(format!(
                "each {form} binding must be (name expression)"
            )));
        };
        let [name_stx, rhs] = pair.as_slice() else {
            return Err(RuntimeError::BadForm(format!(
                "each {form} binding must be (name expression)"
            )));
        };
        let Some(name) = name_stx.as_symbol() else {
            return Err(RuntimeError::BadForm(format!(
                "{form} binding name must be a symbol"
            )));
        };
        raw.push((name.to_string(), rhs));
    }

    let mut inner = env.clone();
    for (name, _) in &raw {
        inner = inner.extend(name.clone(), Value::Void);
    }

    // let right-hand sides live in the enclosing scope, letrec ones in
    // the extended scope
    let rhs_env = if recursive { &inner } else { env };
    let mut bindings = Vec::with_capacity(raw.len());
    for (name, rhs) in raw {
        bindings.push((name, parse(rhs, rhs_env)?));
    }

    let body = Box::new(parse_body(&operands[1..], &inner)?);
    Ok(if recursive {
        Expr::Letrec { bindings, body }
    } else {
        Expr::Let { bindings, body }
    })
}

fn parse_cond(operands: &[Syntax], env: &Env) -> Result<Expr, RuntimeError> {
    let mut clauses = Vec::with_capacity(operands.len());
    for (i, clause_stx) in operands.iter().enumerate() {
        let Syntax::List(parts) = clause_stx else {
            return Err(RuntimeError::BadForm("cond clause must be a list".into()));
        };
        let Some((test_stx, body_stx)) = parts.split_first() else {
            return Err(RuntimeError::BadForm("empty cond clause".into()));
        };
        let clause = if test_stx.as_symbol() == Some("else") {
            if i + 1 != operands.len() {
                return Err(RuntimeError::BadForm(
                    "else must be the last cond clause".into(),
                ));
            }
            if body_stx.is_empty() {
                return Err(RuntimeError::BadForm("else clause needs a body".into()));
            }
            CondClause {
                test: None,
                body: parse_all(body_stx, env)?,
            }
        } else {
            CondClause {
                test: Some(parse(test_stx, env)?),
                body: parse_all(body_stx, env)?,
            }
        };
        clauses.push(clause);
    }
    Ok(Expr::Cond(clauses))
}

fn parse_primitive(
    spec: &'static PrimSpec,
    operands: &[Syntax],
    env: &Env,
) -> Result<Expr, RuntimeError> {
    // Fixed-arity operators are checked at parse time; variadic minimums
    // wait until evaluation so that e.g. (-) parses and then fails.
    if let Arity::Exact(n) = spec.arity
        && operands.len() != n
    {
        return Err(RuntimeError::arity_error(n, operands.len()).in_form(spec.name));
    }
    match spec.op {
        PrimOp::Exit => Ok(Expr::ExitLit),
        PrimOp::MakeVoid if operands.is_empty() => Ok(Expr::VoidLit),
        op => Ok(Expr::Prim {
            op,
            args: parse_all(operands, env)?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_all;
    use crate::syntax::{int, lst, sym};

    /// Parse a single source form in an empty environment.
    fn parse_one(src: &str) -> Result<Expr, RuntimeError> {
        let forms = read_all(src)?;
        assert_eq!(forms.len(), 1, "expected one form in {src:?}");
        parse(&forms[0], &Env::empty())
    }

    fn parse_one_in(src: &str, env: &Env) -> Result<Expr, RuntimeError> {
        let forms = read_all(src).unwrap();
        parse(&forms[0], env)
    }

    #[test]
    fn test_atoms() {
        assert_eq!(parse_one("42").unwrap(), Expr::Fixnum(42));
        assert_eq!(parse_one("1/2").unwrap(), Expr::RationalLit(1, 2));
        assert_eq!(parse_one("#t").unwrap(), Expr::True);
        assert_eq!(parse_one("#f").unwrap(), Expr::False);
        assert_eq!(
            parse_one("\"hi\"").unwrap(),
            Expr::StringLit("hi".to_string())
        );
        assert_eq!(parse_one("x").unwrap(), Expr::Var("x".to_string()));
        // a bare primitive name is still just a variable reference
        assert_eq!(parse_one("car").unwrap(), Expr::Var("car".to_string()));
    }

    #[test]
    fn test_primitive_dispatch() {
        assert_eq!(
            parse_one("(+ 1 2)").unwrap(),
            Expr::Prim {
                op: PrimOp::Plus,
                args: vec![Expr::Fixnum(1), Expr::Fixnum(2)],
            }
        );
        assert_eq!(
            parse_one("(car x)").unwrap(),
            Expr::Prim {
                op: PrimOp::Car,
                args: vec![Expr::Var("x".to_string())],
            }
        );
        // variadic minimums are deferred to evaluation
        assert_eq!(
            parse_one("(-)").unwrap(),
            Expr::Prim {
                op: PrimOp::Minus,
                args: vec![],
            }
        );
        // (void)/(exit) become literals
        assert_eq!(parse_one("(void)").unwrap(), Expr::VoidLit);
        assert_eq!(
            parse_one("(void 1)").unwrap(),
            Expr::Prim {
                op: PrimOp::MakeVoid,
                args: vec![Expr::Fixnum(1)],
            }
        );
        assert_eq!(parse_one("(exit)").unwrap(), Expr::ExitLit);
    }

    #[test]
    fn test_exact_arity_enforced_at_parse_time() {
        let fixed_arity_errors = vec![
            "(car)",
            "(car x y)",
            "(cdr)",
            "(cons 1)",
            "(cons 1 2 3)",
            "(modulo 5)",
            "(expt 2)",
            "(eq? 1)",
            "(set-car! p)",
            "(set-cdr! p 1 2)",
            "(not)",
            "(not #t #f)",
            "(display)",
            "(exit 1)",
            "(null? 1 2)",
        ];
        for src in fixed_arity_errors {
            match parse_one(src) {
                Err(RuntimeError::ArityError { .. }) => {}
                other => panic!("{src}: expected parse-time arity error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_list_quotes_itself() {
        assert_eq!(
            parse_one("()").unwrap(),
            Expr::Quote(Syntax::List(Vec::new()))
        );
    }

    #[test]
    fn test_quote_keeps_raw_syntax() {
        assert_eq!(
            parse_one("(quote (1 2))").unwrap(),
            Expr::Quote(lst(vec![int(1), int(2)]))
        );
        assert_eq!(parse_one("'x").unwrap(), Expr::Quote(sym("x")));
        assert!(parse_one("(quote)").is_err());
        assert!(parse_one("(quote a b)").is_err());
    }

    #[test]
    fn test_bound_names_shadow_everything() {
        let env = Env::empty()
            .extend("+", Value::Integer(1))
            .extend("if", Value::Integer(2));

        // a bound primitive name parses as an application
        assert_eq!(
            parse_one_in("(+ 1 2)", &env).unwrap(),
            Expr::Apply {
                rator: Box::new(Expr::Var("+".to_string())),
                rands: vec![Expr::Fixnum(1), Expr::Fixnum(2)],
            }
        );
        // so does a bound reserved name
        assert_eq!(
            parse_one_in("(if 1 2)", &env).unwrap(),
            Expr::Apply {
                rator: Box::new(Expr::Var("if".to_string())),
                rands: vec![Expr::Fixnum(1), Expr::Fixnum(2)],
            }
        );
    }

    #[test]
    fn test_binding_forms_shadow_lexically() {
        // the lambda parameter shadows + inside the body only
        let Expr::Lambda(lambda) = parse_one("(lambda (+) (+ 1 2))").unwrap() else {
            panic!("expected lambda");
        };
        assert!(matches!(lambda.body, Expr::Apply { .. }));

        // let: shadow visible in the body, not in the right-hand sides
        let Expr::Let { bindings, body } = parse_one("(let ((+ 1)) (+ 1 2))").unwrap() else {
            panic!("expected let");
        };
        assert!(matches!(bindings[0].1, Expr::Fixnum(1)));
        assert!(matches!(*body, Expr::Apply { .. }));

        let Expr::Let { bindings, .. } = parse_one("(let ((x (+ 1 2))) x)").unwrap() else {
            panic!("expected let");
        };
        assert!(matches!(bindings[0].1, Expr::Prim { op: PrimOp::Plus, .. }));

        // letrec: shadow visible in right-hand sides too
        let Expr::Letrec { bindings, .. } = parse_one("(letrec ((+ (+ 1))) 0)").unwrap() else {
            panic!("expected letrec");
        };
        assert!(matches!(bindings[0].1, Expr::Apply { .. }));

        // define: the right-hand side sees the name it is defining
        let Expr::Define { expr, .. } = parse_one("(define car (car 1))").unwrap() else {
            panic!("expected define");
        };
        assert!(matches!(*expr, Expr::Apply { .. }));
    }

    #[test]
    fn test_begin_sequence_sees_earlier_defines() {
        let Expr::Begin(exprs) = parse_one("(begin (define + 1) (+ 1 2))").unwrap() else {
            panic!("expected begin");
        };
        assert!(matches!(exprs[0], Expr::Define { .. }));
        // after the define, + refers to the binding, not the operator
        assert!(matches!(exprs[1], Expr::Apply { .. }));
    }

    #[test]
    fn test_lambda_shapes() {
        let Expr::Lambda(lambda) = parse_one("(lambda (a b) (+ a b))").unwrap() else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.params, vec!["a", "b"]);
        assert!(!lambda.variadic);

        // multi-form body wraps in begin
        let Expr::Lambda(lambda) = parse_one("(lambda (x) 1 2)").unwrap() else {
            panic!("expected lambda");
        };
        assert!(matches!(lambda.body, Expr::Begin(_)));

        // trailing ... marks the rest-parameter
        let Expr::Lambda(lambda) = parse_one("(lambda (a b ...) b)").unwrap() else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.params, vec!["a", "b"]);
        assert!(lambda.variadic);

        assert!(parse_one("(lambda x 1)").is_err()); // params must be a list
        assert!(parse_one("(lambda (1) 1)").is_err()); // params must be symbols
        assert!(parse_one("(lambda (a ... b) 1)").is_err()); // ... must be last
        assert!(parse_one("(lambda (...) 1)").is_err()); // ... needs a name
        assert!(parse_one("(lambda (x))").is_err()); // missing body
    }

    #[test]
    fn test_define_shapes() {
        assert!(matches!(
            parse_one("(define x 1)").unwrap(),
            Expr::Define { .. }
        ));

        // function sugar desugars to a lambda
        let Expr::Define { name, expr } = parse_one("(define (add a b) (+ a b))").unwrap() else {
            panic!("expected define");
        };
        assert_eq!(name, "add");
        let Expr::Lambda(lambda) = *expr else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.params, vec!["a", "b"]);

        // variadic sugar
        let Expr::Define { expr, .. } = parse_one("(define (f a ...) a)").unwrap() else {
            panic!("expected define");
        };
        let Expr::Lambda(lambda) = *expr else {
            panic!("expected lambda");
        };
        assert!(lambda.variadic);

        // defining a primitive name is allowed (it shadows); a reserved
        // form is not
        assert!(parse_one("(define + 1)").is_ok());
        assert!(parse_one("(define if 1)").is_err());
        assert!(parse_one("(define lambda 1)").is_err());

        assert!(parse_one("(define 5 1)").is_err());
        assert!(parse_one("(define x)").is_err());
        assert!(parse_one("(define x 1 2)").is_err());
        assert!(parse_one("(define (f))").is_err()); // sugar needs a body
    }

    #[test]
    fn test_set_shapes() {
        assert!(matches!(
            parse_one("(set! x 1)").unwrap(),
            Expr::Set { .. }
        ));
        assert!(parse_one("(set! 5 1)").is_err());
        assert!(parse_one("(set! x)").is_err());
        assert!(parse_one("(set! x 1 2)").is_err());
    }

    #[test]
    fn test_let_shapes() {
        assert!(matches!(
            parse_one("(let ((x 1) (y 2)) (+ x y))").unwrap(),
            Expr::Let { .. }
        ));
        assert!(matches!(
            parse_one("(letrec ((f (lambda (n) n))) (f 1))").unwrap(),
            Expr::Letrec { .. }
        ));
        // multi-form bodies are allowed
        assert!(parse_one("(let ((x 1)) x x)").is_ok());

        assert!(parse_one("(let ((x 1)))").is_err()); // missing body
        assert!(parse_one("(let x 1)").is_err()); // bindings must be a list
        assert!(parse_one("(let ((x)) 1)").is_err()); // binding needs a value
        assert!(parse_one("(let ((x 1 2)) 1)").is_err());
        assert!(parse_one("(let ((1 2)) 1)").is_err()); // name must be a symbol
    }

    #[test]
    fn test_cond_shapes() {
        let Expr::Cond(clauses) =
            parse_one("(cond ((= x 1) 1) ((= x 2)) (else 3))").unwrap()
        else {
            panic!("expected cond");
        };
        assert_eq!(clauses.len(), 3);
        assert!(clauses[0].test.is_some());
        assert_eq!(clauses[0].body.len(), 1);
        // test-only clause is allowed
        assert!(clauses[1].body.is_empty());
        // else clause has no test
        assert!(clauses[2].test.is_none());

        assert!(parse_one("(cond (else 1) (#t 2))").is_err()); // else must be last
        assert!(parse_one("(cond (else))").is_err()); // else needs a body
        assert!(parse_one("(cond ())").is_err()); // empty clause
        assert!(parse_one("(cond 5)").is_err()); // clause must be a list
    }

    #[test]
    fn test_if_and_logic_shapes() {
        assert!(matches!(parse_one("(if #t 1 2)").unwrap(), Expr::If { .. }));
        assert!(parse_one("(if #t 1)").is_err());
        assert!(parse_one("(if #t 1 2 3)").is_err());

        assert_eq!(parse_one("(and)").unwrap(), Expr::And(vec![]));
        assert_eq!(parse_one("(or)").unwrap(), Expr::Or(vec![]));
        assert!(matches!(parse_one("(and 1 2)").unwrap(), Expr::And(_)));
    }

    #[test]
    fn test_free_application() {
        // unknown head symbol: resolved at eval time
        assert_eq!(
            parse_one("(f 1)").unwrap(),
            Expr::Apply {
                rator: Box::new(Expr::Var("f".to_string())),
                rands: vec![Expr::Fixnum(1)],
            }
        );
        // non-symbol head
        assert!(matches!(
            parse_one("((lambda (x) x) 1)").unwrap(),
            Expr::Apply { .. }
        ));
    }
}
