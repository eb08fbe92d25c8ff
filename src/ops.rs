//! Primitive-operator registry and semantics.
//!
//! Every primitive is one entry in a single registry: its surface name,
//! its operator tag, and its argument-count contract. The parser consults
//! the registry for head-position dispatch and enforces `Exact` arities at
//! parse time; when a primitive is referenced as a first-class value and
//! applied later, the same contract is validated here. Reserved forms
//! (`if`, `lambda`, ...) are not operators - they are syntax handled by
//! the parser - but their name table also lives here so both subsystems
//! agree on what is reserved.
//!
//! Arithmetic is exact: integers and rationals promote as needed, all
//! `i64` steps are checked, and results in lowest terms with denominator
//! 1 collapse back to integers.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::RuntimeError;
use crate::value::{Value, simplify_ratio};

/// Argument-count contract of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    /// Check an argument count against this contract.
    pub fn validate(self, got: usize) -> Result<(), RuntimeError> {
        let expected = match self {
            Arity::Exact(n) if got != n => n,
            Arity::AtLeast(n) if got < n => n,
            _ => return Ok(()),
        };
        Err(RuntimeError::arity_error(expected, got))
    }
}

/// Tag of a primitive operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimOp {
    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    Modulo,
    Expt,
    // Chained numeric comparison
    Less,
    LessEq,
    NumEq,
    GreaterEq,
    Greater,
    // Pairs and lists
    Cons,
    Car,
    Cdr,
    SetCar,
    SetCdr,
    ListCtor,
    // Identity and type predicates
    IsEq,
    IsBoolean,
    IsFixnum,
    IsNull,
    IsPair,
    IsProcedure,
    IsSymbol,
    IsString,
    IsList,
    // Logic and I/O
    Not,
    Display,
    // Control values
    MakeVoid,
    Exit,
}

/// Syntactic forms recognized by the parser. Reserved names may still be
/// shadowed by user bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserved {
    If,
    Begin,
    Quote,
    Define,
    Set,
    Lambda,
    Let,
    Letrec,
    Cond,
    And,
    Or,
}

/// Look up a reserved-form name.
pub fn find_reserved(name: &str) -> Option<Reserved> {
    let word = match name {
        "if" => Reserved::If,
        "begin" => Reserved::Begin,
        "quote" => Reserved::Quote,
        "define" => Reserved::Define,
        "set!" => Reserved::Set,
        "lambda" => Reserved::Lambda,
        "let" => Reserved::Let,
        "letrec" => Reserved::Letrec,
        "cond" => Reserved::Cond,
        "and" => Reserved::And,
        "or" => Reserved::Or,
        _ => return None,
    };
    Some(word)
}

/// One entry in the primitive registry.
#[derive(Debug)]
pub struct PrimSpec {
    pub name: &'static str,
    pub op: PrimOp,
    pub arity: Arity,
}

static PRIMITIVES: &[PrimSpec] = &[
    PrimSpec { name: "+", op: PrimOp::Plus, arity: Arity::AtLeast(0) },
    PrimSpec { name: "-", op: PrimOp::Minus, arity: Arity::AtLeast(1) },
    PrimSpec { name: "*", op: PrimOp::Mul, arity: Arity::AtLeast(0) },
    PrimSpec { name: "/", op: PrimOp::Div, arity: Arity::AtLeast(1) },
    PrimSpec { name: "modulo", op: PrimOp::Modulo, arity: Arity::Exact(2) },
    PrimSpec { name: "expt", op: PrimOp::Expt, arity: Arity::Exact(2) },
    PrimSpec { name: "<", op: PrimOp::Less, arity: Arity::AtLeast(2) },
    PrimSpec { name: "<=", op: PrimOp::LessEq, arity: Arity::AtLeast(2) },
    PrimSpec { name: "=", op: PrimOp::NumEq, arity: Arity::AtLeast(2) },
    PrimSpec { name: ">=", op: PrimOp::GreaterEq, arity: Arity::AtLeast(2) },
    PrimSpec { name: ">", op: PrimOp::Greater, arity: Arity::AtLeast(2) },
    PrimSpec { name: "cons", op: PrimOp::Cons, arity: Arity::Exact(2) },
    PrimSpec { name: "car", op: PrimOp::Car, arity: Arity::Exact(1) },
    PrimSpec { name: "cdr", op: PrimOp::Cdr, arity: Arity::Exact(1) },
    PrimSpec { name: "set-car!", op: PrimOp::SetCar, arity: Arity::Exact(2) },
    PrimSpec { name: "set-cdr!", op: PrimOp::SetCdr, arity: Arity::Exact(2) },
    PrimSpec { name: "list", op: PrimOp::ListCtor, arity: Arity::Any },
    PrimSpec { name: "eq?", op: PrimOp::IsEq, arity: Arity::Exact(2) },
    PrimSpec { name: "boolean?", op: PrimOp::IsBoolean, arity: Arity::Exact(1) },
    PrimSpec { name: "fixnum?", op: PrimOp::IsFixnum, arity: Arity::Exact(1) },
    PrimSpec { name: "null?", op: PrimOp::IsNull, arity: Arity::Exact(1) },
    PrimSpec { name: "pair?", op: PrimOp::IsPair, arity: Arity::Exact(1) },
    PrimSpec { name: "procedure?", op: PrimOp::IsProcedure, arity: Arity::Exact(1) },
    PrimSpec { name: "symbol?", op: PrimOp::IsSymbol, arity: Arity::Exact(1) },
    PrimSpec { name: "string?", op: PrimOp::IsString, arity: Arity::Exact(1) },
    PrimSpec { name: "list?", op: PrimOp::IsList, arity: Arity::Exact(1) },
    PrimSpec { name: "not", op: PrimOp::Not, arity: Arity::Exact(1) },
    PrimSpec { name: "display", op: PrimOp::Display, arity: Arity::Exact(1) },
    PrimSpec { name: "void", op: PrimOp::MakeVoid, arity: Arity::Any },
    PrimSpec { name: "exit", op: PrimOp::Exit, arity: Arity::Exact(0) },
];

static PRIMITIVES_BY_NAME: LazyLock<HashMap<&'static str, &'static PrimSpec>> =
    LazyLock::new(|| PRIMITIVES.iter().map(|spec| (spec.name, spec)).collect());

/// Look up a primitive by its surface name.
pub fn find_primitive(name: &str) -> Option<&'static PrimSpec> {
    PRIMITIVES_BY_NAME.get(name).copied()
}

impl PrimOp {
    /// Registry entry of this operator.
    pub fn spec(self) -> &'static PrimSpec {
        PRIMITIVES
            .iter()
            .find(|spec| spec.op == self)
            .expect("every operator is registered")
    }
}

/// Apply a primitive operator to already-evaluated arguments.
///
/// The registry arity is validated here for every call, which covers
/// first-class uses; operator-position calls with an `Exact` contract
/// were additionally rejected at parse time.
pub(crate) fn apply(op: PrimOp, args: &[Value]) -> Result<Value, RuntimeError> {
    let spec = op.spec();
    spec.arity
        .validate(args.len())
        .map_err(|e| e.in_form(spec.name))?;

    match op {
        PrimOp::Plus => add_values(args),
        PrimOp::Minus => sub_values(args),
        PrimOp::Mul => mul_values(args),
        PrimOp::Div => div_values(args),
        PrimOp::Modulo => modulo(&args[0], &args[1]),
        PrimOp::Expt => expt(&args[0], &args[1]),
        PrimOp::Less => compare_chain(args, "<", |ord| ord == Ordering::Less),
        PrimOp::LessEq => compare_chain(args, "<=", |ord| ord != Ordering::Greater),
        PrimOp::NumEq => compare_chain(args, "=", |ord| ord == Ordering::Equal),
        PrimOp::GreaterEq => compare_chain(args, ">=", |ord| ord != Ordering::Less),
        PrimOp::Greater => compare_chain(args, ">", |ord| ord == Ordering::Greater),
        PrimOp::Cons => Ok(Value::cons(args[0].clone(), args[1].clone())),
        PrimOp::Car => match &args[0] {
            Value::Pair(p) => Ok(p.car.borrow().clone()),
            other => Err(RuntimeError::TypeError(format!(
                "car: argument is not a pair: {other}"
            ))),
        },
        PrimOp::Cdr => match &args[0] {
            Value::Pair(p) => Ok(p.cdr.borrow().clone()),
            other => Err(RuntimeError::TypeError(format!(
                "cdr: argument is not a pair: {other}"
            ))),
        },
        PrimOp::SetCar => match &args[0] {
            Value::Pair(p) => {
                *p.car.borrow_mut() = args[1].clone();
                Ok(Value::Void)
            }
            other => Err(RuntimeError::TypeError(format!(
                "set-car!: argument is not a pair: {other}"
            ))),
        },
        PrimOp::SetCdr => match &args[0] {
            Value::Pair(p) => {
                *p.cdr.borrow_mut() = args[1].clone();
                Ok(Value::Void)
            }
            other => Err(RuntimeError::TypeError(format!(
                "set-cdr!: argument is not a pair: {other}"
            ))),
        },
        PrimOp::ListCtor => Ok(Value::list_from(args)),
        PrimOp::IsEq => Ok(Value::Boolean(eq_values(&args[0], &args[1]))),
        PrimOp::IsBoolean => Ok(Value::Boolean(matches!(args[0], Value::Boolean(_)))),
        PrimOp::IsFixnum => Ok(Value::Boolean(matches!(args[0], Value::Integer(_)))),
        PrimOp::IsNull => Ok(Value::Boolean(matches!(args[0], Value::Null))),
        PrimOp::IsPair => Ok(Value::Boolean(matches!(args[0], Value::Pair(_)))),
        PrimOp::IsProcedure => Ok(Value::Boolean(matches!(
            args[0],
            Value::Procedure(_) | Value::Primitive(_)
        ))),
        PrimOp::IsSymbol => Ok(Value::Boolean(matches!(args[0], Value::Symbol(_)))),
        PrimOp::IsString => Ok(Value::Boolean(matches!(args[0], Value::String(_)))),
        PrimOp::IsList => Ok(Value::Boolean(is_proper_list(&args[0]))),
        PrimOp::Not => Ok(Value::Boolean(args[0].is_false())),
        PrimOp::Display => {
            // Strings print their contents unquoted; everything else
            // prints in its canonical textual form.
            match &args[0] {
                Value::String(s) => print!("{s}"),
                other => print!("{other}"),
            }
            Ok(Value::Void)
        }
        PrimOp::MakeVoid => Ok(Value::Void),
        PrimOp::Exit => Ok(Value::Terminate),
    }
}

// ---------------------------------------------------------------------------
// Exact arithmetic
// ---------------------------------------------------------------------------

/// An exact number: an integer or a normalized rational.
#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Rat(i64, i64),
}

impl Num {
    fn from_value(value: &Value, op: &'static str) -> Result<Num, RuntimeError> {
        match value {
            Value::Integer(n) => Ok(Num::Int(*n)),
            Value::Rational(num, den) => Ok(Num::Rat(*num, *den)),
            other => Err(RuntimeError::TypeError(format!(
                "{op}: expected a number, got {other}"
            ))),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(n) => Value::Integer(n),
            Num::Rat(num, den) => Value::Rational(num, den),
        }
    }

    fn parts(self) -> (i64, i64) {
        match self {
            Num::Int(n) => (n, 1),
            Num::Rat(num, den) => (num, den),
        }
    }

    fn make(num: i64, den: i64) -> Result<Num, RuntimeError> {
        let (n, d) = simplify_ratio(num, den)?;
        Ok(if d == 1 { Num::Int(n) } else { Num::Rat(n, d) })
    }

    fn add(self, other: Num) -> Result<Num, RuntimeError> {
        if let (Num::Int(a), Num::Int(b)) = (self, other) {
            return a.checked_add(b).map(Num::Int).ok_or(RuntimeError::Overflow("+"));
        }
        let (a, b) = self.parts();
        let (c, d) = other.parts();
        let num = checked(a.checked_mul(d).and_then(|x| c.checked_mul(b).and_then(|y| x.checked_add(y))), "+")?;
        let den = checked(b.checked_mul(d), "+")?;
        Num::make(num, den)
    }

    fn sub(self, other: Num) -> Result<Num, RuntimeError> {
        if let (Num::Int(a), Num::Int(b)) = (self, other) {
            return a.checked_sub(b).map(Num::Int).ok_or(RuntimeError::Overflow("-"));
        }
        let (a, b) = self.parts();
        let (c, d) = other.parts();
        let num = checked(a.checked_mul(d).and_then(|x| c.checked_mul(b).and_then(|y| x.checked_sub(y))), "-")?;
        let den = checked(b.checked_mul(d), "-")?;
        Num::make(num, den)
    }

    fn mul(self, other: Num) -> Result<Num, RuntimeError> {
        if let (Num::Int(a), Num::Int(b)) = (self, other) {
            return a.checked_mul(b).map(Num::Int).ok_or(RuntimeError::Overflow("*"));
        }
        let (a, b) = self.parts();
        let (c, d) = other.parts();
        Num::make(checked(a.checked_mul(c), "*")?, checked(b.checked_mul(d), "*")?)
    }

    fn div(self, other: Num) -> Result<Num, RuntimeError> {
        let (a, b) = self.parts();
        let (c, d) = other.parts();
        if c == 0 {
            return Err(RuntimeError::DivisionByZero);
        }
        Num::make(checked(a.checked_mul(d), "/")?, checked(b.checked_mul(c), "/")?)
    }

    fn neg(self) -> Result<Num, RuntimeError> {
        let (num, den) = self.parts();
        let num = num.checked_neg().ok_or(RuntimeError::Overflow("-"))?;
        Num::make(num, den)
    }

    fn recip(self) -> Result<Num, RuntimeError> {
        let (num, den) = self.parts();
        if num == 0 {
            return Err(RuntimeError::DivisionByZero);
        }
        Num::make(den, num)
    }

    /// Exact comparison via cross-multiplication in 128-bit intermediates.
    fn compare(self, other: Num) -> Ordering {
        let (a, b) = self.parts();
        let (c, d) = other.parts();
        (a as i128 * d as i128).cmp(&(c as i128 * b as i128))
    }
}

fn checked(result: Option<i64>, op: &'static str) -> Result<i64, RuntimeError> {
    result.ok_or(RuntimeError::Overflow(op))
}

fn numeric_args(args: &[Value], op: &'static str) -> Result<Vec<Num>, RuntimeError> {
    args.iter().map(|v| Num::from_value(v, op)).collect()
}

fn add_values(args: &[Value]) -> Result<Value, RuntimeError> {
    let mut sum = Num::Int(0);
    for num in numeric_args(args, "+")? {
        sum = sum.add(num)?;
    }
    Ok(sum.into_value())
}

fn sub_values(args: &[Value]) -> Result<Value, RuntimeError> {
    let nums = numeric_args(args, "-")?;
    let (first, rest) = nums.split_first().expect("arity checked");
    if rest.is_empty() {
        return Ok(first.neg()?.into_value());
    }
    let mut result = *first;
    for num in rest {
        result = result.sub(*num)?;
    }
    Ok(result.into_value())
}

fn mul_values(args: &[Value]) -> Result<Value, RuntimeError> {
    let mut product = Num::Int(1);
    for num in numeric_args(args, "*")? {
        product = product.mul(num)?;
    }
    Ok(product.into_value())
}

fn div_values(args: &[Value]) -> Result<Value, RuntimeError> {
    let nums = numeric_args(args, "/")?;
    let (first, rest) = nums.split_first().expect("arity checked");
    if rest.is_empty() {
        return Ok(first.recip()?.into_value());
    }
    let mut result = *first;
    for num in rest {
        result = result.div(*num)?;
    }
    Ok(result.into_value())
}

fn modulo(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Integer(dividend), Value::Integer(divisor)) => {
            if *divisor == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            // i64::MIN % -1 is the one remainder the hardware traps on
            let remainder = dividend
                .checked_rem(*divisor)
                .ok_or(RuntimeError::Overflow("modulo"))?;
            Ok(Value::Integer(remainder))
        }
        _ => Err(RuntimeError::TypeError(
            "modulo is only defined for integers".into(),
        )),
    }
}

/// Integer exponentiation by squaring on a checked 64-bit accumulator.
fn expt(base: &Value, exponent: &Value) -> Result<Value, RuntimeError> {
    let (Value::Integer(base), Value::Integer(exponent)) = (base, exponent) else {
        return Err(RuntimeError::TypeError(
            "expt is only defined for integers".into(),
        ));
    };
    if *exponent < 0 {
        return Err(RuntimeError::EvalError(
            "expt: negative exponent is not supported".into(),
        ));
    }
    if *base == 0 && *exponent == 0 {
        return Err(RuntimeError::EvalError("expt: 0^0 is undefined".into()));
    }

    let mut result: i64 = 1;
    let mut square = *base;
    let mut exp = *exponent;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(square).ok_or(RuntimeError::Overflow("expt"))?;
        }
        exp >>= 1;
        if exp > 0 {
            square = square.checked_mul(square).ok_or(RuntimeError::Overflow("expt"))?;
        }
    }
    Ok(Value::Integer(result))
}

/// Chained comparison: true iff every adjacent pair satisfies `pred`.
fn compare_chain(
    args: &[Value],
    op: &'static str,
    pred: fn(Ordering) -> bool,
) -> Result<Value, RuntimeError> {
    let nums = numeric_args(args, op)?;
    for pair in nums.windows(2) {
        if !pred(pair[0].compare(pair[1])) {
            return Ok(Value::Boolean(false));
        }
    }
    Ok(Value::Boolean(true))
}

// ---------------------------------------------------------------------------
// Identity and list structure
// ---------------------------------------------------------------------------

/// `eq?`: structural on immediates (integers, rationals, booleans,
/// symbols, null, void), identity on pairs, strings and procedures.
fn eq_values(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Rational(x1, y1), Value::Rational(x2, y2)) => x1 == x2 && y1 == y2,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Null, Value::Null) | (Value::Void, Value::Void) => true,
        (Value::String(x), Value::String(y)) => Rc::ptr_eq(x, y),
        (Value::Pair(x), Value::Pair(y)) => Rc::ptr_eq(x, y),
        (Value::Procedure(x), Value::Procedure(y)) => Rc::ptr_eq(x, y),
        (Value::Primitive(x), Value::Primitive(y)) => x == y,
        _ => false,
    }
}

/// Cycle-safe `list?`: a two-speed walk down the cdr chain. The fast
/// cursor reaches null (proper list) or a non-pair (improper) first
/// unless the chain loops, in which case the cursors meet.
fn is_proper_list(value: &Value) -> bool {
    let mut slow = value.clone();
    let mut fast = value.clone();
    loop {
        for _ in 0..2 {
            fast = match fast {
                Value::Null => return true,
                Value::Pair(p) => p.cdr.borrow().clone(),
                _ => return false,
            };
        }
        slow = match slow {
            Value::Pair(p) => p.cdr.borrow().clone(),
            _ => return false,
        };
        if let (Value::Pair(a), Value::Pair(b)) = (&slow, &fast)
            && Rc::ptr_eq(a, b)
        {
            return false;
        }
    }
}
