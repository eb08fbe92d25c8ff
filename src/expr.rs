//! Abstract expression tree.
//!
//! The parser produces these nodes; the evaluator consumes them. Primitive
//! operators are ordinary variants carrying their operator tag, not
//! procedure calls - the parser only emits them when the head name is a
//! primitive that no binding shadows. Expressions outlive parsing whenever
//! a closure references its body, which is why [`Lambda`] sits behind an
//! `Rc` shared between the tree and every procedure value made from it.

use std::rc::Rc;

use crate::ops::PrimOp;
use crate::syntax::Syntax;

/// A lambda's static shape: parameter names, variadic marker, body.
///
/// For a variadic lambda the last parameter is the rest-parameter; the
/// parameters before it bind positionally and surplus arguments collect
/// into a proper list bound to the last one.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub variadic: bool,
    pub body: Expr,
}

/// One `cond` clause. `test` is `None` for the `else` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct CondClause {
    pub test: Option<Expr>,
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    Fixnum(i64),
    /// Numerator/denominator as written; normalized on evaluation.
    RationalLit(i64, i64),
    StringLit(String),
    True,
    False,
    VoidLit,
    ExitLit,

    Var(String),
    /// Carries the raw syntax; converted to a value lazily at eval time.
    Quote(Syntax),

    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        alt: Box<Expr>,
    },
    Cond(Vec<CondClause>),
    Begin(Vec<Expr>),

    // Short-circuit logic; not reducible to primitives.
    And(Vec<Expr>),
    Or(Vec<Expr>),

    Lambda(Rc<Lambda>),
    Apply {
        rator: Box<Expr>,
        rands: Vec<Expr>,
    },

    Define {
        name: String,
        expr: Box<Expr>,
    },
    Set {
        name: String,
        expr: Box<Expr>,
    },
    Let {
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },
    Letrec {
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },

    /// A primitive operator applied in operator position.
    Prim {
        op: PrimOp,
        args: Vec<Expr>,
    },
}
