//! The expression model.
//!
//! One enum serves as both program and value: the compiler emits syntax
//! forms (symbols, calls, lambdas, conditionals, let blocks) and evaluation
//! reduces them to values (numbers, text, booleans, lists, functions,
//! containers). Values evaluate to themselves.

use std::fmt;
use std::sync::Arc;

use df_core::EntityRef;

use crate::env::{Environment, Scope};
use crate::error::EvalResult;

/// Signature of host operations produced by node kinds.
pub type NativeFn = dyn Fn(&[Expr]) -> EvalResult<Expr> + Send + Sync;

/// Signature of built-in primitives. They receive the environment so that
/// higher-order primitives can call back into user functions.
pub type PrimitiveFn = fn(&Environment, &[Expr]) -> EvalResult<Expr>;

/// How many arguments a callable accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// A built-in function. Primitives are immutable and live for the whole program.
pub struct Primitive {
    pub name: &'static str,
    pub arity: Arity,
    pub func: PrimitiveFn,
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A host operation bound into the program by a node kind, typically a call
/// into the external document.
#[derive(Clone)]
pub struct Native {
    pub name: String,
    pub arity: Arity,
    pub func: Arc<NativeFn>,
}

impl Native {
    pub fn new(
        name: impl Into<String>,
        arity: Arity,
        func: impl Fn(&[Expr]) -> EvalResult<Expr> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A user function value: parameter names, body, and the local scope it was
/// created in. Top-level names are not captured; they are looked up in the
/// environment each time the body runs.
#[derive(Debug)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Arc<Expr>,
    pub scope: Option<Arc<Scope>>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    List(Vec<Expr>),
    Function(Arc<Closure>),
    Container(EntityRef),
    Primitive(&'static Primitive),
    Native(Native),

    Symbol(String),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Arc<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Let {
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expr::Text(value.into())
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    /// Call a named function; the name is resolved when the call runs.
    pub fn call_named(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::call(Expr::symbol(name), args)
    }

    pub fn lambda(params: Vec<String>, body: Expr) -> Self {
        Expr::Lambda {
            params,
            body: Arc::new(body),
        }
    }

    /// Short description of the variant, used in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Expr::Number(_) => "number",
            Expr::Text(_) => "text",
            Expr::Boolean(_) => "boolean",
            Expr::List(_) => "list",
            Expr::Function(_) | Expr::Primitive(_) | Expr::Native(_) => "function",
            Expr::Container(_) => "container",
            Expr::Symbol(_) => "symbol",
            Expr::Call { .. } => "call",
            Expr::Lambda { .. } => "lambda",
            Expr::If { .. } => "if",
            Expr::Let { .. } => "let",
        }
    }

    /// True for variants that evaluate to themselves.
    pub fn is_value(&self) -> bool {
        match self {
            Expr::List(items) => items.iter().all(Expr::is_value),
            Expr::Number(_)
            | Expr::Text(_)
            | Expr::Boolean(_)
            | Expr::Function(_)
            | Expr::Container(_)
            | Expr::Primitive(_)
            | Expr::Native(_) => true,
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Number(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Boolean(value)
    }
}

/// Structural equality. Host operations compare by name, closures by
/// parameters, body and scope identity.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::Number(a), Expr::Number(b)) => a == b,
            (Expr::Text(a), Expr::Text(b)) => a == b,
            (Expr::Boolean(a), Expr::Boolean(b)) => a == b,
            (Expr::List(a), Expr::List(b)) => a == b,
            (Expr::Function(a), Expr::Function(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.params == b.params
                        && a.body == b.body
                        && match (&a.scope, &b.scope) {
                            (None, None) => true,
                            (Some(x), Some(y)) => Arc::ptr_eq(x, y),
                            _ => false,
                        })
            }
            (Expr::Container(a), Expr::Container(b)) => a == b,
            (Expr::Primitive(a), Expr::Primitive(b)) => a.name == b.name,
            (Expr::Native(a), Expr::Native(b)) => a.name == b.name,
            (Expr::Symbol(a), Expr::Symbol(b)) => a == b,
            (
                Expr::Call {
                    callee: ca,
                    args: aa,
                },
                Expr::Call {
                    callee: cb,
                    args: ab,
                },
            ) => ca == cb && aa == ab,
            (
                Expr::Lambda {
                    params: pa,
                    body: ba,
                },
                Expr::Lambda {
                    params: pb,
                    body: bb,
                },
            ) => pa == pb && ba == bb,
            (
                Expr::If {
                    cond: ca,
                    then: ta,
                    otherwise: oa,
                },
                Expr::If {
                    cond: cb,
                    then: tb,
                    otherwise: ob,
                },
            ) => ca == cb && ta == tb && oa == ob,
            (
                Expr::Let {
                    bindings: ba,
                    body: ya,
                },
                Expr::Let {
                    bindings: bb,
                    body: yb,
                },
            ) => ba == bb && ya == yb,
            _ => false,
        }
    }
}
