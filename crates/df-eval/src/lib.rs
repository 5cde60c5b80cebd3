//! df-eval: expression model and evaluation environment for dynaflow.
//!
//! Provides:
//! - `Expr`, the tagged expression/value type the graph compiles to
//! - `Environment`, top-level bindings with late-bound lookup
//! - the evaluator and the built-in primitive table
//! - a printer producing the s-expression form shown in run logs
//!
//! # Example
//!
//! ```
//! use df_eval::{Environment, Expr};
//!
//! let env = Environment::new();
//! let sum = Expr::call_named("+", vec![Expr::Number(3.0), Expr::Number(4.0)]);
//! assert_eq!(env.evaluate(&sum).unwrap(), Expr::Number(7.0));
//! assert_eq!(sum.to_string(), "(+ 3 4)");
//! ```

pub mod env;
pub mod error;
pub mod eval;
pub mod expr;
pub mod primitives;
pub mod print;

// Re-exports for ergonomics
pub use env::{Environment, Scope};
pub use error::{EvalError, EvalResult};
pub use eval::MAX_CALL_DEPTH;
pub use expr::{Arity, Closure, Expr, Native, NativeFn, Primitive};
