//! The evaluator.

use std::cell::Cell;
use std::sync::Arc;

use crate::env::{Environment, Scope};
use crate::error::{EvalError, EvalResult};
use crate::expr::{Closure, Expr};

/// Maximum nesting of user-function calls before evaluation fails.
pub const MAX_CALL_DEPTH: usize = 200;

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl Environment {
    /// Evaluate an expression against the current top-level bindings.
    pub fn evaluate(&self, expr: &Expr) -> EvalResult<Expr> {
        self.eval_in(expr, None)
    }

    /// Apply a callable value to already-evaluated arguments.
    pub fn apply(&self, callee: &Expr, args: Vec<Expr>) -> EvalResult<Expr> {
        match callee {
            Expr::Function(closure) => self.apply_closure(closure, args),
            Expr::Primitive(primitive) => {
                if !primitive.arity.accepts(args.len()) {
                    return Err(EvalError::Arity {
                        callee: primitive.name.to_string(),
                        expected: primitive.arity.to_string(),
                        found: args.len(),
                    });
                }
                (primitive.func)(self, &args)
            }
            Expr::Native(native) => {
                if !native.arity.accepts(args.len()) {
                    return Err(EvalError::Arity {
                        callee: native.name.clone(),
                        expected: native.arity.to_string(),
                        found: args.len(),
                    });
                }
                (native.func)(&args)
            }
            other => Err(EvalError::NotCallable {
                found: other.type_name(),
            }),
        }
    }

    fn apply_closure(&self, closure: &Closure, args: Vec<Expr>) -> EvalResult<Expr> {
        if closure.params.len() != args.len() {
            return Err(EvalError::Arity {
                callee: format!("(lambda ({}))", closure.params.join(" ")),
                expected: closure.params.len().to_string(),
                found: args.len(),
            });
        }

        let depth = self.depth.get() + 1;
        if depth > MAX_CALL_DEPTH {
            return Err(EvalError::RecursionLimit {
                limit: MAX_CALL_DEPTH,
            });
        }
        self.depth.set(depth);
        let _guard = DepthGuard(&self.depth);

        let vars = closure.params.iter().cloned().zip(args).collect();
        let frame = Arc::new(Scope::new(vars, closure.scope.clone()));
        self.eval_in(&closure.body, Some(&frame))
    }

    fn resolve(&self, name: &str, scope: Option<&Arc<Scope>>) -> EvalResult<Expr> {
        if let Some(value) = scope.and_then(|s| s.lookup(name)) {
            return Ok(value.clone());
        }
        self.lookup(name)
    }

    fn eval_in(&self, expr: &Expr, scope: Option<&Arc<Scope>>) -> EvalResult<Expr> {
        match expr {
            Expr::Number(_)
            | Expr::Text(_)
            | Expr::Boolean(_)
            | Expr::Function(_)
            | Expr::Container(_)
            | Expr::Primitive(_)
            | Expr::Native(_) => Ok(expr.clone()),

            Expr::List(items) => items
                .iter()
                .map(|item| self.eval_in(item, scope))
                .collect::<EvalResult<Vec<_>>>()
                .map(Expr::List),

            Expr::Symbol(name) => self.resolve(name, scope),

            Expr::Call { callee, args } => {
                let callee = self.eval_in(callee, scope)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval_in(arg, scope))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.apply(&callee, args)
            }

            Expr::Lambda { params, body } => Ok(Expr::Function(Arc::new(Closure {
                params: params.clone(),
                body: Arc::clone(body),
                scope: scope.cloned(),
            }))),

            Expr::If {
                cond,
                then,
                otherwise,
            } => match self.eval_in(cond, scope)? {
                Expr::Boolean(true) => self.eval_in(then, scope),
                Expr::Boolean(false) => self.eval_in(otherwise, scope),
                other => Err(EvalError::TypeMismatch {
                    context: "if".to_string(),
                    expected: "boolean",
                    found: other.type_name(),
                }),
            },

            Expr::Let { bindings, body } => {
                // Each binding sees the ones before it.
                let mut frame = scope.cloned();
                for (name, value) in bindings {
                    let value = self.eval_in(value, frame.as_ref())?;
                    frame = Some(Arc::new(Scope::new(vec![(name.clone(), value)], frame)));
                }
                self.eval_in(body, frame.as_ref())
            }
        }
    }
}
