//! Symbol table and scoping.
//!
//! Two layers:
//! - top-level bindings, owned by [`Environment`] and mutable through `define`
//! - local [`Scope`] frames created by calls and `let`, immutable once built
//!
//! Closures keep a link to their local scope only. Names that fall through
//! to the top level are resolved against the environment at the moment the
//! body runs, so a redefinition is picked up by every existing closure.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EvalError, EvalResult};
use crate::expr::Expr;
use crate::primitives::PRIMITIVES;

/// An immutable local frame with a link to its parent.
#[derive(Debug)]
pub struct Scope {
    vars: Vec<(String, Expr)>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    pub fn new(vars: Vec<(String, Expr)>, parent: Option<Arc<Scope>>) -> Self {
        Self { vars, parent }
    }

    /// Walk the frame chain, innermost first.
    pub fn lookup(&self, name: &str) -> Option<&Expr> {
        let mut frame = Some(self);
        while let Some(current) = frame {
            // Later entries shadow earlier ones within a frame.
            if let Some((_, value)) = current.vars.iter().rev().find(|(n, _)| n == name) {
                return Some(value);
            }
            frame = current.parent.as_deref();
        }
        None
    }
}

/// Top-level bindings plus the immutable primitive table.
#[derive(Debug)]
pub struct Environment {
    globals: HashMap<String, Expr>,
    primitives: HashMap<&'static str, Expr>,
    pub(crate) depth: Cell<usize>,
}

impl Environment {
    /// Create an environment with every primitive pre-loaded.
    pub fn new() -> Self {
        let primitives = PRIMITIVES
            .iter()
            .map(|p| (p.name, Expr::Primitive(p)))
            .collect();
        Self {
            globals: HashMap::new(),
            primitives,
            depth: Cell::new(0),
        }
    }

    /// Bind `name` at the top level, replacing any previous binding.
    pub fn define(&mut self, name: impl Into<String>, expr: Expr) -> EvalResult<()> {
        let name = name.into();
        if self.is_primitive(&name) {
            return Err(EvalError::ReservedSymbol { name });
        }
        self.globals.insert(name, expr);
        Ok(())
    }

    /// Remove a top-level binding. Returns the old value, if any.
    pub fn remove(&mut self, name: &str) -> Option<Expr> {
        self.globals.remove(name)
    }

    pub fn lookup(&self, name: &str) -> EvalResult<Expr> {
        self.globals
            .get(name)
            .or_else(|| self.primitives.get(name))
            .cloned()
            .ok_or_else(|| EvalError::UnboundSymbol {
                name: name.to_string(),
            })
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.globals.contains_key(name) || self.is_primitive(name)
    }

    pub fn is_primitive(&self, name: &str) -> bool {
        self.primitives.contains_key(name)
    }

    /// User-defined top-level names, sorted.
    pub fn defined_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.globals.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
