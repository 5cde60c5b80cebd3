//! Printable s-expression form, used for run logs.

use std::fmt;

use crate::expr::Expr;

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Text(s) => write!(f, "{:?}", s),
            Expr::Boolean(b) => write!(f, "{}", b),
            Expr::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Expr::Function(closure) => write!(f, "<function ({})>", closure.params.join(" ")),
            Expr::Container(entity) => write!(f, "{}", entity),
            Expr::Primitive(p) => f.write_str(p.name),
            Expr::Native(n) => f.write_str(&n.name),
            Expr::Symbol(name) => f.write_str(name),
            Expr::Call { callee, args } => {
                write!(f, "({}", callee)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Lambda { params, body } => {
                write!(f, "(lambda ({}) {})", params.join(" "), body)
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => write!(f, "(if {} {} {})", cond, then, otherwise),
            Expr::Let { bindings, body } => {
                f.write_str("(let (")?;
                for (i, (name, value)) in bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "({} {})", name, value)?;
                }
                write!(f, ") {})", body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_core::{EntityId, EntityRef};

    #[test]
    fn prints_calls_and_values() {
        let expr = Expr::call_named(
            "+",
            vec![Expr::Number(3.0), Expr::call_named("f", vec![Expr::Number(0.5)])],
        );
        assert_eq!(expr.to_string(), "(+ 3 (f 0.5))");
        assert_eq!(Expr::text("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(
            Expr::List(vec![Expr::Boolean(true), Expr::Number(1.0)]).to_string(),
            "[true 1]"
        );
        assert_eq!(
            Expr::Container(EntityRef::new(EntityId(12), "wall")).to_string(),
            "<wall 12>"
        );
    }

    #[test]
    fn prints_binding_forms() {
        let expr = Expr::Let {
            bindings: vec![("a".into(), Expr::Number(1.0))],
            body: Box::new(Expr::lambda(vec!["x".into()], Expr::symbol("a"))),
        };
        assert_eq!(expr.to_string(), "(let ((a 1)) (lambda (x) a))");
    }
}
