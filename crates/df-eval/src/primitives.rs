//! Built-in primitives, pre-loaded into every [`Environment`].

use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use crate::expr::{Arity, Expr, Primitive};

pub static PRIMITIVES: &[Primitive] = &[
    Primitive { name: "+", arity: Arity::AtLeast(0), func: prim_add },
    Primitive { name: "-", arity: Arity::AtLeast(1), func: prim_sub },
    Primitive { name: "*", arity: Arity::AtLeast(0), func: prim_mul },
    Primitive { name: "/", arity: Arity::AtLeast(1), func: prim_div },
    Primitive { name: "=", arity: Arity::Exact(2), func: prim_eq },
    Primitive { name: "<", arity: Arity::Exact(2), func: prim_lt },
    Primitive { name: ">", arity: Arity::Exact(2), func: prim_gt },
    Primitive { name: "<=", arity: Arity::Exact(2), func: prim_le },
    Primitive { name: ">=", arity: Arity::Exact(2), func: prim_ge },
    Primitive { name: "not", arity: Arity::Exact(1), func: prim_not },
    Primitive { name: "and", arity: Arity::AtLeast(0), func: prim_and },
    Primitive { name: "or", arity: Arity::AtLeast(0), func: prim_or },
    Primitive { name: "list", arity: Arity::AtLeast(0), func: prim_list },
    Primitive { name: "first", arity: Arity::Exact(1), func: prim_first },
    Primitive { name: "rest", arity: Arity::Exact(1), func: prim_rest },
    Primitive { name: "cons", arity: Arity::Exact(2), func: prim_cons },
    Primitive { name: "length", arity: Arity::Exact(1), func: prim_length },
    Primitive { name: "empty?", arity: Arity::Exact(1), func: prim_is_empty },
    Primitive { name: "append", arity: Arity::AtLeast(0), func: prim_append },
    Primitive { name: "map", arity: Arity::Exact(2), func: prim_map },
    Primitive { name: "fold", arity: Arity::Exact(3), func: prim_fold },
    Primitive { name: "concat", arity: Arity::AtLeast(0), func: prim_concat },
    Primitive { name: "to-text", arity: Arity::Exact(1), func: prim_to_text },
];

fn mismatch(context: &str, expected: &'static str, found: &Expr) -> EvalError {
    EvalError::TypeMismatch {
        context: context.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn number(context: &str, value: &Expr) -> EvalResult<f64> {
    match value {
        Expr::Number(n) => Ok(*n),
        other => Err(mismatch(context, "number", other)),
    }
}

fn numbers(context: &str, args: &[Expr]) -> EvalResult<Vec<f64>> {
    args.iter().map(|arg| number(context, arg)).collect()
}

fn boolean(context: &str, value: &Expr) -> EvalResult<bool> {
    match value {
        Expr::Boolean(b) => Ok(*b),
        other => Err(mismatch(context, "boolean", other)),
    }
}

fn list<'a>(context: &str, value: &'a Expr) -> EvalResult<&'a [Expr]> {
    match value {
        Expr::List(items) => Ok(items),
        other => Err(mismatch(context, "list", other)),
    }
}

fn prim_add(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    Ok(Expr::Number(numbers("+", args)?.iter().sum()))
}

fn prim_sub(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    let values = numbers("-", args)?;
    match values.split_first() {
        Some((only, [])) => Ok(Expr::Number(-only)),
        Some((first, rest)) => Ok(Expr::Number(rest.iter().fold(*first, |acc, v| acc - v))),
        None => Err(EvalError::Runtime {
            message: "'-' needs an argument".to_string(),
        }),
    }
}

fn prim_mul(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    Ok(Expr::Number(numbers("*", args)?.iter().product()))
}

fn prim_div(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    let values = numbers("/", args)?;
    let (first, rest) = values.split_first().ok_or_else(|| EvalError::Runtime {
        message: "'/' needs an argument".to_string(),
    })?;
    if rest.is_empty() {
        if *first == 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        return Ok(Expr::Number(1.0 / first));
    }
    let mut acc = *first;
    for divisor in rest {
        if *divisor == 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        acc /= divisor;
    }
    Ok(Expr::Number(acc))
}

fn prim_eq(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    Ok(Expr::Boolean(args[0] == args[1]))
}

fn compare(context: &str, args: &[Expr], op: fn(f64, f64) -> bool) -> EvalResult<Expr> {
    let a = number(context, &args[0])?;
    let b = number(context, &args[1])?;
    Ok(Expr::Boolean(op(a, b)))
}

fn prim_lt(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    compare("<", args, |a, b| a < b)
}

fn prim_gt(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    compare(">", args, |a, b| a > b)
}

fn prim_le(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    compare("<=", args, |a, b| a <= b)
}

fn prim_ge(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    compare(">=", args, |a, b| a >= b)
}

fn prim_not(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    Ok(Expr::Boolean(!boolean("not", &args[0])?))
}

fn prim_and(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    let mut all = true;
    for arg in args {
        all &= boolean("and", arg)?;
    }
    Ok(Expr::Boolean(all))
}

fn prim_or(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    let mut any = false;
    for arg in args {
        any |= boolean("or", arg)?;
    }
    Ok(Expr::Boolean(any))
}

fn prim_list(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    Ok(Expr::List(args.to_vec()))
}

fn prim_first(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    list("first", &args[0])?
        .first()
        .cloned()
        .ok_or_else(|| EvalError::Runtime {
            message: "first of an empty list".to_string(),
        })
}

fn prim_rest(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    match list("rest", &args[0])? {
        [] => Err(EvalError::Runtime {
            message: "rest of an empty list".to_string(),
        }),
        [_, tail @ ..] => Ok(Expr::List(tail.to_vec())),
    }
}

fn prim_cons(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    let tail = list("cons", &args[1])?;
    let mut items = Vec::with_capacity(tail.len() + 1);
    items.push(args[0].clone());
    items.extend_from_slice(tail);
    Ok(Expr::List(items))
}

fn prim_length(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    Ok(Expr::Number(list("length", &args[0])?.len() as f64))
}

fn prim_is_empty(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    Ok(Expr::Boolean(list("empty?", &args[0])?.is_empty()))
}

fn prim_append(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    let mut items = Vec::new();
    for arg in args {
        items.extend_from_slice(list("append", arg)?);
    }
    Ok(Expr::List(items))
}

fn prim_map(env: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    let func = &args[0];
    list("map", &args[1])?
        .iter()
        .map(|item| env.apply(func, vec![item.clone()]))
        .collect::<EvalResult<Vec<_>>>()
        .map(Expr::List)
}

/// `(fold f init xs)` calls `f(acc, x)` left to right.
fn prim_fold(env: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    let func = &args[0];
    let mut acc = args[1].clone();
    for item in list("fold", &args[2])? {
        acc = env.apply(func, vec![acc, item.clone()])?;
    }
    Ok(acc)
}

fn prim_concat(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    let mut out = String::new();
    for arg in args {
        match arg {
            Expr::Text(s) => out.push_str(s),
            other => return Err(mismatch("concat", "text", other)),
        }
    }
    Ok(Expr::Text(out))
}

fn prim_to_text(_: &Environment, args: &[Expr]) -> EvalResult<Expr> {
    Ok(match &args[0] {
        Expr::Text(s) => Expr::Text(s.clone()),
        other => Expr::Text(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(name: &str, args: Vec<Expr>) -> EvalResult<Expr> {
        let env = Environment::new();
        env.evaluate(&Expr::call_named(name, args))
    }

    fn nums(values: &[f64]) -> Vec<Expr> {
        values.iter().copied().map(Expr::Number).collect()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("+", nums(&[1.0, 2.0, 3.0])).unwrap(), Expr::Number(6.0));
        assert_eq!(eval("-", nums(&[10.0, 3.0, 2.0])).unwrap(), Expr::Number(5.0));
        assert_eq!(eval("-", nums(&[4.0])).unwrap(), Expr::Number(-4.0));
        assert_eq!(eval("*", nums(&[2.0, 3.0])).unwrap(), Expr::Number(6.0));
        assert_eq!(eval("/", nums(&[9.0, 3.0])).unwrap(), Expr::Number(3.0));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            eval("/", nums(&[1.0, 0.0])).unwrap_err(),
            EvalError::DivisionByZero
        );
    }

    #[test]
    fn arithmetic_rejects_text() {
        let err = eval("+", vec![Expr::Number(1.0), Expr::text("a")]).unwrap_err();
        assert!(matches!(
            err,
            EvalError::TypeMismatch {
                expected: "number",
                found: "text",
                ..
            }
        ));
    }

    #[test]
    fn primitive_arity_is_checked() {
        assert!(matches!(
            eval("<", nums(&[1.0])),
            Err(EvalError::Arity { found: 1, .. })
        ));
    }

    #[test]
    fn list_operations() {
        let xs = Expr::call_named("list", nums(&[1.0, 2.0, 3.0]));
        assert_eq!(eval("length", vec![xs.clone()]).unwrap(), Expr::Number(3.0));
        assert_eq!(eval("first", vec![xs.clone()]).unwrap(), Expr::Number(1.0));
        assert_eq!(
            eval("rest", vec![xs.clone()]).unwrap(),
            Expr::List(nums(&[2.0, 3.0]))
        );
        assert_eq!(
            eval("cons", vec![Expr::Number(0.0), xs]).unwrap(),
            Expr::List(nums(&[0.0, 1.0, 2.0, 3.0]))
        );
        assert!(eval("first", vec![Expr::List(vec![])]).is_err());
    }

    #[test]
    fn map_and_fold_call_back_into_functions() {
        let xs = Expr::List(nums(&[1.0, 2.0, 3.0]));
        let inc = Expr::lambda(
            vec!["x".into()],
            Expr::call_named("+", vec![Expr::symbol("x"), Expr::Number(1.0)]),
        );
        assert_eq!(
            eval("map", vec![inc, xs.clone()]).unwrap(),
            Expr::List(nums(&[2.0, 3.0, 4.0]))
        );
        assert_eq!(
            eval("fold", vec![Expr::symbol("+"), Expr::Number(0.0), xs]).unwrap(),
            Expr::Number(6.0)
        );
    }

    #[test]
    fn text_operations() {
        assert_eq!(
            eval("concat", vec![Expr::text("a"), Expr::text("b")]).unwrap(),
            Expr::text("ab")
        );
        assert_eq!(
            eval("to-text", vec![Expr::Number(2.5)]).unwrap(),
            Expr::text("2.5")
        );
    }
}
