//! The functions registered into every root [`Context`]: `arg`, `f`,
//! `fragment`, and `join`.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::eval;
use crate::func::FuncDef;
use crate::parser::{self, Expr, Literal};

pub(crate) fn default_funcs() -> HashMap<String, Rc<FuncDef>> {
    let mut m = HashMap::new();
    m.insert(
        "arg".to_string(),
        FuncDef::register_ctx_numeric("arg", arg).expect("builtin names are valid"),
    );
    m.insert(
        "f".to_string(),
        FuncDef::register_ctx_numeric("f", fragment).expect("builtin names are valid"),
    );
    m.insert(
        "fragment".to_string(),
        FuncDef::register_ctx_numeric("fragment", fragment).expect("builtin names are valid"),
    );
    m.insert("join".to_string(), FuncDef::join_native());
    m.insert(
        "no_unused_error".to_string(),
        FuncDef::register_noout("no_unused_error", no_unused_error).expect("builtin names are valid"),
    );
    m
}

fn current_fragment_context(
    ctx: &Rc<Context>,
    who: &str,
) -> Result<Rc<std::cell::RefCell<crate::property::FragmentContext>>> {
    ctx.fragment().ok_or_else(|| Error::BadFunctionCall {
        name: who.to_string(),
        reason: "called with no fragment being built".into(),
    })
}

fn arg(ctx: &Rc<Context>, index: i64) -> Result<String> {
    let fc = current_fragment_context(ctx, "arg")?;
    let mut fc = fc.borrow_mut();
    fc.args.build(ctx, index)
}

fn fragment(ctx: &Rc<Context>, index: i64) -> Result<String> {
    let fc = current_fragment_context(ctx, "fragment")?;
    let mut fc = fc.borrow_mut();
    fc.fragments.build(ctx, index)
}

/// `#no_unused_error(i)`. Marks property `i` used without building it, for
/// built-ins that intentionally skip some checks on a given property.
fn no_unused_error(ctx: &Rc<Context>, index: i64) -> Result<()> {
    let fc = current_fragment_context(ctx, "no_unused_error")?;
    let mut fc = fc.borrow_mut();
    fc.args.report_used(index);
    fc.fragments.report_used(index);
    Ok(())
}

fn literal_str(name: &str, which: &str, lit: &Literal) -> Result<String> {
    match lit {
        Literal::Str(s) => Ok(s.clone()),
        other => Err(Error::BadFunctionCall {
            name: name.to_string(),
            reason: format!("{which} must be a string, got {:?}", other),
        }),
    }
}

fn literal_index(name: &str, which: &str, lit: &Literal) -> Result<i64> {
    match lit {
        Literal::Number(n) => Ok(*n as i64),
        other => Err(Error::BadFunctionCall {
            name: name.to_string(),
            reason: format!("{which} must be a number, got {:?}", other),
        }),
    }
}

fn rewrite_iteration(clause: &parser::Clause, i: i64) -> parser::Clause {
    let exprs = clause
        .exprs
        .iter()
        .map(|e| match e {
            Expr::Func(fe) => Expr::FuncCall(parser::FuncCallExpr {
                name: fe.name.clone(),
                args: vec![Literal::Number(i as f64)],
                pos: fe.pos,
            }),
            other => other.clone(),
        })
        .collect();
    parser::Clause { exprs }
}

/// `#join(template, separator[, from[, to]])`. Re-parameterizes `template`
/// across a range of indices, substituting each bare `#name` in it with
/// `#name(i)` and concatenating the non-empty results with `separator`.
pub(crate) fn join(ctx: &Rc<Context>, args: &[Literal]) -> Result<String> {
    if args.len() < 2 || args.len() > 4 {
        return Err(Error::BadFunctionCall {
            name: "join".to_string(),
            reason: format!("expected 2 to 4 arguments, got {}", args.len()),
        });
    }
    let template = literal_str("join", "template", &args[0])?;
    let separator = literal_str("join", "separator", &args[1])?;
    let from = match args.get(2) {
        Some(lit) => {
            let v = literal_index("join", "from", lit)?;
            if v > 0 {
                Some(v)
            } else {
                None
            }
        }
        None => None,
    };
    let to = match args.get(3) {
        Some(lit) => {
            let v = literal_index("join", "to", lit)?;
            if v > 0 {
                Some(v)
            } else {
                None
            }
        }
        None => None,
    };
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(Error::BadFunctionCall {
                name: "join".to_string(),
                reason: format!("from ({f}) must not exceed to ({t})"),
            });
        }
    }

    let clause = parser::parse(&template)?;
    let iterated: Vec<String> = clause
        .exprs
        .iter()
        .filter_map(|e| match e {
            Expr::Func(fe) => Some(fe.name.clone()),
            _ => None,
        })
        .collect();
    if iterated.is_empty() {
        return Err(Error::BadFunctionCall {
            name: "join".to_string(),
            reason: "template contains no function to iterate".into(),
        });
    }
    let mut checked = BTreeSet::new();
    for name in &iterated {
        if !checked.insert(name.clone()) {
            continue;
        }
        let func = ctx
            .lookup_func(name)
            .ok_or_else(|| Error::UnknownFunction { name: name.clone() })?;
        if !func.is_join_compatible() {
            return Err(Error::IncompatibleFunction {
                name: name.clone(),
                reason: "must take exactly one numeric parameter and return a fallible string"
                    .into(),
            });
        }
    }

    let start = from.map(|f| f.max(1)).unwrap_or(1);
    let mut i = start;
    let mut out = String::new();
    let mut appended_any = false;
    loop {
        let rewritten = rewrite_iteration(&clause, i);
        match eval::build_clause(&template, &rewritten, ctx) {
            Ok(s) => {
                if !s.is_empty() {
                    if appended_any {
                        out.push_str(&separator);
                    }
                    out.push_str(&s);
                    appended_any = true;
                }
            }
            Err(e) if e.is_invalid_index() => {
                let within_explicit_bounds = matches!((from, to), (Some(f), Some(t)) if i >= f && i <= t);
                if within_explicit_bounds {
                    return Err(e);
                }
                break;
            }
            Err(e) => return Err(e),
        }
        if let Some(t) = to {
            if i == t {
                break;
            }
        }
        i += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BindVarStyle;
    use crate::fragment::Fragment;

    #[test]
    fn arg_without_fragment_context_errors() {
        let ctx = Context::root(BindVarStyle::Dollar);
        let err = arg(&ctx, 1).unwrap_err();
        assert!(matches!(err, Error::BadFunctionCall { .. }));
    }

    #[test]
    fn join_over_args_range() {
        let f = Fragment::with_args(
            "$1,#join('#arg',',', 2)",
            [crate::value::Value::int(1), crate::value::Value::int(2), crate::value::Value::int(3), crate::value::Value::int(4)],
        );
        let (sql, args) = f.build_query(BindVarStyle::Dollar).unwrap();
        assert_eq!(sql, "$1,$2,$3,$4");
        assert_eq!(
            args,
            vec![
                crate::value::Value::int(1),
                crate::value::Value::int(2),
                crate::value::Value::int(3),
                crate::value::Value::int(4),
            ]
        );
    }

    #[test]
    fn no_unused_error_suppresses_unused_property() {
        let f = Fragment::with_args("$1#no_unused_error(2)", [crate::value::Value::int(1), crate::value::Value::int(2)]);
        let (sql, args) = f.build_query(BindVarStyle::Dollar).unwrap();
        assert_eq!(sql, "$1");
        assert_eq!(args, vec![crate::value::Value::int(1)]);
    }

    #[test]
    fn join_rejects_incompatible_function() {
        let mut map = HashMap::new();
        map.insert(
            "bad".to_string(),
            FuncDef::register("bad", || "x".to_string()).unwrap(),
        );
        let root = Context::root(BindVarStyle::Dollar);
        let scoped = Context::with_funcs(&root, map);
        let err = join(&scoped, &[Literal::Str("#bad".into()), Literal::Str(",".into())]).unwrap_err();
        assert!(matches!(err, Error::IncompatibleFunction { .. }));
    }
}
