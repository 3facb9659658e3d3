//! The evaluator: walks a parsed [`Clause`](crate::parser::Clause),
//! dispatching plain text, bind variables, and function calls, and ties
//! together the lexer, parser, context, and property modules into
//! [`Fragment::build_query`](crate::fragment::Fragment::build_query) /
//! [`Fragment::build_fragment`](crate::fragment::Fragment::build_fragment).

use std::cell::RefCell;
use std::rc::Rc;

use crate::builtins;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::func::ArgValue;
use crate::parser::{self, Clause, Expr, Literal};
use crate::property::FragmentContext;

fn literal_to_arg_value(lit: &Literal) -> ArgValue {
    match lit {
        Literal::Number(n) => {
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                ArgValue::Int(*n as i64)
            } else {
                ArgValue::Float(*n)
            }
        }
        Literal::Str(s) => ArgValue::Str(s.clone()),
        Literal::Bool(b) => ArgValue::Bool(*b),
        Literal::Nil => ArgValue::Nil,
    }
}

/// Walks one already-parsed `Clause`, writing plain text verbatim, resolving
/// bind variables through the current fragment's `Args` property, and
/// dispatching function calls through the scoped function registry.
pub(crate) fn build_clause(raw: &str, clause: &Clause, ctx: &Rc<Context>) -> Result<String> {
    let mut out = String::new();
    for expr in &clause.exprs {
        match expr {
            Expr::Plain(p) => out.push_str(&p.text),
            Expr::BindVar(b) => {
                let fc = ctx.fragment().ok_or_else(|| {
                    Error::syntax(raw, b.pos, "bind variable referenced with no fragment in scope")
                })?;
                let s = fc.borrow_mut().args.build(ctx, b.index)?;
                out.push_str(&s);
            }
            Expr::FuncCall(call) => {
                let func = ctx
                    .lookup_func(&call.name)
                    .ok_or_else(|| Error::UnknownFunction { name: call.name.clone() })?;
                let s = if func.is_native_join() {
                    builtins::join(ctx, &call.args)?
                } else {
                    let args: Vec<ArgValue> = call.args.iter().map(literal_to_arg_value).collect();
                    func.call(ctx, &args)?
                };
                out.push_str(&s);
            }
            Expr::Func(fe) => {
                return Err(Error::syntax(
                    raw,
                    fe.pos,
                    format!("'#{}' used without being called, forgot to call it?", fe.name),
                ));
            }
        }
    }
    Ok(out)
}

/// Evaluates one fragment: parses its raw template, walks the resulting
/// clause in a freshly scoped `FragmentContext`, runs the usage checker, and
/// applies prefix/suffix trimming rules.
pub(crate) fn build_fragment(fragment: &Fragment, ctx: &Rc<Context>) -> Result<String> {
    tracing::trace!(raw = %fragment.raw, "building fragment");
    let fc = Rc::new(RefCell::new(FragmentContext::new(fragment)));
    let child_ctx = Context::with_fragment(ctx, fc.clone());

    let clause = parser::parse(&fragment.raw)?;
    let body = match build_clause(&fragment.raw, &clause, &child_ctx) {
        Ok(body) => body,
        Err(e) => {
            if !matches!(e, Error::Syntax { .. }) {
                tracing::warn!(raw = %fragment.raw, error = %e, "fragment build aborted");
            }
            return Err(e);
        }
    };
    fc.borrow().check_usage(&fragment.raw)?;

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if let Some(p) = fragment.prefix.as_deref().filter(|p| !p.is_empty()) {
        parts.push(p);
    }
    parts.push(trimmed);
    if let Some(s) = fragment.suffix.as_deref().filter(|s| !s.is_empty()) {
        parts.push(s);
    }
    Ok(parts.join(" "))
}
