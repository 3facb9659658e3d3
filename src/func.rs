//! The function registry: named preprocessing callables a template can
//! invoke via `#name(...)`.
//!
//! Dispatch is a small, closed set rather than fully generic: the legal
//! parameter kinds, output shapes, and optional leading context capture
//! amount to four concrete shapes, so each gets its own registration
//! constructor instead of one reflective path.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::context::Context;
use crate::error::{Error, Result};

/// A runtime argument value, mirroring the lexer's literal kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Nil,
}

/// A function's declared output shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    /// No output; called for effect only.
    Zero,
    /// Always succeeds with a string.
    One,
    /// May fail; the fallible counterpart used by every addressing function.
    TwoWithError,
}

type PlainFn = dyn Fn() -> String;
type CtxFn = dyn Fn(&Rc<Context>) -> Result<String>;
type NumericFn = dyn Fn(i64) -> Result<String>;
type CtxNumericFn = dyn Fn(&Rc<Context>, i64) -> Result<String>;
type CtxNoOutFn = dyn Fn(&Rc<Context>, i64) -> Result<()>;

enum Body {
    Plain(Rc<PlainFn>),
    Ctx(Rc<CtxFn>),
    Numeric(Rc<NumericFn>),
    CtxNumeric(Rc<CtxNumericFn>),
    NoOut(Rc<CtxNoOutFn>),
    /// `#join`: native, variadic (2-4 args), never user-constructible.
    /// Dispatched directly by the evaluator; [`FuncDef::call`] never sees it.
    Join,
}

/// A registered preprocessing function.
pub struct FuncDef {
    name: String,
    body: Body,
    arity: Arity,
    join_compatible: bool,
}

impl std::fmt::Debug for FuncDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncDef")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("join_compatible", &self.join_compatible)
            .finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
        return Err(Error::BadFunctionRegistration {
            name: name.to_string(),
            reason: "function names may contain only letters and '_'".into(),
        });
    }
    Ok(())
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "function panicked with a non-string payload".to_string()
    }
}

fn one_numeric_arg(name: &str, args: &[ArgValue]) -> Result<i64> {
    match args {
        [ArgValue::Int(n)] => Ok(*n),
        [ArgValue::Float(n)] => Ok(*n as i64),
        [other] => Err(Error::BadFunctionCall {
            name: name.to_string(),
            reason: format!("expected a numeric argument, got {:?}", other),
        }),
        _ => Err(Error::BadFunctionCall {
            name: name.to_string(),
            reason: format!("expected exactly 1 argument, got {}", args.len()),
        }),
    }
}

fn expect_no_args(name: &str, args: &[ArgValue]) -> Result<()> {
    if !args.is_empty() {
        return Err(Error::BadFunctionCall {
            name: name.to_string(),
            reason: format!("expected 0 arguments, got {}", args.len()),
        });
    }
    Ok(())
}

impl FuncDef {
    /// Registers a zero-parameter function returning a plain string (output
    /// arity 1). Cannot participate in `#join`, since it has no numeric
    /// parameter to iterate.
    pub fn register(name: impl Into<String>, f: impl Fn() -> String + 'static) -> Result<Rc<FuncDef>> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Rc::new(FuncDef {
            name,
            body: Body::Plain(Rc::new(f)),
            arity: Arity::One,
            join_compatible: false,
        }))
    }

    /// Registers a zero-parameter, context-capturing function that may fail
    /// (output arity 2). Cannot participate in `#join`.
    pub fn register_ctx(
        name: impl Into<String>,
        f: impl Fn(&Rc<Context>) -> Result<String> + 'static,
    ) -> Result<Rc<FuncDef>> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Rc::new(FuncDef {
            name,
            body: Body::Ctx(Rc::new(f)),
            arity: Arity::TwoWithError,
            join_compatible: false,
        }))
    }

    /// Registers a one-numeric-parameter function that may fail. This is
    /// the `#join`-compatible shape without a context capture.
    pub fn register_numeric(
        name: impl Into<String>,
        f: impl Fn(i64) -> Result<String> + 'static,
    ) -> Result<Rc<FuncDef>> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Rc::new(FuncDef {
            name,
            body: Body::Numeric(Rc::new(f)),
            arity: Arity::TwoWithError,
            join_compatible: true,
        }))
    }

    /// Registers a one-numeric-parameter function preceded by a context
    /// capture. This is the shape `arg`, `f`, and `fragment` all use, and
    /// the shape `#join` expects of whatever it iterates.
    ///
    /// A caller wanting a scope-addressable "global args" bank (referenced
    /// from user functions the way the numbered properties are) builds it
    /// entirely on top of this: register a function that closes over its own
    /// `Vec<Value>` and ignores or repurposes the numeric parameter, then
    /// scope it in with [`Context::with_funcs`](crate::context::Context::with_funcs).
    /// No core change is needed for that pattern.
    pub fn register_ctx_numeric(
        name: impl Into<String>,
        f: impl Fn(&Rc<Context>, i64) -> Result<String> + 'static,
    ) -> Result<Rc<FuncDef>> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Rc::new(FuncDef {
            name,
            body: Body::CtxNumeric(Rc::new(f)),
            arity: Arity::TwoWithError,
            join_compatible: true,
        }))
    }

    /// Registers a one-numeric-parameter, context-capturing function with
    /// no string output (output arity 0). Called for effect only, e.g. to
    /// mark a property used without building it. Not `#join`-compatible,
    /// since `#join` concatenates string results.
    pub fn register_noout(
        name: impl Into<String>,
        f: impl Fn(&Rc<Context>, i64) -> Result<()> + 'static,
    ) -> Result<Rc<FuncDef>> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Rc::new(FuncDef {
            name,
            body: Body::NoOut(Rc::new(f)),
            arity: Arity::Zero,
            join_compatible: false,
        }))
    }

    pub(crate) fn join_native() -> Rc<FuncDef> {
        Rc::new(FuncDef {
            name: "join".to_string(),
            body: Body::Join,
            arity: Arity::TwoWithError,
            join_compatible: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Whether this function's registered shape is `#join`-compatible:
    /// return arity 2, exactly one numeric parameter, optionally preceded
    /// by a context capture. Since the shape is fixed at registration time
    /// by which constructor was used, this is a plain field read rather
    /// than a runtime probe.
    pub fn is_join_compatible(&self) -> bool {
        self.join_compatible
    }

    pub(crate) fn is_native_join(&self) -> bool {
        matches!(self.body, Body::Join)
    }

    pub(crate) fn call(&self, ctx: &Rc<Context>, args: &[ArgValue]) -> Result<String> {
        match &self.body {
            Body::Plain(f) => {
                expect_no_args(&self.name, args)?;
                let f = f.clone();
                catch_unwind(AssertUnwindSafe(|| f()))
                    .map_err(|p| Error::FunctionPanic {
                        name: self.name.clone(),
                        message: panic_message(p),
                    })
            }
            Body::Ctx(f) => {
                expect_no_args(&self.name, args)?;
                let f = f.clone();
                catch_unwind(AssertUnwindSafe(|| f(ctx)))
                    .unwrap_or_else(|p| {
                        Err(Error::FunctionPanic {
                            name: self.name.clone(),
                            message: panic_message(p),
                        })
                    })
            }
            Body::Numeric(f) => {
                let n = one_numeric_arg(&self.name, args)?;
                let f = f.clone();
                catch_unwind(AssertUnwindSafe(|| f(n))).unwrap_or_else(|p| {
                    Err(Error::FunctionPanic {
                        name: self.name.clone(),
                        message: panic_message(p),
                    })
                })
            }
            Body::CtxNumeric(f) => {
                let n = one_numeric_arg(&self.name, args)?;
                let f = f.clone();
                catch_unwind(AssertUnwindSafe(|| f(ctx, n))).unwrap_or_else(|p| {
                    Err(Error::FunctionPanic {
                        name: self.name.clone(),
                        message: panic_message(p),
                    })
                })
            }
            Body::NoOut(f) => {
                let n = one_numeric_arg(&self.name, args)?;
                let f = f.clone();
                catch_unwind(AssertUnwindSafe(|| f(ctx, n).map(|_| String::new())))
                    .unwrap_or_else(|p| {
                        Err(Error::FunctionPanic {
                            name: self.name.clone(),
                            message: panic_message(p),
                        })
                    })
            }
            Body::Join => unreachable!("#join is dispatched natively by the evaluator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BindVarStyle;

    #[test]
    fn register_rejects_bad_names() {
        let err = FuncDef::register("bad-name", || "x".to_string()).unwrap_err();
        assert!(matches!(err, Error::BadFunctionRegistration { .. }));
    }

    #[test]
    fn plain_function_ignores_context() {
        let f = FuncDef::register("greet", || "hi".to_string()).unwrap();
        let ctx = Context::root(BindVarStyle::Dollar);
        assert_eq!(f.call(&ctx, &[]).unwrap(), "hi");
    }

    #[test]
    fn numeric_function_is_join_compatible() {
        let f = FuncDef::register_numeric("double", |n| Ok((n * 2).to_string())).unwrap();
        assert!(f.is_join_compatible());
        let ctx = Context::root(BindVarStyle::Dollar);
        assert_eq!(f.call(&ctx, &[ArgValue::Int(3)]).unwrap(), "6");
    }

    #[test]
    fn zero_param_function_is_not_join_compatible() {
        let f = FuncDef::register("bad", || "x".to_string()).unwrap();
        assert!(!f.is_join_compatible());
    }

    #[test]
    fn wrong_arity_call_errors() {
        let f = FuncDef::register_numeric("double", |n| Ok(n.to_string())).unwrap();
        let ctx = Context::root(BindVarStyle::Dollar);
        let err = f.call(&ctx, &[]).unwrap_err();
        assert!(matches!(err, Error::BadFunctionCall { .. }));
    }

    #[test]
    fn panic_is_caught_as_function_panic() {
        let f = FuncDef::register("boom", || panic!("kaboom")).unwrap();
        let ctx = Context::root(BindVarStyle::Dollar);
        let err = f.call(&ctx, &[]).unwrap_err();
        assert!(matches!(err, Error::FunctionPanic { .. }));
    }

    #[test]
    fn noout_function_returns_empty_string_on_success() {
        use std::cell::Cell;
        use std::rc::Rc as StdRc;

        let seen = StdRc::new(Cell::new(0i64));
        let seen_in_closure = seen.clone();
        let f = FuncDef::register_noout("mark_used", move |_ctx, n| {
            seen_in_closure.set(n);
            Ok(())
        })
        .unwrap();
        assert_eq!(f.arity(), Arity::Zero);
        assert!(!f.is_join_compatible());
        let ctx = Context::root(BindVarStyle::Dollar);
        assert_eq!(f.call(&ctx, &[ArgValue::Int(3)]).unwrap(), "");
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn noout_function_panic_is_caught() {
        let f = FuncDef::register_noout("boom", |_ctx, _n| panic!("kaboom")).unwrap();
        let ctx = Context::root(BindVarStyle::Dollar);
        let err = f.call(&ctx, &[ArgValue::Int(1)]).unwrap_err();
        assert!(matches!(err, Error::FunctionPanic { .. }));
    }
}
