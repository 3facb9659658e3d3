//! The composable unit: a raw template plus the values and sub-builders its
//! `#`-calls address.

use std::rc::Rc;

use crate::context::{BindVarStyle, Context};
use crate::error::Result;
use crate::eval;
use crate::value::Value;

/// Capability shared by anything a fragment's `#f`/`#fragment` calls can
/// address: given the context currently building its parent, produce a
/// string and commit whatever argument values it needs along the way.
pub trait FragmentBuilder {
    fn build_fragment(&self, ctx: &Rc<Context>) -> Result<String>;
}

impl FragmentBuilder for Rc<dyn FragmentBuilder> {
    fn build_fragment(&self, ctx: &Rc<Context>) -> Result<String> {
        (**self).build_fragment(ctx)
    }
}

/// Wraps one opaque [`Value`] so it can sit in the same `Property<T>` slot a
/// sub-fragment would. `#arg(i)` and bare `$i`/`?` both resolve to this.
#[derive(Clone)]
pub(crate) struct ArgBuilder(pub Value);

impl FragmentBuilder for ArgBuilder {
    fn build_fragment(&self, ctx: &Rc<Context>) -> Result<String> {
        Ok(ctx.commit_arg(self.0.clone()))
    }
}

/// A template string plus the properties its `#`-calls can address.
///
/// Immutable by convention: the same `Fragment` can be built repeatedly
/// against fresh contexts and always produces the same result.
#[derive(Clone)]
pub struct Fragment {
    pub(crate) raw: String,
    pub(crate) args: Vec<Value>,
    pub(crate) fragments: Vec<Rc<dyn FragmentBuilder>>,
    pub(crate) prefix: Option<String>,
    pub(crate) suffix: Option<String>,
}

impl Fragment {
    /// A template with no properties.
    pub fn raw(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            args: Vec::new(),
            fragments: Vec::new(),
            prefix: None,
            suffix: None,
        }
    }

    /// A template addressing positional argument values via `$N`/`?`/`#arg`.
    pub fn with_args(raw: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            raw: raw.into(),
            args: args.into_iter().collect(),
            fragments: Vec::new(),
            prefix: None,
            suffix: None,
        }
    }

    /// A template addressing sub-builders via `#f`/`#fragment`/`#join`.
    pub fn with_fragments(
        raw: impl Into<String>,
        fragments: impl IntoIterator<Item = Rc<dyn FragmentBuilder>>,
    ) -> Self {
        Self {
            raw: raw.into(),
            args: Vec::new(),
            fragments: fragments.into_iter().collect(),
            prefix: None,
            suffix: None,
        }
    }

    /// Appends more sub-builders after construction. Returns `self` for
    /// chaining.
    pub fn append_fragments(
        mut self,
        fragments: impl IntoIterator<Item = Rc<dyn FragmentBuilder>>,
    ) -> Self {
        self.fragments.extend(fragments);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Allocates a fresh root [`Context`] in the requested style, evaluates
    /// this fragment, and returns the built SQL alongside its ordered
    /// arguments.
    pub fn build_query(&self, style: BindVarStyle) -> Result<(String, Vec<Value>)> {
        let ctx = Context::root(style);
        let sql = eval::build_fragment(self, &ctx)?;
        Ok((sql, ctx.committed_args()))
    }

    /// Evaluates this fragment within a caller-provided context, e.g. as a
    /// child of another fragment's build. Arguments land in the context's
    /// shared store; read them back via the context that owns the root.
    pub fn build_fragment(&self, ctx: &Rc<Context>) -> Result<String> {
        eval::build_fragment(self, ctx)
    }
}

impl FragmentBuilder for Fragment {
    fn build_fragment(&self, ctx: &Rc<Context>) -> Result<String> {
        eval::build_fragment(self, ctx)
    }
}

/// Shorthand for a raw template with positional args and no sub-fragments.
pub fn fa(raw: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Fragment {
    Fragment::with_args(raw, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_has_no_properties() {
        let f = Fragment::raw("now()");
        assert!(f.args.is_empty());
        assert!(f.fragments.is_empty());
    }

    #[test]
    fn builder_chaining_sets_prefix_suffix() {
        let f = Fragment::raw("1=1").with_prefix("WHERE").with_suffix("FOR UPDATE");
        assert_eq!(f.prefix.as_deref(), Some("WHERE"));
        assert_eq!(f.suffix.as_deref(), Some("FOR UPDATE"));
    }
}
