//! Per-fragment property accounting: the `Args`/`Fragments` slots a
//! fragment's `#`-calls address, and the usage checker that makes sure every
//! declared slot is referenced exactly once.

use std::rc::Rc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::fragment::{ArgBuilder, Fragment, FragmentBuilder};

/// One indexed collection of buildable items (either a fragment's `args` or
/// its `fragments`), with usage tracking and a per-build string cache.
///
/// The cache is bypassed entirely while the active bind-var style is
/// `Question`: each textual reference must re-commit so every occurrence of
/// `?` lines up with its own entry in the argument list. Under `Dollar` the
/// cache is honored, which combined with the dollar store's deduplication is
/// what makes repeated references to the same slot collapse onto one
/// placeholder.
pub(crate) struct Property<T: FragmentBuilder> {
    items: Vec<T>,
    used: Vec<bool>,
    cache: Vec<Option<String>>,
}

impl<T: FragmentBuilder> Property<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        let n = items.len();
        Self {
            items,
            used: vec![false; n],
            cache: vec![None; n],
        }
    }

    fn validate_index(&self, index: i64) -> Result<usize> {
        if index < 1 || index as usize > self.items.len() {
            return Err(Error::InvalidIndex {
                index,
                max: self.items.len(),
            });
        }
        Ok((index - 1) as usize)
    }

    /// Marks the 1-based `index` used without building it. Out-of-range
    /// indexes are silently ignored rather than erroring.
    pub(crate) fn report_used(&mut self, index: i64) {
        if index >= 1 && (index as usize) <= self.used.len() {
            self.used[(index - 1) as usize] = true;
        }
    }

    pub(crate) fn build(&mut self, ctx: &Rc<Context>, index: i64) -> Result<String> {
        let idx = self.validate_index(index)?;
        self.used[idx] = true;
        if ctx.style_is_question() {
            return self.items[idx].build_fragment(ctx);
        }
        if let Some(cached) = &self.cache[idx] {
            return Ok(cached.clone());
        }
        let built = self.items[idx].build_fragment(ctx)?;
        self.cache[idx] = Some(built.clone());
        Ok(built)
    }

    /// Returns the 1-based indexes of every slot never marked used, or
    /// `None` if all were.
    pub(crate) fn unused(&self) -> Option<Vec<usize>> {
        let unused: Vec<usize> = self
            .used
            .iter()
            .enumerate()
            .filter(|(_, used)| !**used)
            .map(|(i, _)| i + 1)
            .collect();
        if unused.is_empty() {
            None
        } else {
            Some(unused)
        }
    }
}

/// Per-fragment evaluation state: one `Property` for `args`, one for
/// `fragments`, bound to the fragment currently being built.
pub(crate) struct FragmentContext {
    pub(crate) args: Property<ArgBuilder>,
    pub(crate) fragments: Property<Rc<dyn FragmentBuilder>>,
}

impl FragmentContext {
    pub(crate) fn new(fragment: &Fragment) -> Self {
        Self {
            args: Property::new(fragment.args.iter().cloned().map(ArgBuilder).collect()),
            fragments: Property::new(fragment.fragments.clone()),
        }
    }

    /// Runs the usage checker for this fragment. Args are checked before
    /// fragments, matching declaration order in `Fragment`.
    pub(crate) fn check_usage(&self, raw: &str) -> Result<()> {
        if let Some(indexes) = self.args.unused() {
            return Err(Error::UnusedProperty {
                raw: raw.to_string(),
                indexes,
            });
        }
        if let Some(indexes) = self.fragments.unused() {
            return Err(Error::UnusedProperty {
                raw: raw.to_string(),
                indexes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BindVarStyle, Context};
    use crate::value::Value;

    #[test]
    fn out_of_range_build_is_invalid_index() {
        let mut prop = Property::new(vec![ArgBuilder(Value::int(1))]);
        let ctx = Context::root(BindVarStyle::Dollar);
        let err = prop.build(&ctx, 5).unwrap_err();
        assert!(matches!(err, Error::InvalidIndex { index: 5, max: 1 }));
    }

    #[test]
    fn report_used_ignores_out_of_range() {
        let mut prop: Property<ArgBuilder> = Property::new(vec![ArgBuilder(Value::int(1))]);
        prop.report_used(0);
        prop.report_used(99);
        assert_eq!(prop.unused(), Some(vec![1]));
    }

    #[test]
    fn unused_reports_unbuild_indexes() {
        let mut prop = Property::new(vec![ArgBuilder(Value::int(1)), ArgBuilder(Value::int(2))]);
        let ctx = Context::root(BindVarStyle::Dollar);
        prop.build(&ctx, 1).unwrap();
        assert_eq!(prop.unused(), Some(vec![2]));
    }

    #[test]
    fn dollar_style_caches_repeated_builds() {
        let mut prop = Property::new(vec![ArgBuilder(Value::int(7))]);
        let ctx = Context::root(BindVarStyle::Dollar);
        let a = prop.build(&ctx, 1).unwrap();
        let b = prop.build(&ctx, 1).unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.committed_args(), vec![Value::int(7)]);
    }

    #[test]
    fn question_style_recommits_every_build() {
        let mut prop = Property::new(vec![ArgBuilder(Value::int(7))]);
        let ctx = Context::root(BindVarStyle::Question);
        prop.build(&ctx, 1).unwrap();
        prop.build(&ctx, 1).unwrap();
        assert_eq!(ctx.committed_args(), vec![Value::int(7), Value::int(7)]);
    }
}
