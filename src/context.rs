//! Build-wide state: the argument store, the resolved bind-var style, and
//! the scoped function registry a fragment tree is evaluated against.
//!
//! A `Context` forms a cactus stack: a child shares everything with its
//! parent except the one slot it overrides (the function table, or the
//! fragment currently being built). The argument store and resolved style
//! always live on the root and are reached by following `parent` links.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins;
use crate::func::FuncDef;
use crate::property::FragmentContext;
use crate::value::Value;

/// How a build resolves `$N`/`?` placeholders. `Auto` defers the choice to
/// the first committed argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BindVarStyle {
    #[default]
    Auto,
    Dollar,
    Question,
}

#[derive(Default, Debug)]
struct DollarStore {
    values: Vec<Value>,
}

impl DollarStore {
    fn commit(&mut self, value: Value) -> String {
        if let Some(pos) = self.values.iter().position(|v| v == &value) {
            return format!("${}", pos + 1);
        }
        self.values.push(value);
        format!("${}", self.values.len())
    }
}

#[derive(Default, Debug)]
struct QuestionStore {
    values: Vec<Value>,
}

impl QuestionStore {
    fn commit(&mut self, value: Value) -> String {
        self.values.push(value);
        "?".to_string()
    }
}

enum ResolvedState {
    Unresolved,
    Dollar(DollarStore),
    Question(QuestionStore),
}

impl ResolvedState {
    fn values(&self) -> Vec<Value> {
        match self {
            ResolvedState::Unresolved => Vec::new(),
            ResolvedState::Dollar(s) => s.values.clone(),
            ResolvedState::Question(s) => s.values.clone(),
        }
    }
}

struct RootState {
    state: RefCell<ResolvedState>,
    base_funcs: HashMap<String, Rc<FuncDef>>,
}

impl RootState {
    fn new(style: BindVarStyle) -> Self {
        let state = match style {
            BindVarStyle::Auto => ResolvedState::Unresolved,
            BindVarStyle::Dollar => ResolvedState::Dollar(DollarStore::default()),
            BindVarStyle::Question => ResolvedState::Question(QuestionStore::default()),
        };
        Self {
            state: RefCell::new(state),
            base_funcs: builtins::default_funcs(),
        }
    }
}

enum Overlay {
    None,
    Funcs(HashMap<String, Rc<FuncDef>>),
    Fragment(Rc<RefCell<FragmentContext>>),
}

/// Process-local, per-build state. Never shared across concurrent builds.
pub struct Context {
    root: Rc<RootState>,
    parent: Option<Rc<Context>>,
    overlay: Overlay,
}

impl Context {
    /// Creates a fresh root context in the requested style.
    pub fn root(style: BindVarStyle) -> Rc<Context> {
        Rc::new(Context {
            root: Rc::new(RootState::new(style)),
            parent: None,
            overlay: Overlay::None,
        })
    }

    /// Derives a scoped child whose function lookups prefer `funcs` over
    /// whatever the parent chain (and the built-in table) would resolve,
    /// without mutating the parent.
    ///
    /// A caller layers a "global args" bank on top of the core this way:
    /// register a context-capturing function (see
    /// [`crate::func::FuncDef::register_ctx_numeric`]) that closes over a
    /// `Vec<Value>` private to the caller, then hand the resulting map to
    /// this constructor. It is ordinary function registration at a
    /// narrower scope.
    pub fn with_funcs(parent: &Rc<Context>, funcs: HashMap<String, Rc<FuncDef>>) -> Rc<Context> {
        Rc::new(Context {
            root: parent.root.clone(),
            parent: Some(parent.clone()),
            overlay: Overlay::Funcs(funcs),
        })
    }

    pub(crate) fn with_fragment(
        parent: &Rc<Context>,
        fragment: Rc<RefCell<FragmentContext>>,
    ) -> Rc<Context> {
        Rc::new(Context {
            root: parent.root.clone(),
            parent: Some(parent.clone()),
            overlay: Overlay::Fragment(fragment),
        })
    }

    /// The enclosing context, if any. Lets a user function walk outward,
    /// e.g. to inspect the fragment that is one level up from the one it
    /// was called from.
    pub fn parent(&self) -> Option<&Rc<Context>> {
        self.parent.as_ref()
    }

    /// The `FragmentContext` of the fragment currently being built, found by
    /// walking the overlay chain.
    pub(crate) fn fragment(&self) -> Option<Rc<RefCell<FragmentContext>>> {
        let mut cur = self;
        loop {
            if let Overlay::Fragment(fc) = &cur.overlay {
                return Some(fc.clone());
            }
            match &cur.parent {
                Some(p) => cur = p,
                None => return None,
            }
        }
    }

    /// Looks up a function by name, preferring the nearest scoped override
    /// and falling back to the root's built-in/registered table.
    pub(crate) fn lookup_func(&self, name: &str) -> Option<Rc<FuncDef>> {
        let mut cur = self;
        loop {
            if let Overlay::Funcs(map) = &cur.overlay {
                if let Some(f) = map.get(name) {
                    return Some(f.clone());
                }
            }
            match &cur.parent {
                Some(p) => cur = p,
                None => break,
            }
        }
        self.root.base_funcs.get(name).cloned()
    }

    pub(crate) fn style_is_question(&self) -> bool {
        matches!(*self.root.state.borrow(), ResolvedState::Question(_))
    }

    /// Commits one value to the argument store, resolving `Auto` to `Dollar`
    /// on the first commit if no explicit style was configured, and returns
    /// the placeholder text to splice into the built SQL.
    pub(crate) fn commit_arg(&self, value: Value) -> String {
        let mut state = self.root.state.borrow_mut();
        if matches!(*state, ResolvedState::Unresolved) {
            *state = ResolvedState::Dollar(DollarStore::default());
        }
        match &mut *state {
            ResolvedState::Dollar(s) => s.commit(value),
            ResolvedState::Question(s) => s.commit(value),
            ResolvedState::Unresolved => unreachable!("just resolved above"),
        }
    }

    /// The values committed so far, in commit order.
    pub(crate) fn committed_args(&self) -> Vec<Value> {
        self.root.state.borrow().values()
    }
}
