//! Name-resolution sources consulted during expansion.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::variable::{Location, QuoteStyle, Variable};

/// A source that resolves a variable name.
///
/// Sources that own their records hand out borrows; synthetic sources
/// such as [`OsEnv`] return owned records.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<Cow<'_, Variable>>;
}

impl<F> Lookup for F
where
    F: Fn(&str) -> Option<Variable>,
{
    fn lookup(&self, name: &str) -> Option<Cow<'_, Variable>> {
        self(name).map(Cow::Owned)
    }
}

/// A lookup that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl Lookup for NoLookup {
    fn lookup(&self, _name: &str) -> Option<Cow<'_, Variable>> {
        None
    }
}

/// Resolves names from the host process environment.
///
/// Hits carry [`Location::os_env`] and a raw value equal to the value,
/// so no further expansion applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEnv;

impl Lookup for OsEnv {
    fn lookup(&self, name: &str) -> Option<Cow<'_, Variable>> {
        let value = std::env::var(name).ok()?;
        Some(Cow::Owned(Variable::new(
            name,
            value,
            Location::os_env(),
            QuoteStyle::Unquoted,
        )))
    }
}

/// A lookup source paired with its priority.
pub struct Prioritized<'a> {
    pub priority: i32,
    pub source: Box<dyn Lookup + 'a>,
}

impl fmt::Debug for Prioritized<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prioritized")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Pair a lookup source with a priority for [`CompositeLookup::new`].
pub fn with_priority<'a>(source: impl Lookup + 'a, priority: i32) -> Prioritized<'a> {
    Prioritized {
        priority,
        source: Box::new(source),
    }
}

/// Several lookup sources tried in descending priority order.
#[derive(Debug, Default)]
pub struct CompositeLookup<'a> {
    sources: Vec<Prioritized<'a>>,
}

impl<'a> CompositeLookup<'a> {
    /// Build a composite; higher priorities are tried first and equal
    /// priorities keep the given order.
    #[must_use]
    pub fn new(mut sources: Vec<Prioritized<'a>>) -> Self {
        sources.sort_by_key(|p| std::cmp::Reverse(p.priority));
        Self { sources }
    }

    /// Priorities in query order.
    #[must_use]
    pub fn priorities(&self) -> Vec<i32> {
        self.sources.iter().map(|p| p.priority).collect()
    }
}

impl Lookup for CompositeLookup<'_> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, Variable>> {
        self.sources.iter().find_map(|p| p.source.lookup(name))
    }
}

/// Growing table of already-resolved variables, keyed by name.
///
/// A later insert under the same name replaces the earlier record.
#[derive(Debug, Default)]
pub struct Table {
    entries: HashMap<String, Variable>,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, variable: Variable) {
        self.entries.insert(variable.name.clone(), variable);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Lookup for Table {
    fn lookup(&self, name: &str) -> Option<Cow<'_, Variable>> {
        self.entries.get(name).map(Cow::Borrowed)
    }
}

/// The table first, then a fallback source.
pub(crate) struct Chain<'a, A: ?Sized, B: ?Sized> {
    pub(crate) first: &'a A,
    pub(crate) then: &'a B,
}

impl<A: Lookup + ?Sized, B: Lookup + ?Sized> Lookup for Chain<'_, A, B> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, Variable>> {
        self.first
            .lookup(name)
            .or_else(|| self.then.lookup(name))
    }
}
