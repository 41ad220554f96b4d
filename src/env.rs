use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::Error;
use crate::expand::expand;
use crate::lookup::{Chain, Lookup, NoLookup, Table};
use crate::variable::{QuoteStyle, Variable};

/// A parsed env file: variables in declaration order.
///
/// Values stay unexpanded until [`EnvFile::resolve`] runs; after a
/// successful resolution further calls return the cached values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    variables: Vec<Variable>,
    resolved: bool,
    /// Values of contributors that came from external lookups.
    external: BTreeMap<String, String>,
}

impl EnvFile {
    /// Wrap unexpanded variables, keeping their order.
    #[must_use]
    pub const fn new(variables: Vec<Variable>) -> Self {
        Self {
            variables,
            resolved: false,
            external: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// The last declaration of `name`, which is the one whose value
    /// ends up in the resolved map.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().rev().find(|v| v.name == name)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.variables.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Whether a resolution has completed.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.variables.iter()
    }

    /// Current values by name; later declarations win.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect()
    }

    /// Value captured during resolution for a contributor that was not
    /// declared in this file.
    #[must_use]
    pub fn external_value(&self, name: &str) -> Option<&str> {
        self.external.get(name).map(String::as_str)
    }

    /// Expand every variable against the ones declared before it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Expansion` for the first failed `?`/`:?` form.
    pub fn resolve(&mut self) -> Result<BTreeMap<String, String>, Error> {
        self.resolve_with(&NoLookup)
    }

    /// Like [`resolve`](Self::resolve), falling back to `external` for
    /// names not declared earlier in the file.
    ///
    /// Once a resolution has succeeded, later calls return the cached
    /// values and `external` is not consulted, even if it differs from
    /// the lookup used the first time.
    ///
    /// # Errors
    ///
    /// Returns `Error::Expansion` for the first failed `?`/`:?` form;
    /// no values are returned in that case.
    pub fn resolve_with(
        &mut self,
        external: &dyn Lookup,
    ) -> Result<BTreeMap<String, String>, Error> {
        if self.resolved {
            debug!("env file already resolved, reusing values and ignoring external lookup");
            return Ok(self.values());
        }

        debug!(variables = self.variables.len(), "resolving env file");
        let mut table = Table::new();
        let mut captured = BTreeMap::new();

        for variable in &mut self.variables {
            if variable.quote_style == QuoteStyle::SingleQuoted {
                trace!(name = %variable.name, "single-quoted, not expanded");
                variable.value.clone_from(&variable.raw_value);
                variable.expanded.clear();
            } else {
                let lookup = Chain {
                    first: &table,
                    then: external,
                };
                let expansion = expand(&variable.raw_value, &lookup)?;

                for name in expansion.provenance.keys() {
                    if table.get(name).is_some() {
                        continue;
                    }
                    if let Some(var) = external.lookup(name) {
                        captured.insert(name.clone(), var.value.clone());
                    }
                }

                trace!(
                    name = %variable.name,
                    contributors = expansion.provenance.len(),
                    "expanded"
                );
                variable.value = expansion.value;
                variable.expanded = expansion.provenance;
            }
            table.insert(variable.clone());
        }

        self.external = captured;
        self.resolved = true;
        debug!(names = table.len(), "env file resolved");

        Ok(self.values())
    }

    /// Describe how `name` got its value; see [`crate::explain`].
    #[must_use]
    pub fn explain(&self, name: &str) -> String {
        crate::explain::explain(self, name)
    }
}

impl<'a> IntoIterator for &'a EnvFile {
    type Item = &'a Variable;
    type IntoIter = std::slice::Iter<'a, Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.variables.iter()
    }
}
