use std::collections::BTreeMap;
use std::fmt;

/// Source reference for a declared variable, formatted as `source:line`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Location(String);

impl Location {
    /// Sentinel location attached to variables sourced from the host
    /// process environment.
    pub const OS_ENV: &'static str = ":os";

    /// Build a `source:line` location.
    #[must_use]
    pub fn new(source: &str, line: usize) -> Self {
        Self(format!("{source}:{line}"))
    }

    /// The host-environment sentinel location.
    #[must_use]
    pub fn os_env() -> Self {
        Self(Self::OS_ENV.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a value was quoted in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteStyle {
    /// Bare value; inline `#` comments were stripped.
    #[default]
    Unquoted,
    /// `'...'`: taken verbatim and never expanded.
    SingleQuoted,
    /// `"..."`: escape sequences were processed.
    DoubleQuoted,
}

/// A single declared variable with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    /// Text after quote stripping and escape processing, before expansion.
    pub raw_value: String,
    /// Final expanded text.
    pub value: String,
    pub location: Location,
    pub quote_style: QuoteStyle,
    /// Variables consulted while expanding `raw_value`, keyed to where
    /// each of them was declared.
    pub expanded: BTreeMap<String, Location>,
}

impl Variable {
    /// Create an unexpanded variable whose value equals its raw text.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        raw_value: impl Into<String>,
        location: Location,
        quote_style: QuoteStyle,
    ) -> Self {
        let raw_value = raw_value.into();
        Self {
            name: name.into(),
            value: raw_value.clone(),
            raw_value,
            location,
            quote_style,
            expanded: BTreeMap::new(),
        }
    }
}

/// Whether `name` is a legal variable name: `[A-Za-z_][A-Za-z0-9_.-]*`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_format() {
        assert_eq!(Location::new("", 3).as_str(), ":3");
        assert_eq!(Location::new("app.env", 12).to_string(), "app.env:12");
        assert_eq!(Location::os_env().as_str(), ":os");
    }

    #[test]
    fn new_variable_value_mirrors_raw() {
        let v = Variable::new("FOO", "$BAR", Location::new("", 1), QuoteStyle::Unquoted);
        assert_eq!(v.value, "$BAR");
        assert!(v.expanded.is_empty());
    }

    #[test]
    fn valid_names() {
        for name in ["FOO", "_foo", "a.b-c_1", "X"] {
            assert!(is_valid_name(name), "{name} should be valid");
        }
    }

    #[test]
    fn invalid_names() {
        for name in ["", "1FOO", "FOO BAR", "FOO@BAR", "-x", ".x", "é"] {
            assert!(!is_valid_name(name), "{name} should be invalid");
        }
    }
}
