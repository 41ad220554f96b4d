//! Human-readable explanation of where a variable's value came from.
//!
//! ```text
//! Variable: PATH
//! Location: :2
//! Raw Value: $BASE/bin
//! Final Value: /usr/bin
//! Expanded from:
//!   - BASE=/usr at :1
//! ```

use std::fmt::Write as _;

use crate::env::EnvFile;

/// Returned by [`explain`] when no variable has the requested name.
pub const NOT_FOUND: &str = "Variable not found";

/// Explain the last declaration of `name` in `file`.
///
/// Contributors are listed sorted by name, each with its current value
/// in `file` rather than the value seen at expansion time. A contributor
/// that came from an external lookup shows the value captured then.
#[must_use]
pub fn explain(file: &EnvFile, name: &str) -> String {
    let Some(variable) = file.get(name) else {
        return NOT_FOUND.to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "Variable: {}", variable.name);
    let _ = writeln!(out, "Location: {}", variable.location);
    let _ = writeln!(out, "Raw Value: {}", variable.raw_value);
    let _ = writeln!(out, "Final Value: {}", variable.value);

    if variable.expanded.is_empty() {
        return out;
    }

    out.push_str("Expanded from:\n");
    let values = file.values();
    for (dep, location) in &variable.expanded {
        let declared_here = file
            .iter()
            .any(|v| v.name == *dep && v.location == *location);
        let in_file = values.get(dep).map(String::as_str);
        let value = if declared_here {
            in_file
        } else {
            file.external_value(dep).or(in_file)
        }
        .unwrap_or_default();
        let _ = writeln!(out, "  - {dep}={value} at {location}");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_str;
    use crate::variable::{Location, QuoteStyle, Variable};

    fn resolved(input: &str) -> EnvFile {
        let mut file = parse_str(input).expect("parse");
        file.resolve().expect("resolve");
        file
    }

    #[test]
    fn no_expansion_has_no_contributor_block() {
        let file = resolved("BASE=/usr");
        assert_eq!(
            explain(&file, "BASE"),
            "Variable: BASE\nLocation: :1\nRaw Value: /usr\nFinal Value: /usr\n"
        );
    }

    #[test]
    fn missing_variable() {
        let file = resolved("FOO=bar");
        assert_eq!(explain(&file, "NOPE"), NOT_FOUND);
    }

    #[test]
    fn duplicate_reports_last_declaration() {
        let file = resolved("A=1\nA=2");
        let text = explain(&file, "A");
        assert!(text.contains("Location: :2"));
        assert!(text.contains("Final Value: 2"));
    }

    #[test]
    fn contributor_value_is_current() {
        let file = resolved("A=1\nB=$A\nA=2");
        assert!(explain(&file, "B").contains("  - A=2 at :1\n"));
    }

    #[test]
    fn external_contributor_declared_later_shows_captured_value() {
        let host = |name: &str| {
            (name == "HOME").then(|| {
                Variable::new("HOME", "/home/me", Location::os_env(), QuoteStyle::Unquoted)
            })
        };
        let mut file = parse_str("A=$HOME\nHOME=/x\nB=$HOME").expect("parse");
        file.resolve_with(&host).expect("resolve");
        assert!(explain(&file, "A").contains("  - HOME=/home/me at :os\n"));
        assert!(explain(&file, "B").contains("  - HOME=/x at :2\n"));
    }

    #[test]
    fn unresolved_file_shows_raw_values() {
        let file = parse_str("A=1\nB=$A").expect("parse");
        assert_eq!(
            explain(&file, "B"),
            "Variable: B\nLocation: :2\nRaw Value: $A\nFinal Value: $A\n"
        );
    }
}
