//! Shell-style parameter expansion with provenance tracking.
//!
//! Supports `$NAME`, `${NAME}` and the operator forms `${NAME:?msg}`,
//! `${NAME:-default}`, `${NAME:+alt}`, `${NAME?msg}`, `${NAME-default}`
//! and `${NAME+alt}`. Default and replacement text is expanded
//! recursively with the same lookup.

use std::collections::BTreeMap;
use std::fmt;

use crate::lookup::Lookup;
use crate::variable::Location;

/// Deepest nesting of default or replacement words that is expanded.
pub const MAX_DEPTH: usize = 256;

/// Classifies an expansion error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionErrorKind {
    /// `${NAME:?msg}` or `${NAME?msg}` with the variable unset
    /// (or empty, for the colon form).
    Required {
        name: String,
        message: Option<String>,
    },
    /// Default or replacement words nested deeper than [`MAX_DEPTH`].
    TooDeep { name: String },
}

impl fmt::Display for ExpansionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required {
                message: Some(message),
                ..
            } => f.write_str(message),
            Self::Required {
                name,
                message: None,
            } => write!(f, "{name}: required variable is not set"),
            Self::TooDeep { name } => {
                write!(f, "{name}: expansion nested more than {MAX_DEPTH} levels deep")
            }
        }
    }
}

/// Error produced while expanding a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct ExpansionError {
    pub kind: ExpansionErrorKind,
}

impl ExpansionError {
    fn required(name: &str, message: &str) -> Self {
        Self {
            kind: ExpansionErrorKind::Required {
                name: name.to_string(),
                message: (!message.is_empty()).then(|| message.to_string()),
            },
        }
    }

    fn too_deep(name: &str) -> Self {
        Self {
            kind: ExpansionErrorKind::TooDeep {
                name: name.to_string(),
            },
        }
    }
}

/// Result of a successful expansion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expansion {
    pub value: String,
    /// Every variable consulted, keyed to its declaration location.
    pub provenance: BTreeMap<String, Location>,
}

/// Operator inside a `${...}` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    /// `:?`
    RequiredNonEmpty,
    /// `:-`
    DefaultIfEmpty,
    /// `:+`
    AltIfNonEmpty,
    /// `?`
    Required,
    /// `-`
    Default,
    /// `+`
    Alt,
}

impl Operator {
    /// Operators in the order they are tried.
    const PRECEDENCE: [(&'static str, Self); 6] = [
        (":?", Self::RequiredNonEmpty),
        (":-", Self::DefaultIfEmpty),
        (":+", Self::AltIfNonEmpty),
        ("?", Self::Required),
        ("-", Self::Default),
        ("+", Self::Alt),
    ];
}

/// Expand every reference in `raw` using `lookup`.
///
/// # Errors
///
/// Returns `ExpansionError` when a `?`/`:?` form names a variable that
/// is unset (or empty, for `:?`), or when default and replacement words
/// nest more than [`MAX_DEPTH`] levels. No partial output is returned.
pub fn expand(raw: &str, lookup: &dyn Lookup) -> Result<Expansion, ExpansionError> {
    let mut out = Expansion::default();
    expand_into(raw, lookup, &mut out, 0)?;
    Ok(out)
}

fn expand_into(
    raw: &str,
    lookup: &dyn Lookup,
    out: &mut Expansion,
    depth: usize,
) -> Result<(), ExpansionError> {
    let bytes = raw.as_bytes();
    let mut pos = 0;
    // start of the pending verbatim run
    let mut run = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' if bytes.get(pos + 1) == Some(&b'$') => {
                out.value.push_str(&raw[run..pos]);
                out.value.push('$');
                pos += 2;
                run = pos;
            }
            b'$' => {
                out.value.push_str(&raw[run..pos]);
                pos = expand_dollar(raw, pos, lookup, out, depth)?;
                run = pos;
            }
            _ => pos += 1,
        }
    }

    out.value.push_str(&raw[run..]);
    Ok(())
}

/// Expand the reference starting at the `$` at `start`; returns the
/// position just past it.
fn expand_dollar(
    raw: &str,
    start: usize,
    lookup: &dyn Lookup,
    out: &mut Expansion,
    depth: usize,
) -> Result<usize, ExpansionError> {
    let bytes = raw.as_bytes();
    let next = start + 1;

    match bytes.get(next) {
        Some(&c) if is_name_byte(c) => {
            let end = bytes[next..]
                .iter()
                .position(|&b| !is_name_byte(b))
                .map_or(bytes.len(), |n| next + n);
            substitute(&raw[next..end], lookup, out);
            Ok(end)
        }
        Some(b'{') => {
            let content_start = next + 1;
            let Some(close) = find_closing_brace(raw, content_start) else {
                out.value.push_str("${");
                return Ok(content_start);
            };
            expand_braced(&raw[content_start..close], lookup, out, depth)?;
            Ok(close + 1)
        }
        _ => {
            out.value.push('$');
            Ok(next)
        }
    }
}

/// Expand the content of a `${...}` form found at `depth`.
fn expand_braced(
    content: &str,
    lookup: &dyn Lookup,
    out: &mut Expansion,
    depth: usize,
) -> Result<(), ExpansionError> {
    let Some((name, op, word)) = split_operator(content) else {
        substitute(content, lookup, out);
        return Ok(());
    };
    let expand_word = |out: &mut Expansion| {
        if depth >= MAX_DEPTH {
            return Err(ExpansionError::too_deep(name));
        }
        expand_into(word, lookup, out, depth + 1)
    };

    let found = lookup.lookup(name);
    let set_non_empty = found.as_ref().is_some_and(|v| !v.value.is_empty());

    match op {
        Operator::RequiredNonEmpty | Operator::Required => {
            let ok = if op == Operator::Required {
                found.is_some()
            } else {
                set_non_empty
            };
            match found {
                Some(var) if ok => {
                    out.value.push_str(&var.value);
                    credit(out, name, &var.location);
                }
                _ => return Err(ExpansionError::required(name, word)),
            }
        }
        Operator::DefaultIfEmpty | Operator::Default => {
            let use_own = if op == Operator::Default {
                found.is_some()
            } else {
                set_non_empty
            };
            match found {
                Some(var) if use_own => {
                    out.value.push_str(&var.value);
                    credit(out, name, &var.location);
                }
                _ => expand_word(out)?,
            }
        }
        Operator::AltIfNonEmpty | Operator::Alt => {
            let use_alt = if op == Operator::Alt {
                found.is_some()
            } else {
                set_non_empty
            };
            if let Some(var) = found.filter(|_| use_alt) {
                expand_word(out)?;
                credit(out, name, &var.location);
            }
        }
    }

    Ok(())
}

/// Emit the value of `name` if it resolves; a miss emits nothing.
fn substitute(name: &str, lookup: &dyn Lookup, out: &mut Expansion) {
    if let Some(var) = lookup.lookup(name) {
        out.value.push_str(&var.value);
        credit(out, name, &var.location);
    }
}

fn credit(out: &mut Expansion, name: &str, location: &Location) {
    out.provenance
        .entry(name.to_string())
        .or_insert_with(|| location.clone());
}

const fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Find the `}` closing a `${` whose content starts at `from`.
///
/// Only `${` opens a nested level; a bare `{` is ordinary text.
fn find_closing_brace(raw: &str, from: usize) -> Option<usize> {
    let bytes = raw.as_bytes();
    let mut depth = 1usize;
    let mut pos = from;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' if bytes.get(pos + 1) == Some(&b'$') => pos += 2,
            b'$' if bytes.get(pos + 1) == Some(&b'{') => {
                depth += 1;
                pos += 2;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
                pos += 1;
            }
            _ => pos += 1,
        }
    }

    None
}

/// Split `${...}` content into name, operator and word.
///
/// Operators are only recognised outside nested `${...}` forms, and
/// the first operator in precedence order that occurs wins.
pub(crate) fn split_operator(content: &str) -> Option<(&str, Operator, &str)> {
    Operator::PRECEDENCE.iter().find_map(|&(token, op)| {
        find_top_level(content, token)
            .map(|idx| (&content[..idx], op, &content[idx + token.len()..]))
    })
}

/// Byte index of the first occurrence of `token` at nesting depth 0.
fn find_top_level(content: &str, token: &str) -> Option<usize> {
    let bytes = content.as_bytes();
    let needle = token.as_bytes();
    let mut depth = 0usize;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' if bytes.get(pos + 1) == Some(&b'$') => {
                pos += 2;
                continue;
            }
            b'$' if bytes.get(pos + 1) == Some(&b'{') => {
                depth += 1;
                pos += 2;
                continue;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                pos += 1;
                continue;
            }
            _ => {}
        }
        if depth == 0 && bytes[pos..].starts_with(needle) {
            return Some(pos);
        }
        pos += 1;
    }

    None
}
