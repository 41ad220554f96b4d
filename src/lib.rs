//! `.env` file parser with explainable variable expansion.
//!
//! Parses `KEY=value` environment-definition files, resolves shell-style
//! references (`$VAR`, `${VAR}`, `${VAR:-default}`, `${VAR:?message}`, ...)
//! in declaration order and records which variables each value was built
//! from, so the result can be explained.
//!
//! # Quick start
//!
//! ## Parse and resolve
//!
//! ```
//! use envfile_rs::parse_str;
//!
//! let mut env = parse_str("BASE=/usr\nPATH=$BASE/bin\n").unwrap();
//! let values = env.resolve().unwrap();
//! assert_eq!(values["PATH"], "/usr/bin");
//! ```
//!
//! ## Explain a value
//!
//! ```
//! use envfile_rs::parse_str;
//!
//! let mut env = parse_str("BASE=/usr\nPATH=$BASE/bin\n").unwrap();
//! env.resolve().unwrap();
//! assert!(env.explain("PATH").contains("  - BASE=/usr at :1"));
//! ```
//!
//! ## Fall back to the host environment
//!
//! ```
//! use envfile_rs::{CompositeLookup, OsEnv, parse_str, with_priority};
//!
//! let host = CompositeLookup::new(vec![with_priority(OsEnv, 0)]);
//! let mut env = parse_str("GREETING=${ENVFILE_DOC_UNSET:-hello}\n").unwrap();
//! assert_eq!(env.resolve_with(&host).unwrap()["GREETING"], "hello");
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod cancel;
pub mod env;
pub mod expand;
pub mod explain;
pub mod lookup;
pub mod parser;
pub mod variable;

pub use cancel::CancellationToken;
pub use env::EnvFile;
pub use expand::{Expansion, ExpansionError, ExpansionErrorKind, MAX_DEPTH, expand};
pub use lookup::{CompositeLookup, Lookup, NoLookup, OsEnv, Prioritized, Table, with_priority};
pub use parser::{Parser, SyntaxError, SyntaxErrorKind, parse};
pub use variable::{Location, QuoteStyle, Variable};

/// Unified error type for parsing and resolution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed declaration.
    #[error("{0}")]
    Syntax(#[from] SyntaxError),
    /// A required variable was unset or empty.
    #[error("{0}")]
    Expansion(#[from] ExpansionError),
    /// The underlying reader failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The cancellation token fired while parsing.
    #[error("operation cancelled")]
    Cancelled,
}

/// Parse an in-memory env file.
pub fn parse_str(input: &str) -> Result<EnvFile, Error> {
    parse(input.as_bytes(), &CancellationToken::new())
}
