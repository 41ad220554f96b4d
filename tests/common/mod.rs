#![allow(dead_code)]

use std::collections::BTreeMap;

use envfile_rs::{EnvFile, Error, parse_str};

/// Parse and resolve, panicking on any error.
pub fn resolve(input: &str) -> BTreeMap<String, String> {
    let mut env = parse_str(input).expect("parse failed");
    env.resolve().expect("resolve failed")
}

/// Parse and resolve, returning the resolved file.
pub fn resolved(input: &str) -> EnvFile {
    let mut env = parse_str(input).expect("parse failed");
    env.resolve().expect("resolve failed");
    env
}

/// Parse and resolve, expecting a failure at either stage.
pub fn resolve_err(input: &str) -> Error {
    match parse_str(input) {
        Err(e) => e,
        Ok(mut env) => env
            .resolve()
            .expect_err("expected parse or resolve to fail"),
    }
}

/// Build an expected value map from string pairs.
pub fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}
