//! Parsing of `[bzz://]<reference>[/<path>]` command arguments.

use mantle_core::{Reference, Result};

const BZZ_SCHEME: &str = "bzz://";

/// A manifest root plus an optional path inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub reference: Reference,
    /// Path below the root, without a leading `/`. May be empty.
    pub path: String,
}

impl Address {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.strip_prefix(BZZ_SCHEME).unwrap_or(input);
        let (hex, path) = match trimmed.split_once('/') {
            Some((hex, path)) => (hex, path),
            None => (trimmed, ""),
        };

        Ok(Self {
            reference: Reference::parse(hex)?,
            path: path.to_string(),
        })
    }
}
