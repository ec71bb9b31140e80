//! Turning user input into the list of stations to pull from.
//!
//! Resolution is pure data work: nothing in this module touches the network.

mod table;

pub use table::{LookupTable, Selection};

use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// One remote camera host.
///
/// Two targets are the same target when their addresses match, whatever
/// their labels say.
#[derive(Debug, Clone, Eq, Serialize)]
pub struct Target {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Target {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// `label (address)` when labelled, otherwise just the address.
    pub fn display(&self) -> String {
        match &self.label {
            Some(label) => format!("{} ({})", label, self.address),
            None => self.address.clone(),
        }
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

/// Errors raised while resolving targets.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No address was typed
    #[error("no address given")]
    EmptyAddress,

    /// The address would be read as an option by `ping` or `net use`
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// The lookup table lacks a required column
    #[error("lookup table {path} has no {column} column")]
    MissingColumn { path: PathBuf, column: &'static str },

    /// The lookup table could not be read or parsed
    #[error("failed to read lookup table {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Wrap a single typed address as an unlabelled target.
pub fn resolve_single(input: &str) -> Result<Vec<Target>, ResolveError> {
    let address = input.trim();
    if address.is_empty() {
        return Err(ResolveError::EmptyAddress);
    }
    if !is_valid_address(address) {
        return Err(ResolveError::InvalidAddress(address.to_string()));
    }
    Ok(vec![Target::new(address)])
}

/// Addresses are passed to external commands as bare arguments, so a
/// leading `-` or `/` would turn them into switches.
pub(crate) fn is_valid_address(address: &str) -> bool {
    !address.starts_with(['-', '/']) && !address.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_resolve_single() {
        let targets = resolve_single("  192.168.1.20 ").unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].address, "192.168.1.20");
        assert!(targets[0].label.is_none());
    }

    #[test]
    fn test_resolve_single_empty() {
        assert!(matches!(resolve_single("   "), Err(ResolveError::EmptyAddress)));
    }

    #[test]
    fn test_resolve_single_rejects_switches() {
        assert!(matches!(resolve_single("-t"), Err(ResolveError::InvalidAddress(a)) if a == "-t"));
        assert!(matches!(resolve_single("/delete"), Err(ResolveError::InvalidAddress(_))));
        assert!(matches!(resolve_single("10.0.0.1 -t"), Err(ResolveError::InvalidAddress(_))));
    }

    #[test]
    fn test_identity_is_address() {
        let a = Target::new("10.0.0.1").with_label("Press 1");
        let b = Target::new("10.0.0.1").with_label("Press 2");
        assert_eq!(a, b);

        let set: HashSet<Target> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(Target::new("h").display(), "h");
        assert_eq!(Target::new("h").with_label("Line A").display(), "Line A (h)");
    }
}
