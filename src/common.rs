//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers and labels.
pub type Id = internment::Intern<String>;

/// Intern a string as an [Id].
pub fn id(s: &str) -> Id {
    Id::new(s.to_string())
}
