//! Deciding which versions still need to be migrated.

use std::collections::HashSet;

/// Versions present at the source but not at the destination.
///
/// The result keeps the source enumeration order, which is usually publish
/// order. A module that was never published at the destination is passed
/// as an empty set and yields every source version.
pub fn pending(source: &[String], dest: &HashSet<String>) -> Vec<String> {
    source
        .iter()
        .filter(|v| !dest.contains(*v))
        .cloned()
        .collect()
}

/// Versions present at both registries, in source order.
pub fn skipped(source: &[String], dest: &HashSet<String>) -> Vec<String> {
    source
        .iter()
        .filter(|v| dest.contains(*v))
        .cloned()
        .collect()
}
