use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::feed::entry::Entry;

/// Selection applied to every update's entries.
///
/// Stages run in a fixed order: geometry presence (always), radius (if
/// set), category (if set). Each stage is a pure per-entry predicate, so
/// the order affects only how much work later stages do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    /// Maximum distance to home in kilometres, inclusive.
    pub radius: Option<f64>,
    /// Accepted categories. Entries without a category never match.
    pub categories: Option<HashSet<String>>,
}

impl EntryFilter {
    pub fn apply<E: Entry>(&self, entries: Vec<E>) -> Vec<E> {
        let before = entries.len();

        let mut filtered: Vec<E> = entries
            .into_iter()
            .filter(|entry| entry.geometry().is_some())
            .collect();

        if let Some(radius) = self.radius {
            filtered.retain(|entry| entry.distance_to_home().is_some_and(|d| d <= radius));
        }

        if let Some(categories) = &self.categories {
            filtered.retain(|entry| {
                entry
                    .category()
                    .is_some_and(|category| categories.contains(category))
            });
        }

        tracing::debug!(before = before, after = filtered.len(), "Filtered entries");
        filtered
    }
}

/// Newest published timestamp among `entries`, if any entry has one.
pub fn newest_timestamp<E: Entry>(entries: &[E]) -> Option<DateTime<Utc>> {
    let newest = entries.iter().filter_map(Entry::published).max();
    if let Some(ts) = newest {
        tracing::debug!(last_timestamp = %ts, "Extracted last timestamp");
    }
    newest
}
