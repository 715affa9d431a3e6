//! Key-path bucketing for the configuration tree.
//!
//! Configuration keys follow the shape `<namespace>/<service>/<leaf>`. The
//! snapshot builder groups entries into per-filter buckets by matching
//! filter names against the leaf segment, then narrows a bucket down to a
//! single service by matching the service segment.

use std::collections::HashMap;

use tracing::debug;

use super::ConfigEntry;

/// Groups `entries` into buckets keyed by filter name.
///
/// An entry lands in the bucket for every filter that occurs as a substring
/// of its final path segment, so one entry may appear in several buckets.
/// Filters that match nothing get no bucket.
pub fn partition_by_filter<'a>(
    entries: &'a [ConfigEntry],
    filters: &[String],
) -> HashMap<String, Vec<&'a ConfigEntry>> {
    let mut buckets: HashMap<String, Vec<&ConfigEntry>> = HashMap::new();
    for filter in filters {
        for entry in entries {
            let leaf = entry.key.split('/').next_back().unwrap_or_default();
            if leaf.contains(filter.as_str()) {
                buckets.entry(filter.clone()).or_default().push(entry);
            }
        }
    }
    buckets
}

/// Selects the entries whose service path segment equals `service`.
///
/// Keys with no service segment cannot belong to any service and are
/// skipped.
pub fn entries_for_service<'a>(
    entries: &[&'a ConfigEntry],
    service: &str,
) -> Vec<&'a ConfigEntry> {
    let mut selected = Vec::new();
    for entry in entries {
        match entry.key.split('/').nth(1) {
            Some(segment) if segment == service => selected.push(*entry),
            Some(_) => {}
            None => {
                debug!(key = %entry.key, "Skipping configuration key without a service segment");
            }
        }
    }
    selected
}
