use serde::{Deserialize, Serialize};
use slowscope_protocol::{GroupSummary, QueryRecord};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExclusionRules {
    /// Names excluded when a key component equals them.
    #[serde(default)]
    pub exact: Vec<String>,
    /// Substrings excluded wherever they appear in a key.
    #[serde(default)]
    pub contains: Vec<String>,
}

impl ExclusionRules {
    /// Internal/system entities that never belong in a ranking.
    pub fn builtin() -> Self {
        Self {
            exact: vec!["system__activity".to_string(), "i__looker".to_string()],
            contains: vec!["system__".to_string(), "i__looker".to_string()],
        }
    }
}

fn normalize(raw: &str) -> Option<String> {
    let needle = raw.trim().to_ascii_lowercase();
    (!needle.is_empty()).then_some(needle)
}

/// Immutable, case-insensitive exclusion set. Share it behind an `Arc` between concurrent
/// grouping runs.
#[derive(Clone, Debug, Default)]
pub struct ExclusionRuleSet {
    exact: HashSet<String>,
    contains: Vec<String>,
}

impl ExclusionRuleSet {
    pub fn new(rules: &ExclusionRules) -> Self {
        let exact = rules.exact.iter().filter_map(|raw| normalize(raw)).collect();
        let contains = rules
            .contains
            .iter()
            .filter_map(|raw| normalize(raw))
            .collect();
        Self { exact, contains }
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.contains.is_empty()
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        let lower = name.trim().to_ascii_lowercase();
        self.exact.contains(&lower)
            || self
                .contains
                .iter()
                .any(|needle| lower.contains(needle.as_str()))
    }

    /// A record is excluded when its model, its explore or the whole group key matches.
    pub fn excludes(&self, record: &QueryRecord) -> bool {
        self.is_excluded(&record.model)
            || self.is_excluded(&record.explore)
            || self.is_excluded(&record.group_key)
    }
}

/// Drop excluded records, bucket the rest by group key, keep the `max_groups` most expensive
/// groups and at most `per_group_cap` of the slowest records in each.
pub fn group_and_rank(
    records: Vec<QueryRecord>,
    rules: &ExclusionRuleSet,
    per_group_cap: usize,
    max_groups: usize,
) -> Vec<GroupSummary> {
    let before = records.len();
    let mut buckets: HashMap<String, Vec<QueryRecord>> = HashMap::new();
    for record in records {
        if rules.excludes(&record) {
            continue;
        }
        buckets
            .entry(record.group_key.clone())
            .or_default()
            .push(record);
    }
    let kept: usize = buckets.values().map(Vec::len).sum();
    if kept < before {
        log::debug!("excluded {} internal record(s)", before - kept);
    }

    let mut groups: Vec<GroupSummary> = buckets
        .into_iter()
        .map(|(key, records)| GroupSummary {
            total_cost: records.iter().map(|r| r.runtime_seconds).sum(),
            record_count: records.len(),
            key,
            records,
        })
        .collect();

    groups.sort_by(|a, b| {
        b.total_cost
            .total_cmp(&a.total_cost)
            .then_with(|| a.key.cmp(&b.key))
    });
    groups.truncate(max_groups);

    for group in &mut groups {
        group.records.sort_by(|a, b| {
            b.runtime_seconds
                .total_cmp(&a.runtime_seconds)
                .then_with(|| a.id.cmp(&b.id))
        });
        group.records.truncate(per_group_cap);
    }
    groups
}
