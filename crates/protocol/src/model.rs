use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One historical query execution, keyed by `model.explore`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct QueryRecord {
    pub id: String,
    pub group_key: String,
    pub model: String,
    pub explore: String,
    pub runtime_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    /// Label of the ladder step that first produced this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl QueryRecord {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        explore: impl Into<String>,
        runtime_seconds: f64,
    ) -> Self {
        let model = model.into();
        let explore = explore.into();
        Self {
            id: id.into(),
            group_key: group_key(&model, &explore),
            model,
            explore,
            runtime_seconds: runtime_seconds.max(0.0),
            created_at: None,
            dashboard_title: None,
            user_email: None,
            category: None,
        }
    }
}

pub fn group_key(model: &str, explore: &str) -> String {
    format!("{model}.{explore}")
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct GroupSummary {
    pub key: String,
    pub total_cost: f64,
    /// Records in the group before the per-group cap was applied.
    pub record_count: usize,
    pub records: Vec<QueryRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, JsonSchema)]
pub struct ExploreSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, JsonSchema)]
pub struct ModelExplores {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub explores: Vec<ExploreSummary>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, JsonSchema)]
pub struct DashboardSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, JsonSchema)]
pub struct SavedViewSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_builds_group_key_and_clamps_runtime() {
        let record = QueryRecord::new("q1", "ecommerce", "orders", -3.0);
        assert_eq!(record.group_key, "ecommerce.orders");
        assert_eq!(record.runtime_seconds, 0.0);
    }
}
