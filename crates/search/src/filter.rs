use crate::error::{Result, SearchError};
use crate::records::RecordFields;
use crate::window::TimeWindow;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The tunable part of a slow-query request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub time_window: TimeWindow,
    pub runtime_floor: f64,
    pub limit: usize,
}

impl QueryFilter {
    pub fn new(time_window: TimeWindow, runtime_floor: f64, limit: usize) -> Result<Self> {
        validate_floor(runtime_floor)?;
        Ok(Self {
            time_window,
            runtime_floor,
            limit: limit.max(1),
        })
    }
}

pub(crate) fn validate_floor(floor: f64) -> Result<()> {
    if floor.is_finite() && floor >= 0.0 {
        Ok(())
    } else {
        Err(SearchError::InvalidRuntimeFloor(floor))
    }
}

/// Where query history lives and how its rows are shaped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySource {
    pub model: String,
    pub explore: String,
    /// Dimension the time window is applied to.
    pub time_field: String,
    pub fields: RecordFields,
}

impl Default for QuerySource {
    fn default() -> Self {
        Self {
            model: "system__activity".to_string(),
            explore: "history".to_string(),
            time_field: "history.created_date".to_string(),
            fields: RecordFields::default(),
        }
    }
}

impl QuerySource {
    /// Arguments for the structured-query tool.
    pub fn arguments(&self, filter: &QueryFilter) -> Map<String, Value> {
        let mut filters = Map::new();
        filters.insert(
            self.time_field.clone(),
            Value::String(filter.time_window.to_string()),
        );
        filters.insert(
            self.fields.runtime.clone(),
            Value::String(format!(">= {}", filter.runtime_floor)),
        );

        let mut args = Map::new();
        args.insert("model".to_string(), json!(self.model));
        args.insert("explore".to_string(), json!(self.explore));
        args.insert("fields".to_string(), json!(self.fields.all()));
        args.insert("filters".to_string(), Value::Object(filters));
        args.insert(
            "sorts".to_string(),
            json!([format!("{} desc", self.fields.runtime)]),
        );
        args.insert("limit".to_string(), json!(filter.limit));
        args
    }
}
