use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use slowscope_protocol::{QueryRecord, RemoteCallResult};

/// Row field names of the query-history explore.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecordFields {
    pub id: String,
    pub model: String,
    pub explore: String,
    pub runtime: String,
    pub created_at: String,
    pub dashboard_title: String,
    pub user_email: String,
}

impl Default for RecordFields {
    fn default() -> Self {
        Self {
            id: "history.id".to_string(),
            model: "query.model".to_string(),
            explore: "query.view".to_string(),
            runtime: "history.runtime".to_string(),
            created_at: "history.created_time".to_string(),
            dashboard_title: "dashboard.title".to_string(),
            user_email: "user.email".to_string(),
        }
    }
}

impl RecordFields {
    pub fn all(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.model.clone(),
            self.explore.clone(),
            self.runtime.clone(),
            self.created_at.clone(),
            self.dashboard_title.clone(),
            self.user_email.clone(),
        ]
    }
}

/// Collect every decodable row from a query result.
///
/// Rows arrive either as a top-level JSON array or wrapped in an object under `data`/`rows`.
/// Rows missing an id, a model or an explore are dropped; runtimes may be numbers or numeric
/// strings.
pub fn extract_records(result: &RemoteCallResult, fields: &RecordFields) -> Vec<QueryRecord> {
    let mut out = Vec::new();
    let mut dropped = 0usize;
    for payload in result.json_payloads() {
        for row in rows_of(payload) {
            match record_from_row(row, fields) {
                Some(record) => out.push(record),
                None => dropped += 1,
            }
        }
    }
    if dropped > 0 {
        log::debug!("dropped {dropped} query row(s) without id/model/explore");
    }
    out
}

fn rows_of(payload: &Value) -> Vec<&Map<String, Value>> {
    let rows = match payload {
        Value::Array(items) => items,
        Value::Object(obj) => match ["data", "rows"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
        {
            Some(items) => items,
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    rows.iter().filter_map(Value::as_object).collect()
}

fn record_from_row(row: &Map<String, Value>, fields: &RecordFields) -> Option<QueryRecord> {
    let id = scalar_string(row.get(&fields.id)?)?;
    let model = scalar_string(row.get(&fields.model)?)?;
    let explore = scalar_string(row.get(&fields.explore)?)?;
    let runtime = row.get(&fields.runtime).and_then(number).unwrap_or(0.0);

    let mut record = QueryRecord::new(id, model, explore, runtime);
    record.created_at = row.get(&fields.created_at).and_then(scalar_string);
    record.dashboard_title = row.get(&fields.dashboard_title).and_then(scalar_string);
    record.user_email = row.get(&fields.user_email).and_then(scalar_string);
    Some(record)
}

fn scalar_string(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!raw.is_empty()).then_some(raw)
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
