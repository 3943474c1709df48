//! Decoding of the listing tools' results into summaries.
//!
//! Helpers are inconsistent about shape: a list may arrive as one JSON array, as an object
//! wrapping the array, or as one JSON payload per item. Entries without a usable name or id
//! are dropped.

use serde_json::{Map, Value};
use slowscope_protocol::{
    DashboardSummary, ExploreSummary, ModelExplores, RemoteCallResult, SavedViewSummary,
};

const WRAPPER_KEYS: &[&str] = &[
    "items",
    "data",
    "results",
    "models",
    "explores",
    "dashboards",
    "looks",
];

fn items(result: &RemoteCallResult) -> Vec<Value> {
    let mut out = Vec::new();
    for payload in result.json_payloads() {
        match payload {
            Value::Array(list) => out.extend(list.iter().cloned()),
            Value::Object(map) => {
                let wrapped = WRAPPER_KEYS
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_array));
                match wrapped {
                    Some(list) => out.extend(list.iter().cloned()),
                    None => out.push(payload.clone()),
                }
            }
            Value::String(_) => out.push(payload.clone()),
            _ => {}
        }
    }
    out
}

fn text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Name of a nested `{"name": ..}` / `{"id": ..}` object, or the value itself when it is a string.
fn nested_name(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Object(inner) => text(inner, &["name", "id", "title"]),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

pub fn parse_models(result: &RemoteCallResult) -> Vec<ModelExplores> {
    let mut models: Vec<ModelExplores> = Vec::new();
    for item in items(result) {
        let model = match &item {
            Value::String(name) if !name.trim().is_empty() => ModelExplores {
                model: name.trim().to_string(),
                ..ModelExplores::default()
            },
            Value::Object(map) => match text(map, &["name", "id"]) {
                Some(name) => ModelExplores {
                    model: name,
                    label: text(map, &["label"]),
                    explores: Vec::new(),
                },
                None => continue,
            },
            _ => continue,
        };
        if !models.iter().any(|m| m.model == model.model) {
            models.push(model);
        }
    }
    models
}

pub fn parse_explores(result: &RemoteCallResult) -> Vec<ExploreSummary> {
    items(result)
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) if !name.trim().is_empty() => Some(ExploreSummary {
                name: name.trim().to_string(),
                ..ExploreSummary::default()
            }),
            Value::Object(map) => Some(ExploreSummary {
                name: text(&map, &["name", "id"])?,
                label: text(&map, &["label", "title"]),
                description: text(&map, &["description"]),
            }),
            _ => None,
        })
        .collect()
}

pub fn parse_dashboards(result: &RemoteCallResult) -> Vec<DashboardSummary> {
    items(result)
        .into_iter()
        .filter_map(|item| {
            let map = item.as_object()?;
            let id = text(map, &["id"])?;
            Some(DashboardSummary {
                title: text(map, &["title", "name"]).unwrap_or_else(|| id.clone()),
                folder: nested_name(map, "folder")
                    .or_else(|| text(map, &["folder_name", "space"])),
                id,
            })
        })
        .collect()
}

pub fn parse_saved_views(result: &RemoteCallResult) -> Vec<SavedViewSummary> {
    items(result)
        .into_iter()
        .filter_map(|item| {
            let map = item.as_object()?;
            let id = text(map, &["id"])?;
            Some(SavedViewSummary {
                title: text(map, &["title", "name"]).unwrap_or_else(|| id.clone()),
                model: nested_name(map, "model")
                    .or_else(|| text(map, &["model_id", "model_name"])),
                id,
            })
        })
        .collect()
}
