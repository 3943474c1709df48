use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod model;
pub mod outcome;

pub use model::{
    group_key, DashboardSummary, ExploreSummary, GroupSummary, ModelExplores, QueryRecord,
    SavedViewSummary,
};
pub use outcome::{DegradedFetch, ErrorInfo, ErrorKind, FetchOutcome};

pub const JSONRPC_VERSION: &str = "2.0";
pub const TOOLS_CALL_METHOD: &str = "tools/call";

/// One `tools/call` request, written as a single line to the helper's stdin.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RemoteCallRequest {
    pub correlation_id: u64,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: WireParams<'a>,
}

#[derive(Serialize)]
struct WireParams<'a> {
    name: &'a str,
    arguments: &'a Map<String, Value>,
}

impl RemoteCallRequest {
    pub fn new(
        correlation_id: u64,
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            correlation_id,
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Newline-terminated JSON-RPC line.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let wire = WireRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.correlation_id,
            method: TOOLS_CALL_METHOD,
            params: WireParams {
                name: &self.tool_name,
                arguments: &self.arguments,
            },
        };
        let mut line = serde_json::to_vec(&wire)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Response line as emitted by the helper. Every field is optional so that decoding never
/// depends on the helper being strict about the envelope.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WireResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<WireError>,
}

impl WireResponse {
    /// Numeric id, if the helper echoed one. String ids holding digits are accepted too.
    pub fn numeric_id(&self) -> Option<u64> {
        match self.id.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_response_shape(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WireError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

/// One decoded response line.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct Envelope {
    pub id: Option<u64>,
    pub payloads: Vec<Payload>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, JsonSchema)]
pub struct RemoteCallResult {
    pub envelopes: Vec<Envelope>,
    pub skipped_lines: usize,
}

impl RemoteCallResult {
    pub fn payloads(&self) -> impl Iterator<Item = &Payload> {
        self.envelopes.iter().flat_map(|e| e.payloads.iter())
    }

    pub fn json_payloads(&self) -> impl Iterator<Item = &Value> {
        self.payloads().filter_map(Payload::as_json)
    }
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

pub fn serialize_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}
