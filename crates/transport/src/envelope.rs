use crate::error::{CallError, Result};
use serde_json::Value;
use slowscope_protocol::{Envelope, Payload, RemoteCallResult, WireResponse};

/// Decode helper output without checking correlation ids.
pub fn parse(raw: &str, tool_name: &str) -> Result<RemoteCallResult> {
    parse_correlated(raw, tool_name, None)
}

/// Decode newline-delimited response envelopes.
///
/// Helpers interleave log lines with protocol lines, so anything that is not a JSON-RPC
/// response object is skipped and counted instead of failing the call. When `expected_id` is
/// set, envelopes echoing a different id are skipped too. The first error envelope ends the
/// parse with [`CallError::RemoteError`].
pub fn parse_correlated(
    raw: &str,
    tool_name: &str,
    expected_id: Option<u64>,
) -> Result<RemoteCallResult> {
    let mut out = RemoteCallResult::default();

    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<WireResponse>(line) {
            Ok(response) if response.is_response_shape() => response,
            Ok(_) => {
                log::debug!("{tool_name}: line {line_no} is JSON but not a response; skipped");
                out.skipped_lines += 1;
                continue;
            }
            Err(err) => {
                log::debug!("{tool_name}: line {line_no} skipped ({err})");
                out.skipped_lines += 1;
                continue;
            }
        };

        let id = response.numeric_id();
        if let (Some(expected), Some(actual)) = (expected_id, id) {
            if expected != actual {
                log::debug!("{tool_name}: envelope id {actual} does not match request {expected}");
                out.skipped_lines += 1;
                continue;
            }
        }

        if let Some(error) = response.error {
            let message = if error.message.trim().is_empty() {
                "error envelope without message".to_string()
            } else {
                error.message
            };
            return Err(CallError::RemoteError {
                tool: tool_name.to_string(),
                code: error.code,
                message,
            });
        }

        let Some(result) = response.result else {
            out.skipped_lines += 1;
            continue;
        };

        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(CallError::RemoteError {
                tool: tool_name.to_string(),
                code: None,
                message: tool_error_message(&result),
            });
        }

        out.envelopes.push(Envelope {
            id,
            payloads: payloads_from_result(result),
        });
    }

    if out.skipped_lines > 0 {
        log::debug!(
            "{tool_name}: decoded {} envelope(s), skipped {} line(s)",
            out.envelopes.len(),
            out.skipped_lines
        );
    }
    Ok(out)
}

fn payloads_from_result(result: Value) -> Vec<Payload> {
    if !result.get("content").is_some_and(Value::is_array) {
        return vec![Payload::Json(result)];
    }

    result
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|item| {
            let is_text = item.get("type").and_then(Value::as_str) == Some("text");
            match item.get("text").and_then(Value::as_str) {
                Some(text) if is_text => decode_text(text),
                _ => Payload::Json(item.clone()),
            }
        })
        .collect()
}

/// Text items usually carry JSON; fall back to the raw text when they do not.
fn decode_text(text: &str) -> Payload {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) => Payload::Json(value),
        Err(_) => Payload::Text(text.to_string()),
    }
}

fn tool_error_message(result: &Value) -> String {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if texts.is_empty() {
        "tool reported an error".to_string()
    } else {
        texts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data_line(id: u64, text: &str) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "content": [{ "type": "text", "text": text }] }
        })
        .to_string()
    }

    #[test]
    fn skips_garbage_between_valid_envelopes() {
        let raw = [
            "starting helper v1.2".to_string(),
            data_line(1, r#"[{"name":"ecommerce"}]"#),
            "{not json".to_string(),
            String::new(),
            r#"{"level":"info","msg":"connected"}"#.to_string(),
            data_line(1, r#"{"rows":3}"#),
        ]
        .join("\n");

        let parsed = parse(&raw, "get_models").unwrap();
        assert_eq!(parsed.envelopes.len(), 2);
        assert_eq!(parsed.skipped_lines, 3);
        assert_eq!(
            parsed.envelopes[0].payloads,
            vec![Payload::Json(json!([{ "name": "ecommerce" }]))]
        );
    }

    #[test]
    fn plain_text_content_is_preserved() {
        let raw = data_line(4, "no explores found");
        let parsed = parse(&raw, "get_explores").unwrap();
        assert_eq!(
            parsed.envelopes[0].payloads,
            vec![Payload::Text("no explores found".to_string())]
        );
        assert_eq!(parsed.envelopes[0].id, Some(4));
    }

    #[test]
    fn error_envelope_stops_parsing() {
        let raw = [
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"looker unreachable"}}"#
                .to_string(),
            data_line(1, "[]"),
        ]
        .join("\n");

        match parse(&raw, "query") {
            Err(CallError::RemoteError { code, message, .. }) => {
                assert_eq!(code, Some(-32000));
                assert_eq!(message, "looker unreachable");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn tool_level_error_is_remote_error() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": { "isError": true, "content": [{ "type": "text", "text": "bad field" }] }
        })
        .to_string();
        let err = parse(&raw, "query").unwrap_err();
        assert_eq!(err.to_string(), "query: remote error: bad field");
    }

    #[test]
    fn mismatched_ids_are_skipped_when_correlating() {
        let raw = [data_line(9, "[1]"), data_line(3, "[2]")].join("\n");
        let parsed = parse_correlated(&raw, "query", Some(3)).unwrap();
        assert_eq!(parsed.envelopes.len(), 1);
        assert_eq!(parsed.skipped_lines, 1);
        assert_eq!(parsed.envelopes[0].payloads, vec![Payload::Json(json!([2]))]);
    }

    #[test]
    fn result_without_content_becomes_single_payload() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"result":{"models":["a"]}}"#;
        let parsed = parse(raw, "get_models").unwrap();
        assert_eq!(
            parsed.envelopes[0].payloads,
            vec![Payload::Json(json!({ "models": ["a"] }))]
        );
    }

    #[test]
    fn non_text_items_are_kept_as_json() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "content": [{ "type": "image", "data": "AAAA" }] }
        })
        .to_string();
        let parsed = parse(&raw, "get_looks").unwrap();
        assert_eq!(
            parsed.envelopes[0].payloads,
            vec![Payload::Json(json!({ "type": "image", "data": "AAAA" }))]
        );
    }

    #[test]
    fn empty_buffer_is_empty_result() {
        let parsed = parse("\n\n", "get_models").unwrap();
        assert!(parsed.envelopes.is_empty());
        assert_eq!(parsed.skipped_lines, 0);
    }
}
