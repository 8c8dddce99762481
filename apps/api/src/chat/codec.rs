//! Message Codec — turns one persisted chat record into its ordered parts.
//!
//! Stored metadata has gone through two shapes over time:
//! - ordered parts (current): `{"version": 2, "parts": [{"type": "text", ..}, {"type": "tool", ..}]}`
//! - legacy: `{"toolCalls": [..], "toolResults": [..]}`, which cannot express interleaving
//!
//! Decoding tries each shape in that order and settles on plain text when neither
//! fits. Nothing here returns an error: a bad blob just yields a smaller transcript.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::chat::models::{ChatRecord, ChatTurn, Part, RawTimestamp, ToolInvocation, ToolState};

/// Written into every metadata blob produced by `encode_turn_metadata`.
pub const ORDERED_SCHEMA_VERSION: u32 = 2;

// ────────────────────────────────────────────────────────────────────────────
// Stored shapes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StoredPart {
    Text {
        #[serde(default)]
        text: String,
    },
    Tool {
        #[serde(alias = "toolName")]
        name: String,
        #[serde(default = "empty_object", alias = "args")]
        input: Value,
        #[serde(default, alias = "output")]
        result: Option<Value>,
    },
}

#[derive(Debug, Deserialize)]
struct OrderedMetadata {
    parts: Vec<StoredPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMetadata {
    tool_calls: Vec<LegacyToolCall>,
    #[serde(default)]
    tool_results: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct LegacyToolCall {
    #[serde(alias = "toolName")]
    name: String,
    #[serde(default = "empty_object", alias = "args", alias = "arguments")]
    input: Value,
}

/// Which stored shape a metadata blob matched.
#[derive(Debug)]
enum StoredSchema {
    Ordered(Vec<StoredPart>),
    Legacy(LegacyMetadata),
    Unrecognized,
}

impl StoredSchema {
    fn detect(metadata: Option<&Value>) -> Self {
        let Some(metadata) = metadata else {
            return StoredSchema::Unrecognized;
        };

        if let Ok(ordered) = OrderedMetadata::deserialize(metadata) {
            if !ordered.parts.is_empty() {
                return StoredSchema::Ordered(ordered.parts);
            }
        }

        if let Ok(legacy) = LegacyMetadata::deserialize(metadata) {
            return StoredSchema::Legacy(legacy);
        }

        StoredSchema::Unrecognized
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Output recorded for a tool that resolved without storing a result.
pub fn success_marker() -> Value {
    json!({ "success": true })
}

/// Deterministic id for the `index`-th tool call of a turn.
pub fn tool_call_id(turn_id: &str, index: usize) -> String {
    format!("{turn_id}-tool-{index}")
}

fn persisted_tool(
    turn_id: &str,
    index: usize,
    name: String,
    input: Value,
    result: Option<Value>,
) -> Part {
    Part::ToolInvocation(ToolInvocation {
        tool_call_id: tool_call_id(turn_id, index),
        tool_name: name,
        input,
        state: ToolState::Succeeded,
        output: Some(result.unwrap_or_else(success_marker)),
        error_text: None,
    })
}

fn text_part(text: &str) -> Option<Part> {
    (!text.is_empty()).then(|| Part::Text {
        text: text.to_string(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Decoding
// ────────────────────────────────────────────────────────────────────────────

/// Decodes a record into its ordered parts. Never yields an empty text part.
pub fn decode_turn(record: &ChatRecord) -> Vec<Part> {
    match StoredSchema::detect(record.metadata.as_ref()) {
        StoredSchema::Ordered(stored) => {
            let parts = decode_ordered(&record.id, stored);
            if parts.is_empty() {
                // Nothing renderable survived, so the body is the better source.
                return text_part(&record.content).into_iter().collect();
            }
            parts
        }
        StoredSchema::Legacy(legacy) => decode_legacy(&record.id, &record.content, legacy),
        StoredSchema::Unrecognized => {
            if record.metadata.as_ref().is_some_and(|m| !m.is_null()) {
                debug!(
                    "Metadata on turn {} matched no known schema; using plain text",
                    record.id
                );
            }
            text_part(&record.content).into_iter().collect()
        }
    }
}

fn decode_ordered(turn_id: &str, stored: Vec<StoredPart>) -> Vec<Part> {
    let mut parts = Vec::with_capacity(stored.len());
    let mut tool_index = 0;

    for part in stored {
        match part {
            StoredPart::Text { text } => {
                if !text.is_empty() {
                    parts.push(Part::Text { text });
                }
            }
            StoredPart::Tool {
                name,
                input,
                result,
            } => {
                parts.push(persisted_tool(turn_id, tool_index, name, input, result));
                tool_index += 1;
            }
        }
    }

    parts
}

fn decode_legacy(turn_id: &str, content: &str, legacy: LegacyMetadata) -> Vec<Part> {
    let mut results = legacy.tool_results.unwrap_or_default().into_iter();

    let mut parts: Vec<Part> = legacy
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| {
            // A stored `null` counts as a missing result.
            let result = results.next().filter(|r| !r.is_null());
            persisted_tool(turn_id, index, call.name, call.input, result)
        })
        .collect();

    parts.extend(text_part(content));
    parts
}

/// Normalizes a stored timestamp. Missing or unusable values become the Unix epoch.
pub fn normalize_timestamp(raw: Option<&RawTimestamp>) -> DateTime<Utc> {
    let normalized = match raw {
        Some(RawTimestamp::EpochMillis(ms)) => Utc.timestamp_millis_opt(*ms).single(),
        Some(RawTimestamp::EpochMillisFloat(ms)) => Utc.timestamp_millis_opt(*ms as i64).single(),
        Some(RawTimestamp::Time(time)) => Some(*time),
        Some(RawTimestamp::Unrecognized(_)) | None => None,
    };
    normalized.unwrap_or_default()
}

/// Full reconstruction: identity, role, body, normalized time and decoded parts.
pub fn reconstruct_turn(record: &ChatRecord) -> ChatTurn {
    ChatTurn {
        id: record.id.clone(),
        role: record.role,
        content: record.content.clone(),
        created_at: normalize_timestamp(record.created_at.as_ref()),
        parts: decode_turn(record),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Encoding
// ────────────────────────────────────────────────────────────────────────────

/// Writes parts in the ordered schema.
///
/// Failed tools are stored as `{"success": false, "error": ..}` so the failure is
/// still visible after decoding. Pending tools are stored without a result.
pub fn encode_turn_metadata(parts: &[Part]) -> Value {
    let stored: Vec<Value> = parts
        .iter()
        .map(|part| match part {
            Part::Text { text } => json!({ "type": "text", "text": text }),
            Part::ToolInvocation(tool) => {
                let mut element = json!({
                    "type": "tool",
                    "name": tool.tool_name,
                    "input": tool.input,
                });
                if let Some(result) = stored_result(tool) {
                    element["result"] = result;
                }
                element
            }
        })
        .collect();

    json!({
        "version": ORDERED_SCHEMA_VERSION,
        "parts": stored,
    })
}

fn stored_result(tool: &ToolInvocation) -> Option<Value> {
    match tool.state {
        ToolState::Pending => None,
        ToolState::Succeeded => Some(tool.output.clone().unwrap_or_else(success_marker)),
        ToolState::Failed => Some(json!({
            "success": false,
            "error": tool.error_text.clone().unwrap_or_default(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::chat::models::ChatRole;

    fn record(id: &str, content: &str, metadata: Option<Value>) -> ChatRecord {
        ChatRecord {
            id: id.to_string(),
            role: ChatRole::Assistant,
            content: content.to_string(),
            metadata,
            created_at: None,
        }
    }

    fn tool_names(parts: &[Part]) -> Vec<&str> {
        parts
            .iter()
            .filter_map(|p| p.as_tool())
            .map(|t| t.tool_name.as_str())
            .collect()
    }

    // ── plain text ──────────────────────────────────────────────────────────

    #[test]
    fn test_no_metadata_yields_single_text_part() {
        let parts = decode_turn(&record("m1", "Hello there", None));
        assert_eq!(
            parts,
            vec![Part::Text {
                text: "Hello there".to_string()
            }]
        );
    }

    #[test]
    fn test_no_metadata_empty_body_yields_nothing() {
        assert!(decode_turn(&record("m1", "", None)).is_empty());
    }

    #[test]
    fn test_unrecognized_metadata_falls_back_to_text() {
        let blobs = [
            json!({"foo": "bar"}),
            json!("just a string"),
            json!([1, 2, 3]),
            json!({"parts": "not a list"}),
            json!({"parts": [{"type": "image", "url": "x"}]}),
            json!({"toolCalls": [{"noName": true}]}),
            Value::Null,
        ];
        for blob in blobs {
            let parts = decode_turn(&record("m1", "body", Some(blob.clone())));
            assert_eq!(
                parts,
                vec![Part::Text {
                    text: "body".to_string()
                }],
                "blob {blob} should fall back to plain text"
            );
        }
    }

    // ── ordered parts ───────────────────────────────────────────────────────

    #[test]
    fn test_ordered_parts_preserve_interleaving() {
        let metadata = json!({
            "version": 2,
            "parts": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool", "name": "search", "input": {"q": "rust"}, "result": {"hits": 3}},
                {"type": "text", "text": "Found some."},
                {"type": "tool", "name": "update_section", "input": {}},
                {"type": "text", "text": "Done."}
            ]
        });
        let parts = decode_turn(&record("m7", "Let me look. Found some. Done.", Some(metadata)));

        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0].as_text(), Some("Let me look."));
        assert_eq!(parts[1].as_tool().unwrap().tool_name, "search");
        assert_eq!(parts[1].as_tool().unwrap().output, Some(json!({"hits": 3})));
        assert_eq!(parts[2].as_text(), Some("Found some."));
        assert_eq!(parts[3].as_tool().unwrap().tool_name, "update_section");
        assert_eq!(parts[4].as_text(), Some("Done."));
    }

    #[test]
    fn test_ordered_tool_ids_count_tools_only() {
        let metadata = json!({
            "parts": [
                {"type": "text", "text": "a"},
                {"type": "tool", "name": "one"},
                {"type": "text", "text": "b"},
                {"type": "tool", "name": "two"}
            ]
        });
        let parts = decode_turn(&record("turn", "", Some(metadata)));
        let ids: Vec<&str> = parts
            .iter()
            .filter_map(|p| p.as_tool())
            .map(|t| t.tool_call_id.as_str())
            .collect();
        assert_eq!(ids, vec!["turn-tool-0", "turn-tool-1"]);
    }

    #[test]
    fn test_ordered_tool_defaults() {
        let metadata = json!({"parts": [{"type": "tool", "toolName": "lookup"}]});
        let parts = decode_turn(&record("m1", "", Some(metadata)));
        let tool = parts[0].as_tool().unwrap();

        assert_eq!(tool.tool_name, "lookup");
        assert_eq!(tool.state, ToolState::Succeeded);
        assert_eq!(tool.input, json!({}));
        assert_eq!(tool.output, Some(success_marker()));
        assert!(tool.error_text.is_none());
    }

    #[test]
    fn test_ordered_skips_empty_text_elements() {
        let metadata = json!({
            "parts": [
                {"type": "text", "text": ""},
                {"type": "tool", "name": "search"},
                {"type": "text"}
            ]
        });
        let parts = decode_turn(&record("m1", "ignored", Some(metadata)));
        assert_eq!(parts.len(), 1);
        assert!(parts[0].as_tool().is_some());
    }

    #[test]
    fn test_ordered_with_only_empty_text_uses_body() {
        let metadata = json!({"parts": [{"type": "text", "text": ""}]});
        let parts = decode_turn(&record("m1", "fallback", Some(metadata)));
        assert_eq!(parts[0].as_text(), Some("fallback"));
    }

    #[test]
    fn test_ordered_takes_priority_over_legacy() {
        let metadata = json!({
            "parts": [{"type": "text", "text": "new"}],
            "toolCalls": [{"name": "old"}]
        });
        let parts = decode_turn(&record("m1", "body", Some(metadata)));
        assert_eq!(
            parts,
            vec![Part::Text {
                text: "new".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_ordered_list_defers_to_legacy() {
        let metadata = json!({"parts": [], "toolCalls": [{"name": "search"}]});
        let parts = decode_turn(&record("m1", "body", Some(metadata)));
        assert_eq!(tool_names(&parts), vec!["search"]);
        assert_eq!(parts.last().unwrap().as_text(), Some("body"));
    }

    // ── legacy ──────────────────────────────────────────────────────────────

    #[test]
    fn test_legacy_tool_then_text() {
        let metadata = json!({"toolCalls": [{"name": "search"}], "toolResults": []});
        let parts = decode_turn(&record("m1", "Done.", Some(metadata)));

        assert_eq!(parts.len(), 2);
        let tool = parts[0].as_tool().unwrap();
        assert_eq!(tool.tool_name, "search");
        assert_eq!(tool.output, Some(success_marker()));
        assert_eq!(parts[1].as_text(), Some("Done."));
    }

    #[test]
    fn test_legacy_results_matched_by_position() {
        let metadata = json!({
            "toolCalls": [
                {"name": "a", "args": {"x": 1}},
                {"name": "b"},
                {"name": "c"}
            ],
            "toolResults": [{"ok": "a"}, null]
        });
        let parts = decode_turn(&record("m1", "", Some(metadata)));

        assert_eq!(tool_names(&parts), vec!["a", "b", "c"]);
        assert_eq!(parts[0].as_tool().unwrap().input, json!({"x": 1}));
        assert_eq!(parts[0].as_tool().unwrap().output, Some(json!({"ok": "a"})));
        assert_eq!(parts[1].as_tool().unwrap().output, Some(success_marker()));
        assert_eq!(parts[2].as_tool().unwrap().output, Some(success_marker()));
    }

    #[test]
    fn test_legacy_tools_always_precede_text() {
        let metadata = json!({
            "toolCalls": [{"name": "z"}, {"name": "a"}],
            "toolResults": null
        });
        let parts = decode_turn(&record("m1", "summary", Some(metadata)));

        let last_tool = parts.iter().rposition(|p| p.as_tool().is_some()).unwrap();
        let text_positions: Vec<usize> = parts
            .iter()
            .enumerate()
            .filter(|(_, p)| p.as_text().is_some())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(text_positions, vec![2]);
        assert!(last_tool < text_positions[0]);
    }

    #[test]
    fn test_legacy_without_body_has_no_text() {
        let metadata = json!({"toolCalls": [{"name": "search"}]});
        let parts = decode_turn(&record("m1", "", Some(metadata)));
        assert_eq!(parts.len(), 1);
        assert!(parts.iter().all(|p| p.as_text() != Some("")));
    }

    #[test]
    fn test_legacy_record_with_null_body_decodes_tools_only() {
        let record: ChatRecord = serde_json::from_value(json!({
            "id": "m7",
            "role": "assistant",
            "content": null,
            "metadata": {"toolCalls": [{"name": "search", "args": {"q": "rust"}}]}
        }))
        .unwrap();

        let parts = decode_turn(&record);
        assert_eq!(parts.len(), 1);
        let tool = parts[0].as_tool().unwrap();
        assert_eq!(tool.tool_name, "search");
        assert_eq!(tool.tool_call_id, "m7-tool-0");
        assert_eq!(tool.state, ToolState::Succeeded);
    }

    #[test]
    fn test_tool_ids_unique_within_turn() {
        let calls: Vec<Value> = (0..20).map(|i| json!({"name": format!("t{i}")})).collect();
        let metadata = json!({"toolCalls": calls});
        let parts = decode_turn(&record("m9", "", Some(metadata)));

        let ids: HashSet<&str> = parts
            .iter()
            .filter_map(|p| p.as_tool())
            .map(|t| t.tool_call_id.as_str())
            .collect();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let metadata = json!({"toolCalls": [{"name": "search"}, {"name": "edit"}]});
        let rec = record("m1", "ok", Some(metadata));
        assert_eq!(decode_turn(&rec), decode_turn(&rec));
    }

    // ── timestamps ──────────────────────────────────────────────────────────

    #[test]
    fn test_normalize_timestamp_variants() {
        let epoch = DateTime::<Utc>::default();
        assert_eq!(normalize_timestamp(None), epoch);
        assert_eq!(
            normalize_timestamp(Some(&RawTimestamp::Unrecognized(json!("soon")))),
            epoch
        );

        let from_ms = normalize_timestamp(Some(&RawTimestamp::EpochMillis(1_714_564_800_000)));
        assert_eq!(from_ms.to_rfc3339(), "2024-05-01T12:00:00+00:00");

        let from_float =
            normalize_timestamp(Some(&RawTimestamp::EpochMillisFloat(1_714_564_800_000.0)));
        assert_eq!(from_float, from_ms);
    }

    #[test]
    fn test_reconstruct_turn_carries_identity() {
        let mut rec = record("m3", "hi", None);
        rec.role = ChatRole::User;
        rec.created_at = Some(RawTimestamp::EpochMillis(0));

        let turn = reconstruct_turn(&rec);
        assert_eq!(turn.id, "m3");
        assert_eq!(turn.role, ChatRole::User);
        assert_eq!(turn.content, "hi");
        assert_eq!(turn.parts.len(), 1);
    }

    // ── encoding ────────────────────────────────────────────────────────────

    #[test]
    fn test_encode_then_decode_keeps_order_and_failure() {
        let parts = vec![
            Part::Text {
                text: "Checking.".to_string(),
            },
            Part::ToolInvocation(ToolInvocation {
                tool_call_id: "live-1".to_string(),
                tool_name: "fetch_resume".to_string(),
                input: json!({"id": 4}),
                state: ToolState::Failed,
                output: None,
                error_text: Some("not found".to_string()),
            }),
            Part::Text {
                text: "That failed.".to_string(),
            },
        ];

        let metadata = encode_turn_metadata(&parts);
        assert_eq!(metadata["version"], json!(ORDERED_SCHEMA_VERSION));

        let decoded = decode_turn(&record("m1", "", Some(metadata)));
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].as_text(), Some("Checking."));
        assert_eq!(decoded[2].as_text(), Some("That failed."));

        let tool = decoded[1].as_tool().unwrap();
        assert_eq!(tool.tool_call_id, "m1-tool-0");
        assert_eq!(tool.input, json!({"id": 4}));
        assert_eq!(
            tool.output,
            Some(json!({"success": false, "error": "not found"}))
        );
    }

    #[test]
    fn test_encode_pending_tool_has_no_result() {
        let parts = vec![Part::ToolInvocation(ToolInvocation {
            tool_call_id: "x".to_string(),
            tool_name: "slow".to_string(),
            input: json!({}),
            state: ToolState::Pending,
            output: None,
            error_text: None,
        })];
        let metadata = encode_turn_metadata(&parts);
        assert!(metadata["parts"][0].get("result").is_none());
    }
}
