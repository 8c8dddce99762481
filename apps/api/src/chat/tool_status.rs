//! Tool-call presentation state.
//!
//! A resolved call counts as a success unless it says otherwise: most tool
//! integrations only report failures explicitly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::models::{Part, ToolInvocation, ToolState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Succeeded,
    Failed,
}

/// Derives the display status of a tool invocation.
///
/// - populated `error_text` → `Failed`
/// - output object with `"success": false` → `Failed`
/// - any other output → `Succeeded`
/// - no payload → falls back to the stored state (`Pending` reads as `Running`)
pub fn derive_tool_status(tool: &ToolInvocation) -> ToolStatus {
    if tool.error_text.as_deref().is_some_and(|e| !e.is_empty()) {
        return ToolStatus::Failed;
    }

    if let Some(output) = &tool.output {
        return if output_flags_failure(output) {
            ToolStatus::Failed
        } else {
            ToolStatus::Succeeded
        };
    }

    match tool.state {
        ToolState::Pending => ToolStatus::Running,
        ToolState::Succeeded => ToolStatus::Succeeded,
        ToolState::Failed => ToolStatus::Failed,
    }
}

fn output_flags_failure(output: &Value) -> bool {
    output.get("success").and_then(Value::as_bool) == Some(false)
}

impl Part {
    /// Status for tool parts; `None` for text.
    pub fn tool_status(&self) -> Option<ToolStatus> {
        self.as_tool().map(derive_tool_status)
    }
}
