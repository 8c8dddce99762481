//! Live Turn Assembler — folds streamed transport events into the live block.
//!
//! This is the only place tool invocations sit in `Pending` or end up `Failed`;
//! anything read back from storage is already resolved.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::chat::codec::{normalize_timestamp, success_marker};
use crate::chat::models::{ChatRole, ChatTurn, Part, RawTimestamp, ToolInvocation, ToolState};

/// Events delivered by the streaming transport for the active session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TurnStarted {
        turn_id: String,
        role: ChatRole,
        #[serde(default)]
        created_at: Option<RawTimestamp>,
    },
    TextDelta {
        turn_id: String,
        delta: String,
    },
    ToolCallStarted {
        turn_id: String,
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        input: Value,
    },
    ToolCallCompleted {
        tool_call_id: String,
        #[serde(default)]
        output: Option<Value>,
    },
    ToolCallFailed {
        tool_call_id: String,
        error_text: String,
    },
}

/// The live block, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct LiveTranscript {
    turns: Vec<ChatTurn>,
}

impl LiveTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<ChatTurn> {
        self.turns
    }

    pub fn apply_all(&mut self, events: impl IntoIterator<Item = StreamEvent>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Applies one event. Events for unknown turns or tool calls are dropped.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::TurnStarted {
                turn_id,
                role,
                created_at,
            } => {
                if self.turn_mut(&turn_id).is_some() {
                    return;
                }
                self.turns.push(ChatTurn {
                    id: turn_id,
                    role,
                    content: String::new(),
                    created_at: normalize_timestamp(created_at.as_ref()),
                    parts: Vec::new(),
                });
            }
            StreamEvent::TextDelta { turn_id, delta } => {
                if delta.is_empty() {
                    return;
                }
                let Some(turn) = self.turn_mut(&turn_id) else {
                    warn!("Text delta for unknown turn {turn_id} dropped");
                    return;
                };
                turn.content.push_str(&delta);
                match turn.parts.last_mut() {
                    Some(Part::Text { text }) => text.push_str(&delta),
                    _ => turn.parts.push(Part::Text { text: delta }),
                }
            }
            StreamEvent::ToolCallStarted {
                turn_id,
                tool_call_id,
                tool_name,
                input,
            } => {
                if self.tool_mut(&tool_call_id).is_some() {
                    warn!("Tool call {tool_call_id} announced twice; keeping the first");
                    return;
                }
                let Some(turn) = self.turn_mut(&turn_id) else {
                    warn!("Tool call {tool_call_id} for unknown turn {turn_id} dropped");
                    return;
                };
                turn.parts.push(Part::ToolInvocation(ToolInvocation {
                    tool_call_id,
                    tool_name,
                    input,
                    state: ToolState::Pending,
                    output: None,
                    error_text: None,
                }));
            }
            StreamEvent::ToolCallCompleted {
                tool_call_id,
                output,
            } => {
                let Some(tool) = self.tool_mut(&tool_call_id) else {
                    warn!("Completion for unknown tool call {tool_call_id} dropped");
                    return;
                };
                // The latest terminal event wins; drop the other outcome's fields.
                tool.state = ToolState::Succeeded;
                tool.output = Some(output.unwrap_or_else(success_marker));
                tool.error_text = None;
            }
            StreamEvent::ToolCallFailed {
                tool_call_id,
                error_text,
            } => {
                let Some(tool) = self.tool_mut(&tool_call_id) else {
                    warn!("Failure for unknown tool call {tool_call_id} dropped");
                    return;
                };
                tool.state = ToolState::Failed;
                tool.output = None;
                tool.error_text = Some(error_text);
            }
        }
    }

    fn turn_mut(&mut self, turn_id: &str) -> Option<&mut ChatTurn> {
        self.turns.iter_mut().rev().find(|t| t.id == turn_id)
    }

    fn tool_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolInvocation> {
        self.turns
            .iter_mut()
            .rev()
            .flat_map(|t| t.parts.iter_mut())
            .find_map(|part| match part {
                Part::ToolInvocation(tool) if tool.tool_call_id == tool_call_id => Some(tool),
                _ => None,
            })
    }
}
