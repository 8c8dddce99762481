// Assistant chat transcripts.
// Implements: part model, message codec, history/live merge, tool status, live assembly.
// Codec, merge and status are pure; only the store touches the database.

pub mod codec;
pub mod handlers;
pub mod live;
pub mod merge;
pub mod models;
pub mod store;
pub mod tool_status;

// Re-export the public API consumed by other modules (handlers, routes, callers).
pub use codec::{decode_turn, encode_turn_metadata, reconstruct_turn};
pub use live::{LiveTranscript, StreamEvent};
pub use merge::merge_transcript;
pub use models::{ChatRecord, ChatRole, ChatTurn, Part, ToolInvocation, ToolState};
pub use tool_status::{derive_tool_status, ToolStatus};
