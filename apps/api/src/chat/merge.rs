//! History/Live Merge — joins a paginated history block with the live block.

use std::collections::HashSet;

use tracing::debug;

use crate::chat::models::ChatTurn;

/// Returns `historical ++ live`, dropping historical turns the live block also has.
///
/// The live copy of a turn always wins. Each block is assumed to be internally
/// unique; duplicates inside one block are left alone.
pub fn merge_transcript(historical: Vec<ChatTurn>, live: Vec<ChatTurn>) -> Vec<ChatTurn> {
    if historical.is_empty() {
        return live;
    }

    let historical_len = historical.len();
    let mut merged: Vec<ChatTurn> = {
        let live_ids: HashSet<&str> = live.iter().map(|turn| turn.id.as_str()).collect();
        historical
            .into_iter()
            .filter(|turn| !live_ids.contains(turn.id.as_str()))
            .collect()
    };

    let superseded = historical_len - merged.len();
    if superseded > 0 {
        debug!("{superseded} historical turn(s) superseded by live copies");
    }

    merged.reserve(live.len());
    merged.extend(live);
    merged
}
