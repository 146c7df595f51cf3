use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of `<claude dir>/history.jsonl`, the prompt history Claude Code
/// shows when resuming. Rows are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub display: String,
    #[serde(default)]
    pub pasted_contents: Map<String, Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub project: String,
    pub session_id: String,
}

impl HistoryEntry {
    /// Build the entry for a fresh clone. `display` is bounded to `limit`
    /// characters.
    pub fn for_clone(
        tag: &str,
        first_prompt: Option<&str>,
        limit: usize,
        timestamp: i64,
        project: String,
        session_id: String,
    ) -> Self {
        let display = match first_prompt {
            Some(p) => format!("{tag} {}", p.trim()),
            None => tag.to_string(),
        };
        Self {
            display: truncate(&display, limit),
            pasted_contents: Map::new(),
            timestamp,
            project,
            session_id,
        }
    }
}

/// Truncate a string to `max` chars, appending "..." if truncated.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
    }
}
