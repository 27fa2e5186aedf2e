use schemars::JsonSchema;
use serde::Deserialize;

use crate::history::QueryLogEntry;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueriesRequest {
    /// How many recent prompts to return, newest first (default from config, 5–50).
    pub limit: Option<usize>,
}

impl QueriesRequest {
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit
            .unwrap_or(default)
            .clamp(crate::config::MIN_HISTORY_LIMIT, crate::config::MAX_HISTORY_LIMIT)
    }
}

pub fn to_markdown(entries: &[QueryLogEntry]) -> String {
    if entries.is_empty() {
        return "No queries logged yet.".to_string();
    }
    let mut out = format!("## Last {} Queries\n\n", entries.len());
    for e in entries {
        // Keep each prompt on one bullet line.
        let one_line = e.prompt_text.replace('\n', " ");
        out.push_str(&format!("- {one_line}\n"));
    }
    out
}
