use schemars::JsonSchema;
use serde::Deserialize;

use crate::runner::BatchOutcome;
use crate::session::SlotState;
use crate::tools::enums::{AskMode, ResponseFormat};

pub const DEFAULT_COUNT: i64 = 6;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AskRequest {
    /// The prompt to send. Empty prompts are sent as-is.
    pub prompt: String,
    /// Number of parallel responses (default 6). Clamped to 1..=max configured.
    pub count: Option<i64>,
    /// Model name from `listmodels` output (defaults to the configured model).
    pub model: Option<String>,
    /// Relative file paths whose contents are placed ahead of the prompt. Requires working_directory.
    pub file_paths: Option<Vec<String>>,
    /// Absolute path of the project root used to resolve file_paths.
    pub working_directory: Option<String>,
    /// Put each file's path on the line above its contents (default false).
    pub label_paths: Option<bool>,
    /// "fanout" (default) or "single" (one request, no retries).
    pub mode: Option<AskMode>,
    /// "detailed" (default, full text per slot) or "concise" (status per slot).
    pub response_format: Option<ResponseFormat>,
}

impl AskRequest {
    pub fn count(&self) -> i64 {
        self.count.unwrap_or(DEFAULT_COUNT)
    }
}

/// Render a finished batch for the tool reply.
pub fn to_markdown(outcome: &BatchOutcome, format: ResponseFormat) -> String {
    let mut out = format!(
        "# {} of {} responses from `{}` ({} ms)\n",
        outcome.succeeded(),
        outcome.slots.len(),
        outcome.model,
        outcome.elapsed_ms
    );
    for report in &outcome.slots {
        let n = report.slot.index + 1;
        let text = report.slot.display_text().unwrap_or_default();
        match (&report.slot.state, format) {
            (_, ResponseFormat::Detailed) => {
                out.push_str(&format!("\n## Response {n}\n\n{text}\n"));
            }
            (SlotState::Succeeded(_), ResponseFormat::Concise) => {
                out.push_str(&format!("- Response {n}: ok after {} attempt(s)\n", report.attempts));
            }
            (_, ResponseFormat::Concise) => {
                out.push_str(&format!("- Response {n}: {text}\n"));
            }
        }
    }
    out
}
