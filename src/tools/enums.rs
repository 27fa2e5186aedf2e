use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How a prompt is dispatched.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AskMode {
    /// N parallel requests with per-slot retries.
    #[default]
    Fanout,
    /// One request, no retries.
    Single,
}

/// Response format for batch results.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Every slot's full text.
    #[default]
    Detailed,
    /// Per-slot status line only.
    Concise,
}
