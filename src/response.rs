use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::context::FileContext;

/// JSON envelope every tool returns as its single text content.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub status: &'static str,
    pub content: String,
    pub content_type: &'static str,
    pub metadata: ToolMetadata,
}

#[derive(Debug, Serialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    pub model_used: String,
    /// Token the prompt was logged under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    /// Selected files left out for budget, as `name (sizeB)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_skipped: Option<Vec<String>>,
    /// Selected files that were excluded or could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_errors: Option<Vec<String>>,
    #[serde(serialize_with = "serialize_finite_f64")]
    pub duration_seconds: f64,
}

impl ToolMetadata {
    pub fn new(tool_name: &str, model_used: &str, duration_seconds: f64) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            model_used: model_used.to_string(),
            query_id: None,
            files_skipped: None,
            files_errors: None,
            duration_seconds,
        }
    }

    /// Report what the file context left out. Empty lists stay absent.
    pub fn with_file_report(mut self, files: &FileContext) -> Self {
        let skipped = files.skipped_labels();
        self.files_skipped = (!skipped.is_empty()).then_some(skipped);
        self.files_errors = (!files.errors.is_empty()).then(|| files.errors.clone());
        self
    }
}

/// Serialize f64, clamping non-finite values (NaN, Inf) to 0.0.
fn serialize_finite_f64<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(if v.is_finite() { *v } else { 0.0 })
}

impl ToolResponse {
    pub fn success(content: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "success",
            content,
            content_type: "text",
            metadata,
        }
    }

    pub fn error(message: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "error",
            content: message,
            content_type: "text",
            metadata,
        }
    }

    /// Always a transport-level success; failures live in `"status": "error"`
    /// so one failed call does not cancel sibling tool calls.
    pub fn into_call_tool_result(self) -> CallToolResult {
        match serde_json::to_string(&self) {
            Ok(json) => CallToolResult::success(vec![Content::text(json)]),
            Err(e) => {
                let escaped = e.to_string().replace('\\', "\\\\").replace('"', "\\\"");
                CallToolResult::success(vec![Content::text(format!(
                    r#"{{"status":"error","content":"serialization failed: {escaped}","content_type":"text","metadata":{{}}}}"#
                ))])
            }
        }
    }
}
