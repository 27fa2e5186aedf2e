use schemars::JsonSchema;
use serde::Deserialize;

/// Cap on files listed by the `filetree` tool.
pub const MAX_LISTED_FILES: usize = 2000;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileTreeRequest {
    /// Absolute path of the folder to list. Build output, VCS folders,
    /// dependency trees, and lock files are hidden.
    pub working_directory: String,
}
