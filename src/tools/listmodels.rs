use serde::Serialize;

use crate::dispatch::registry::ModelEntry;

#[derive(Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub description: String,
    pub context_window: u32,
    pub default: bool,
}

impl ModelInfo {
    pub fn new(entry: &ModelEntry, default_model: &str) -> Self {
        Self {
            name: entry.model_id.clone(),
            description: entry.description.clone(),
            context_window: entry.context_window,
            default: entry.model_id == default_model,
        }
    }
}

#[derive(Serialize)]
pub struct ListModelsResponse {
    pub models: Vec<ModelInfo>,
}

impl ListModelsResponse {
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("| model | description | context |\n|---|---|---|\n");
        for m in &self.models {
            let marker = if m.default { " (default)" } else { "" };
            let window = if m.context_window == 0 {
                "?".to_string()
            } else {
                m.context_window.to_string()
            };
            out.push_str(&format!(
                "| `{}`{marker} | {} | {window} |\n",
                m.name, m.description
            ));
        }
        out
    }
}
