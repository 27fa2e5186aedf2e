use crate::error::OuvertError;

pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub model_id: String,
    /// One-line description of the model.
    pub description: String,
    pub context_window: u32,
}

impl ModelEntry {
    fn new(model_id: &str, description: &str, context_window: u32) -> Self {
        Self {
            model_id: model_id.to_string(),
            description: description.to_string(),
            context_window,
        }
    }
}

/// The models a user can pick from, in display order.
#[derive(Debug, Clone)]
pub struct Registry {
    models: Vec<ModelEntry>,
    default_model: String,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl Registry {
    /// Built-in catalog. A configured default that is not in the catalog is
    /// appended so it stays selectable.
    pub fn new(default_model: &str) -> Self {
        let mut models = vec![
            ModelEntry::new("llama3-70b-8192", "Llama 3 70B", 8192),
            ModelEntry::new("mixtral-8x7b-32768", "Mixtral 8x7B", 32768),
            ModelEntry::new("gemma2-9b-it", "Gemma 2 9B instruct", 8192),
            ModelEntry::new("gemma-7b-it", "Gemma 7B instruct", 8192),
            ModelEntry::new("llama3-8b-8192", "Llama 3 8B", 8192),
        ];
        if !models.iter().any(|m| m.model_id == default_model) {
            models.push(ModelEntry::new(default_model, "configured default", 0));
        }
        Self {
            models,
            default_model: default_model.to_string(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn get(&self, model: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.model_id == model)
    }

    pub fn list_models(&self) -> &[ModelEntry] {
        &self.models
    }

    /// Resolve a requested model; `None` or blank selects the default.
    pub fn resolve(&self, requested: Option<&str>) -> Result<&ModelEntry, OuvertError> {
        let model = requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model);
        self.get(model).ok_or_else(|| OuvertError::ModelNotFound {
            model: model.to_string(),
            suggestions: self.suggest_models(model),
        })
    }

    /// Suggest similar model names for a failed lookup (substring match).
    /// Sorted alphabetically, capped at 5 to keep error messages readable.
    pub fn suggest_models(&self, query: &str) -> Vec<String> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return vec![];
        }
        let mut suggestions: Vec<String> = self
            .models
            .iter()
            .map(|m| &m.model_id)
            .filter(|k| {
                let k_lower = k.to_lowercase();
                k_lower.contains(&q) || q.contains(&k_lower)
            })
            .cloned()
            .collect();
        suggestions.sort();
        suggestions.truncate(5);
        suggestions
    }
}
