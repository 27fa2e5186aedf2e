use thiserror::Error;

#[derive(Debug, Error)]
pub enum OuvertError {
    #[error("model not found: {model}")]
    ModelNotFound {
        model: String,
        suggestions: Vec<String>,
    },

    /// One failed completion attempt. Every cause (transport, status, body)
    /// lands here and is handled identically by the retry loop.
    #[error("transient failure from {provider}: {message}")]
    Transient {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("request failed after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    #[error("key-value store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("missing configuration: {0}")]
    Misconfigured(&'static str),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("file context error: {0}")]
    FileContext(String),
}

impl OuvertError {
    /// Short machine-readable reason, used in logs and tool payloads.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ModelNotFound { .. } => "model_not_found",
            Self::Transient { .. } | Self::Request(_) => "transient",
            Self::ExhaustedRetries { .. } => "exhausted_retries",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Misconfigured(_) => "misconfigured",
            Self::FileContext(_) => "file_context",
        }
    }

    /// Sanitized message for tool replies. Never echoes upstream bodies,
    /// URLs, or tokens.
    pub fn user_message(&self) -> String {
        match self {
            Self::ModelNotFound { model, suggestions } => {
                if suggestions.is_empty() {
                    format!("model not found: {model}")
                } else {
                    format!(
                        "model not found: {model}. Did you mean: {}?",
                        suggestions.join(", ")
                    )
                }
            }
            Self::Transient {
                provider, status, ..
            } => match status {
                Some(s) => format!("{provider} returned HTTP {s}"),
                None => format!("request to {provider} failed"),
            },
            Self::ExhaustedRetries { .. } => "Request failed after retries".to_string(),
            Self::StorageUnavailable(_) => "query log is unavailable".to_string(),
            Self::Misconfigured(var) => {
                format!("missing configuration: set {var} in the environment")
            }
            Self::Request(_) => "request to provider failed".to_string(),
            Self::FileContext(msg) => format!("file context error: {msg}"),
        }
    }
}
