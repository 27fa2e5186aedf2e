use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::registry::DEFAULT_MODEL;

/// Default OpenAI-compatible endpoint (Groq).
pub const DEFAULT_COMPLETION_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Bounds for the per-deployment response ceiling.
pub const MIN_MAX_RESPONSES: usize = 4;
pub const MAX_MAX_RESPONSES: usize = 20;

/// Bounds for the "last N queries" listing.
pub const MIN_HISTORY_LIMIT: usize = 5;
pub const MAX_HISTORY_LIMIT: usize = 50;

/// Environment variable names, first match wins. The `NEXT_PUBLIC_` names are
/// what older deployments exported.
const COMPLETION_KEY_VARS: &[&str] = &["GROQ_API_KEY", "NEXT_PUBLIC_GROQ_API_KEY"];
const KV_URL_VARS: &[&str] = &["KV_REST_API_URL", "NEXT_PUBLIC_KV_REST_API_URL"];
const KV_TOKEN_VARS: &[&str] = &["KV_REST_API_TOKEN", "NEXT_PUBLIC_KV_REST_API_TOKEN"];

/// Names reported in `Misconfigured` errors.
pub const COMPLETION_KEY_VAR: &str = "GROQ_API_KEY";
pub const KV_URL_VAR: &str = "KV_REST_API_URL";
pub const KV_TOKEN_VAR: &str = "KV_REST_API_TOKEN";

/// Runner tuning. Defaults mirror the values every deployment shipped with.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Ceiling for the requested response count.
    pub max_responses: usize,
    /// Retries per slot after the first attempt.
    pub retries: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
    /// How many recent queries the log listing returns.
    pub history_limit: usize,
    /// Per-request HTTP timeout for completion calls.
    pub request_timeout: Duration,
    /// Suffix each prompt with " (Variation i+1)".
    pub tag_variations: bool,
    pub default_model: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_responses: MAX_MAX_RESPONSES,
            retries: 30,
            retry_delay: Duration::from_secs(10),
            history_limit: MIN_HISTORY_LIMIT,
            request_timeout: Duration::from_secs(120),
            tag_variations: false,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Optional `ouvert.toml` overlay. Every field is optional; absent fields keep
/// the environment/default value.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub completion_url: Option<String>,
    pub max_responses: Option<usize>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub history_limit: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub tag_variations: Option<bool>,
    pub default_model: Option<String>,
}

pub struct Config {
    pub completion_url: String,
    pub completion_api_key: Option<String>,
    pub kv_url: Option<String>,
    pub kv_token: Option<String>,
    pub runner: RunnerConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("completion_url", &self.completion_url)
            .field(
                "completion_api_key",
                &self.completion_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("kv_url", &self.kv_url)
            .field("kv_token", &self.kv_token.as_ref().map(|_| "[REDACTED]"))
            .field("runner", &self.runner)
            .finish()
    }
}

impl Config {
    /// Environment, then the TOML overlay from `OUVERT_CONFIG` or `./ouvert.toml`.
    pub fn load() -> Self {
        let mut config = Self::from_env();

        let path = env::var("OUVERT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ouvert.toml"));
        if path.exists() {
            match FileConfig::read(&path) {
                Ok(file) => config.apply(file),
                Err(e) => tracing::warn!("ignoring {}: {e}", path.display()),
            }
        }

        config
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (the process environment in
    /// production, a map in tests). Missing credentials are not an error here;
    /// they surface as `Misconfigured` when first used.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|&n| lookup(n))
                .filter(|v| !v.trim().is_empty())
        };

        let completion_api_key = first(COMPLETION_KEY_VARS);
        if completion_api_key.is_none() {
            tracing::warn!("{COMPLETION_KEY_VAR} not set; completion requests will fail");
        }
        let kv_url = first(KV_URL_VARS);
        let kv_token = first(KV_TOKEN_VARS);
        if kv_url.is_none() || kv_token.is_none() {
            tracing::warn!("{KV_URL_VAR}/{KV_TOKEN_VAR} not set; query log unavailable");
        }

        Self {
            completion_url: DEFAULT_COMPLETION_URL.to_string(),
            completion_api_key,
            kv_url,
            kv_token,
            runner: RunnerConfig::default(),
        }
    }

    /// Overlay file settings, clamping to the supported ranges.
    pub fn apply(&mut self, file: FileConfig) {
        if let Some(url) = file.completion_url {
            self.completion_url = url;
        }
        let r = &mut self.runner;
        if let Some(max) = file.max_responses {
            r.max_responses = max.clamp(MIN_MAX_RESPONSES, MAX_MAX_RESPONSES);
        }
        if let Some(retries) = file.retries {
            r.retries = retries;
        }
        if let Some(secs) = file.retry_delay_secs {
            r.retry_delay = Duration::from_secs(secs);
        }
        if let Some(limit) = file.history_limit {
            r.history_limit = limit.clamp(MIN_HISTORY_LIMIT, MAX_HISTORY_LIMIT);
        }
        if let Some(secs) = file.request_timeout_secs {
            r.request_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(tag) = file.tag_variations {
            r.tag_variations = tag;
        }
        if let Some(model) = file.default_model.filter(|m| !m.trim().is_empty()) {
            r.default_model = model;
        }
    }
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }
}
