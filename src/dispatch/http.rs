use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::COMPLETION_KEY_VAR;
use crate::dispatch::{CompletionFuture, CompletionService, QueryRequest};
use crate::error::OuvertError;

const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// OpenAI-compatible chat-completions client.
pub struct HttpDispatch {
    client: Client,
    provider: String,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

impl HttpDispatch {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, OuvertError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            provider: provider.into(),
            base_url: base_url.into(),
            api_key,
        })
    }

    fn transient(&self, message: String, status: Option<u16>) -> OuvertError {
        OuvertError::Transient {
            provider: self.provider.clone(),
            message,
            status,
        }
    }

    pub async fn query_model(&self, req: &QueryRequest) -> Result<String, OuvertError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(OuvertError::Misconfigured(COMPLETION_KEY_VAR))?;
        let start = Instant::now();

        let body = ChatCompletionRequest {
            model: &req.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &req.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &req.user_prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transient(format!("send failed: {e}"), None))?;

        let status = response.status();

        // Cap error body reads to MAX_RESPONSE_BYTES
        if !status.is_success() {
            let error_bytes = response.bytes().await.unwrap_or_default();
            let truncated = &error_bytes[..error_bytes.len().min(MAX_RESPONSE_BYTES)];
            let text = String::from_utf8_lossy(truncated);
            return Err(self.transient(format!("{status}: {text}"), Some(status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transient(format!("failed to read response body: {e}"), None))?;

        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(self.transient(
                format!(
                    "response too large: {} bytes (max {MAX_RESPONSE_BYTES})",
                    bytes.len()
                ),
                None,
            ));
        }

        let completion: ChatCompletion = serde_json::from_slice(&bytes)
            .map_err(|e| self.transient(format!("failed to parse response: {e}"), None))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| self.transient("empty choices or null content".to_string(), None))?;

        tracing::debug!(
            model = %req.model,
            slot = req.variation_index,
            latency_ms = start.elapsed().as_millis() as u64,
            "completion received"
        );

        Ok(text)
    }
}

impl CompletionService for HttpDispatch {
    fn complete<'a>(&'a self, req: &'a QueryRequest) -> CompletionFuture<'a> {
        Box::pin(self.query_model(req))
    }

    fn ready(&self) -> Result<(), OuvertError> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(OuvertError::Misconfigured(COMPLETION_KEY_VAR)),
        }
    }
}
