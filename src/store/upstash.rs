use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{KV_TOKEN_VAR, KV_URL_VAR};
use crate::error::OuvertError;
use crate::store::{KvFuture, KvStore};

/// Upstash / Vercel KV REST client. Each command is POSTed to the base URL
/// as a JSON array (`["SET", key, value]`) and answered with
/// `{"result": ...}` or `{"error": "..."}`.
pub struct UpstashKv {
    client: Client,
    url: Option<String>,
    token: Option<String>,
}

#[derive(Deserialize)]
struct RestReply {
    result: Option<Value>,
    error: Option<String>,
}

impl UpstashKv {
    pub fn new(url: Option<String>, token: Option<String>) -> Result<Self, OuvertError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, url, token })
    }

    fn credentials(&self) -> Result<(&str, &str), OuvertError> {
        let url = self
            .url
            .as_deref()
            .ok_or(OuvertError::Misconfigured(KV_URL_VAR))?;
        let token = self
            .token
            .as_deref()
            .ok_or(OuvertError::Misconfigured(KV_TOKEN_VAR))?;
        Ok((url, token))
    }

    async fn command<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, OuvertError> {
        let (url, token) = self.credentials()?;
        let unavailable = OuvertError::StorageUnavailable;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(args)
            .send()
            .await
            .map_err(|e| unavailable(format!("{}: {e}", args[0])))?;

        let status = response.status();
        let reply: RestReply = response
            .json()
            .await
            .map_err(|e| unavailable(format!("{}: HTTP {status}: {e}", args[0])))?;

        if let Some(err) = reply.error {
            return Err(unavailable(format!("{}: {err}", args[0])));
        }
        if !status.is_success() {
            return Err(unavailable(format!("{}: HTTP {status}", args[0])));
        }

        serde_json::from_value(reply.result.unwrap_or(Value::Null))
            .map_err(|e| unavailable(format!("{}: unexpected result: {e}", args[0])))
    }
}

impl KvStore for UpstashKv {
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> KvFuture<'a, ()> {
        Box::pin(async move {
            let _: Value = self.command(&["SET", key, value]).await?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<String>> {
        Box::pin(async move {
            let value: Option<Value> = self.command(&["GET", key]).await?;
            // Non-string JSON values come back as their JSON text.
            Ok(value.map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            }))
        })
    }

    fn keys<'a>(&'a self, pattern: &'a str) -> KvFuture<'a, Vec<String>> {
        Box::pin(async move { self.command(&["KEYS", pattern]).await })
    }
}
