use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use serde::Serialize;

use crate::error::OuvertError;
use crate::store::KvStore;

pub const QUERY_PREFIX: &str = "query:";
pub const RESPONSE_PREFIX: &str = "response:";

/// Width of the zero-padded millisecond token. 13 digits covers epoch millis
/// until the year 2286, so lexicographic order equals chronological order.
const TOKEN_WIDTH: usize = 13;

/// Last token handed out in this process; keeps tokens strictly increasing
/// when two batches start within the same millisecond.
static LAST_TOKEN: AtomicU64 = AtomicU64::new(0);

/// One logged prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryLogEntry {
    pub id: String,
    pub prompt_text: String,
    /// Epoch milliseconds, recovered from the id.
    pub timestamp_ms: u64,
}

/// Append-only prompt log on top of a key-value store.
#[derive(Clone)]
pub struct QueryLog {
    store: Arc<dyn KvStore>,
}

/// Next timestamp-derived token: epoch millis, bumped past the previous token
/// when the clock has not advanced.
pub fn next_token() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let prev = LAST_TOKEN
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    format!("{:0width$}", now.max(prev + 1), width = TOKEN_WIDTH)
}

pub fn query_key(token: &str) -> String {
    format!("{QUERY_PREFIX}{token}")
}

pub fn response_key(token: &str, index: usize) -> String {
    format!("{RESPONSE_PREFIX}{token}:{index}")
}

impl QueryLog {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Store the prompt under a fresh `query:<token>` key.
    pub async fn record_query(&self, prompt: &str) -> Result<QueryLogEntry, OuvertError> {
        let token = next_token();
        self.record_query_as(&token, prompt).await
    }

    /// Store the prompt under a caller-chosen token.
    pub async fn record_query_as(
        &self,
        token: &str,
        prompt: &str,
    ) -> Result<QueryLogEntry, OuvertError> {
        self.store.set(&query_key(token), prompt).await?;
        Ok(QueryLogEntry {
            id: token.to_string(),
            prompt_text: prompt.to_string(),
            timestamp_ms: token.parse().unwrap_or_default(),
        })
    }

    pub async fn record_response(
        &self,
        token: &str,
        index: usize,
        text: &str,
    ) -> Result<(), OuvertError> {
        self.store.set(&response_key(token, index), text).await
    }

    /// Most recent `limit` prompts, newest first. Keys whose value vanished
    /// between listing and reading are skipped.
    pub async fn recent(&self, limit: usize) -> Result<Vec<QueryLogEntry>, OuvertError> {
        let mut keys = self.store.keys(&format!("{QUERY_PREFIX}*")).await?;
        keys.sort();
        let start = keys.len().saturating_sub(limit);
        let newest: Vec<String> = keys.split_off(start).into_iter().rev().collect();

        let values = join_all(newest.iter().map(|k| self.store.get(k))).await;

        let mut entries = Vec::with_capacity(newest.len());
        for (key, value) in newest.iter().zip(values) {
            if let Some(prompt_text) = value? {
                let id = key.trim_start_matches(QUERY_PREFIX).to_string();
                entries.push(QueryLogEntry {
                    timestamp_ms: id.parse().unwrap_or_default(),
                    id,
                    prompt_text,
                });
            }
        }
        Ok(entries)
    }
}
