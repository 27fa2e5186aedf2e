use std::collections::BTreeMap;

use tokio::sync::Mutex;

use crate::store::{glob_match, KvFuture, KvStore};

/// Process-local store. Backs tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<BTreeMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

impl KvStore for MemoryKv {
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> KvFuture<'a, ()> {
        Box::pin(async move {
            self.inner
                .lock()
                .await
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.inner.lock().await.get(key).cloned()) })
    }

    fn keys<'a>(&'a self, pattern: &'a str) -> KvFuture<'a, Vec<String>> {
        Box::pin(async move {
            Ok(self
                .inner
                .lock()
                .await
                .keys()
                .filter(|k| glob_match(pattern, k))
                .cloned()
                .collect())
        })
    }
}
