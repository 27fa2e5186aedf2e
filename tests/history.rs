//! Query log: key layout, newest-first listing, bounded reads.

use std::sync::Arc;

use ouvert::history::{QueryLog, next_token};
use ouvert::store::{KvStore, MemoryKv};

#[tokio::test]
async fn last_two_is_newest_first() {
    let store = Arc::new(MemoryKv::new());
    let log = QueryLog::new(store.clone());

    log.record_query_as("1718000000001", "first").await.unwrap();
    log.record_query_as("1718000000002", "second").await.unwrap();
    log.record_query_as("1718000000003", "third").await.unwrap();

    let recent = log.recent(2).await.unwrap();
    let prompts: Vec<&str> = recent.iter().map(|e| e.prompt_text.as_str()).collect();
    assert_eq!(prompts, vec!["third", "second"]);
    assert_eq!(recent[0].id, "1718000000003");
    assert_eq!(recent[0].timestamp_ms, 1_718_000_000_003);
}

#[tokio::test]
async fn listing_ignores_response_keys() {
    let store = Arc::new(MemoryKv::new());
    let log = QueryLog::new(store.clone());

    log.record_query_as("1718000000001", "prompt").await.unwrap();
    log.record_response("1718000000001", 0, "answer").await.unwrap();
    store.set("unrelated", "x").await.unwrap();

    let recent = log.recent(50).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].prompt_text, "prompt");
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn generated_tokens_sort_chronologically() {
    let store = Arc::new(MemoryKv::new());
    let log = QueryLog::new(store);

    for i in 0..10 {
        log.record_query(&format!("prompt {i}")).await.unwrap();
    }

    let recent = log.recent(5).await.unwrap();
    let prompts: Vec<&str> = recent.iter().map(|e| e.prompt_text.as_str()).collect();
    assert_eq!(
        prompts,
        vec!["prompt 9", "prompt 8", "prompt 7", "prompt 6", "prompt 5"]
    );
}

#[tokio::test]
async fn empty_log_lists_nothing() {
    let store = Arc::new(MemoryKv::new());
    let log = QueryLog::new(store.clone());
    assert!(store.is_empty().await);
    assert!(log.recent(5).await.unwrap().is_empty());
}

#[test]
fn tokens_are_fixed_width_digits() {
    let t = next_token();
    assert_eq!(t.len(), 13);
    assert!(t.chars().all(|c| c.is_ascii_digit()));
}
