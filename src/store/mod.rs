pub mod memory;
pub mod upstash;

use std::future::Future;
use std::pin::Pin;

use crate::error::OuvertError;

pub use memory::MemoryKv;
pub use upstash::UpstashKv;

pub type KvFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, OuvertError>> + Send + 'a>>;

/// Flat key-value namespace. Only what the query log needs: set, get, and
/// key listing by glob pattern.
pub trait KvStore: Send + Sync {
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> KvFuture<'a, ()>;

    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<String>>;

    /// Keys matching a Redis-style glob (`*` and `?`). Order is unspecified.
    fn keys<'a>(&'a self, pattern: &'a str) -> KvFuture<'a, Vec<String>>;
}

/// Redis `KEYS` glob subset: `*` matches any run, `?` any single char.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    let (mut pi, mut ki) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ki));
            pi += 1;
        } else if let Some((sp, sk)) = star {
            pi = sp + 1;
            ki = sk + 1;
            star = Some((sp, sk + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::glob_match;

    #[test]
    fn prefix_star() {
        assert!(glob_match("query:*", "query:1718000000000"));
        assert!(glob_match("query:*", "query:"));
        assert!(!glob_match("query:*", "response:1:0"));
    }

    #[test]
    fn inner_wildcards() {
        assert!(glob_match("response:*:?", "response:17:3"));
        assert!(!glob_match("response:*:?", "response:17:13"));
        assert!(glob_match("*", ""));
    }
}
