pub mod http;
pub mod registry;

use std::future::Future;
use std::pin::Pin;

use crate::error::OuvertError;

/// System message sent with every request.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// One response slot's request. Built once per slot at batch start and
/// reused unchanged by every retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub variation_index: usize,
    /// Batch generation captured at dispatch. Results carrying an older
    /// generation are dropped by the session.
    pub generation: u64,
}

impl QueryRequest {
    pub fn new(user_prompt: String, model: String, variation_index: usize, generation: u64) -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt,
            model,
            variation_index,
            generation,
        }
    }
}

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, OuvertError>> + Send + 'a>>;

/// Opaque chat-completion boundary: a request in, completion text or an error out.
pub trait CompletionService: Send + Sync {
    fn complete<'a>(&'a self, req: &'a QueryRequest) -> CompletionFuture<'a>;

    /// Checked once before a batch dispatches. Missing credentials fail here
    /// instead of burning the retry budget.
    fn ready(&self) -> Result<(), OuvertError> {
        Ok(())
    }
}
