use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::{Id as TaskId, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::RunnerConfig;
use crate::context::inject_context;
use crate::dispatch::{CompletionService, QueryRequest};
use crate::error::OuvertError;
use crate::history::{QueryLog, next_token};
use crate::session::{BatchGuard, FAILED_AFTER_RETRIES, ResponseSlot, Session, SlotState};

/// Reason shown by single-shot mode when its one request fails.
pub const SINGLE_SHOT_FAILURE: &str = "Failed to get response from AI";

/// Reason recorded for a slot whose batch was replaced mid-flight.
pub const SUPERSEDED: &str = "superseded by a newer batch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Fixed pause between attempts. No growth, no jitter.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 30,
            delay: Duration::from_secs(10),
        }
    }
}

/// Clamp a requested response count into `[1, max]`.
pub fn clamp_response_count(requested: i64, max: usize) -> usize {
    let max = max.max(1);
    if requested < 1 {
        1
    } else {
        usize::try_from(requested).map_or(max, |n| n.min(max))
    }
}

/// One submitted prompt.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub prompt: String,
    pub count: i64,
    pub model: String,
    /// Concatenated file blocks to place ahead of the prompt.
    pub context: Option<String>,
}

/// Per-slot summary of a finished batch.
#[derive(Debug, Clone, Serialize)]
pub struct SlotReport {
    #[serde(flatten)]
    pub slot: ResponseSlot,
    pub attempts: u32,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub generation: u64,
    /// Token the prompt was logged under; `None` when logging failed or is off.
    pub query_id: Option<String>,
    pub model: String,
    /// Sorted by slot index.
    pub slots: Vec<SlotReport>,
    pub elapsed_ms: u64,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.slots
            .iter()
            .filter(|r| matches!(r.slot.state, SlotState::Succeeded(_)))
            .count()
    }
}

/// Expands one prompt into N independent requests, runs each with its own
/// bounded retry loop, and publishes every slot to the session the moment it
/// settles.
///
/// - Slot `i` is written only by the task owning index `i`.
/// - The batch returns once every slot is terminal; there is no cutoff.
/// - Prompt logging is best effort and never fails the batch.
pub struct FanoutRunner {
    completion: Arc<dyn CompletionService>,
    log: Option<QueryLog>,
    policy: RetryPolicy,
    max_responses: usize,
    tag_variations: bool,
}

impl FanoutRunner {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            log: None,
            policy: RetryPolicy::default(),
            max_responses: crate::config::MAX_MAX_RESPONSES,
            tag_variations: false,
        }
    }

    pub fn from_config(
        completion: Arc<dyn CompletionService>,
        log: Option<QueryLog>,
        config: &RunnerConfig,
    ) -> Self {
        Self {
            completion,
            log,
            policy: RetryPolicy {
                retries: config.retries,
                delay: config.retry_delay,
            },
            max_responses: config.max_responses,
            tag_variations: config.tag_variations,
        }
    }

    pub fn with_log(mut self, log: QueryLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_responses(mut self, max: usize) -> Self {
        self.max_responses = max.max(1);
        self
    }

    pub fn with_variation_tags(mut self, enabled: bool) -> Self {
        self.tag_variations = enabled;
        self
    }

    /// Build the per-slot requests for one batch.
    pub fn expand(&self, prompt: &str, n: usize, model: &str, generation: u64) -> Vec<QueryRequest> {
        (0..n)
            .map(|i| {
                let text = if self.tag_variations {
                    format!("{prompt} (Variation {})", i + 1)
                } else {
                    prompt.to_string()
                };
                QueryRequest::new(text, model.to_string(), i, generation)
            })
            .collect()
    }

    pub async fn run_batch(
        &self,
        session: &Arc<Session>,
        req: &BatchRequest,
    ) -> Result<BatchOutcome, OuvertError> {
        self.completion.ready()?;

        let start = Instant::now();
        let n = clamp_response_count(req.count, self.max_responses);
        let effective = match req.context.as_deref() {
            Some(ctx) if !ctx.is_empty() => inject_context(ctx, &req.prompt),
            _ => req.prompt.clone(),
        };

        // Settles the board even if this future is dropped mid-batch.
        let guard = BatchGuard::begin(session, n);
        let generation = guard.generation();

        // Best effort: a storage failure is logged and the batch proceeds.
        let query_id = match &self.log {
            Some(log) => {
                let token = next_token();
                match log.record_query_as(&token, &req.prompt).await {
                    Ok(_) => Some(token),
                    Err(e) => {
                        tracing::warn!("failed to log query: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        tracing::info!(generation, slots = n, model = %req.model, "dispatching batch");

        let mut set = JoinSet::new();
        let mut task_slots: HashMap<TaskId, usize> = HashMap::new();

        for query in self.expand(&effective, n, &req.model, generation) {
            let index = query.variation_index;
            let completion = self.completion.clone();
            let session = session.clone();
            let cancel = guard.ticket().cancel.clone();
            let policy = self.policy;
            let log = self.log.clone();
            let query_id = query_id.clone();

            let abort_handle = set.spawn(async move {
                let slot_start = Instant::now();
                let (state, attempts) = run_slot(&*completion, &query, policy, &cancel).await;
                session.record(query.generation, index, state.clone());

                if let (SlotState::Succeeded(text), Some(log), Some(token)) = (&state, log, query_id)
                    && let Err(e) = log.record_response(&token, index, text).await
                {
                    tracing::warn!(slot = index, "failed to log response: {e}");
                }

                SlotReport {
                    slot: ResponseSlot { index, state },
                    attempts,
                    latency_ms: slot_start.elapsed().as_millis() as u64,
                }
            });
            task_slots.insert(abort_handle.id(), index);
        }

        let mut reports = Vec::with_capacity(n);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                // Attribute panics to their slot so the board still completes.
                Err(join_err) => {
                    tracing::error!("slot task failed: {join_err}");
                    if let Some(&index) = task_slots.get(&join_err.id()) {
                        let state = SlotState::Failed(FAILED_AFTER_RETRIES.to_string());
                        session.record(generation, index, state.clone());
                        reports.push(SlotReport {
                            slot: ResponseSlot { index, state },
                            attempts: 0,
                            latency_ms: start.elapsed().as_millis() as u64,
                        });
                    }
                }
            }
        }
        reports.sort_by_key(|r| r.slot.index);

        session.finish_batch(generation);

        let outcome = BatchOutcome {
            generation,
            query_id,
            model: req.model.clone(),
            slots: reports,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            generation,
            succeeded = outcome.succeeded(),
            total = n,
            elapsed_ms = outcome.elapsed_ms,
            "batch complete"
        );
        Ok(outcome)
    }

    /// One request, no retries. Used when there is no file context to fan out.
    pub async fn ask_once(
        &self,
        session: &Arc<Session>,
        prompt: &str,
        model: &str,
    ) -> Result<ResponseSlot, OuvertError> {
        self.completion.ready()?;

        let guard = BatchGuard::begin(session, 1);
        let generation = guard.generation();
        let query = QueryRequest::new(prompt.to_string(), model.to_string(), 0, generation);

        let state = match self.completion.complete(&query).await {
            Ok(text) => SlotState::Succeeded(text),
            Err(e) => {
                tracing::warn!("single-shot query failed: {e}");
                SlotState::Failed(SINGLE_SHOT_FAILURE.to_string())
            }
        };
        session.record(generation, 0, state.clone());
        session.finish_batch(generation);

        Ok(ResponseSlot { index: 0, state })
    }
}

/// Attempt a slot until success, budget exhaustion, or cancellation.
/// Returns the terminal state and the number of attempts made.
async fn run_slot(
    completion: &dyn CompletionService,
    query: &QueryRequest,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> (SlotState, u32) {
    let superseded = || SlotState::Failed(SUPERSEDED.to_string());

    for attempt in 1..=policy.max_attempts() {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (superseded(), attempt - 1),
            r = completion.complete(query) => r,
        };

        match result {
            Ok(text) => return (SlotState::Succeeded(text), attempt),
            Err(e) => {
                tracing::warn!(
                    slot = query.variation_index,
                    attempt,
                    reason = e.reason(),
                    "completion attempt failed: {e}"
                );
                if attempt == policy.max_attempts() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (superseded(), attempt),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
        }
    }

    let exhausted = OuvertError::ExhaustedRetries {
        attempts: policy.max_attempts(),
    };
    tracing::warn!(slot = query.variation_index, "{exhausted}");
    (SlotState::Failed(exhausted.user_message()), policy.max_attempts())
}
