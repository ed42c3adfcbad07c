//! Batch matching: many resume/job pairs with bounded fan-out.
//!
//! One item's failure never aborts its siblings. Successes come back sorted by
//! score (highest first); failures are attributed to their input index.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MAX_BATCH_CONCURRENCY;
use crate::llm_client::{ErrorKind, LlmClient, LlmError};
use crate::matching::matcher::{MatchOptions, MatchOutcome, Matcher};

#[derive(Debug, Clone)]
pub struct MatchPair {
    /// Caller-facing identifier echoed back in results, e.g. a resume id.
    pub label: String,
    pub resume_text: String,
    pub job_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub index: usize,
    pub label: String,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub label: String,
    pub kind: ErrorKind,
    /// Transient failures are worth re-queueing later.
    pub transient: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<BatchItem>,
    pub failures: Vec<BatchFailure>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchFailure {
    fn from_error(index: usize, label: String, err: &LlmError) -> Self {
        Self {
            index,
            label,
            kind: err.kind(),
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

/// Runs every pair through `matcher`, at most `concurrency` provider calls at a time.
pub async fn batch_match(
    matcher: &Matcher,
    llm: &LlmClient,
    pairs: &[MatchPair],
    options: MatchOptions,
    concurrency: usize,
) -> BatchOutcome {
    let concurrency = concurrency.clamp(1, MAX_BATCH_CONCURRENCY);
    info!(
        items = pairs.len(),
        concurrency,
        detailed = options.detailed,
        "Starting batch match"
    );

    let outcomes: Vec<(usize, Result<MatchOutcome, LlmError>)> =
        stream::iter(0..pairs.len())
            .map(|index| async move {
                let pair = &pairs[index];
                let outcome = matcher
                    .match_resume(llm, &pair.resume_text, &pair.job_text, options)
                    .await;
                (index, outcome)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (index, outcome) in outcomes {
        let label = pairs[index].label.clone();
        match outcome {
            Ok(outcome) => results.push(BatchItem {
                index,
                label,
                outcome,
            }),
            Err(err) => {
                warn!(
                    index,
                    label = %label,
                    kind = ?err.kind(),
                    transient = err.is_transient(),
                    error = %err,
                    "Batch item failed"
                );
                failures.push(BatchFailure::from_error(index, label, &err));
            }
        }
    }

    results.sort_by(|a, b| {
        b.outcome
            .match_score
            .total_cmp(&a.outcome.match_score)
            .then(a.index.cmp(&b.index))
    });
    failures.sort_by_key(|f| f.index);

    info!(
        succeeded = results.len(),
        failed = failures.len(),
        "Batch match completed"
    );

    BatchOutcome {
        succeeded: results.len(),
        failed: failures.len(),
        results,
        failures,
    }
}
