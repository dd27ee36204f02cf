//! Retry/back-off policy for LLM calls (spec §4.4), grounded on the
//! teacher's `agent/execution/llm_retry.rs`: retries are scoped to rate
//! limit errors, with an exponential backoff informed by the provider's
//! own `retry_after_secs` when it provides one.

use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Cap on rate-limit retries. Spec §4.4: "rate_limit retried once
    /// after server-advised delay".
    pub rate_limit_max_retries: usize,
    /// Cap on transient network/provider-error retries. Spec §4.4:
    /// "transient network errors retried with capped exponential
    /// back-off (up to 3 attempts, jitter)".
    pub transient_max_retries: usize,
    pub default_wait_secs: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_max_retries: 1,
            transient_max_retries: 3,
            default_wait_secs: 1,
            backoff_multiplier: 2.0,
        }
    }
}

/// Notification emitted before/after a rate-limit wait, so callers (the
/// engine) can turn it into a domain event without this crate knowing
/// about the event model.
#[derive(Debug, Clone)]
pub enum RetryNotice {
    Waiting {
        message: String,
        wait_secs: u64,
        attempt: usize,
        max_attempts: usize,
    },
    Resumed {
        attempt: usize,
    },
}

/// Call `call_fn` with retry on rate-limit and transient provider/network
/// errors (spec §4.4). Cancellation-aware: both between attempts and
/// during the backoff wait. Auth and malformed-request errors, and
/// `context_length_exceeded`, are never retried here — the former are
/// non-recoverable, the latter is the engine's job to recover from via
/// compression (spec §7).
pub async fn call_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut on_notice: impl FnMut(RetryNotice),
    mut call_fn: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, LlmError>>,
{
    let mut rate_limit_attempt = 0usize;
    let mut transient_attempt = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(LlmError::Provider("cancelled".into()));
        }

        match call_fn().await {
            Ok(value) => return Ok(value),
            Err(LlmError::RateLimited {
                message,
                retry_after_secs,
            }) => {
                rate_limit_attempt += 1;
                if rate_limit_attempt > policy.rate_limit_max_retries {
                    return Err(LlmError::RateLimited {
                        message,
                        retry_after_secs,
                    });
                }

                let wait_secs = retry_after_secs.unwrap_or(policy.default_wait_secs);
                on_notice(RetryNotice::Waiting {
                    message,
                    wait_secs,
                    attempt: rate_limit_attempt,
                    max_attempts: policy.rate_limit_max_retries,
                });

                if wait_cancellable(wait_secs, cancel).await {
                    return Err(LlmError::Provider("cancelled during rate limit wait".into()));
                }

                on_notice(RetryNotice::Resumed {
                    attempt: rate_limit_attempt + 1,
                });
            }
            Err(error) if error.is_transient() => {
                transient_attempt += 1;
                if transient_attempt > policy.transient_max_retries {
                    return Err(error);
                }

                let wait_secs = jittered_backoff(policy, transient_attempt);
                on_notice(RetryNotice::Waiting {
                    message: error.to_string(),
                    wait_secs,
                    attempt: transient_attempt,
                    max_attempts: policy.transient_max_retries,
                });

                if wait_cancellable(wait_secs, cancel).await {
                    return Err(LlmError::Provider("cancelled during retry backoff".into()));
                }

                on_notice(RetryNotice::Resumed {
                    attempt: transient_attempt + 1,
                });
            }
            Err(other) => return Err(other),
        }
    }
}

/// Capped exponential backoff with jitter (spec §4.4): `base * mult^n`,
/// perturbed by up to ±25% so many concurrent tasks retrying the same
/// upstream outage don't all wake up in lockstep.
fn jittered_backoff(policy: &RetryPolicy, attempt: usize) -> u64 {
    let base = policy.default_wait_secs as f64 * policy.backoff_multiplier.powi((attempt - 1) as i32);
    let jitter_fraction = rand::random::<f64>() * 0.5 - 0.25;
    (base * (1.0 + jitter_fraction)).max(0.0) as u64
}

async fn wait_cancellable(wait_secs: u64, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_secs(wait_secs)) => false,
        _ = cancel.cancelled() => true,
    }
}
