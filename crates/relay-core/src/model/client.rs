use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;

use super::types::*;

/// One outbound completion attempt.
///
/// Implementations perform exactly one round trip and classify its failure;
/// retrying is the job of [`CompletionClient`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn send(&self, req: &CompletionRequest) -> Result<String, ApiError>;
}

/// Bounded exponential backoff.
///
/// The wait before attempt `n` (n >= 2) is
/// `clamp(2^(n-2) * multiplier, min_wait, max_wait)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_secs(1),
            min_wait: Duration::from_secs(4),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self
        }
    }

    /// Wait before the given 1-based attempt. The first attempt never waits.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        let exp = self.multiplier.saturating_mul(factor);
        exp.max(self.min_wait).min(self.max_wait)
    }
}

/// Completion client with retry and error classification.
///
/// Holds no mutable state; every call builds its own request and may run in
/// parallel with others.
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    settings: CompletionSettings,
    retry: RetryPolicy,
}

impl CompletionClient {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        settings: CompletionSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            settings,
            retry,
        }
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// Ask for a completion of `prompt`.
    ///
    /// Transient failures are retried until the attempt budget is spent; a
    /// permanent failure is returned immediately.
    pub async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, ApiError> {
        let req = CompletionRequest::new(&self.settings, prompt, system_prompt);
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let wait = self.retry.backoff_before(attempt);
            if !wait.is_zero() {
                sleep(wait).await;
            }

            match self.backend.send(&req).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "completion attempt failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts, error = %e, "completion failed");
                    return Err(e);
                }
            }
        }
    }
}
