use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Decides whether an error is worth another attempt
pub type ErrorClassifier = fn(&anyhow::Error) -> bool;

/// Serializable retry settings (config.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(default)]
    pub initial_delay_ms: u64,
    #[serde(default)]
    pub delay_step_ms: u64,
    /// Wait `initial_delay_ms` before the very first attempt as well
    #[serde(default)]
    pub delay_first_attempt: bool,
}

impl RetryConfig {
    /// Fill-price lookup: 3 attempts, 0.5s / 0.8s / 1.1s settle delays
    pub fn fill_price_default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            delay_step_ms: 300,
            delay_first_attempt: true,
        }
    }

    /// Opening market orders: 3 attempts, 2s apart
    pub fn order_default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2000,
            delay_step_ms: 0,
            delay_first_attempt: false,
        }
    }
}

/// Retry policy passed explicitly into each I/O call site
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub delay_step: Duration,
    pub delay_first_attempt: bool,
    classifier: ErrorClassifier,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, delay_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            delay_step,
            delay_first_attempt: false,
            classifier: retry_everything,
        }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn delay_first_attempt(mut self, enabled: bool) -> Self {
        self.delay_first_attempt = enabled;
        self
    }

    /// Delay to wait before attempt `attempt` (0-based)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 && !self.delay_first_attempt {
            return Duration::ZERO;
        }
        let steps = if self.delay_first_attempt { attempt } else { attempt - 1 };
        self.initial_delay + self.delay_step * steps
    }

    pub fn is_retryable(&self, error: &anyhow::Error) -> bool {
        (self.classifier)(error)
    }

    /// Run `op` until it succeeds, the classifier rejects the error, or attempts run out.
    ///
    /// `op` receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("[RETRY] {} succeeded on attempt {}/{}", label, attempt + 1, self.max_attempts);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let last = attempt + 1 >= self.max_attempts;
                    if last || !self.is_retryable(&e) {
                        if !last {
                            debug!("[RETRY] {} failed with non-retryable error: {}", label, e);
                        }
                        return Err(e);
                    }
                    warn!(
                        "[RETRY] {} failed (attempt {}/{}): {}",
                        label,
                        attempt + 1,
                        self.max_attempts,
                        e
                    );
                    attempt += 1;
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.delay_step_ms),
        )
        .delay_first_attempt(config.delay_first_attempt)
    }
}

fn retry_everything(_: &anyhow::Error) -> bool {
    true
}

// Status codes are matched with the "HTTP <code>" prefix the venue clients put on errors
const PERMANENT_MARKERS: &[&str] = &["http 401", "http 403", "http 404", "unauthorized", "forbidden", "insufficient"];

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "ssl",
    "eof",
    "network",
    "temporary",
    "temporarily",
    "rate limit",
    "too many requests",
    "http 400",
    "http 429",
    "http 502",
    "http 503",
    "http 504",
];

/// Network hiccups, gateway errors and rate limits; auth and not-found errors are permanent
pub fn is_transient_error(error: &anyhow::Error) -> bool {
    let message = format!("{:#}", error).to_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| message.contains(m)) {
        return false;
    }
    if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
        return true;
    }
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .any(|e| e.is_timeout() || e.is_connect() || e.is_request())
}
