//! Saga settings supplied at construction.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff schedule for transient adapter failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Exponential backoff doubling from `initial_backoff` up to
    /// `max_backoff`, with one delay per retry after the first attempt.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Settings shared by the order manager and the reconciliation engine.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Prefix of generated order numbers.
    pub order_number_prefix: String,
    /// How long a customer has to pay.
    pub payment_ttl: chrono::Duration,
    /// Retry schedule for fulfillment placement.
    pub retry: RetryPolicy,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            order_number_prefix: "TU".to_string(),
            payment_ttl: chrono::Duration::hours(24),
            retry: RetryPolicy::default(),
        }
    }
}
