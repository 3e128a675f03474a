// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retry policy applied by the sender between failed attempts.

use std::time::Duration;

/// Enum representing the type of backoff to use for the delay between retries.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub enum RetryBackoffType {
    /// Increases the delay by a fixed increment each attempt.
    Linear,
    /// The delay is constant for each attempt.
    Constant,
    /// The delay is doubled for each attempt.
    Exponential,
}

/// The retry strategy of the sender: how many attempts a payload gets and
/// how long to back off between them. Retries are bounded; a payload whose
/// attempts are exhausted is dropped with a failure event.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct RetryStrategy {
    /// The maximum number of attempts per payload.
    max_retries: u32,
    /// The minimum delay between attempts.
    delay: Duration,
    /// The type of backoff to use for the delay between retries.
    backoff_type: RetryBackoffType,
    /// An optional jitter to add randomness to the delay.
    jitter: Option<Duration>,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy {
            max_retries: 5,
            delay: Duration::from_millis(100),
            backoff_type: RetryBackoffType::Exponential,
            jitter: None,
        }
    }
}

impl RetryStrategy {
    /// Create a strategy from the maximum attempt count, the minimum delay
    /// in milliseconds, the backoff type and an optional jitter in
    /// milliseconds.
    pub fn new(
        max_retries: u32,
        delay_ms: u64,
        backoff_type: RetryBackoffType,
        jitter_ms: Option<u64>,
    ) -> RetryStrategy {
        RetryStrategy {
            max_retries,
            delay: Duration::from_millis(delay_ms),
            backoff_type,
            jitter: jitter_ms.map(Duration::from_millis),
        }
    }

    /// The delay before the attempt following `attempt` (1-indexed), with
    /// jitter applied.
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            RetryBackoffType::Exponential => self.delay * 2u32.pow(attempt - 1),
            RetryBackoffType::Constant => self.delay,
            RetryBackoffType::Linear => self.delay + self.delay * (attempt - 1),
        };

        match self.jitter {
            Some(jitter) if jitter.as_millis() > 0 => {
                let jitter = rand::random::<u64>() % jitter.as_millis() as u64;
                delay + Duration::from_millis(jitter)
            }
            _ => delay,
        }
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
