// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use confide_core::TaskError;

/// §4.5 retry policy: up to 3 attempts total, exponential backoff starting
/// at 2s and capped at 30s, with ±20% jitter to avoid retry storms across
/// sessions failing together.
pub const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_DELAY: Duration = Duration::from_secs(30);
const JITTER_FRACTION: f64 = 0.2;

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY.as_secs_f64() * 2f64.powi(attempt as i32);
    let capped = exp.min(MAX_DELAY.as_secs_f64());
    let jitter = capped * JITTER_FRACTION;
    let jittered = rand::thread_rng().gen_range((capped - jitter)..=(capped + jitter));
    Duration::from_secs_f64(jittered.max(0.0))
}

/// Retries `op` while its error is retryable ([`TaskError::is_retryable`]),
/// up to [`MAX_RETRIES`] attempts total. Non-retryable errors and the final
/// attempt's error are returned immediately.
pub async fn retry_with_backoff<F, Fut, T>(mut op: F) -> Result<T, TaskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= MAX_RETRIES || !err.is_retryable() {
                    return Err(err);
                }
                let delay = backoff_delay(attempt - 1);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
