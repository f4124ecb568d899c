//! Retry with exponential backoff, and a requests-per-minute limiter

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub jitter: Duration,
}

impl RetryPolicy {
	pub fn new(max_attempts: u32, base_delay: Duration, jitter: Duration) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			base_delay,
			jitter,
		}
	}

	pub fn from_settings(settings: &Settings) -> Self {
		Self::new(settings.retry_attempts, settings.retry_base, settings.retry_jitter)
	}

	/// Wait before retry number `attempt` (1-based): `base * 2^(attempt-1)` plus uniform jitter
	pub fn delay(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(10);
		let backoff = self.base_delay.saturating_mul(1 << exponent);
		let jitter_ms = self.jitter.as_millis() as u64;
		if jitter_ms == 0 {
			return backoff;
		}
		backoff + Duration::from_millis(rand::random_range(0..=jitter_ms))
	}

	/// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out
	pub fn run<T>(&self, label: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
		let mut attempt = 1;
		loop {
			match op() {
				Ok(value) => return Ok(value),
				Err(err) if err.is_retryable() && attempt < self.max_attempts => {
					let delay = self.delay(attempt);
					tracing::warn!(
						label,
						attempt,
						max_attempts = self.max_attempts,
						delay_ms = delay.as_millis() as u64,
						error = %err,
						"retrying"
					);
					thread::sleep(delay);
					attempt += 1;
				}
				Err(err) => return Err(err),
			}
		}
	}
}

/// Spaces calls evenly to stay under a requests-per-minute budget. Shared across worker threads.
#[derive(Debug)]
pub struct RateLimiter {
	interval: Duration,
	next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
	pub fn per_minute(rpm: u32) -> Self {
		Self {
			interval: Duration::from_secs(60) / rpm.max(1),
			next_slot: Mutex::new(None),
		}
	}

	/// Block until the caller may issue its request
	pub fn wait(&self) {
		if self.interval.is_zero() {
			return;
		}

		let now = Instant::now();
		let slot = {
			let Ok(mut next) = self.next_slot.lock() else {
				return;
			};
			let slot = next.map_or(now, |n| n.max(now));
			*next = Some(slot + self.interval);
			slot
		};

		if slot > now {
			thread::sleep(slot - now);
		}
	}
}
