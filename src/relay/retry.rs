//! Exponential backoff for remote storage calls.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, error::ConfigError, storage::StorageError};

/// Backoff schedule plus the per-attempt timeout.
///
/// Delays grow as `base_delay * multiplier^(n-1)` and are capped at `max_delay`, so the sequence
/// never decreases. The per-attempt timeout bounds one call and is independent of the budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Delay before the first retry.
	pub base_delay: StdDuration,
	/// Growth factor applied per retry.
	pub multiplier: u32,
	/// Upper bound for any single delay.
	pub max_delay: StdDuration,
	/// Total attempts including the first one.
	pub max_attempts: u32,
	/// Bound on one attempt.
	pub attempt_timeout: StdDuration,
}
impl RetryPolicy {
	/// Delay slept after failed attempt number `attempt` (1-based).
	pub fn delay_after(&self, attempt: u32) -> StdDuration {
		let mut delay = self.base_delay.min(self.max_delay);

		for _ in 1..attempt {
			delay =
				delay.checked_mul(self.multiplier).unwrap_or(self.max_delay).min(self.max_delay);
		}

		delay
	}

	/// Checks the schedule is usable.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == 0 {
			return Err(ConfigError::invalid_setting("retry.max_attempts", "must be at least 1"));
		}
		if self.multiplier == 0 {
			return Err(ConfigError::invalid_setting("retry.multiplier", "must be at least 1"));
		}
		if self.base_delay > self.max_delay {
			return Err(ConfigError::invalid_setting(
				"retry.base_delay",
				"must not exceed retry.max_delay",
			));
		}
		if self.attempt_timeout.is_zero() {
			return Err(ConfigError::invalid_setting("retry.attempt_timeout", "must be positive"));
		}

		Ok(())
	}

	/// Runs `op` until it succeeds, fails permanently, or the attempt budget is spent.
	///
	/// `on_retry` observes every transient failure that will be retried.
	pub(crate) async fn run<T, F, Fut, R>(
		&self,
		stage: &'static str,
		mut op: F,
		mut on_retry: R,
	) -> Result<Retried<T>, RetryError>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Result<T, StorageError>>,
		R: FnMut(&StorageError),
	{
		let mut attempt = 1;

		loop {
			let outcome = tokio::time::timeout(self.attempt_timeout, op(attempt))
				.await
				.unwrap_or(Err(StorageError::Timeout));

			match outcome {
				Ok(value) => return Ok(Retried { value, retries: attempt - 1 }),
				Err(err) if !err.is_transient() => return Err(RetryError::Permanent(err)),
				Err(err) if attempt >= self.max_attempts =>
					return Err(RetryError::Exhausted { attempts: attempt, last: err }),
				Err(err) => {
					let delay = self.delay_for(attempt, &err);

					tracing::warn!(stage, attempt, ?delay, error = %err, "backing off");

					on_retry(&err);
					tokio::time::sleep(delay).await;

					attempt += 1;
				},
			}
		}
	}

	// A Retry-After hint can stretch the delay but never shrink it below the schedule.
	fn delay_for(&self, attempt: u32, err: &StorageError) -> StdDuration {
		let scheduled = self.delay_after(attempt);

		match err {
			StorageError::RateLimited { retry_after: Some(hint) } =>
				scheduled.max((*hint).min(self.max_delay)),
			_ => scheduled,
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			base_delay: StdDuration::from_secs(1),
			multiplier: 2,
			max_delay: StdDuration::from_secs(30),
			max_attempts: 5,
			attempt_timeout: StdDuration::from_secs(120),
		}
	}
}

/// Successful value plus how many retries it took.
#[derive(Debug)]
pub(crate) struct Retried<T> {
	pub(crate) value: T,
	pub(crate) retries: u32,
}

/// Terminal retry outcome.
#[derive(Debug)]
pub(crate) enum RetryError {
	/// Every attempt failed transiently.
	Exhausted { attempts: u32, last: StorageError },
	/// A non-retryable failure ended the loop early.
	Permanent(StorageError),
}
