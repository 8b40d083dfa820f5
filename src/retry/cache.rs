//! Cache-layer retry policies for queries and mutations.

// self
use crate::{
	_prelude::*,
	retry::{RetryDecision, RetryPolicy, exponential_delay},
};

/// Query policy: client errors are final except `408`/`429`, everything else gets a few retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRetryPolicy {
	/// Retries for `5xx` and network failures.
	pub max_retries: u32,
	/// Retries for the recoverable client errors `408` and `429`.
	pub max_recoverable_client_retries: u32,
	/// Delay cap.
	pub max_delay: Duration,
}
impl QueryRetryPolicy {
	fn retry_budget(&self, error: &ApiError) -> u32 {
		match error.status {
			408 | 429 => self.max_recoverable_client_retries,
			400..=499 => 0,
			_ => self.max_retries,
		}
	}
}
impl Default for QueryRetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			max_recoverable_client_retries: 2,
			max_delay: Duration::from_secs(30),
		}
	}
}
impl RetryPolicy for QueryRetryPolicy {
	fn decide(&self, attempt: u32, error: &ApiError) -> RetryDecision {
		if attempt < self.retry_budget(error) {
			RetryDecision::retry(exponential_delay(attempt, self.max_delay))
		} else {
			RetryDecision::stop()
		}
	}
}

/// Mutation policy: mutations may not be idempotent, so client errors are never retried and
/// everything else is retried at most once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRetryPolicy {
	/// Retries for `5xx` and network failures.
	pub max_retries: u32,
	/// Delay cap.
	pub max_delay: Duration,
}
impl Default for MutationRetryPolicy {
	fn default() -> Self {
		Self { max_retries: 1, max_delay: Duration::from_secs(5) }
	}
}
impl RetryPolicy for MutationRetryPolicy {
	fn decide(&self, attempt: u32, error: &ApiError) -> RetryDecision {
		if (400..500).contains(&error.status) || attempt >= self.max_retries {
			return RetryDecision::stop();
		}

		RetryDecision::retry(exponential_delay(attempt, self.max_delay))
	}
}
