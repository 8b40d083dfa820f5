//! Wire-level retry policy applied by the client facade.

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	retry::{RetryDecision, RetryPolicy, exponential_delay},
};

/// Retries network failures, `5xx`, `408`, and `429` with jittered exponential backoff.
///
/// Jitter is additive: the wait is `base + U[0, jitter_ratio * base]`, so it never undercuts the
/// deterministic curve.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRetryPolicy {
	/// Retries allowed beyond the initial attempt.
	pub max_retries: u32,
	/// Upper bound of the deterministic part of the delay.
	pub max_delay: Duration,
	/// Fraction of the deterministic delay added as random jitter.
	pub jitter_ratio: f64,
}
impl TransportRetryPolicy {
	/// Returns `true` when the failure looks transient on the wire.
	pub fn is_retryable(error: &ApiError) -> bool {
		matches!(error.status, 0 | 408 | 429) || error.status >= 500
	}

	/// Same as [`RetryPolicy::decide`] with a caller-supplied RNG.
	pub fn decide_with_rng<R>(&self, attempt: u32, error: &ApiError, rng: &mut R) -> RetryDecision
	where
		R: Rng,
	{
		if attempt >= self.max_retries || !Self::is_retryable(error) {
			return RetryDecision::stop();
		}

		let base = exponential_delay(attempt, self.max_delay);
		// NaN would poison `mul_f64`; treat it as no jitter.
		let ratio =
			if self.jitter_ratio.is_nan() { 0.0 } else { self.jitter_ratio.clamp(0.0, 1.0) };
		let jitter_ceiling = base.mul_f64(ratio);
		let jitter_ms = u64::try_from(jitter_ceiling.as_millis()).unwrap_or(u64::MAX);
		let jitter = Duration::from_millis(rng.random_range(0..=jitter_ms));

		RetryDecision::retry(base + jitter)
	}
}
impl Default for TransportRetryPolicy {
	fn default() -> Self {
		Self { max_retries: 3, max_delay: Duration::from_secs(30), jitter_ratio: 0.1 }
	}
}
impl RetryPolicy for TransportRetryPolicy {
	fn decide(&self, attempt: u32, error: &ApiError) -> RetryDecision {
		self.decide_with_rng(attempt, error, &mut rand::rng())
	}
}
