//! Retry policies for the transport and cache layers.
//!
//! Both layers share the same exponential curve (`1000 ms * 2^attempt`, capped) but disagree on
//! eligibility: the transport layer retries anything that looks transient on the wire, while the
//! cache layer encodes user-facing assumptions (queries are idempotent, mutations may not be).
//! Attempt indices are 0-based: `attempt == 0` describes the failure of the initial call.

pub mod cache;
pub mod transport;

pub use cache::*;
pub use transport::*;

// self
use crate::{
	_prelude::*,
	obs::{self, CallSpan, Outcome, Stage},
};

/// Base delay of the exponential curve.
pub const BASE_DELAY: Duration = Duration::from_millis(1_000);

/// Outcome of consulting a [`RetryPolicy`] after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDecision {
	/// Whether another attempt should be made.
	pub should_retry: bool,
	/// Wait before the next attempt; zero when `should_retry` is `false`.
	pub delay: Duration,
}
impl RetryDecision {
	/// Retry after `delay`.
	pub const fn retry(delay: Duration) -> Self {
		Self { should_retry: true, delay }
	}

	/// Give up.
	pub const fn stop() -> Self {
		Self { should_retry: false, delay: Duration::ZERO }
	}
}

/// Decides, per failed attempt, whether to retry and how long to wait.
pub trait RetryPolicy
where
	Self: Send + Sync,
{
	/// Evaluates the failure of attempt `attempt` (0-based).
	fn decide(&self, attempt: u32, error: &ApiError) -> RetryDecision;
}

/// Returns `min(BASE_DELAY * 2^attempt, cap)`, saturating instead of overflowing.
pub fn exponential_delay(attempt: u32, cap: Duration) -> Duration {
	let multiplier = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);

	BASE_DELAY.checked_mul(multiplier).map_or(cap, |delay| delay.min(cap))
}

/// Runs `op` until it succeeds or `policy` declines another attempt, sleeping between attempts.
pub async fn run_with_retry<P, T, F, Fut>(
	policy: &P,
	stage: Stage,
	mut op: F,
) -> Result<T, ApiError>
where
	P: ?Sized + RetryPolicy,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, ApiError>>,
{
	let span = CallSpan::new(stage, "run_with_retry");

	span.instrument(async move {
		let mut attempt = 0;

		loop {
			obs::record_outcome(stage, Outcome::Attempt);

			let error = match op().await {
				Ok(value) => {
					obs::record_outcome(stage, Outcome::Success);

					return Ok(value);
				},
				Err(error) => error,
			};
			let decision = policy.decide(attempt, &error);

			if !decision.should_retry {
				obs::record_outcome(stage, Outcome::Failure);

				return Err(error);
			}

			obs::record_outcome(stage, Outcome::Retry);
			obs::log_cache_retry(stage, attempt + 1, &error, decision.delay);
			tokio::time::sleep(decision.delay).await;

			attempt += 1;
		}
	})
	.await
}
