//! Optional observability helpers for client calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (default) to emit spans named `resilient_client.call` with the `stage` and
//!   `call` fields, a structured warning for every retry, and development-mode request logs.
//! - Enable `metrics` to increment the `resilient_client_outcome_total` counter for every
//!   attempt/success/failure/retry, labeled by `stage` + `outcome`.

mod counter;
mod span;

pub use counter::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Layers observed by the client stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Client facade request lifecycle.
	Request,
	/// Single-flight token refresh.
	Refresh,
	/// Cached query fetch.
	Query,
	/// Cache-layer mutation.
	Mutation,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Request => "request",
			Stage::Refresh => "refresh",
			Stage::Query => "query",
			Stage::Mutation => "mutation",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// An attempt started.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// A failed attempt was scheduled for another try.
	Retry,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
			Outcome::Retry => "retry",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
