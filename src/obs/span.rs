// self
use crate::{_prelude::*, events::ClientEvent, http::Method, obs::Stage};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// A span builder used by client calls.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided stage + call site.
	pub fn new(stage: Stage, call: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("resilient_client.call", stage = stage.as_str(), call);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, call);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits the structured warning attached to every transport retry.
pub fn log_retry(attempt: u32, method: Method, url: &Url, status: u16, delay: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			attempt,
			method = method.as_str(),
			url = url.as_str(),
			status,
			delay_ms = delay.as_millis() as u64,
			"retrying request"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, method, url, status, delay);
	}
}

/// Emits the warning attached to every cache-layer retry.
pub fn log_cache_retry(stage: Stage, attempt: u32, error: &ApiError, delay: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			stage = stage.as_str(),
			attempt,
			status = error.status,
			code = error.code.as_str(),
			delay_ms = delay.as_millis() as u64,
			"retrying cache operation"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, attempt, error, delay);
	}
}

/// Development-mode log of an outgoing request.
pub fn log_request(method: Method, url: &Url, body: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(method = method.as_str(), url = url.as_str(), body, "api request");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (method, url, body);
	}
}

/// Development-mode log of a completed attempt; `status` is `0` when no response arrived.
pub fn log_response(method: Method, url: &Url, status: u16, elapsed: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			method = method.as_str(),
			url = url.as_str(),
			status,
			duration_ms = elapsed.as_millis() as u64,
			"api response"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (method, url, status, elapsed);
	}
}

/// Logs a broadcast notification.
pub fn log_event(event: &ClientEvent) {
	#[cfg(feature = "tracing")]
	{
		match event {
			ClientEvent::Logout { reason } =>
				tracing::info!(event = event.name(), reason = reason.as_str(), "client event"),
			ClientEvent::QueryError { key, error } => tracing::debug!(
				event = event.name(),
				key = %key,
				status = error.status,
				code = error.code.as_str(),
				"client event"
			),
			ClientEvent::MutationError { error } => tracing::debug!(
				event = event.name(),
				status = error.status,
				code = error.code.as_str(),
				"client event"
			),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = event;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = CallSpan::new(Stage::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}

	#[test]
	fn log_helpers_accept_all_inputs() {
		let url =
			Url::parse("http://localhost:8000/api/health").expect("Failed to parse test URL.");

		log_retry(1, Method::Get, &url, 503, Duration::from_secs(1));
		log_request(Method::Post, &url, "{}");
		log_response(Method::Get, &url, 0, Duration::from_millis(12));
		log_cache_retry(Stage::Query, 1, &ApiError::new("Down.", "DOWN", 503), Duration::ZERO);
	}
}
