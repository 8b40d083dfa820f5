//! Ordered request/response middleware applied around every transport attempt.
//!
//! The client runs [`Middleware::on_request`] for each middleware in registration order before an
//! attempt is sent, then [`Middleware::on_response`] in the same order once the attempt settles.
//! Middleware observes and decorates; control flow (retry, refresh, replay) stays in the client.

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::{AUTHORIZATION, HttpRequest, HttpResponse, RequestBody},
	obs,
	store::TokenProvider,
};

/// Per-request attempt metadata.
#[derive(Clone, Debug)]
pub struct RequestContext {
	/// Transport retries consumed so far (0 for the initial attempt).
	pub attempt: u32,
	/// Set once the `401 → refresh → replay` path has run for this request.
	pub retried: bool,
	/// Start of the current attempt.
	pub started_at: Instant,
}
impl RequestContext {
	/// Creates the context for a fresh request.
	pub fn new() -> Self {
		Self { attempt: 0, retried: false, started_at: Instant::now() }
	}

	/// Restamps the start time for a new attempt.
	pub fn begin_attempt(&mut self) {
		self.started_at = Instant::now();
	}

	/// Time elapsed since the current attempt started.
	pub fn elapsed(&self) -> Duration {
		self.started_at.elapsed()
	}
}
impl Default for RequestContext {
	fn default() -> Self {
		Self::new()
	}
}

/// Observer/decorator hook around transport attempts.
pub trait Middleware
where
	Self: Send + Sync,
{
	/// Decorates the outgoing request.
	fn on_request(&self, request: &mut HttpRequest, ctx: &RequestContext) {
		let _ = (request, ctx);
	}

	/// Observes the attempt outcome.
	fn on_response(
		&self,
		request: &HttpRequest,
		outcome: Result<&HttpResponse, &TransportError>,
		ctx: &RequestContext,
	) {
		let _ = (request, outcome, ctx);
	}
}

/// Attaches `Authorization: Bearer <access>` when an access token is held.
///
/// Unauthenticated calls pass through untouched; a header left over from a previous attempt is
/// removed when the store has since been cleared.
#[derive(Clone)]
pub struct BearerAuth(pub Arc<dyn TokenProvider>);
impl Middleware for BearerAuth {
	fn on_request(&self, request: &mut HttpRequest, _ctx: &RequestContext) {
		match self.0.get().access_token {
			Some(token) => request.set_header(AUTHORIZATION, token.bearer()),
			None => {
				request.remove_header(AUTHORIZATION);
			},
		}
	}
}
impl Debug for BearerAuth {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("BearerAuth").field(&self.0).finish()
	}
}

/// Development-mode request/response logger.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestLogger {
	/// Logging is skipped entirely when `false`.
	pub enabled: bool,
}
impl RequestLogger {
	/// Creates a logger gated on `enabled`.
	pub fn new(enabled: bool) -> Self {
		Self { enabled }
	}
}
impl Middleware for RequestLogger {
	fn on_request(&self, request: &mut HttpRequest, _ctx: &RequestContext) {
		if !self.enabled {
			return;
		}

		let body = match &request.body {
			RequestBody::Empty => String::new(),
			RequestBody::Json(value) => value.to_string(),
			RequestBody::Multipart(upload) => format!("<multipart {}>", upload.file_name),
		};

		obs::log_request(request.method, &request.url, &body);
	}

	fn on_response(
		&self,
		request: &HttpRequest,
		outcome: Result<&HttpResponse, &TransportError>,
		ctx: &RequestContext,
	) {
		if !self.enabled {
			return;
		}

		let status = outcome.map_or(0, |response| response.status);

		obs::log_response(request.method, &request.url, status, ctx.elapsed());
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::AuthTokens,
		http::Method,
		store::{MemoryTokenStore, TokenProvider},
	};

	fn request() -> HttpRequest {
		HttpRequest::new(
			Method::Get,
			Url::parse("http://localhost:8000/api/surveys").expect("Failed to parse test URL."),
		)
	}

	#[test]
	fn bearer_auth_attaches_current_access_token() {
		let store = Arc::new(MemoryTokenStore::with_tokens(AuthTokens::new("T1", "R1")));
		let auth = BearerAuth(store.clone());
		let mut outgoing = request();

		auth.on_request(&mut outgoing, &RequestContext::new());

		assert_eq!(outgoing.header("Authorization"), Some("Bearer T1"));

		store.clear();
		auth.on_request(&mut outgoing, &RequestContext::new());

		assert_eq!(outgoing.header("Authorization"), None);
	}

	#[test]
	fn bearer_auth_passes_unauthenticated_requests_through() {
		let auth = BearerAuth(Arc::new(MemoryTokenStore::default()));
		let mut outgoing = request();

		auth.on_request(&mut outgoing, &RequestContext::new());

		assert!(outgoing.headers.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn context_measures_attempt_duration() {
		let mut ctx = RequestContext::new();

		tokio::time::advance(Duration::from_millis(250)).await;

		assert_eq!(ctx.elapsed(), Duration::from_millis(250));

		ctx.begin_attempt();

		assert_eq!(ctx.elapsed(), Duration::ZERO);
	}

	#[test]
	fn disabled_logger_is_silent() {
		let logger = RequestLogger::new(false);
		let mut outgoing = request();

		logger.on_request(&mut outgoing, &RequestContext::new());
		logger.on_response(&outgoing, Ok(&HttpResponse::new(200, "")), &RequestContext::new());
	}
}
