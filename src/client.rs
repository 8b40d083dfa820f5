//! HTTP client facade composing middleware, transport retries, and `401` recovery.
//!
//! [`ApiClient::execute`] owns the attempt loop. Each attempt clones the caller's request, runs
//! the middleware chain (bearer auth first, caller middleware next, the development logger last),
//! and sends it under a fresh per-attempt deadline. Successful responses pass through untouched.
//! A `401` is handed to the [`TokenRefresher`] once per request and the request is replayed with
//! whatever token the store holds afterwards; every other failure is normalized and offered to
//! the transport retry policy.

// std
use std::path::Path;
// self
use crate::{
	_prelude::*,
	auth::AuthTokens,
	config::ClientConfig,
	error::{self, Failure, INVALID_URL},
	events::EventBus,
	http::{HttpRequest, HttpResponse, HttpTransport, Method, MultipartUpload, send_with_deadline},
	middleware::{BearerAuth, Middleware, RequestContext, RequestLogger},
	obs::{self, CallSpan, Outcome, Stage},
	refresh::{RefreshMetrics, TokenRefresher},
	retry::{RetryPolicy, TransportRetryPolicy},
	store::TokenProvider,
};
#[cfg(feature = "reqwest")] use crate::{http::ReqwestTransport, store::MemoryTokenStore};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Payload returned by the generic upload endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
	/// Public URL of the stored file.
	pub url: String,
	/// Name the server stored the file under.
	pub filename: String,
}

/// Payload returned by the health endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
	/// Service status label (e.g. `ok`).
	pub status: String,
	/// Server-side timestamp, passed through verbatim.
	pub timestamp: String,
}

/// Resilient API client bound to one base URL.
pub struct ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	config: ClientConfig,
	transport: Arc<T>,
	tokens: Arc<dyn TokenProvider>,
	events: EventBus,
	retry: Arc<dyn RetryPolicy>,
	refresher: Arc<TokenRefresher<T>>,
	middleware: Vec<Arc<dyn Middleware>>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client over a caller-provided transport, token provider, and event bus.
	pub fn with_transport(
		config: ClientConfig,
		transport: impl Into<Arc<T>>,
		tokens: Arc<dyn TokenProvider>,
		events: EventBus,
	) -> Result<Self> {
		let transport = transport.into();
		let refresh_endpoint = config.endpoint(&config.refresh_path)?;
		let refresher = TokenRefresher::new(
			transport.clone(),
			tokens.clone(),
			events.clone(),
			refresh_endpoint,
			config.timeout(),
		);
		let middleware: Vec<Arc<dyn Middleware>> =
			vec![Arc::new(BearerAuth(tokens.clone())), Arc::new(RequestLogger::new(config.debug))];

		Ok(Self {
			config,
			transport,
			tokens,
			events,
			retry: Arc::new(TransportRetryPolicy::default()),
			refresher: Arc::new(refresher),
			middleware,
		})
	}

	/// Appends `middleware` after bearer auth and any previously added middleware.
	///
	/// The development logger always stays last so it observes the fully decorated request.
	pub fn with_middleware(mut self, middleware: impl 'static + Middleware) -> Self {
		let logger_slot = self.middleware.len().saturating_sub(1);

		self.middleware.insert(logger_slot, Arc::new(middleware));

		self
	}

	/// Replaces the transport retry policy.
	pub fn with_retry_policy(mut self, policy: impl 'static + RetryPolicy) -> Self {
		self.retry = Arc::new(policy);

		self
	}

	/// Active configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Token provider shared with the refresher.
	pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
		&self.tokens
	}

	/// Event bus the client publishes logout notifications to.
	pub fn events(&self) -> &EventBus {
		&self.events
	}

	/// Counters describing `401` recoveries.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		self.refresher.metrics.clone()
	}

	/// Stores a new token pair, replacing the previous one.
	pub fn set_tokens(&self, tokens: AuthTokens) {
		self.tokens.set(tokens);
	}

	/// Forgets both tokens.
	pub fn clear_tokens(&self) {
		self.tokens.clear();
	}

	/// Returns the current token pair.
	pub fn tokens_snapshot(&self) -> AuthTokens {
		self.tokens.get()
	}

	/// Builds a request for `path` resolved against the base URL with the configured deadline.
	pub fn request(&self, method: Method, path: &str) -> Result<HttpRequest, ApiError> {
		let url = self.config.endpoint(path).map_err(|err| {
			ApiError::new(err.to_string(), INVALID_URL, 0).with_detail("path", path)
		})?;

		Ok(HttpRequest::new(method, url).with_timeout(self.config.timeout()))
	}

	/// Sends `request` with middleware, transport retries, and `401` recovery applied.
	///
	/// Returns the first `2xx` response. Any other outcome surfaces as a normalized [`ApiError`]
	/// once retries are exhausted or the refresh path has failed.
	pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
		const STAGE: Stage = Stage::Request;

		let span = CallSpan::new(STAGE, "execute");

		span.instrument(async move {
			let mut ctx = RequestContext::new();

			loop {
				let mut outgoing = request.clone();

				ctx.begin_attempt();

				for middleware in &self.middleware {
					middleware.on_request(&mut outgoing, &ctx);
				}

				obs::record_outcome(STAGE, Outcome::Attempt);

				let outcome = send_with_deadline(self.transport.as_ref(), &outgoing).await;

				for middleware in &self.middleware {
					middleware.on_response(&outgoing, outcome.as_ref(), &ctx);
				}

				let error = match outcome {
					Ok(response) if response.is_success() => {
						obs::record_outcome(STAGE, Outcome::Success);

						return Ok(response);
					},
					Ok(response) => error::normalize(Failure::Response(&response)),
					Err(err) => error::normalize(Failure::Transport(&err)),
				};

				if error.status == 401 && !ctx.retried {
					ctx.retried = true;

					if let Err(err) = self.refresher.recover(outgoing.bearer_token(), error).await {
						obs::record_outcome(STAGE, Outcome::Failure);

						return Err(err);
					}

					continue;
				}

				let decision = self.retry.decide(ctx.attempt, &error);

				if !decision.should_retry {
					obs::record_outcome(STAGE, Outcome::Failure);

					return Err(error);
				}

				obs::record_outcome(STAGE, Outcome::Retry);
				obs::log_retry(
					ctx.attempt + 1,
					outgoing.method,
					&outgoing.url,
					error.status,
					decision.delay,
				);
				tokio::time::sleep(decision.delay).await;

				ctx.attempt += 1;
			}
		})
		.await
	}

	/// `GET path`, decoding the JSON body.
	pub async fn get<R>(&self, path: &str) -> Result<R, ApiError>
	where
		R: DeserializeOwned,
	{
		self.send_json(self.request(Method::Get, path)?).await
	}

	/// `GET path?params`, decoding the JSON body.
	pub async fn get_with_params<R, K, V>(
		&self,
		path: &str,
		params: impl IntoIterator<Item = (K, V)>,
	) -> Result<R, ApiError>
	where
		R: DeserializeOwned,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		self.send_json(self.request(Method::Get, path)?.with_query(params)).await
	}

	/// `POST path` with a JSON body.
	pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		let request = self.request(Method::Post, path)?.with_json(error::encode_json(body)?);

		self.send_json(request).await
	}

	/// `PUT path` with a JSON body.
	pub async fn put<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		let request = self.request(Method::Put, path)?.with_json(error::encode_json(body)?);

		self.send_json(request).await
	}

	/// `PATCH path` with a JSON body.
	pub async fn patch<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		let request = self.request(Method::Patch, path)?.with_json(error::encode_json(body)?);

		self.send_json(request).await
	}

	/// `DELETE path`; an empty response body decodes as `()`.
	pub async fn delete<R>(&self, path: &str) -> Result<R, ApiError>
	where
		R: DeserializeOwned,
	{
		self.send_json(self.request(Method::Delete, path)?).await
	}

	/// Uploads a file to the configured upload endpoint.
	pub async fn upload(&self, upload: MultipartUpload) -> Result<UploadResponse, ApiError> {
		let path = self.config.upload_path.clone();

		self.upload_to(&path, upload).await
	}

	/// Uploads a file to `path`, decoding a caller-chosen response type.
	pub async fn upload_to<R>(&self, path: &str, upload: MultipartUpload) -> Result<R, ApiError>
	where
		R: DeserializeOwned,
	{
		self.send_json(self.request(Method::Post, path)?.with_multipart(upload)).await
	}

	/// Fetches `path` as raw bytes.
	pub async fn download(&self, path: &str) -> Result<Vec<u8>, ApiError> {
		let response = self.execute(self.request(Method::Get, path)?).await?;

		Ok(response.body)
	}

	/// Fetches `path` and writes the bytes to `destination`, returning the byte count.
	pub async fn download_to(&self, path: &str, destination: impl AsRef<Path>) -> Result<u64> {
		let bytes = self.download(path).await?;

		tokio::fs::write(destination, &bytes).await?;

		Ok(bytes.len() as u64)
	}

	/// `GET` the configured health endpoint.
	pub async fn health_check(&self) -> Result<HealthStatus, ApiError> {
		let path = self.config.health_path.clone();

		self.get(&path).await
	}

	async fn send_json<R>(&self, request: HttpRequest) -> Result<R, ApiError>
	where
		R: DeserializeOwned,
	{
		let response = self.execute(request).await?;

		response.json().map_err(|err| ApiError::decode(response.status, err))
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client backed by reqwest, an in-memory token store, and a fresh event bus.
	pub fn new(config: ClientConfig) -> Result<Self> {
		let http = ReqwestClient::builder()
			.timeout(config.timeout())
			.build()
			.map_err(crate::error::ConfigError::from)?;

		Self::with_transport(
			config,
			ReqwestTransport::with_client(http),
			Arc::new(MemoryTokenStore::default()),
			EventBus::default(),
		)
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("config", &self.config)
			.field("tokens", &self.tokens)
			.field("refresher", &self.refresher)
			.field("middleware", &self.middleware.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// self
	use super::*;
	use crate::{
		error::{TransportError, TransportErrorKind},
		http::TransportFuture,
		store::MemoryTokenStore,
	};

	#[derive(Default)]
	struct ScriptedTransport {
		replies: Mutex<VecDeque<Result<HttpResponse, TransportErrorKind>>>,
		seen: Mutex<Vec<HttpRequest>>,
	}
	impl ScriptedTransport {
		fn replying(
			replies: impl IntoIterator<Item = Result<HttpResponse, TransportErrorKind>>,
		) -> Arc<Self> {
			let replies = Mutex::new(replies.into_iter().collect());

			Arc::new(Self { replies, ..Default::default() })
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
			self.seen.lock().push(request.clone());

			let reply = self.replies.lock().pop_front().unwrap_or(Err(TransportErrorKind::Connect));

			Box::pin(async move {
				reply.map_err(|kind| TransportError::new(kind, "scripted failure"))
			})
		}
	}

	#[derive(Default)]
	struct CountingMiddleware(AtomicUsize);
	impl Middleware for CountingMiddleware {
		fn on_request(&self, request: &mut HttpRequest, ctx: &RequestContext) {
			self.0.fetch_add(1, Ordering::SeqCst);
			request.set_header("x-attempt", ctx.attempt.to_string());
		}
	}

	fn client(
		transport: Arc<ScriptedTransport>,
		tokens: AuthTokens,
	) -> ApiClient<ScriptedTransport> {
		ApiClient::with_transport(
			ClientConfig::default(),
			transport,
			Arc::new(MemoryTokenStore::with_tokens(tokens)),
			EventBus::default(),
		)
		.expect("Client should build.")
	}

	fn ok(body: Value) -> Result<HttpResponse, TransportErrorKind> {
		Ok(HttpResponse::json_body(200, &body))
	}

	fn status(code: u16) -> Result<HttpResponse, TransportErrorKind> {
		Ok(HttpResponse::json_body(code, &serde_json::json!({ "message": "scripted" })))
	}

	#[tokio::test(start_paused = true)]
	async fn transient_failures_are_retried_transparently() {
		let transport = ScriptedTransport::replying([
			status(503),
			Err(TransportErrorKind::Timeout),
			ok(serde_json::json!({ "items": [] })),
		]);
		let client = client(transport.clone(), AuthTokens::default());
		let payload: Value = client.get("/surveys").await.expect("Third attempt should succeed.");

		assert_eq!(payload, serde_json::json!({ "items": [] }));
		assert_eq!(transport.seen.lock().len(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn non_retryable_client_errors_fail_fast() {
		let transport = ScriptedTransport::replying([status(404)]);
		let client = client(transport.clone(), AuthTokens::default());
		let err = client.get::<Value>("/surveys/9").await.expect_err("404 must surface.");

		assert_eq!(err.status, 404);
		assert_eq!(err.message, "scripted");
		assert_eq!(transport.seen.lock().len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn retries_stop_after_policy_budget() {
		let transport = ScriptedTransport::replying((0..4).map(|_| status(500)));
		let client = client(transport.clone(), AuthTokens::default());
		let err = client.get::<Value>("/surveys").await.expect_err("Exhausted retries must fail.");

		assert_eq!(err.status, 500);
		assert_eq!(transport.seen.lock().len(), 4);
	}

	#[tokio::test]
	async fn unauthorized_request_is_replayed_with_refreshed_token() {
		let transport = ScriptedTransport::replying([
			status(401),
			ok(serde_json::json!({ "accessToken": "T2" })),
			ok(serde_json::json!({ "id": 1 })),
		]);
		let client = client(transport.clone(), AuthTokens::new("T1", "R1"));
		let payload: Value = client.get("/surveys").await.expect("Replay should succeed.");

		assert_eq!(payload, serde_json::json!({ "id": 1 }));
		assert_eq!(client.tokens_snapshot(), AuthTokens::new("T2", "R1"));

		let seen = transport.seen.lock();

		assert_eq!(seen[0].bearer_token(), Some("T1"));
		assert_eq!(seen[1].url.path(), "/api/auth/refresh");
		assert_eq!(seen[2].bearer_token(), Some("T2"));
	}

	#[tokio::test]
	async fn replayed_unauthorized_does_not_refresh_twice() {
		let transport = ScriptedTransport::replying([
			status(401),
			ok(serde_json::json!({ "accessToken": "T2" })),
			status(401),
		]);
		let client = client(transport.clone(), AuthTokens::new("T1", "R1"));
		let err = client.get::<Value>("/surveys").await.expect_err("Second 401 must surface.");

		assert_eq!(err.status, 401);
		assert_eq!(transport.seen.lock().len(), 3);
		assert_eq!(client.refresh_metrics().attempts(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn middleware_runs_between_auth_and_logger_on_every_attempt() {
		let transport = ScriptedTransport::replying([status(502), ok(Value::Null)]);
		let client = client(transport.clone(), AuthTokens::access_only("T1"))
			.with_middleware(CountingMiddleware::default());

		client.get::<()>("/ping").await.expect("Retry should succeed.");

		let seen = transport.seen.lock();

		assert_eq!(seen[0].header("x-attempt"), Some("0"));
		assert_eq!(seen[1].header("x-attempt"), Some("1"));
		assert_eq!(seen[1].bearer_token(), Some("T1"));
	}

	#[tokio::test]
	async fn empty_delete_response_decodes_as_unit() {
		let transport = ScriptedTransport::replying([Ok(HttpResponse::new(204, Vec::<u8>::new()))]);
		let client = client(transport, AuthTokens::default());

		client.delete::<()>("/surveys/1").await.expect("204 should decode as unit.");
	}

	#[tokio::test]
	async fn undecodable_success_body_reports_decode_error() {
		let transport = ScriptedTransport::replying([ok(serde_json::json!({ "status": 1 }))]);
		let client = client(transport, AuthTokens::default());
		let err = client.health_check().await.expect_err("Malformed health payload must fail.");

		assert_eq!(err.code, error::DECODE_ERROR);
		assert_eq!(err.status, 200);
		assert_eq!(err.details.get("path"), Some(&Value::String("status".into())));
	}
}
