//! Single-flight token refresh triggered by `401` responses.
//!
//! Every request that receives a `401` calls [`TokenRefresher::recover`] with the access token it
//! was sent with. Recoveries are serialized behind one async guard; once inside, a recovery first
//! checks whether the store already holds a different access token. If so, another request
//! refreshed while this one waited and the fresh token is reused without touching the network,
//! so N concurrent `401`s cost exactly one refresh call. Otherwise the refresher posts the refresh
//! token, rotates the stored pair, and hands the new access token back for replay. Any failure
//! clears the store and broadcasts a single [`ClientEvent::Logout`].

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AuthTokens, TokenSecret},
	error::{self, Failure},
	events::{ClientEvent, EventBus, LogoutReason},
	http::{HttpRequest, HttpTransport, Method, send_with_deadline},
	obs::{self, CallSpan, Outcome, Stage},
	store::TokenProvider,
};

/// Payload returned by the refresh endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
	/// Newly minted access token.
	pub access_token: String,
	/// Rotated refresh token, when the server rotates.
	#[serde(default)]
	pub refresh_token: Option<String>,
}

/// Coordinates `401` recoveries so concurrent failures share one refresh call.
pub struct TokenRefresher<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	tokens: Arc<dyn TokenProvider>,
	events: EventBus,
	endpoint: Url,
	timeout: Duration,
	guard: AsyncMutex<()>,
	/// Shared counters for refresh outcomes.
	pub metrics: Arc<RefreshMetrics>,
}
impl<T> TokenRefresher<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a refresher that posts to `endpoint` through `transport`.
	pub fn new(
		transport: Arc<T>,
		tokens: Arc<dyn TokenProvider>,
		events: EventBus,
		endpoint: Url,
		timeout: Duration,
	) -> Self {
		Self {
			transport,
			tokens,
			events,
			endpoint,
			timeout,
			guard: AsyncMutex::new(()),
			metrics: Default::default(),
		}
	}

	/// Recovers from a `401` received by a request sent with `stale_access`.
	///
	/// Returns the access token the original request should be replayed with. On failure the
	/// store is cleared, one logout is broadcast, and the normalized error for the caller is
	/// returned: the refresh endpoint's error, or `unauthorized` when no refresh was possible.
	pub async fn recover(
		&self,
		stale_access: Option<&str>,
		unauthorized: ApiError,
	) -> Result<TokenSecret, ApiError> {
		const STAGE: Stage = Stage::Refresh;

		let span = CallSpan::new(STAGE, "recover");

		span.instrument(async move {
			let _singleflight = self.guard.lock().await;
			let current = self.tokens.get();

			if let Some(sent) = stale_access {
				match &current.access_token {
					Some(fresh) if fresh.expose() != sent => {
						self.metrics.record_coalesced();

						return Ok(fresh.clone());
					},
					// A concurrent recovery already ended the session.
					None if current.refresh_token.is_none() => return Err(unauthorized),
					_ => {},
				}
			}

			let Some(refresh_token) = current.refresh_token else {
				return Err(self.end_session(LogoutReason::RefreshTokenMissing, unauthorized));
			};

			obs::record_outcome(STAGE, Outcome::Attempt);
			self.metrics.record_attempt();

			let payload = match self.call_refresh_endpoint(&refresh_token).await {
				Ok(payload) => payload,
				Err(err) => return Err(self.end_session(LogoutReason::RefreshFailed, err)),
			};
			let access = TokenSecret::new(payload.access_token);
			let refresh = payload.refresh_token.map(TokenSecret::new).unwrap_or(refresh_token);

			self.tokens.set(AuthTokens {
				access_token: Some(access.clone()),
				refresh_token: Some(refresh),
			});
			self.metrics.record_success();
			obs::record_outcome(STAGE, Outcome::Success);

			Ok(access)
		})
		.await
	}

	async fn call_refresh_endpoint(
		&self,
		refresh_token: &TokenSecret,
	) -> Result<RefreshResponse, ApiError> {
		let request = HttpRequest::new(Method::Post, self.endpoint.clone())
			.with_timeout(self.timeout)
			.with_json(serde_json::json!({ "refreshToken": refresh_token.expose() }));
		let response = send_with_deadline(self.transport.as_ref(), &request)
			.await
			.map_err(|err| error::normalize(Failure::Transport(&err)))?;

		if !response.is_success() {
			return Err(error::normalize(Failure::Response(&response)));
		}

		response.json().map_err(|err| ApiError::decode(response.status, err))
	}

	fn end_session(&self, reason: LogoutReason, err: ApiError) -> ApiError {
		self.tokens.clear();
		self.metrics.record_failure();
		obs::record_outcome(Stage::Refresh, Outcome::Failure);
		self.events.publish(ClientEvent::Logout { reason });

		err
	}
}
impl<T> Debug for TokenRefresher<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRefresher")
			.field("endpoint", &self.endpoint.as_str())
			.field("timeout", &self.timeout)
			.field("metrics", &self.metrics)
			.finish()
	}
}
