//! Client-level error types and the normalizer that folds raw failures into [`ApiError`].

// self
use crate::{_prelude::*, http::HttpResponse};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fallback code used when neither the server nor the transport supplies one.
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
/// Code used when a successful response body cannot be decoded into the requested type.
pub const DECODE_ERROR: &str = "DECODE_ERROR";
/// Transport code for `4xx` responses whose body carries no code.
pub const BAD_REQUEST: &str = "ERR_BAD_REQUEST";
/// Transport code for `5xx` (and other non-`2xx`) responses whose body carries no code.
pub const BAD_RESPONSE: &str = "ERR_BAD_RESPONSE";

/// Code used when a request path cannot be resolved against the base URL.
pub const INVALID_URL: &str = "ERR_INVALID_URL";

const NETWORK_FALLBACK_MESSAGE: &str = "Network Error";

/// Canonical client error exposed by public APIs that do more than issue a request.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Request failed after retries and refresh handling.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Local filesystem failure (e.g., while saving a download).
	#[error("I/O error occurred while handling a response body.")]
	Io(#[from] std::io::Error),
}

/// Configuration and validation failures raised while building a client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Layered configuration could not be extracted.
	#[error("Configuration could not be loaded.")]
	Load(#[from] Box<figment::Error>),
	/// Base URL or endpoint path cannot be parsed.
	#[error("Endpoint `{endpoint}` is not a valid URL.")]
	InvalidEndpoint {
		/// Offending endpoint or path.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL cannot carry a path (e.g., `mailto:`).
	#[error("Base URL `{0}` cannot be used as a base for relative endpoints.")]
	CannotBeABase(Url),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<figment::Error> for ConfigError {
	fn from(e: figment::Error) -> Self {
		Self::Load(Box::new(e))
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failure: no HTTP response was received.
#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct TransportError {
	/// Failure classification.
	pub kind: TransportErrorKind,
	/// Human-readable description.
	pub message: String,
	/// Transport-specific cause, when available.
	#[source]
	pub source: Option<BoxError>,
}
impl TransportError {
	/// Creates an error without an underlying cause.
	pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
		Self { kind, message: message.into(), source: None }
	}

	/// Attaches the transport-specific cause.
	pub fn with_source(mut self, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		self.source = Some(Box::new(src));

		self
	}

	/// Builds the timeout error reported when an attempt exceeds its deadline.
	pub fn timeout(after: Duration) -> Self {
		Self::new(
			TransportErrorKind::Timeout,
			format!("timeout of {}ms exceeded", after.as_millis()),
		)
	}

	/// Returns the machine-readable code for this failure, if the kind defines one.
	pub fn code(&self) -> Option<&'static str> {
		self.kind.code()
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		let kind = if e.is_timeout() {
			TransportErrorKind::Timeout
		} else if e.is_connect() {
			TransportErrorKind::Connect
		} else {
			TransportErrorKind::Other
		};

		Self::new(kind, e.to_string()).with_source(e)
	}
}

/// Reasons a request never produced an HTTP response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
	/// Attempt exceeded its deadline.
	Timeout,
	/// Connection could not be established (refused, DNS, TLS).
	Connect,
	/// Request was aborted before completion.
	Aborted,
	/// Any other transport failure.
	Other,
}
impl TransportErrorKind {
	/// Returns the stable code reported through [`ApiError::code`].
	pub const fn code(self) -> Option<&'static str> {
		match self {
			TransportErrorKind::Timeout => Some("ECONNABORTED"),
			TransportErrorKind::Connect => Some("ERR_NETWORK"),
			TransportErrorKind::Aborted => Some("ERR_CANCELED"),
			TransportErrorKind::Other => None,
		}
	}
}

/// Raw failure handed to [`normalize`].
#[derive(Clone, Copy, Debug)]
pub enum Failure<'a> {
	/// The server answered with a non-success status.
	Response(&'a HttpResponse),
	/// No response was received.
	Transport(&'a TransportError),
}

/// Coarse classification used by retry policies and callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
	/// No HTTP response was received.
	Network,
	/// HTTP 401.
	Unauthorized,
	/// Any other 4xx status.
	Client,
	/// 5xx (and any other unexpected non-success status).
	Server,
}

/// Normalized error surfaced to callers for every failed request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ThisError)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
	/// Server-provided message or a transport/generic fallback.
	pub message: String,
	/// Server-provided code, transport code, or [`UNKNOWN_ERROR`].
	pub code: String,
	/// HTTP status, or `0` when no response was received.
	pub status: u16,
	/// Server-provided details or the raw response body.
	pub details: Map<String, Value>,
	/// Instant the failure was normalized.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
}
impl ApiError {
	/// Creates an error with empty details stamped at the current instant.
	pub fn new(message: impl Into<String>, code: impl Into<String>, status: u16) -> Self {
		Self {
			message: message.into(),
			code: code.into(),
			status,
			details: Map::new(),
			timestamp: OffsetDateTime::now_utc(),
		}
	}

	/// Adds a detail entry.
	pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.details.insert(key.into(), value.into());

		self
	}

	/// Builds the error reported when a successful body cannot be decoded.
	pub fn decode(status: u16, err: serde_path_to_error::Error<serde_json::Error>) -> Self {
		let path = err.path().to_string();
		let message = format!("Response body could not be decoded: {}.", err.inner());

		Self::new(message, DECODE_ERROR, status).with_detail("path", path)
	}

	/// Returns `true` when no HTTP response was received.
	pub fn is_network_error(&self) -> bool {
		self.status == 0
	}

	/// Classifies the failure by status.
	pub fn class(&self) -> ErrorClass {
		match self.status {
			0 => ErrorClass::Network,
			401 => ErrorClass::Unauthorized,
			400..=499 => ErrorClass::Client,
			_ => ErrorClass::Server,
		}
	}
}

/// Serializes a request payload or cached value into JSON.
pub(crate) fn encode_json<B>(body: &B) -> Result<Value, ApiError>
where
	B: ?Sized + Serialize,
{
	serde_json::to_value(body).map_err(|err| {
		ApiError::new(format!("Payload could not be encoded: {err}."), UNKNOWN_ERROR, 0)
	})
}

/// Normalizes a raw failure at the current instant.
pub fn normalize(failure: Failure<'_>) -> ApiError {
	normalize_at(failure, OffsetDateTime::now_utc())
}

/// Normalizes a raw failure, stamping it with `now`.
pub fn normalize_at(failure: Failure<'_>, now: OffsetDateTime) -> ApiError {
	match failure {
		Failure::Response(response) => normalize_response(response, now),
		Failure::Transport(err) => ApiError {
			message: if err.message.trim().is_empty() {
				NETWORK_FALLBACK_MESSAGE.into()
			} else {
				err.message.clone()
			},
			code: err.code().unwrap_or(UNKNOWN_ERROR).into(),
			status: 0,
			details: Map::new(),
			timestamp: now,
		},
	}
}

fn normalize_response(response: &HttpResponse, now: OffsetDateTime) -> ApiError {
	let body = response.json_value();
	let payload = body.as_ref().and_then(Value::as_object);
	let message = payload
		.and_then(|object| object.get("message"))
		.and_then(Value::as_str)
		.filter(|message| !message.is_empty())
		.map(str::to_owned)
		.unwrap_or_else(|| format!("Request failed with status code {}", response.status));
	let code = payload
		.and_then(|object| object.get("code"))
		.and_then(Value::as_str)
		.filter(|code| !code.is_empty())
		.unwrap_or(if (400..500).contains(&response.status) { BAD_REQUEST } else { BAD_RESPONSE })
		.to_owned();
	let details = match (payload, &body) {
		(Some(object), _) => match object.get("details") {
			Some(Value::Object(details)) => details.clone(),
			_ => object.clone(),
		},
		(None, Some(Value::Null)) => Map::new(),
		(None, Some(other)) => Map::from_iter([("body".to_owned(), other.clone())]),
		(None, None) => match response.text() {
			Some(text) if !text.trim().is_empty() =>
				Map::from_iter([("body".to_owned(), Value::String(text.into_owned()))]),
			_ => Map::new(),
		},
	};

	ApiError { message, code, status: response.status, details, timestamp: now }
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn response(status: u16, body: &str) -> HttpResponse {
		HttpResponse::new(status, body.as_bytes().to_vec())
	}

	#[test]
	fn network_failures_normalize_to_status_zero() {
		let now = macros::datetime!(2025-11-10 12:00 UTC);

		for kind in [
			TransportErrorKind::Timeout,
			TransportErrorKind::Connect,
			TransportErrorKind::Aborted,
			TransportErrorKind::Other,
		] {
			let err = TransportError::new(kind, "connection refused");
			let normalized = normalize_at(Failure::Transport(&err), now);

			assert_eq!(normalized.status, 0);
			assert!(normalized.is_network_error());
			assert_eq!(normalized.class(), ErrorClass::Network);
			assert_eq!(normalized.message, "connection refused");
			assert!(normalized.details.is_empty());
			assert_eq!(normalized.timestamp, now);
		}
	}

	#[test]
	fn transport_codes_fall_back_to_unknown() {
		let timeout = TransportError::timeout(Duration::from_secs(30));
		let other = TransportError::new(TransportErrorKind::Other, "");

		assert_eq!(normalize(Failure::Transport(&timeout)).code, "ECONNABORTED");
		assert_eq!(normalize(Failure::Transport(&timeout)).message, "timeout of 30000ms exceeded");
		assert_eq!(normalize(Failure::Transport(&other)).code, UNKNOWN_ERROR);
		assert_eq!(normalize(Failure::Transport(&other)).message, "Network Error");
	}

	#[test]
	fn server_payload_fields_take_precedence() {
		let body = r#"{"message":"Survey not found.","code":"SURVEY_MISSING","details":{"id":42}}"#;
		let normalized = normalize(Failure::Response(&response(404, body)));

		assert_eq!(normalized.status, 404);
		assert_eq!(normalized.class(), ErrorClass::Client);
		assert_eq!(normalized.message, "Survey not found.");
		assert_eq!(normalized.code, "SURVEY_MISSING");
		assert_eq!(normalized.details.get("id"), Some(&Value::from(42)));
	}

	#[test]
	fn missing_payload_fields_use_fallbacks() {
		let normalized = normalize(Failure::Response(&response(503, r#"{"retry":true}"#)));

		assert_eq!(normalized.message, "Request failed with status code 503");
		assert_eq!(normalized.code, BAD_RESPONSE);
		assert_eq!(normalize(Failure::Response(&response(409, "{}"))).code, BAD_REQUEST);
		assert_eq!(normalized.details.get("retry"), Some(&Value::Bool(true)));
		assert_eq!(normalized.class(), ErrorClass::Server);
	}

	#[test]
	fn non_object_bodies_land_under_body_key() {
		let text = normalize(Failure::Response(&response(502, "Bad Gateway")));
		let array = normalize(Failure::Response(&response(500, "[1,2]")));
		let empty = normalize(Failure::Response(&response(500, "")));

		assert_eq!(text.details.get("body"), Some(&Value::from("Bad Gateway")));
		assert_eq!(array.details.get("body"), Some(&serde_json::json!([1, 2])));
		assert!(empty.details.is_empty());
	}

	#[test]
	fn unauthorized_is_classified_separately() {
		let normalized = normalize(Failure::Response(&response(401, "{}")));

		assert_eq!(normalized.class(), ErrorClass::Unauthorized);
	}

	#[test]
	fn api_error_serializes_in_camel_case_with_rfc3339_timestamp() {
		let err = ApiError {
			message: "Boom.".into(),
			code: "BOOM".into(),
			status: 500,
			details: Map::new(),
			timestamp: macros::datetime!(2025-11-10 12:00 UTC),
		};
		let payload = serde_json::to_value(&err).expect("ApiError should serialize to JSON.");

		assert_eq!(payload["timestamp"], "2025-11-10T12:00:00Z");
		assert_eq!(payload["status"], 500);
	}
}
