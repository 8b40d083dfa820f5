//! Transport primitives for API calls.
//!
//! The module exposes [`HttpTransport`] alongside the transport-agnostic [`HttpRequest`] and
//! [`HttpResponse`] types so downstream crates can plug in custom HTTP stacks (or scripted fakes
//! in tests) without losing the client's retry, refresh, and normalization behavior.
//! Implementations must return `Ok` for every response that carries an HTTP status, including
//! `4xx`/`5xx`; `Err` is reserved for attempts that produced no response at all.

// std
use std::borrow::Cow;
// self
use crate::{_prelude::*, error::TransportError};

/// Header carrying bearer credentials.
pub const AUTHORIZATION: &str = "authorization";

const BEARER_PREFIX: &str = "Bearer ";

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Callback invoked with an integer upload percentage (`0..=100`).
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Abstraction over HTTP stacks capable of executing API requests.
///
/// The trait is the client's only dependency on an HTTP library. Implementations must be
/// `Send + Sync + 'static` so a single transport can be shared by the client facade and the
/// token refresher behind an [`Arc`].
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request`, honoring [`HttpRequest::timeout`] when the stack supports it.
	fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a>;
}

/// Sends `request` through `transport` under a fresh deadline of [`HttpRequest::timeout`].
///
/// The deadline is enforced here as well as by the transport so stacks that ignore
/// [`HttpRequest::timeout`] still cannot stall an attempt, and no partially elapsed deadline ever
/// carries over into the next attempt.
pub async fn send_with_deadline<T>(
	transport: &T,
	request: &HttpRequest,
) -> Result<HttpResponse, TransportError>
where
	T: ?Sized + HttpTransport,
{
	match tokio::time::timeout(request.timeout, transport.send(request)).await {
		Ok(outcome) => outcome,
		Err(_) => Err(TransportError::timeout(request.timeout)),
	}
}

/// HTTP verbs used by the client facade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical upper-case verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Transport-agnostic request description.
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// HTTP verb.
	pub method: Method,
	/// Fully resolved URL, including query parameters.
	pub url: Url,
	/// Request headers keyed by lower-case name.
	pub headers: BTreeMap<String, String>,
	/// Request payload.
	pub body: RequestBody,
	/// Deadline applied to a single attempt.
	pub timeout: Duration,
}
impl HttpRequest {
	/// Default per-attempt deadline.
	pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self {
			method,
			url,
			headers: BTreeMap::new(),
			body: RequestBody::Empty,
			timeout: Self::DEFAULT_TIMEOUT,
		}
	}

	/// Sets a header, normalizing the name to lower case.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.set_header(name, value);

		self
	}

	/// Appends query parameters to the URL.
	pub fn with_query<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: AsRef<str>,
		V: AsRef<str>,
	{
		{
			let mut pairs = self.url.query_pairs_mut();

			for (key, value) in params {
				pairs.append_pair(key.as_ref(), value.as_ref());
			}
		}

		// `query_pairs_mut` leaves an empty `?` behind when no pairs were appended.
		if self.url.query() == Some("") {
			self.url.set_query(None);
		}

		self
	}

	/// Attaches a JSON payload.
	pub fn with_json(mut self, body: Value) -> Self {
		self.body = RequestBody::Json(body);

		self
	}

	/// Attaches a multipart upload.
	pub fn with_multipart(mut self, upload: MultipartUpload) -> Self {
		self.body = RequestBody::Multipart(upload);

		self
	}

	/// Overrides the per-attempt deadline.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Sets a header in place.
	pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
	}

	/// Removes a header in place.
	pub fn remove_header(&mut self, name: impl AsRef<str>) -> Option<String> {
		self.headers.remove(&name.as_ref().to_ascii_lowercase())
	}

	/// Returns a header value by case-insensitive name.
	pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
		self.headers.get(&name.as_ref().to_ascii_lowercase()).map(String::as_str)
	}

	/// Returns the bearer token carried by the `Authorization` header, if any.
	pub fn bearer_token(&self) -> Option<&str> {
		self.header(AUTHORIZATION)?.strip_prefix(BEARER_PREFIX)
	}
}

/// Request payload variants.
#[derive(Clone, Debug, Default)]
pub enum RequestBody {
	/// No body.
	#[default]
	Empty,
	/// JSON document.
	Json(Value),
	/// `multipart/form-data` upload.
	Multipart(MultipartUpload),
}

/// A single-file multipart upload with optional text fields and progress reporting.
#[derive(Clone)]
pub struct MultipartUpload {
	/// Form field name carrying the file.
	pub field_name: String,
	/// File name reported to the server.
	pub file_name: String,
	/// MIME type of the file, if known.
	pub content_type: Option<String>,
	/// File contents; shared so retries do not copy the payload.
	pub contents: Arc<[u8]>,
	/// Additional text fields sent alongside the file.
	pub fields: Vec<(String, String)>,
	/// Invoked with the integer percentage as the payload is streamed.
	pub progress: Option<ProgressCallback>,
}
impl MultipartUpload {
	/// Default form field name used for uploads.
	pub const DEFAULT_FIELD: &'static str = "file";

	/// Creates an upload for the provided file.
	pub fn new(file_name: impl Into<String>, contents: impl Into<Arc<[u8]>>) -> Self {
		Self {
			field_name: Self::DEFAULT_FIELD.into(),
			file_name: file_name.into(),
			content_type: None,
			contents: contents.into(),
			fields: Vec::new(),
			progress: None,
		}
	}

	/// Overrides the form field name.
	pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
		self.field_name = name.into();

		self
	}

	/// Sets the MIME type.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());

		self
	}

	/// Adds a text field.
	pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.fields.push((name.into(), value.into()));

		self
	}

	/// Registers a progress callback.
	pub fn on_progress(mut self, callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
		self.progress = Some(Arc::new(callback));

		self
	}

	/// Total payload size in bytes.
	pub fn total_bytes(&self) -> u64 {
		self.contents.len() as u64
	}

	/// Reports progress for `loaded` bytes when the total is known.
	pub fn report_progress(&self, loaded: u64) {
		if let (Some(callback), Some(percent)) =
			(&self.progress, UploadProgress::percent(loaded, self.total_bytes()))
		{
			callback(percent);
		}
	}
}
impl Debug for MultipartUpload {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MultipartUpload")
			.field("field_name", &self.field_name)
			.field("file_name", &self.file_name)
			.field("content_type", &self.content_type)
			.field("bytes", &self.contents.len())
			.field("fields", &self.fields)
			.field("progress_set", &self.progress.is_some())
			.finish()
	}
}

/// Upload progress arithmetic.
#[derive(Clone, Copy, Debug)]
pub struct UploadProgress;
impl UploadProgress {
	/// Returns `floor(loaded * 100 / total)` clamped to 100, or `None` when the total is unknown.
	pub fn percent(loaded: u64, total: u64) -> Option<u8> {
		if total == 0 {
			return None;
		}

		let percent = (u128::from(loaded) * 100 / u128::from(total)).min(100);

		u8::try_from(percent).ok()
	}
}

/// Transport-agnostic response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers keyed by lower-case name.
	pub headers: BTreeMap<String, String>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Creates a response without headers.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into() }
	}

	/// Creates a JSON response.
	pub fn json_body(status: u16, body: &Value) -> Self {
		Self::new(status, body.to_string()).with_header("content-type", "application/json")
	}

	/// Sets a header, normalizing the name to lower case.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Returns `true` for `2xx` statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decodes the body, reporting the failing JSON path on error.
	///
	/// An empty body decodes as JSON `null`, so `()` and `Option<T>` accept `204` responses.
	pub fn json<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: DeserializeOwned,
	{
		if self.body.is_empty() {
			return serde_path_to_error::deserialize(Value::Null);
		}

		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
	}

	/// Parses the body as a JSON value, if it is one.
	pub fn json_value(&self) -> Option<Value> {
		if self.body.is_empty() {
			return None;
		}

		serde_json::from_slice(&self.body).ok()
	}

	/// Returns the body as UTF-8 text, if it is valid UTF-8.
	pub fn text(&self) -> Option<Cow<'_, str>> {
		std::str::from_utf8(&self.body).ok().map(Cow::Borrowed)
	}
}

#[cfg(feature = "reqwest")]
/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	const UPLOAD_CHUNK: usize = 64 * 1024;

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	fn multipart_form(
		upload: &MultipartUpload,
	) -> Result<reqwest::multipart::Form, TransportError> {
		// crates.io
		use futures_util::stream;
		use reqwest::{
			Body,
			multipart::{Form, Part},
		};

		let total = upload.total_bytes();
		let chunks =
			upload.contents.chunks(Self::UPLOAD_CHUNK).map(<[u8]>::to_vec).collect::<Vec<_>>();
		let tracker = upload.clone();
		let mut loaded = 0_u64;
		let body = stream::iter(chunks.into_iter().map(move |chunk| {
			loaded += chunk.len() as u64;
			tracker.report_progress(loaded);

			Ok::<_, std::io::Error>(chunk)
		}));
		let mut part = Part::stream_with_length(Body::wrap_stream(body), total)
			.file_name(upload.file_name.clone());

		if let Some(content_type) = &upload.content_type {
			part = part.mime_str(content_type).map_err(TransportError::from)?;
		}

		let mut form = Form::new();

		for (name, value) in &upload.fields {
			form = form.text(name.clone(), value.clone());
		}

		Ok(form.part(upload.field_name.clone(), part))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Patch => reqwest::Method::PATCH,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder =
				self.0.request(method, request.url.clone()).timeout(request.timeout);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}

			builder = match &request.body {
				RequestBody::Empty => builder,
				RequestBody::Json(value) => builder
					.header(reqwest::header::CONTENT_TYPE, "application/json")
					.body(value.to_string()),
				RequestBody::Multipart(upload) => builder.multipart(Self::multipart_form(upload)?),
			};

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(HttpResponse { status, headers, body })
		})
	}
}
