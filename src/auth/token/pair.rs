//! Access/refresh token pair held by token providers.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Current access/refresh token pair.
///
/// Both halves are optional: the pair is empty at startup, populated after login or refresh, and
/// emptied again on logout or an irrecoverable refresh failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
	/// Bearer credential attached to outgoing requests.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_token: Option<TokenSecret>,
	/// Credential exchanged for a new access token after a `401`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
}
impl AuthTokens {
	/// Creates a populated pair.
	pub fn new(
		access_token: impl Into<TokenSecret>,
		refresh_token: impl Into<TokenSecret>,
	) -> Self {
		Self { access_token: Some(access_token.into()), refresh_token: Some(refresh_token.into()) }
	}

	/// Creates a pair holding only an access token.
	pub fn access_only(access_token: impl Into<TokenSecret>) -> Self {
		Self { access_token: Some(access_token.into()), refresh_token: None }
	}

	/// Returns `true` when neither token is held.
	pub fn is_empty(&self) -> bool {
		self.access_token.is_none() && self.refresh_token.is_none()
	}
}
