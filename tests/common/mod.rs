//! Shared fixtures for the reqwest-backed integration tests.
#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::MockServer;
// self
use resilient_client::{
	auth::AuthTokens,
	client::ReqwestApiClient,
	config::ClientConfig,
	events::EventBus,
	http::ReqwestTransport,
	reqwest::Client,
	store::MemoryTokenStore,
	url::Url,
};

/// Client wired to `server` plus handles on its token store and event bus.
pub struct Harness {
	pub client: ReqwestApiClient,
	pub store: Arc<MemoryTokenStore>,
	pub events: EventBus,
}

/// Builds a transport that accepts the self-signed certificates served by `httpmock`.
pub fn insecure_transport() -> ReqwestTransport {
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestTransport::with_client(client)
}

pub fn harness(server: &MockServer, tokens: AuthTokens) -> Harness {
	harness_with(server, tokens, |config| config)
}

pub fn harness_with(
	server: &MockServer,
	tokens: AuthTokens,
	configure: impl FnOnce(ClientConfig) -> ClientConfig,
) -> Harness {
	let base_url = Url::parse(&server.url("/api")).expect("Mock server URL should parse.");
	let store = Arc::new(MemoryTokenStore::with_tokens(tokens));
	let events = EventBus::default();
	let client = ReqwestApiClient::with_transport(
		configure(ClientConfig::new(base_url)),
		insecure_transport(),
		store.clone(),
		events.clone(),
	)
	.expect("Client should build against the mock server.");

	Harness { client, store, events }
}
