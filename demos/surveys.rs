//! Demonstrates a cached `/surveys` read that survives an expired access token.
//!
//! The mock server rejects the first bearer token, the client refreshes once, replays the
//! request, and the query cache serves the second read without touching the network.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::{Value, json};
// self
use resilient_client::{
	auth::AuthTokens,
	cache::{CacheConfig, QueryCache, QueryKey},
	client::ReqwestApiClient,
	config::ClientConfig,
	events::EventBus,
	http::ReqwestTransport,
	reqwest::Client,
	store::MemoryTokenStore,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/surveys").header("authorization", "Bearer demo-access");
			then.status(401)
				.json_body(json!({ "message": "Token expired.", "code": "TOKEN_EXPIRED" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/auth/refresh")
				.json_body(json!({ "refreshToken": "demo-refresh" }));
			then.status(200).json_body(json!({ "accessToken": "rotated-access" }));
		})
		.await;
	let surveys = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/surveys").header("authorization", "Bearer rotated-access");
			then.status(200).json_body(json!([{ "id": 1, "title": "Onboarding" }]));
		})
		.await;
	let transport = ReqwestTransport::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let store = Arc::new(MemoryTokenStore::with_tokens(AuthTokens::new(
		"demo-access",
		"demo-refresh",
	)));
	let events = EventBus::default();
	let client = ReqwestApiClient::with_transport(
		ClientConfig::new(Url::parse(&server.url("/api"))?),
		transport,
		store,
		events.clone(),
	)?;
	let cache = QueryCache::new(CacheConfig::default(), events);
	let key = QueryKey::from("surveys");

	for _ in 0..2 {
		let listed: Value = cache.fetch_query(key.clone(), || client.get("/surveys")).await?;

		println!("Surveys: {listed}.");
	}

	if let Some(access) = client.tokens_snapshot().access_token {
		println!("Access token after refresh: {}.", access.expose());
	}

	expired.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
	surveys.assert_calls_async(1).await;

	Ok(())
}
