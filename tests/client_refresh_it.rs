#![cfg(feature = "reqwest")]

mod common;

// std
use std::time::Duration;
// crates.io
use httpmock::prelude::*;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::TryRecvError;
// self
use common::harness;
use resilient_client::{
	auth::AuthTokens,
	events::{ClientEvent, LogoutReason},
	store::TokenProvider,
};

#[tokio::test]
async fn expired_access_token_is_refreshed_and_request_replayed() {
	let server = MockServer::start_async().await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/surveys").header("authorization", "Bearer T1");
			then.status(401)
				.json_body(json!({ "message": "Token expired.", "code": "TOKEN_EXPIRED" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh").json_body(json!({ "refreshToken": "R1" }));
			then.status(200).json_body(json!({ "accessToken": "T2" }));
		})
		.await;
	let replay = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/surveys").header("authorization", "Bearer T2");
			then.status(200).json_body(json!([{ "id": 1, "title": "Onboarding" }]));
		})
		.await;
	let h = harness(&server, AuthTokens::new("T1", "R1"));
	let surveys: Value = h.client.get("/surveys").await.expect("Replayed request should succeed.");

	assert_eq!(surveys, json!([{ "id": 1, "title": "Onboarding" }]));
	assert_eq!(h.store.get(), AuthTokens::new("T2", "R1"));

	expired.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
	replay.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_unauthorized_responses_share_one_refresh() {
	let server = MockServer::start_async().await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path_includes("/api/surveys").header("authorization", "Bearer T1");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200)
				.delay(Duration::from_millis(100))
				.json_body(json!({ "accessToken": "T2", "refreshToken": "R2" }));
		})
		.await;
	let replay = server
		.mock_async(|when, then| {
			when.method(GET).path_includes("/api/surveys").header("authorization", "Bearer T2");
			then.status(200).json_body(json!({ "ok": true }));
		})
		.await;
	let h = harness(&server, AuthTokens::new("T1", "R1"));
	let (first, second) =
		tokio::join!(h.client.get::<Value>("/surveys/1"), h.client.get::<Value>("/surveys/2"));

	assert_eq!(first.expect("First request should be replayed."), json!({ "ok": true }));
	assert_eq!(second.expect("Second request should be replayed."), json!({ "ok": true }));
	assert_eq!(h.store.get(), AuthTokens::new("T2", "R2"));

	refresh.assert_calls_async(1).await;
	expired.assert_calls_async(2).await;
	replay.assert_calls_async(2).await;

	let metrics = h.client.refresh_metrics();

	assert_eq!(metrics.attempts(), 1);
	assert_eq!(metrics.coalesced(), 1);
}

#[tokio::test]
async fn failed_refresh_clears_tokens_and_logs_out_once() {
	let server = MockServer::start_async().await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/surveys");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(401).json_body(json!({
				"message": "Refresh token revoked.",
				"code": "REFRESH_REVOKED"
			}));
		})
		.await;
	let h = harness(&server, AuthTokens::new("T1", "R1"));
	let mut logout = h.events.subscribe();
	let err = h.client.get::<Value>("/surveys").await.expect_err("Failed refresh must surface.");

	assert_eq!(err.status, 401);
	assert_eq!(err.code, "REFRESH_REVOKED");
	assert_eq!(err.message, "Refresh token revoked.");
	assert!(h.store.get().is_empty());
	assert_eq!(
		logout.try_recv().expect("Logout should be broadcast."),
		ClientEvent::Logout { reason: LogoutReason::RefreshFailed }
	);
	assert!(matches!(logout.try_recv(), Err(TryRecvError::Empty)));

	expired.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn unauthorized_without_refresh_token_logs_out_without_calling_refresh() {
	let server = MockServer::start_async().await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me");
			then.status(401).json_body(json!({ "message": "Login required." }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200).json_body(json!({ "accessToken": "never" }));
		})
		.await;
	let h = harness(&server, AuthTokens::access_only("T1"));
	let mut logout = h.events.subscribe();
	let err =
		h.client.get::<Value>("/me").await.expect_err("401 without refresh token must surface.");

	assert_eq!(err.status, 401);
	assert_eq!(err.message, "Login required.");
	assert!(h.store.get().is_empty());
	assert_eq!(
		logout.try_recv().expect("Logout should be broadcast."),
		ClientEvent::Logout { reason: LogoutReason::RefreshTokenMissing }
	);

	expired.assert_calls_async(1).await;
	refresh.assert_calls_async(0).await;
}
