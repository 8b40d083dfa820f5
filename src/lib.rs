//! Resilient API client core: normalized errors, jittered retries, single-flight token refresh,
//! and a query cache policy layer.
//!
//! The crate is layered leaves-first:
//!
//! - [`error`] turns every failed call into one [`ApiError`](error::ApiError) shape.
//! - [`retry`] decides whether (and how long until) a failed attempt is retried.
//! - [`store`] holds the access/refresh token pair behind the
//!   [`TokenProvider`](store::TokenProvider) contract.
//! - [`refresh`] coalesces concurrent `401` recoveries into a single refresh call.
//! - [`client`] composes the above around an [`HttpTransport`](http::HttpTransport).
//! - [`cache`] applies user-facing freshness and retry rules on top of the client.
//! - [`events`] broadcasts logouts and cache failures to any number of subscribers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod middleware;
pub mod obs;
pub mod refresh;
pub mod retry;
pub mod store;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use serde_json::{Map, Value};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{ApiError, Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
