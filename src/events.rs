//! In-process notifications published by the client and the query cache.
//!
//! [`EventBus`] is a cloneable handle over a [`tokio::sync::broadcast`] channel. The refresher
//! publishes [`ClientEvent::Logout`], the cache publishes query and mutation failures, and any
//! number of subscribers (UI glue, logging, tests) consume them without coupling back into the
//! publishers.

// crates.io
use tokio::sync::broadcast::{self, Receiver, Sender};
// self
use crate::{_prelude::*, cache::QueryKey};

/// Why the session was ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
	/// A `401` arrived while no refresh token was held.
	RefreshTokenMissing,
	/// The refresh endpoint failed or returned an unusable payload.
	RefreshFailed,
}
impl LogoutReason {
	/// Returns a stable label suitable for logs and UI copy lookups.
	pub const fn as_str(self) -> &'static str {
		match self {
			LogoutReason::RefreshTokenMissing => "No refresh token available",
			LogoutReason::RefreshFailed => "Token refresh failed",
		}
	}
}
impl Display for LogoutReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Notifications broadcast by the client stack.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
	/// Tokens were cleared after an irrecoverable authentication failure.
	Logout {
		/// Cause of the logout.
		reason: LogoutReason,
	},
	/// A cached query transitioned into the error state.
	QueryError {
		/// Key of the failing query.
		key: QueryKey,
		/// Normalized failure.
		error: ApiError,
	},
	/// A mutation failed after its retries.
	MutationError {
		/// Normalized failure.
		error: ApiError,
	},
}
impl ClientEvent {
	/// Returns the event channel name.
	pub const fn name(&self) -> &'static str {
		match self {
			ClientEvent::Logout { .. } => "auth:logout",
			ClientEvent::QueryError { .. } => "api:query-error",
			ClientEvent::MutationError { .. } => "api:mutation-error",
		}
	}
}

/// Cloneable publisher/subscriber handle.
#[derive(Clone, Debug)]
pub struct EventBus(Sender<ClientEvent>);
impl EventBus {
	/// Default number of buffered events per subscriber.
	pub const DEFAULT_CAPACITY: usize = 64;

	/// Creates a bus that buffers up to `capacity` events per lagging subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));

		Self(sender)
	}

	/// Registers a new subscriber that observes events published from now on.
	pub fn subscribe(&self) -> Receiver<ClientEvent> {
		self.0.subscribe()
	}

	/// Publishes `event`, returning how many subscribers received it.
	///
	/// Publishing without subscribers is not an error; the event is dropped.
	pub fn publish(&self, event: ClientEvent) -> usize {
		crate::obs::log_event(&event);

		self.0.send(event).unwrap_or(0)
	}

	/// Number of live subscribers.
	pub fn receiver_count(&self) -> usize {
		self.0.receiver_count()
	}
}
impl Default for EventBus {
	fn default() -> Self {
		Self::new(Self::DEFAULT_CAPACITY)
	}
}
