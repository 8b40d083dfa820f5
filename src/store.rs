//! Token provider contract and the built-in in-memory implementation.
//!
//! The client never reaches for process-wide token state: every component that needs the current
//! access/refresh pair receives an `Arc<dyn TokenProvider>`, so tests can substitute fakes and
//! several clients can coexist in one process.

pub mod memory;

pub use memory::MemoryTokenStore;

// self
use crate::{_prelude::*, auth::AuthTokens};

/// Holder of the current access/refresh token pair.
pub trait TokenProvider
where
	Self: Send + Sync,
{
	/// Returns the current pair by value.
	fn get(&self) -> AuthTokens;

	/// Replaces the held pair. This is a full replace, not a merge: pass both halves if both
	/// should persist.
	fn set(&self, tokens: AuthTokens);

	/// Resets the held pair to empty.
	fn clear(&self);
}
impl Debug for dyn TokenProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let tokens = self.get();

		f.debug_struct("TokenProvider")
			.field("access_token_set", &tokens.access_token.is_some())
			.field("refresh_token_set", &tokens.refresh_token.is_some())
			.finish()
	}
}
