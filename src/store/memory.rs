//! Thread-safe in-memory [`TokenProvider`] implementation.

// self
use crate::{_prelude::*, auth::AuthTokens, store::TokenProvider};

/// Token provider that keeps the pair in a single shared slot with no persistence.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenStore(Arc<RwLock<AuthTokens>>);
impl MemoryTokenStore {
	/// Creates a store pre-populated with `tokens`.
	pub fn with_tokens(tokens: AuthTokens) -> Self {
		Self(Arc::new(RwLock::new(tokens)))
	}
}
impl TokenProvider for MemoryTokenStore {
	fn get(&self) -> AuthTokens {
		self.0.read().clone()
	}

	fn set(&self, tokens: AuthTokens) {
		*self.0.write() = tokens;
	}

	fn clear(&self) {
		*self.0.write() = AuthTokens::default();
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn set_get_clear_round_trip() {
		let store = MemoryTokenStore::default();

		assert!(store.get().is_empty());

		store.set(AuthTokens::new("access-1", "refresh-1"));

		assert_eq!(store.get(), AuthTokens::new("access-1", "refresh-1"));

		store.clear();

		assert_eq!(store.get(), AuthTokens::default());
	}

	#[test]
	fn set_replaces_instead_of_merging() {
		let store = MemoryTokenStore::with_tokens(AuthTokens::new("access-1", "refresh-1"));

		store.set(AuthTokens::access_only("access-2"));

		let tokens = store.get();

		assert_eq!(tokens.access_token.as_ref().map(|secret| secret.expose()), Some("access-2"));
		assert!(tokens.refresh_token.is_none());
	}

	#[test]
	fn clones_share_the_same_slot() {
		let store = MemoryTokenStore::default();
		let provider: Arc<dyn TokenProvider> = Arc::new(store.clone());

		provider.set(AuthTokens::new("shared-access", "shared-refresh"));

		assert_eq!(store.get(), AuthTokens::new("shared-access", "shared-refresh"));
		assert!(format!("{provider:?}").contains("access_token_set: true"));
	}
}
