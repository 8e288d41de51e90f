use std::sync::RwLock;

use crate::auth::claims::TokenPair;

/// Client-scoped persistence for the session's token pair
///
/// One store exists per client session; clearing it ends the session.
pub trait TokenStore: Send + Sync {
    /// The current access token, if a session is active
    fn access_token(&self) -> Option<String>;

    /// The current refresh token, if a session is active
    fn refresh_token(&self) -> Option<String>;

    /// Replace the stored pair
    fn store(&self, pair: TokenPair);

    /// Drop the stored pair entirely
    fn clear(&self);
}

/// In-memory store backing a single client session
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    pair: RwLock<Option<TokenPair>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with an existing pair
    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl TokenStore for InMemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.pair
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|p| p.access_token.clone()))
    }

    fn refresh_token(&self) -> Option<String> {
        self.pair
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|p| p.refresh_token.clone()))
    }

    fn store(&self, pair: TokenPair) {
        if let Ok(mut guard) = self.pair.write() {
            *guard = Some(pair);
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.pair.write() {
            *guard = None;
        }
    }
}
