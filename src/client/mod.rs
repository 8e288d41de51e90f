//! Caller-side companions to the proxy: the token-refresh retry wrapper
//! and the idempotency key manager. Both are scoped to one client session,
//! never shared across sessions.

pub mod idempotency;
pub mod retry;
pub mod token_store;

pub use idempotency::{IdempotencyKeyManager, NoopSink, NotificationSink};
pub use retry::{CallAttempt, HttpTokenRefresher, RetryDecision, RetryingTransport, TokenRefresher};
pub use token_store::{InMemoryTokenStore, TokenStore};
