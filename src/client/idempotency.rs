use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::error::ProxyError;

/// Fire-and-forget observer for mutation outcomes
///
/// Typically a UI notification surface. Sinks must never influence
/// control flow; the mutation result is returned regardless.
pub trait NotificationSink: Send + Sync {
    fn on_success(&self) {}
    fn on_error(&self, _error: &ProxyError) {}
}

/// Sink that ignores everything
#[derive(Debug, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {}

/// Generates and scopes deduplication keys for one client session
///
/// One instance per mutation call-site. The in-progress guard is a plain
/// per-instance flag: two browser tabs sharing a session each hold their
/// own instance and can run concurrently; only calls on the same instance
/// are single-flight.
pub struct IdempotencyKeyManager {
    session_key: String,
    in_progress: AtomicBool,
    active_key: Mutex<Option<String>>,
    sink: Box<dyn NotificationSink>,
}

impl IdempotencyKeyManager {
    /// Create a manager, minting its session-scoped key
    pub fn new() -> Self {
        Self::with_sink(Box::new(NoopSink))
    }

    /// Create a manager that reports outcomes to the given sink
    pub fn with_sink(sink: Box<dyn NotificationSink>) -> Self {
        Self {
            session_key: scoped_key("session"),
            in_progress: AtomicBool::new(false),
            active_key: Mutex::new(None),
            sink,
        }
    }

    /// The session-scoped key, stable for this manager's lifetime.
    ///
    /// Retries of the same logical user action reuse it, so they collapse
    /// to one upstream effect.
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Mint a fresh per-call key; the session key is untouched.
    pub fn generate_key(&self) -> String {
        scoped_key("request")
    }

    /// Whether a mutation is currently executing on this instance
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// The key of the in-flight mutation, if any
    pub fn active_key(&self) -> Option<String> {
        self.active_key.lock().ok().and_then(|guard| guard.clone())
    }

    /// Run a mutation under the single-flight guard.
    ///
    /// A second call while one is executing fails immediately; the guard
    /// clears on every exit path, including cancellation.
    pub async fn execute<V, T, E, F, Fut>(
        &self,
        variables: V,
        use_session_key: bool,
        mutation: F,
    ) -> Result<T, ProxyError>
    where
        E: Into<ProxyError>,
        F: FnOnce(V, String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ProxyError::ValidationFailed {
                message: "request already in progress".to_string(),
                errors: Vec::new(),
            });
        }

        let _guard = InProgressGuard {
            flag: &self.in_progress,
            active_key: &self.active_key,
        };

        let key = if use_session_key {
            self.session_key.clone()
        } else {
            self.generate_key()
        };

        if let Ok(mut active) = self.active_key.lock() {
            *active = Some(key.clone());
        }

        let result = mutation(variables, key).await.map_err(Into::into);

        match &result {
            Ok(_) => self.sink.on_success(),
            Err(error) => self.sink.on_error(error),
        }

        result
    }
}

impl Default for IdempotencyKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the in-progress state on drop, whatever the outcome.
struct InProgressGuard<'a> {
    flag: &'a AtomicBool,
    active_key: &'a Mutex<Option<String>>,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active_key.lock() {
            *active = None;
        }
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn scoped_key(scope: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    format!("{}-{}-{}", scope, millis, Uuid::new_v4())
}
