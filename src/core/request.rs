use std::time::SystemTime;

use bytes::Bytes;
use hyper::{HeaderMap, Method};

/// Header carrying a caller-generated deduplication key for mutations.
pub const IDEMPOTENCY_KEY_HEADER: &str = "X-Idempotency-Key";

/// Header forwarding a pre-existing session token alongside a Basic exchange.
pub const PREVIOUS_TOKEN_HEADER: &str = "X-Previous-Token";

/// Represents one inbound request to the proxy
///
/// Created per HTTP call and discarded after the response is sent; the
/// proxy keeps no state between requests.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// HTTP method
    pub method: Method,

    /// Request path
    pub path: String,

    /// Decoded query parameters, in order of appearance
    pub query: Vec<(String, String)>,

    /// HTTP headers
    pub headers: HeaderMap,

    /// Request body
    pub body: Bytes,

    /// Request timestamp
    pub timestamp: SystemTime,

    /// Request ID for tracing
    pub request_id: String,
}

impl InboundRequest {
    /// Create a new InboundRequest
    pub fn new(
        method: Method,
        path: String,
        query: Vec<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            path,
            query,
            headers,
            body,
            timestamp: SystemTime::now(),
            request_id: generate_request_id(),
        }
    }

    /// Get a header value as a string
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    /// The inbound Authorization header, verbatim
    pub fn authorization(&self) -> Option<String> {
        self.header("Authorization")
    }

    /// The raw Cookie header
    pub fn cookie_header(&self) -> Option<String> {
        self.header("Cookie")
    }

    /// The caller-supplied idempotency key, if any
    pub fn idempotency_key(&self) -> Option<String> {
        self.header(IDEMPOTENCY_KEY_HEADER)
    }
}

/// Parse a raw query string into decoded name/value pairs.
///
/// Pairs that fail to decode are dropped rather than failing the request.
pub fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    raw.split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (name, value) = part.split_once('=').unwrap_or((part, ""));
            let name = urlencoding::decode(name).ok()?.into_owned();
            let value = urlencoding::decode(value).ok()?.into_owned();
            Some((name, value))
        })
        .collect()
}

/// Generate a unique request ID
fn generate_request_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::UNIX_EPOCH;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    format!("{:x}-{:x}", timestamp, counter)
}
