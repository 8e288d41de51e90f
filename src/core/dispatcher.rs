use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Method, StatusCode};
use serde_json::Value;

use crate::auth::cookies::parse_token_from_cookie_header;
use crate::auth::AuthHeaderStrategy;
use crate::config::UpstreamConfig;
use crate::core::path::{resolve_template, strip_template_params};
use crate::core::request::{InboundRequest, IDEMPOTENCY_KEY_HEADER};
use crate::core::route::RouteSpec;
use crate::error::{ConfigError, ProxyError, ReasonCode};

/// Fully resolved outbound request
///
/// Derived deterministically from a route spec and an inbound request;
/// never mutated once built.
#[derive(Debug, Clone)]
pub struct OutboundRequestConfig {
    /// Resolved HTTP method
    pub method: Method,

    /// Full target URL
    pub url: String,

    /// Headers to send, auth included
    pub headers: HeaderMap,

    /// Query parameters (GET only)
    pub query: Vec<(String, String)>,

    /// JSON body (POST/PUT/PATCH only)
    pub body: Option<Value>,

    /// Per-call timeout
    pub timeout: Duration,
}

impl OutboundRequestConfig {
    /// Replace the Authorization header with a bearer credential.
    ///
    /// Used by the retry layer when replaying with a refreshed token.
    pub fn with_bearer(mut self, token: &str) -> Self {
        if let Ok(value) = format!("Bearer {}", token).parse() {
            self.headers.insert(hyper::header::AUTHORIZATION, value);
        }
        self
    }
}

/// Raw response from the upstream gateway
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Parse the body as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Transport seam for outbound upstream calls
///
/// The production transport speaks HTTP via reqwest; tests substitute
/// their own. A transport error means no usable response was received;
/// error-status responses come back as `Ok`.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn send(&self, request: &OutboundRequestConfig) -> Result<UpstreamResponse, ProxyError>;
}

/// HTTP transport backed by a shared reqwest client
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the transport from upstream configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("http client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamTransport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequestConfig) -> Result<UpstreamResponse, ProxyError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport_error(e, &request.url))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::InternalUnexpected {
                context: format!("reading upstream body from {}: {}", request.url, e),
            })?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Classify a reqwest failure into the typed taxonomy.
fn classify_transport_error(error: reqwest::Error, url: &str) -> ProxyError {
    if error.is_timeout() {
        ProxyError::Timeout {
            path: url.to_string(),
        }
    } else {
        // No response was received at all.
        ProxyError::BackendConnectionFailed {
            path: url.to_string(),
            detail: error.to_string(),
        }
    }
}

/// Builds and issues exactly one outbound call per inbound request
///
/// Retry policy does not live here; the interceptor layer owns it.
pub struct RequestDispatcher {
    transport: Arc<dyn UpstreamTransport>,
    strategy: AuthHeaderStrategy,
    upstream: UpstreamConfig,
}

impl RequestDispatcher {
    /// Create a new dispatcher
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        strategy: AuthHeaderStrategy,
        upstream: UpstreamConfig,
    ) -> Self {
        Self {
            transport,
            strategy,
            upstream,
        }
    }

    /// Derive the outbound request for a route spec and inbound request.
    pub fn build_outbound(
        &self,
        spec: &RouteSpec,
        inbound: &InboundRequest,
        params: &HashMap<String, String>,
    ) -> Result<OutboundRequestConfig, ProxyError> {
        let resolved_path = resolve_template(&spec.target_template, params);
        let url = format!("{}{}", self.upstream.gateway_base_url, resolved_path);

        let session_token = inbound
            .cookie_header()
            .as_deref()
            .and_then(parse_token_from_cookie_header);

        let mut headers = self.strategy.headers_for(
            spec.auth_required,
            spec.auth_mode,
            inbound.authorization().as_deref(),
            session_token.as_deref(),
        )?;

        // Key generation is the caller's job; the proxy only forwards.
        if spec.include_idempotency {
            if let Some(key) = inbound.idempotency_key() {
                if let Ok(value) = key.parse() {
                    headers.insert(IDEMPOTENCY_KEY_HEADER, value);
                }
            }
        }

        let is_body_method = spec.method == Method::POST
            || spec.method == Method::PUT
            || spec.method == Method::PATCH;

        let (query, body) = if spec.method == Method::GET {
            (
                strip_template_params(&inbound.query, &spec.target_template),
                None,
            )
        } else if is_body_method {
            headers.insert(
                CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("application/json"),
            );

            let parsed = if inbound.body.is_empty() {
                None
            } else {
                let value: Value = serde_json::from_slice(&inbound.body).map_err(|_| {
                    ProxyError::ValidationFailed {
                        message: "request body must be valid JSON".to_string(),
                        errors: Vec::new(),
                    }
                })?;
                Some(value)
            };

            let transformed = match (&spec.request_transform, parsed) {
                (Some(transform), Some(value)) => Some(transform(value)),
                (_, value) => value,
            };

            (Vec::new(), transformed)
        } else {
            // DELETE and anything else carries no body.
            (Vec::new(), None)
        };

        Ok(OutboundRequestConfig {
            method: spec.method.clone(),
            url,
            headers,
            query,
            body,
            timeout: self.upstream.timeout_for(spec.timeout_tier),
        })
    }

    /// Issue the outbound call and map error statuses into the taxonomy.
    ///
    /// Returns `Ok` only for 2xx responses.
    pub async fn dispatch(
        &self,
        spec: &RouteSpec,
        inbound: &InboundRequest,
        params: &HashMap<String, String>,
    ) -> Result<UpstreamResponse, ProxyError> {
        let outbound = self.build_outbound(spec, inbound, params)?;

        tracing::debug!(
            "dispatching {} {} (request {})",
            outbound.method,
            outbound.url,
            inbound.request_id
        );

        let response = self.transport.send(&outbound).await?;

        if !response.status.is_success() {
            let status = response.status.as_u16();
            return Err(ProxyError::GatewayReturnedError {
                status,
                reason: ReasonCode::from_upstream_status(status),
                body: response.json(),
            });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use hyper::header::{HeaderValue, AUTHORIZATION};

    use crate::config::TimeoutTier;
    use crate::core::route::RouteSpec;

    /// Transport that records requests and replays canned responses.
    struct FakeTransport {
        seen: Mutex<Vec<OutboundRequestConfig>>,
        status: StatusCode,
        body: &'static str,
    }

    impl FakeTransport {
        fn replying(status: StatusCode, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                status,
                body,
            })
        }
    }

    #[async_trait]
    impl UpstreamTransport for FakeTransport {
        async fn send(
            &self,
            request: &OutboundRequestConfig,
        ) -> Result<UpstreamResponse, ProxyError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(UpstreamResponse {
                status: self.status,
                headers: HeaderMap::new(),
                body: Bytes::from(self.body),
            })
        }
    }

    fn upstream_config() -> UpstreamConfig {
        UpstreamConfig {
            gateway_base_url: "http://gateway.internal".to_string(),
            ..UpstreamConfig::default()
        }
    }

    fn dispatcher(transport: Arc<dyn UpstreamTransport>) -> RequestDispatcher {
        RequestDispatcher::new(
            transport,
            AuthHeaderStrategy::new(Some("svc:sekrit".to_string())),
            upstream_config(),
        )
    }

    fn inbound(method: Method, query: Vec<(String, String)>, body: &str) -> InboundRequest {
        InboundRequest::new(
            method,
            "/api/members/42".to_string(),
            query,
            HeaderMap::new(),
            Bytes::from(body.to_string()),
        )
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_get_forwards_query_minus_template_params() {
        let dispatcher = dispatcher(FakeTransport::replying(StatusCode::OK, "{}"));
        let spec = RouteSpec::new(Method::GET, "/members/:id");
        let request = inbound(
            Method::GET,
            vec![
                ("id".to_string(), "42".to_string()),
                ("sort".to_string(), "asc".to_string()),
            ],
            "",
        );

        let outbound = dispatcher
            .build_outbound(&spec, &request, &params(&[("id", "42")]))
            .unwrap();

        assert_eq!(outbound.url, "http://gateway.internal/members/42");
        assert_eq!(outbound.query, vec![("sort".to_string(), "asc".to_string())]);
        assert!(outbound.body.is_none());
    }

    #[test]
    fn test_post_forwards_json_body_with_content_type() {
        let dispatcher = dispatcher(FakeTransport::replying(StatusCode::OK, "{}"));
        let spec = RouteSpec::new(Method::POST, "/auth/login");
        let request = inbound(Method::POST, Vec::new(), r#"{"email":"ada@example.com"}"#);

        let outbound = dispatcher
            .build_outbound(&spec, &request, &params(&[]))
            .unwrap();

        assert_eq!(
            outbound.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            outbound.body.unwrap(),
            serde_json::json!({"email": "ada@example.com"})
        );
        assert!(outbound.query.is_empty());
    }

    #[test]
    fn test_post_applies_request_transform() {
        let dispatcher = dispatcher(FakeTransport::replying(StatusCode::OK, "{}"));
        let spec = RouteSpec::new(Method::POST, "/auth/register").with_request_transform(
            Arc::new(|mut value| {
                value["source"] = Value::String("web".to_string());
                value
            }),
        );
        let request = inbound(Method::POST, Vec::new(), r#"{"email":"a@b.c"}"#);

        let outbound = dispatcher
            .build_outbound(&spec, &request, &params(&[]))
            .unwrap();

        assert_eq!(outbound.body.unwrap()["source"], "web");
    }

    #[test]
    fn test_invalid_json_body_rejected() {
        let dispatcher = dispatcher(FakeTransport::replying(StatusCode::OK, "{}"));
        let spec = RouteSpec::new(Method::POST, "/auth/login");
        let request = inbound(Method::POST, Vec::new(), "not-json");

        let err = dispatcher
            .build_outbound(&spec, &request, &params(&[]))
            .unwrap_err();
        assert!(matches!(err, ProxyError::ValidationFailed { .. }));
    }

    #[test]
    fn test_delete_has_no_body() {
        let dispatcher = dispatcher(FakeTransport::replying(StatusCode::NO_CONTENT, ""));
        let spec = RouteSpec::new(Method::DELETE, "/carts/:id");
        let request = inbound(Method::DELETE, Vec::new(), "ignored");

        let outbound = dispatcher
            .build_outbound(&spec, &request, &params(&[("id", "7")]))
            .unwrap();

        assert!(outbound.body.is_none());
        assert_eq!(outbound.url, "http://gateway.internal/carts/7");
    }

    #[test]
    fn test_idempotency_key_forwarded_only_when_declared() {
        let dispatcher = dispatcher(FakeTransport::replying(StatusCode::OK, "{}"));

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-idempotency-key",
            HeaderValue::from_static("session-1-abc"),
        );
        let request = InboundRequest::new(
            Method::POST,
            "/api/login".to_string(),
            Vec::new(),
            headers,
            Bytes::from("{}"),
        );

        let with_key = RouteSpec::new(Method::POST, "/auth/login").with_idempotency();
        let outbound = dispatcher
            .build_outbound(&with_key, &request, &params(&[]))
            .unwrap();
        assert_eq!(
            outbound.headers.get(IDEMPOTENCY_KEY_HEADER).unwrap(),
            "session-1-abc"
        );

        let without_key = RouteSpec::new(Method::POST, "/auth/login");
        let outbound = dispatcher
            .build_outbound(&without_key, &request, &params(&[]))
            .unwrap();
        assert!(outbound.headers.get(IDEMPOTENCY_KEY_HEADER).is_none());
    }

    #[test]
    fn test_bearer_auth_header_from_cookie() {
        let dispatcher = dispatcher(FakeTransport::replying(StatusCode::OK, "{}"));
        let spec = RouteSpec::new(Method::GET, "/members/me").with_auth(crate::auth::AuthMode::Bearer);

        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("access_token=cookie-tok"));
        let request = InboundRequest::new(
            Method::GET,
            "/api/members/me".to_string(),
            Vec::new(),
            headers,
            Bytes::new(),
        );

        let outbound = dispatcher
            .build_outbound(&spec, &request, &params(&[]))
            .unwrap();
        assert_eq!(
            outbound.headers.get(AUTHORIZATION).unwrap(),
            "Bearer cookie-tok"
        );
    }

    #[test]
    fn test_timeout_tier_selection() {
        let dispatcher = dispatcher(FakeTransport::replying(StatusCode::OK, "{}"));
        let request = inbound(Method::GET, Vec::new(), "");

        let auth_spec =
            RouteSpec::new(Method::GET, "/auth/me").with_timeout_tier(TimeoutTier::Auth);
        let outbound = dispatcher
            .build_outbound(&auth_spec, &request, &params(&[]))
            .unwrap();
        assert_eq!(outbound.timeout, Duration::from_secs(5));

        let general_spec = RouteSpec::new(Method::GET, "/members");
        let outbound = dispatcher
            .build_outbound(&general_spec, &request, &params(&[]))
            .unwrap();
        assert_eq!(outbound.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_dispatch_maps_error_status() {
        let transport = FakeTransport::replying(StatusCode::CONFLICT, r#"{"detail":"exists"}"#);
        let dispatcher = dispatcher(transport.clone());
        let spec = RouteSpec::new(Method::POST, "/members");
        let request = inbound(Method::POST, Vec::new(), "{}");

        let err = dispatcher
            .dispatch(&spec, &request, &params(&[]))
            .await
            .unwrap_err();

        match err {
            ProxyError::GatewayReturnedError {
                status,
                reason,
                body,
            } => {
                assert_eq!(status, 409);
                assert_eq!(reason, ReasonCode::DuplicateResource);
                assert_eq!(body.unwrap()["detail"], "exists");
            }
            other => panic!("expected GatewayReturnedError, got {:?}", other),
        }

        // Exactly one outbound call; the dispatcher never retries.
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_passes_success_through() {
        let transport = FakeTransport::replying(StatusCode::OK, r#"{"name":"ada"}"#);
        let dispatcher = dispatcher(transport.clone());
        let spec = RouteSpec::new(Method::GET, "/members/:id");
        let request = inbound(Method::GET, Vec::new(), "");

        let response = dispatcher
            .dispatch(&spec, &request, &params(&[("id", "42")]))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json().unwrap()["name"], "ada");
    }
}
