use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Query};
use axum::http::HeaderMap as AxumHeaderMap;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use hyper::Method;
use serde_json::{json, Value};

use storefront_bff::auth::{AuthHeaderStrategy, AuthMode};
use storefront_bff::client::{
    HttpTokenRefresher, InMemoryTokenStore, RetryingTransport, TokenStore,
};
use storefront_bff::config::TimeoutTier;
use storefront_bff::proxy::{self, ProxyServices};
use storefront_bff::routes::storefront_routes;
use storefront_bff::validate::PassAllValidator;
use storefront_bff::{
    InboundRequest, ProxyConfig, ReqwestTransport, RequestDispatcher, RouteSpec, UpstreamTransport,
};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Serve an axum app on an ephemeral port and return its address.
async fn spawn_app(app: AxumRouter) -> SocketAddr {
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
        .serve(app.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

/// Mock upstream gateway echoing what it received.
fn upstream_app() -> AxumRouter {
    AxumRouter::new()
        .route(
            "/auth/login",
            post(|headers: AxumHeaderMap, Json(body): Json<Value>| async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.to_string())
                };

                Json(json!({
                    "accessToken": "tok-1",
                    "refreshToken": "refresh-1",
                    "role": "member",
                    "expiresAt": unix_now() + 3600,
                    "receivedAuthorization": header("authorization"),
                    "receivedIdempotencyKey": header("x-idempotency-key"),
                    "receivedPreviousToken": header("x-previous-token"),
                    "echo": body,
                }))
            }),
        )
        .route(
            "/auth/register",
            post(|| async {
                (
                    axum::http::StatusCode::CONFLICT,
                    Json(json!({"detail": "member already exists"})),
                )
            }),
        )
        .route(
            "/members/:id",
            get(
                |Path(id): Path<String>, Query(query): Query<HashMap<String, String>>| async move {
                    Json(json!({
                        "id": id,
                        "query": query,
                        "password": "should-never-leave",
                    }))
                },
            ),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                Json(json!({"too": "late"}))
            }),
        )
}

/// Build a proxy bound to the given upstream and serve it.
async fn spawn_proxy(upstream_addr: SocketAddr) -> SocketAddr {
    let mut config = ProxyConfig::default();
    config.upstream.gateway_base_url = format!("http://{}", upstream_addr);
    config.upstream.basic_auth_secret = Some("svc:sekrit".to_string());
    config.upstream.auth_timeout_seconds = 1;

    let transport = Arc::new(ReqwestTransport::new(&config.upstream).unwrap());
    let strategy = AuthHeaderStrategy::new(config.upstream.basic_auth_secret.clone());
    let dispatcher = RequestDispatcher::new(transport, strategy, config.upstream.clone());

    let services = Arc::new(ProxyServices {
        dispatcher,
        validator: Arc::new(PassAllValidator),
    });

    let mut router = AxumRouter::new();
    for route_set in storefront_routes(&config).unwrap() {
        router = proxy::bind(router, route_set, services.clone()).unwrap();
    }

    spawn_app(router).await
}

#[tokio::test]
async fn login_flow_issues_cookies_and_strips_tokens() {
    let upstream = spawn_app(upstream_app()).await;
    let proxy = spawn_proxy(upstream).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/api/login", proxy))
        .header("X-Idempotency-Key", "session-1-abc")
        .header("Cookie", "access_token=guest-tok")
        .json(&json!({"email": "ada@example.com", "password": "pw"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let cookies: Vec<String> = response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
        .collect();

    let access = cookies
        .iter()
        .find(|c| c.starts_with("access_token="))
        .expect("access-token cookie missing");
    assert!(access.contains("tok-1"));
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("Max-Age="));

    let role = cookies
        .iter()
        .find(|c| c.starts_with("access_type="))
        .expect("role cookie missing");
    assert!(role.contains("member"));
    // Login-flow convenience cookie stays client-readable.
    assert!(!role.contains("HttpOnly"));
    assert!(role.contains("SameSite=Lax"));

    let body: Value = response.json().await.unwrap();

    // Tokens are stripped from the client-facing body.
    assert!(body.get("accessToken").is_none());
    assert!(body.get("refreshToken").is_none());

    // The upstream saw Basic service credentials, the forwarded
    // idempotency key, and the pre-existing session token.
    let authorization = body["receivedAuthorization"].as_str().unwrap();
    assert!(authorization.starts_with("Basic "));
    assert_eq!(body["receivedIdempotencyKey"], "session-1-abc");
    assert_eq!(body["receivedPreviousToken"], "guest-tok");
}

#[tokio::test]
async fn get_strips_consumed_path_params_from_query() {
    let upstream = spawn_app(upstream_app()).await;
    let proxy = spawn_proxy(upstream).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/api/members/42?sort=asc&id=42", proxy))
        .header("Cookie", "access_token=tok")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["id"], "42");
    assert_eq!(body["query"]["sort"], "asc");
    // The template consumed `id`; it must not reach the upstream query.
    assert!(body["query"].get("id").is_none());
    // Sensitive fields never leave the proxy.
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn undeclared_method_is_405_with_allow_header() {
    let upstream = spawn_app(upstream_app()).await;
    let proxy = spawn_proxy(upstream).await;

    let response = reqwest::Client::new()
        .delete(format!("http://{}/api/members/42", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
    assert_eq!(
        response.headers().get(reqwest::header::ALLOW).unwrap(),
        "GET, PUT"
    );

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "method-not-allowed");
}

#[tokio::test]
async fn upstream_conflict_maps_to_duplicate_resource() {
    let upstream = spawn_app(upstream_app()).await;
    let proxy = spawn_proxy(upstream).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/register", proxy))
        .json(&json!({"email": "ada@example.com", "password": "pw"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "duplicate-resource");
}

#[tokio::test]
async fn unreachable_upstream_maps_to_502() {
    // Point the proxy at a port nothing listens on.
    let dead_addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
    let proxy = spawn_proxy(dead_addr).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/api/members/42", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "backend-unreachable");
}

#[tokio::test]
async fn refresh_retry_replays_the_original_call() {
    // Upstream that rejects the first call and accepts the replay, plus
    // the auth service's refresh endpoint.
    let member_hits = Arc::new(AtomicU32::new(0));
    let refresh_hits = Arc::new(AtomicU32::new(0));

    let member_counter = member_hits.clone();
    let refresh_counter = refresh_hits.clone();

    let app = AxumRouter::new()
        .route(
            "/members/me",
            get(move |headers: AxumHeaderMap| {
                let hits = member_counter.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        return (
                            axum::http::StatusCode::UNAUTHORIZED,
                            Json(json!({"detail": "expired"})),
                        );
                    }

                    let authorization = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    (
                        axum::http::StatusCode::OK,
                        Json(json!({"name": "ada", "replayedWith": authorization})),
                    )
                }
            }),
        )
        .route(
            "/auth/refresh",
            post(move |Json(body): Json<Value>| {
                let hits = refresh_counter.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(body["refresh_token"], "refresh-old");
                    Json(json!({
                        "access_token": "access-new",
                        "refresh_token": "refresh-new",
                        "expires_in": 3600,
                        "token_type": "Bearer",
                    }))
                }
            }),
        );

    let addr = spawn_app(app).await;

    let mut config = ProxyConfig::default();
    config.upstream.gateway_base_url = format!("http://{}", addr);
    config.upstream.auth_base_url = format!("http://{}", addr);
    config.upstream.basic_auth_secret = Some("svc:sekrit".to_string());

    let store = Arc::new(InMemoryTokenStore::with_pair(
        storefront_bff::auth::TokenPair {
            access_token: "access-old".to_string(),
            refresh_token: "refresh-old".to_string(),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
        },
    ));

    let transport: Arc<dyn UpstreamTransport> = Arc::new(RetryingTransport::new(
        Arc::new(ReqwestTransport::new(&config.upstream).unwrap()),
        Arc::new(HttpTokenRefresher::new(&config.upstream).unwrap()),
        store.clone(),
    ));

    let dispatcher = RequestDispatcher::new(
        transport,
        AuthHeaderStrategy::new(config.upstream.basic_auth_secret.clone()),
        config.upstream.clone(),
    );

    let spec = RouteSpec::new(Method::GET, "/members/me").with_auth(AuthMode::Bearer);
    let inbound = InboundRequest::new(
        Method::GET,
        "/api/members/me".to_string(),
        Vec::new(),
        {
            let mut headers = hyper::HeaderMap::new();
            headers.insert("cookie", "access_token=access-old".parse().unwrap());
            headers
        },
        bytes::Bytes::new(),
    );

    let response = dispatcher
        .dispatch(&spec, &inbound, &HashMap::new())
        .await
        .unwrap();

    // The caller receives the replay's success.
    let body = response.json().unwrap();
    assert_eq!(body["name"], "ada");
    assert_eq!(body["replayedWith"], "Bearer access-new");

    // Original endpoint hit exactly twice; refresh exactly once.
    assert_eq!(member_hits.load(Ordering::SeqCst), 2);
    assert_eq!(refresh_hits.load(Ordering::SeqCst), 1);

    // The refreshed pair was persisted for subsequent calls.
    assert_eq!(store.access_token().as_deref(), Some("access-new"));
}

#[tokio::test]
async fn slow_upstream_resolves_to_timeout() {
    let upstream = spawn_app(upstream_app()).await;

    let mut config = ProxyConfig::default();
    config.upstream.gateway_base_url = format!("http://{}", upstream);
    config.upstream.basic_auth_secret = Some("svc:sekrit".to_string());
    config.upstream.auth_timeout_seconds = 1;

    let dispatcher = RequestDispatcher::new(
        Arc::new(ReqwestTransport::new(&config.upstream).unwrap()),
        AuthHeaderStrategy::new(config.upstream.basic_auth_secret.clone()),
        config.upstream.clone(),
    );

    let spec = RouteSpec::new(Method::GET, "/slow").with_timeout_tier(TimeoutTier::Auth);
    let inbound = InboundRequest::new(
        Method::GET,
        "/api/slow".to_string(),
        Vec::new(),
        hyper::HeaderMap::new(),
        bytes::Bytes::new(),
    );

    let err = dispatcher
        .dispatch(&spec, &inbound, &HashMap::new())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 504);
}
