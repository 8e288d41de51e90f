use std::collections::HashMap;
use std::sync::Arc;

use axum::response::IntoResponse;
use hyper::Method;
use serde_json::Value;

use crate::core::dispatcher::RequestDispatcher;
use crate::core::request::{parse_query, InboundRequest};
use crate::core::response::ProxyResponse;
use crate::core::route::{PathPattern, RouteSet};
use crate::error::{ConfigError, ProxyError};
use crate::pipeline;
use crate::validate::RequestValidator;

/// Services the handlers depend on, constructed once at startup and
/// injected explicitly.
pub struct ProxyServices {
    pub dispatcher: RequestDispatcher,
    pub validator: Arc<dyn RequestValidator>,
}

/// Top-level entry point for one inbound path
///
/// Holds one route spec per declared method; a single-method endpoint is
/// simply a set of one. The handler is stateless across requests.
pub struct ProxyHandler {
    routes: RouteSet,
    pattern: PathPattern,
    services: Arc<ProxyServices>,
}

impl ProxyHandler {
    /// Create a handler for a route set
    pub fn new(routes: RouteSet, services: Arc<ProxyServices>) -> Result<Self, ConfigError> {
        let pattern = PathPattern::new(routes.path())?;

        Ok(Self {
            routes,
            pattern,
            services,
        })
    }

    /// The inbound path this handler is bound at
    pub fn path(&self) -> &str {
        self.routes.path()
    }

    /// Run the full flow: method match, validation, dispatch, pipeline.
    ///
    /// Every error leaving here is already one of the typed variants.
    pub async fn handle(&self, inbound: InboundRequest) -> Result<ProxyResponse, ProxyError> {
        // Method mismatch fails before anything is dispatched.
        let spec = self.routes.find(&inbound.method)?;

        let has_json_body = (spec.method == Method::POST
            || spec.method == Method::PUT
            || spec.method == Method::PATCH)
            && !inbound.body.is_empty();

        if has_json_body {
            let body: Value = serde_json::from_slice(&inbound.body).map_err(|_| {
                ProxyError::ValidationFailed {
                    message: "request body must be valid JSON".to_string(),
                    errors: Vec::new(),
                }
            })?;

            let outcome = self.services.validator.validate(&body);
            if !outcome.is_valid {
                return Err(ProxyError::ValidationFailed {
                    message: "request validation failed".to_string(),
                    errors: outcome.errors,
                });
            }
        }

        // Path parameters win over query parameters of the same name.
        let mut params = self
            .pattern
            .matches(&inbound.path)
            .unwrap_or_default();
        for (name, value) in &inbound.query {
            params
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }

        let response = self
            .services
            .dispatcher
            .dispatch(&spec, &inbound, &params)
            .await?;

        Ok(pipeline::apply(&spec, &response))
    }
}

/// Bind a route set into an axum router under its declared path.
pub fn bind(
    router: axum::Router,
    routes: RouteSet,
    services: Arc<ProxyServices>,
) -> Result<axum::Router, ConfigError> {
    let handler = Arc::new(ProxyHandler::new(routes, services)?);
    let path = handler.path().to_string();

    Ok(router.route(
        &path,
        axum::routing::any(move |request: hyper::Request<axum::body::Body>| {
            let handler = handler.clone();
            async move {
                let inbound = match into_inbound(request).await {
                    Ok(inbound) => inbound,
                    Err(error) => return error.into_response(),
                };

                let request_id = inbound.request_id.clone();
                match handler.handle(inbound).await {
                    Ok(response) => response.into_response(),
                    Err(error) => {
                        tracing::debug!(
                            "request {} failed with {}: {}",
                            request_id,
                            error.status_code(),
                            error
                        );
                        error.into_response()
                    }
                }
            }
        }),
    ))
}

/// Convert a raw hyper request into the inbound envelope.
async fn into_inbound(
    request: hyper::Request<axum::body::Body>,
) -> Result<InboundRequest, ProxyError> {
    let (parts, body) = request.into_parts();

    let body_bytes =
        hyper::body::to_bytes(body)
            .await
            .map_err(|e| ProxyError::InternalUnexpected {
                context: format!("failed to read request body: {}", e),
            })?;

    let query = parse_query(parts.uri.query());

    Ok(InboundRequest::new(
        parts.method,
        parts.uri.path().to_string(),
        query,
        parts.headers,
        body_bytes,
    ))
}
