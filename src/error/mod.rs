use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Stable reason codes surfaced to clients in the error body.
///
/// Clients branch on these codes, never on message prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    MethodNotAllowed,
    ValidationError,
    InvalidCredentials,
    ResourceNotFound,
    DuplicateResource,
    ServiceUnavailable,
    BackendUnreachable,
    GatewayTimeout,
    InternalError,
}

impl ReasonCode {
    /// The kebab-case wire form of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::MethodNotAllowed => "method-not-allowed",
            ReasonCode::ValidationError => "validation-error",
            ReasonCode::InvalidCredentials => "invalid-credentials",
            ReasonCode::ResourceNotFound => "resource-not-found",
            ReasonCode::DuplicateResource => "duplicate-resource",
            ReasonCode::ServiceUnavailable => "service-unavailable",
            ReasonCode::BackendUnreachable => "backend-unreachable",
            ReasonCode::GatewayTimeout => "gateway-timeout",
            ReasonCode::InternalError => "internal-error",
        }
    }

    /// Map an upstream error status to the stable reason code.
    pub fn from_upstream_status(status: u16) -> Self {
        match status {
            401 => ReasonCode::InvalidCredentials,
            404 => ReasonCode::ResourceNotFound,
            409 => ReasonCode::DuplicateResource,
            400..=499 => ReasonCode::ValidationError,
            _ => ReasonCode::ServiceUnavailable,
        }
    }
}

/// Proxy error types
///
/// Every failure on the request path is translated into exactly one of
/// these variants at the handler boundary; nothing above the handler sees
/// a raw transport error.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("method {method} not allowed")]
    MethodNotAllowed {
        /// The inbound method that failed to match.
        method: String,

        /// Methods declared for this path, for the Allow header.
        allowed: Vec<String>,
    },

    #[error("request validation failed: {message}")]
    ValidationFailed {
        message: String,

        /// Per-field reasons from the validator.
        errors: Vec<String>,
    },

    #[error("could not reach upstream gateway for {path}: {detail}")]
    BackendConnectionFailed {
        /// Target path of the failed call.
        path: String,

        /// Underlying transport message.
        detail: String,
    },

    #[error("upstream gateway returned {status}")]
    GatewayReturnedError {
        /// Upstream status, preserved as the outward status.
        status: u16,

        reason: ReasonCode,

        /// Upstream body, when it parsed as JSON.
        body: Option<serde_json::Value>,
    },

    #[error("upstream request to {path} timed out")]
    Timeout { path: String },

    #[error("internal error: {context}")]
    InternalUnexpected {
        /// Original cause, logged server-side and never sent to clients.
        context: String,
    },
}

/// Client-facing JSON error body with a stable shape.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ReasonCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// HTTP status code mapping for proxy errors
impl ProxyError {
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::MethodNotAllowed { .. } => 405,
            ProxyError::ValidationFailed { .. } => 400,
            ProxyError::BackendConnectionFailed { .. } => 502,
            ProxyError::GatewayReturnedError { status, .. } => *status,
            ProxyError::Timeout { .. } => 504,
            ProxyError::InternalUnexpected { .. } => 500,
        }
    }

    pub fn reason(&self) -> ReasonCode {
        match self {
            ProxyError::MethodNotAllowed { .. } => ReasonCode::MethodNotAllowed,
            ProxyError::ValidationFailed { .. } => ReasonCode::ValidationError,
            ProxyError::BackendConnectionFailed { .. } => ReasonCode::BackendUnreachable,
            ProxyError::GatewayReturnedError { reason, .. } => *reason,
            ProxyError::Timeout { .. } => ReasonCode::GatewayTimeout,
            ProxyError::InternalUnexpected { .. } => ReasonCode::InternalError,
        }
    }

    /// Build the client-facing body for this error.
    ///
    /// The internal-error context never reaches the body; it is only logged.
    pub fn body(&self) -> ErrorBody {
        let (message, details) = match self {
            ProxyError::MethodNotAllowed { method, allowed } => (
                format!("method {} is not allowed for this path", method),
                Some(serde_json::json!({ "allowed": allowed })),
            ),
            ProxyError::ValidationFailed { message, errors } => (
                message.clone(),
                Some(serde_json::json!({ "errors": errors })),
            ),
            ProxyError::BackendConnectionFailed { path, detail } => (
                "the upstream gateway could not be reached".to_string(),
                Some(serde_json::json!({ "path": path, "detail": detail })),
            ),
            ProxyError::GatewayReturnedError { body, .. } => (
                "the upstream gateway rejected the request".to_string(),
                body.clone(),
            ),
            ProxyError::Timeout { path } => (
                "the upstream gateway did not respond in time".to_string(),
                Some(serde_json::json!({ "path": path })),
            ),
            ProxyError::InternalUnexpected { .. } => {
                ("an unexpected error occurred".to_string(), None)
            }
        };

        ErrorBody {
            code: self.reason(),
            message,
            details,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        if let ProxyError::InternalUnexpected { context } = &self {
            tracing::error!("internal error surfaced as 500: {}", context);
        }

        let status = hyper::StatusCode::from_u16(self.status_code())
            .unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (status, axum::Json(self.body())).into_response();

        // 405 responses must advertise the declared methods.
        if let ProxyError::MethodNotAllowed { allowed, .. } = &self {
            if let Ok(value) = allowed.join(", ").parse() {
                response.headers_mut().insert(hyper::header::ALLOW, value);
            }
        }

        response
    }
}

/// Configuration specific errors, raised at startup only
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    MissingValue(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}
