use serde_json::Value;

use crate::core::dispatcher::UpstreamResponse;
use crate::core::response::ProxyResponse;
use crate::core::route::RouteSpec;

/// Field names removed from client-facing bodies, matched exactly at any
/// depth.
const SENSITIVE_FIELDS: &[&str] = &[
    "access_token",
    "accessToken",
    "refresh_token",
    "refreshToken",
    "password",
    "secret",
    "client_secret",
    "clientSecret",
    "api_key",
    "apiKey",
];

/// Recursively remove sensitive fields from a JSON value.
///
/// Removal is by exact key-name match against the denylist; all other
/// keys and values pass through unchanged.
pub fn strip_sensitive_fields(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !SENSITIVE_FIELDS.contains(&key.as_str()))
                .map(|(key, nested)| (key, strip_sensitive_fields(nested)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(strip_sensitive_fields).collect())
        }
        other => other,
    }
}

/// Post-process a successful upstream response.
///
/// Applies the route's response transform, invokes the cookie setter with
/// both the original and the transformed body (cookie issuance may need
/// token data the client-facing body no longer carries), and replies with
/// the upstream's status. Callers route non-2xx responses to the error
/// translator instead of here.
pub fn apply(spec: &RouteSpec, response: &UpstreamResponse) -> ProxyResponse {
    let Some(original) = response.json() else {
        // Not JSON: forward the raw body untouched.
        return ProxyResponse::new(
            response.status,
            response.headers.clone(),
            response.body.clone(),
        );
    };

    let transformed = match &spec.response_transform {
        Some(transform) => transform(original.clone()),
        None => original.clone(),
    };

    let cookies = spec
        .cookie_setter
        .as_ref()
        .map(|setter| setter(&original, &transformed))
        .unwrap_or_default();

    ProxyResponse::json(response.status, &transformed).with_cookies(cookies)
}
