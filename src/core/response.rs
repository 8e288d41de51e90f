use axum::response::IntoResponse;
use bytes::Bytes;
use hyper::{header, HeaderMap, StatusCode};

use crate::auth::cookies::CookieDirective;

/// Represents a response leaving the proxy
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    /// HTTP status code
    pub status: StatusCode,

    /// HTTP headers
    pub headers: HeaderMap,

    /// Response body
    pub body: Bytes,

    /// Cookies to issue with this response
    pub cookies: Vec<CookieDirective>,
}

impl ProxyResponse {
    /// Create a new ProxyResponse
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            cookies: Vec::new(),
        }
    }

    /// Create a JSON response from a serialized value
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        Self::new(status, headers, Bytes::from(body.to_string()))
    }

    /// Attach a cookie directive to this response
    pub fn with_cookie(mut self, cookie: CookieDirective) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Attach several cookie directives to this response
    pub fn with_cookies(mut self, cookies: Vec<CookieDirective>) -> Self {
        self.cookies.extend(cookies);
        self
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> axum::response::Response {
        let mut headers = self.headers;

        for cookie in &self.cookies {
            if let Ok(value) = cookie.to_header_value().parse() {
                headers.append(header::SET_COOKIE, value);
            }
        }

        (self.status, headers, self.body).into_response()
    }
}
