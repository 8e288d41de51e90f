use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use crate::core::request::PREVIOUS_TOKEN_HEADER;
use crate::error::ProxyError;

/// Which credential a route attaches to its outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// User credential: inbound Authorization header or session cookie
    Bearer,

    /// Service credential: HTTP Basic from the server-held secret
    Basic,
}

/// Resolves the auth headers for one outbound request
#[derive(Debug, Clone)]
pub struct AuthHeaderStrategy {
    basic_auth_secret: Option<String>,
}

impl AuthHeaderStrategy {
    /// Create a strategy holding the service secret, if configured
    pub fn new(basic_auth_secret: Option<String>) -> Self {
        Self { basic_auth_secret }
    }

    /// Build the auth headers for an outbound request.
    ///
    /// `inbound_authorization` is the verbatim inbound Authorization header;
    /// `session_token` is the access token parsed from the inbound cookie.
    pub fn headers_for(
        &self,
        auth_required: bool,
        mode: AuthMode,
        inbound_authorization: Option<&str>,
        session_token: Option<&str>,
    ) -> Result<HeaderMap, ProxyError> {
        let mut headers = HeaderMap::new();

        if !auth_required {
            return Ok(headers);
        }

        match mode {
            AuthMode::Basic => {
                let secret = self
                    .basic_auth_secret
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ProxyError::InternalUnexpected {
                        context: "basic auth secret is not configured".to_string(),
                    })?;

                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    secret,
                );
                headers.insert(
                    AUTHORIZATION,
                    header_value(&format!("Basic {}", encoded))?,
                );

                // A pre-existing (e.g. guest) session rides along so the
                // upstream can replace it atomically with the new exchange.
                if let Some(token) = session_token {
                    headers.insert(PREVIOUS_TOKEN_HEADER, header_value(token)?);
                }
            }
            AuthMode::Bearer => {
                if let Some(authorization) = inbound_authorization {
                    headers.insert(AUTHORIZATION, header_value(authorization)?);
                } else if let Some(token) = session_token {
                    headers.insert(
                        AUTHORIZATION,
                        header_value(&format!("Bearer {}", token))?,
                    );
                }
                // Neither present: send nothing and let the upstream reject.
            }
        }

        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value).map_err(|_| ProxyError::InternalUnexpected {
        context: format!("credential value is not a valid header: {:?}", value),
    })
}
