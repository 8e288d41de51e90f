use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::StatusCode;

use crate::auth::claims::TokenPair;
use crate::client::token_store::TokenStore;
use crate::config::UpstreamConfig;
use crate::core::dispatcher::{OutboundRequestConfig, UpstreamResponse, UpstreamTransport};
use crate::error::{ConfigError, ProxyError};

/// Per-call retry marker, threaded explicitly through the retry loop.
///
/// Keeping this a value rather than mutable request state makes the
/// machine's decisions pure and testable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallAttempt {
    pub retried: bool,
}

/// What to do with one upstream response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the response to the caller untouched
    Surface,

    /// Refresh the session once and replay the original call
    RefreshAndReplay,
}

/// Decide how to handle a response status for the given attempt.
///
/// Only a 401 on a not-yet-retried call triggers a refresh; everything
/// else, success or failure, surfaces unchanged.
pub fn decide(status: StatusCode, attempt: CallAttempt) -> RetryDecision {
    if status == StatusCode::UNAUTHORIZED && !attempt.retried {
        RetryDecision::RefreshAndReplay
    } else {
        RetryDecision::Surface
    }
}

/// Seam for the single refresh call
///
/// Implementations must use a client instance that is not wrapped by
/// `RetryingTransport`; a refresh must never trigger another refresh.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ProxyError>;
}

/// HTTP refresher posting to the auth service's refresh endpoint
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    refresh_url: String,
    timeout: Duration,
}

impl HttpTokenRefresher {
    /// Build the refresher with its own unauthenticated client
    pub fn new(config: &UpstreamConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("refresh client: {}", e)))?;

        Ok(Self {
            client,
            refresh_url: config.refresh_url(),
            timeout: Duration::from_secs(config.auth_timeout_seconds),
        })
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ProxyError> {
        let response = self
            .client
            .post(&self.refresh_url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::Timeout {
                        path: self.refresh_url.clone(),
                    }
                } else {
                    ProxyError::BackendConnectionFailed {
                        path: self.refresh_url.clone(),
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(ProxyError::GatewayReturnedError {
                status,
                reason: crate::error::ReasonCode::from_upstream_status(status),
                body: None,
            });
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| ProxyError::InternalUnexpected {
                context: format!("refresh response did not parse: {}", e),
            })
    }
}

/// Transport decorator implementing the refresh-and-replay machine
///
/// Wraps every outbound authenticated call; a 401 gets exactly one refresh
/// attempt and one replay. Refresh failure clears the stored session and
/// surfaces the original 401; the caller owns re-authentication from
/// there.
pub struct RetryingTransport {
    inner: Arc<dyn UpstreamTransport>,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn TokenStore>,
}

impl RetryingTransport {
    /// Wrap a transport with the refresh-and-replay behavior
    pub fn new(
        inner: Arc<dyn UpstreamTransport>,
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            inner,
            refresher,
            store,
        }
    }
}

#[async_trait]
impl UpstreamTransport for RetryingTransport {
    async fn send(&self, request: &OutboundRequestConfig) -> Result<UpstreamResponse, ProxyError> {
        let mut attempt = CallAttempt::default();
        let mut current = request.clone();

        loop {
            let response = self.inner.send(&current).await?;

            match decide(response.status, attempt) {
                RetryDecision::Surface => return Ok(response),
                RetryDecision::RefreshAndReplay => {
                    let Some(refresh_token) = self.store.refresh_token() else {
                        tracing::debug!("401 with no stored session, surfacing");
                        self.store.clear();
                        return Ok(response);
                    };

                    match self.refresher.refresh(&refresh_token).await {
                        Ok(pair) => {
                            tracing::debug!("session refreshed, replaying original call");
                            self.store.store(pair.clone());
                            attempt.retried = true;
                            current = request.clone().with_bearer(&pair.access_token);
                        }
                        Err(error) => {
                            tracing::warn!("token refresh failed: {}", error);
                            self.store.clear();
                            // The original 401 surfaces, not the refresh error.
                            return Ok(response);
                        }
                    }
                }
            }
        }
    }
}
