use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Claims produced by the upstream auth service
///
/// Timestamps are unix seconds. The upstream emits camelCase field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Access token issued for this session
    pub access_token: String,

    /// Role granted to the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Issued at (as Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<u64>,

    /// Expiration time (as Unix timestamp)
    pub expires_at: u64,

    /// Subject identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TokenClaims {
    /// Check if the claims are expired at the given instant
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Token pair returned by the auth service's refresh endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token
    pub access_token: String,

    /// Refresh token
    pub refresh_token: String,

    /// Access token expiration time in seconds
    pub expires_in: u64,

    /// Token type (usually "Bearer")
    pub token_type: String,
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
