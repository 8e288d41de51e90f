use crate::auth::claims::TokenClaims;

/// Cookie holding the session access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Cookie exposing the session role to the client.
pub const ROLE_COOKIE: &str = "access_type";

/// Lifetime margin subtracted so a cookie never outlives its token.
const MAX_AGE_SAFETY_MARGIN_SECONDS: i64 = 60;

/// SameSite cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
        }
    }
}

/// Which issuance variant a route wants.
///
/// `Strict` is the server-issued default; `Login` is the login-flow
/// convenience variant whose role cookie is client-readable and Lax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieVariant {
    Strict,
    Login,
}

/// One Set-Cookie directive, generated fresh per response
#[derive(Debug, Clone)]
pub struct CookieDirective {
    pub name: String,
    pub value: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: Option<i64>,
}

impl CookieDirective {
    /// Create a new directive with `Path=/` and Strict defaults
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            http_only: false,
            secure: false,
            same_site: SameSite::Strict,
            path: "/".to_string(),
            max_age: None,
        }
    }

    /// Set the HttpOnly flag
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set the Secure flag
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the SameSite attribute
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Set Max-Age
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Serialize to a Set-Cookie header value
    pub fn to_header_value(&self) -> String {
        let mut directive = format!(
            "{}={}; Path={}; SameSite={}",
            self.name,
            self.value,
            self.path,
            self.same_site.as_str()
        );

        if self.http_only {
            directive.push_str("; HttpOnly");
        }

        if self.secure {
            directive.push_str("; Secure");
        }

        if let Some(max_age) = self.max_age {
            directive.push_str(&format!("; Max-Age={}", max_age));
        }

        directive
    }
}

/// Compute the cookie max-age for a claim set.
///
/// Lifetime is `expires_at − now`, or `expires_at − issued_at` adjusted for
/// time already elapsed when `issued_at` is present, minus a one-minute
/// safety margin. A result ≤ 0 means the claims are already expired.
pub fn compute_max_age(claims: &TokenClaims, now: u64) -> i64 {
    let remaining = match claims.issued_at {
        Some(issued_at) => {
            let lifetime = claims.expires_at as i64 - issued_at as i64;
            let elapsed = now as i64 - issued_at as i64;
            lifetime - elapsed
        }
        None => claims.expires_at as i64 - now as i64,
    };

    remaining.max(0) - MAX_AGE_SAFETY_MARGIN_SECONDS
}

/// Build the auth cookies for a claim set.
///
/// Expired claims suppress the access-token cookie, but a present role
/// still yields a role cookie; callers of the legacy login flow depend on
/// that asymmetry, so it is kept as-is.
pub fn issue_auth_cookies(
    claims: &TokenClaims,
    variant: CookieVariant,
    production: bool,
    now: u64,
) -> Vec<CookieDirective> {
    let max_age = compute_max_age(claims, now);
    let mut cookies = Vec::new();

    if max_age > 0 {
        cookies.push(
            CookieDirective::new(ACCESS_TOKEN_COOKIE, claims.access_token.clone())
                .http_only(true)
                .secure(production)
                .same_site(SameSite::Strict)
                .max_age(max_age),
        );
    }

    if let Some(role) = &claims.role {
        let (http_only, same_site) = match variant {
            CookieVariant::Strict => (true, SameSite::Strict),
            CookieVariant::Login => (false, SameSite::Lax),
        };

        let mut cookie = CookieDirective::new(ROLE_COOKIE, role.clone())
            .http_only(http_only)
            .secure(production)
            .same_site(same_site);

        if max_age > 0 {
            cookie = cookie.max_age(max_age);
        }

        cookies.push(cookie);
    }

    cookies
}

/// Expire both auth cookies immediately.
pub fn clear_auth_cookies(production: bool) -> Vec<CookieDirective> {
    [ACCESS_TOKEN_COOKIE, ROLE_COOKIE]
        .iter()
        .map(|name| {
            CookieDirective::new(*name, "")
                .http_only(true)
                .secure(production)
                .same_site(SameSite::Strict)
                .max_age(0)
        })
        .collect()
}

/// Extract the access token from a raw Cookie header.
///
/// Splits on `;`, trims each entry, URL-decodes the value. Absent or
/// malformed input yields `None`; this never fails.
pub fn parse_token_from_cookie_header(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|entry| entry.strip_prefix(&format!("{}=", ACCESS_TOKEN_COOKIE)))
        .filter(|value| !value.is_empty())
        .and_then(|value| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}
