use std::sync::Arc;

use hyper::Method;

use crate::auth::claims::{unix_now, TokenClaims};
use crate::auth::cookies::{clear_auth_cookies, issue_auth_cookies, CookieVariant};
use crate::auth::AuthMode;
use crate::config::{ProxyConfig, TimeoutTier};
use crate::core::route::{CookieSetter, RouteSet, RouteSpec};
use crate::error::ConfigError;
use crate::pipeline::strip_sensitive_fields;

/// Cookie setter issuing session cookies from the pre-transform body.
///
/// The transformed body has already had its tokens stripped; only the
/// original still carries the claims.
fn session_cookie_setter(variant: CookieVariant, production: bool) -> CookieSetter {
    Arc::new(move |original, _transformed| {
        match serde_json::from_value::<TokenClaims>(original.clone()) {
            Ok(claims) => issue_auth_cookies(&claims, variant, production, unix_now()),
            // No claims in the upstream body; nothing to issue.
            Err(_) => Vec::new(),
        }
    })
}

/// The statically declared storefront endpoints.
///
/// Built once at startup; there is no runtime route registration.
pub fn storefront_routes(config: &ProxyConfig) -> Result<Vec<RouteSet>, ConfigError> {
    let production = config.production;

    let login = RouteSet::new("/api/login").route(
        RouteSpec::new(Method::POST, "/auth/login")
            .with_auth(AuthMode::Basic)
            .with_idempotency()
            .with_timeout_tier(TimeoutTier::Auth)
            .with_response_transform(Arc::new(strip_sensitive_fields))
            .with_cookie_setter(session_cookie_setter(CookieVariant::Login, production)),
    )?;

    let register = RouteSet::new("/api/register").route(
        RouteSpec::new(Method::POST, "/auth/register")
            .with_auth(AuthMode::Basic)
            .with_idempotency()
            .with_timeout_tier(TimeoutTier::Auth)
            .with_response_transform(Arc::new(strip_sensitive_fields))
            .with_cookie_setter(session_cookie_setter(CookieVariant::Strict, production)),
    )?;

    let logout = RouteSet::new("/api/logout").route(
        RouteSpec::new(Method::POST, "/auth/logout")
            .with_auth(AuthMode::Bearer)
            .with_timeout_tier(TimeoutTier::Auth)
            .with_cookie_setter(Arc::new(move |_original, _transformed| {
                clear_auth_cookies(production)
            })),
    )?;

    let member = RouteSet::new("/api/members/:id")
        .route(
            RouteSpec::new(Method::GET, "/members/:id")
                .with_auth(AuthMode::Bearer)
                .with_response_transform(Arc::new(strip_sensitive_fields)),
        )?
        .route(
            RouteSpec::new(Method::PUT, "/members/:id")
                .with_auth(AuthMode::Bearer)
                .with_idempotency()
                .with_response_transform(Arc::new(strip_sensitive_fields)),
        )?;

    let cart = RouteSet::new("/api/cart")
        .route(RouteSpec::new(Method::GET, "/cart/items").with_auth(AuthMode::Bearer))?
        .route(
            RouteSpec::new(Method::POST, "/cart/items")
                .with_auth(AuthMode::Bearer)
                .with_idempotency(),
        )?;

    let cart_item = RouteSet::new("/api/cart/items/:item_id").route(
        RouteSpec::new(Method::DELETE, "/cart/items/{{item_id}}")
            .with_auth(AuthMode::Bearer)
            .with_idempotency(),
    )?;

    Ok(vec![login, register, logout, member, cart, cart_item])
}
