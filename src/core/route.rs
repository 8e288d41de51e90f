use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use hyper::Method;
use regex::Regex;
use serde_json::Value;

use crate::auth::cookies::CookieDirective;
use crate::auth::AuthMode;
use crate::config::TimeoutTier;
use crate::error::{ConfigError, ProxyError};

/// Transform applied to a JSON body before forwarding or after receiving.
pub type BodyTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Builds cookie directives from the original and transformed upstream
/// bodies. The original still contains token data the transformed body no
/// longer exposes.
pub type CookieSetter = Arc<dyn Fn(&Value, &Value) -> Vec<CookieDirective> + Send + Sync>;

/// Declaration of one proxied endpoint
///
/// Immutable once built; the routing table owns these for the process
/// lifetime.
#[derive(Clone)]
pub struct RouteSpec {
    /// HTTP method this spec serves
    pub method: Method,

    /// Upstream path template (`:name` and `{{name}}` placeholders)
    pub target_template: String,

    /// Whether authentication is required
    pub auth_required: bool,

    /// Which credential to attach when auth is required
    pub auth_mode: AuthMode,

    /// Whether to forward the caller's idempotency key
    pub include_idempotency: bool,

    /// Timeout tier for the outbound call
    pub timeout_tier: TimeoutTier,

    /// Transform applied to the inbound body before forwarding
    pub request_transform: Option<BodyTransform>,

    /// Transform applied to the upstream body before replying
    pub response_transform: Option<BodyTransform>,

    /// Cookie issuance callback
    pub cookie_setter: Option<CookieSetter>,
}

impl RouteSpec {
    /// Create a new route spec for a method and upstream template
    pub fn new(method: Method, target_template: impl Into<String>) -> Self {
        Self {
            method,
            target_template: target_template.into(),
            auth_required: false,
            auth_mode: AuthMode::Bearer,
            include_idempotency: false,
            timeout_tier: TimeoutTier::General,
            request_transform: None,
            response_transform: None,
            cookie_setter: None,
        }
    }

    /// Require authentication with the given mode
    pub fn with_auth(mut self, mode: AuthMode) -> Self {
        self.auth_required = true;
        self.auth_mode = mode;
        self
    }

    /// Forward the caller's idempotency key
    pub fn with_idempotency(mut self) -> Self {
        self.include_idempotency = true;
        self
    }

    /// Set the timeout tier
    pub fn with_timeout_tier(mut self, tier: TimeoutTier) -> Self {
        self.timeout_tier = tier;
        self
    }

    /// Set the request transform
    pub fn with_request_transform(mut self, transform: BodyTransform) -> Self {
        self.request_transform = Some(transform);
        self
    }

    /// Set the response transform
    pub fn with_response_transform(mut self, transform: BodyTransform) -> Self {
        self.response_transform = Some(transform);
        self
    }

    /// Set the cookie issuance callback
    pub fn with_cookie_setter(mut self, setter: CookieSetter) -> Self {
        self.cookie_setter = Some(setter);
        self
    }
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("method", &self.method)
            .field("target_template", &self.target_template)
            .field("auth_required", &self.auth_required)
            .field("auth_mode", &self.auth_mode)
            .field("include_idempotency", &self.include_idempotency)
            .field("timeout_tier", &self.timeout_tier)
            .finish()
    }
}

/// Compiled matcher for an inbound path declaration
///
/// `:name` segments capture one path segment each; everything else matches
/// literally.
#[derive(Debug, Clone)]
pub struct PathPattern {
    regex: Regex,
    param_names: Vec<String>,
}

impl PathPattern {
    /// Compile a pattern from an inbound path declaration
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let mut param_names = Vec::new();
        let mut regex_pattern = "^".to_string();

        for (i, part) in path.split('/').enumerate() {
            if i > 0 {
                regex_pattern.push('/');
            }

            if part.is_empty() {
                continue;
            }

            if let Some(param_name) = part.strip_prefix(':') {
                param_names.push(param_name.to_string());
                regex_pattern.push_str(r"([^/]+)");
            } else {
                regex_pattern.push_str(&regex::escape(part));
            }
        }

        regex_pattern.push('$');

        let regex = Regex::new(&regex_pattern).map_err(|e| {
            ConfigError::ValidationError(format!("invalid route pattern '{}': {}", path, e))
        })?;

        Ok(Self { regex, param_names })
    }

    /// Match a concrete path, extracting the declared parameters
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;

        let mut params = HashMap::new();
        for (i, name) in self.param_names.iter().enumerate() {
            if let Some(value) = captures.get(i + 1) {
                params.insert(name.clone(), value.as_str().to_string());
            }
        }

        Some(params)
    }
}

/// The route specs bound at one inbound path
///
/// A single-method proxy endpoint holds one spec; a multi-method endpoint
/// holds one per method.
#[derive(Debug, Clone)]
pub struct RouteSet {
    path: String,
    specs: Vec<Arc<RouteSpec>>,
}

impl RouteSet {
    /// Create an empty route set for an inbound path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            specs: Vec::new(),
        }
    }

    /// The inbound path this set is bound at
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Add a spec, rejecting a second spec for the same method
    pub fn route(mut self, spec: RouteSpec) -> Result<Self, ConfigError> {
        if self
            .specs
            .iter()
            .any(|existing| existing.method == spec.method)
        {
            return Err(ConfigError::ValidationError(format!(
                "route already declared for {} {}",
                spec.method, self.path
            )));
        }

        self.specs.push(Arc::new(spec));
        Ok(self)
    }

    /// Methods declared on this path, for the Allow header
    pub fn allowed_methods(&self) -> Vec<String> {
        self.specs
            .iter()
            .map(|spec| spec.method.as_str().to_string())
            .collect()
    }

    /// Find the spec matching the inbound method, case-insensitively.
    ///
    /// A miss is a method-not-allowed error carrying the declared methods.
    pub fn find(&self, method: &Method) -> Result<Arc<RouteSpec>, ProxyError> {
        self.specs
            .iter()
            .find(|spec| spec.method.as_str().eq_ignore_ascii_case(method.as_str()))
            .cloned()
            .ok_or_else(|| ProxyError::MethodNotAllowed {
                method: method.as_str().to_string(),
                allowed: self.allowed_methods(),
            })
    }
}
