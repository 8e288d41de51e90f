use serde_json::Value;

/// Result of validating an inbound body
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    /// A passing outcome
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing outcome with per-field reasons
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

/// Validation collaborator invoked before dispatch
///
/// The rule catalog itself lives outside this crate; implementations are
/// pure functions over the body.
pub trait RequestValidator: Send + Sync {
    fn validate(&self, body: &Value) -> ValidationOutcome;
}

/// Default validator that accepts everything
#[derive(Debug, Default)]
pub struct PassAllValidator;

impl RequestValidator for PassAllValidator {
    fn validate(&self, _body: &Value) -> ValidationOutcome {
        ValidationOutcome::valid()
    }
}
