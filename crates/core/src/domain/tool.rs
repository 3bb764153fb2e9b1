use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Rate-limit group a tool belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Provisioning,
    Management,
    Query,
    Diagnostics,
    Support,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 5] = [
        ToolCategory::Provisioning,
        ToolCategory::Management,
        ToolCategory::Query,
        ToolCategory::Diagnostics,
        ToolCategory::Support,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Management => "management",
            Self::Query => "query",
            Self::Diagnostics => "diagnostics",
            Self::Support => "support",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid tool category `{0}` (expected provisioning|management|query|diagnostics|support)")]
pub struct InvalidToolCategory(pub String);

impl FromStr for ToolCategory {
    type Err = InvalidToolCategory;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| InvalidToolCategory(value.to_string()))
    }
}

/// Capability advertisement consumed by the upstream language model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub category: ToolCategory,
    pub description: String,
    /// Audit resource type, e.g. `workspace`.
    pub resource_type: String,
    /// JSON Schema object describing accepted parameters.
    pub parameters: Value,
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("unknown tool: {tool}")]
    UnknownTool { tool: String },
    #[error("rate limit exceeded: {limit} calls per {window_secs}s, retry in {retry_after_secs}s")]
    RateLimitExceeded { limit: u32, window_secs: u64, retry_after_secs: u64 },
    #[error("confirmation required: {message}")]
    ConfirmationRequired { message: String },
    #[error("invalid parameters: {message}")]
    Validation { message: String },
    #[error("execution failed: {message}")]
    ExecutionFailure { message: String },
    #[error("execution timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "unknown_tool",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::ConfirmationRequired { .. } => "confirmation_required",
            Self::Validation { .. } => "validation",
            Self::ExecutionFailure { .. } => "execution_failure",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Outcome of a single dispatch.
///
/// A failed result carries `error`; a successful one carries `payload`.
/// `requires_confirmation` is only ever set on failed results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub success: bool,
    pub payload: Option<Value>,
    pub error: Option<DispatchError>,
    pub requires_confirmation: bool,
    pub confirmation_message: Option<String>,
}

impl ToolInvocationResult {
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
            requires_confirmation: false,
            confirmation_message: None,
        }
    }

    pub fn failed(error: DispatchError) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error),
            requires_confirmation: false,
            confirmation_message: None,
        }
    }

    pub fn needs_confirmation(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            payload: None,
            error: Some(DispatchError::ConfirmationRequired { message: message.clone() }),
            requires_confirmation: true,
            confirmation_message: Some(message),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::failed(DispatchError::Validation { message: message.into() })
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn outcome_label(&self) -> &'static str {
        match (&self.error, self.success) {
            (_, true) => "success",
            (Some(error), false) => error.kind(),
            (None, false) => "failed",
        }
    }
}

/// `true` only when the caller passed the literal boolean `confirmed: true`.
pub fn is_confirmed(params: &Value) -> bool {
    params.get("confirmed").and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{is_confirmed, DispatchError, ToolCategory, ToolInvocationResult};

    #[test]
    fn confirmation_result_never_reports_success() {
        let result = ToolInvocationResult::needs_confirmation("this cannot be undone");
        assert!(!result.success);
        assert!(result.requires_confirmation);
        assert_eq!(result.outcome_label(), "confirmation_required");
        assert_eq!(result.confirmation_message.as_deref(), Some("this cannot be undone"));
    }

    #[test]
    fn only_literal_true_confirms() {
        assert!(is_confirmed(&json!({ "confirmed": true })));
        assert!(!is_confirmed(&json!({ "confirmed": "true" })));
        assert!(!is_confirmed(&json!({ "confirmed": false })));
        assert!(!is_confirmed(&json!({})));
    }

    #[test]
    fn category_parse_rejects_unknown_values() {
        assert_eq!("Query".parse::<ToolCategory>(), Ok(ToolCategory::Query));
        let error = "billing".parse::<ToolCategory>().expect_err("billing is not a category");
        assert!(error.to_string().contains("billing"));
    }

    #[test]
    fn rate_limit_error_text_carries_window_details() {
        let error =
            DispatchError::RateLimitExceeded { limit: 5, window_secs: 3600, retry_after_secs: 42 };
        assert_eq!(
            error.to_string(),
            "rate limit exceeded: 5 calls per 3600s, retry in 42s"
        );
        assert_eq!(error.kind(), "rate_limit_exceeded");
    }
}
