use std::collections::BTreeMap;

use serde_json::Value;
use workdesk_core::domain::tool::is_confirmed;

pub const TERMINATE_WARNING: &str = "Terminating a workspace permanently deletes it and all data \
     on its volumes. This cannot be undone. Re-send the request with confirmation to proceed.";
pub const REBOOT_WARNING: &str = "Rebooting a workspace disconnects the active session and \
     discards unsaved work. Re-send the request with confirmation to proceed.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Proceed,
    RequireConfirmation { message: String },
}

/// Stateless two-step gate for destructive tools.
///
/// A call is confirmed only when its own parameters carry `confirmed: true`;
/// nothing is remembered between calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationGate {
    warnings: BTreeMap<String, String>,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::empty()
            .with_destructive("terminate_workspace", TERMINATE_WARNING)
            .with_destructive("reboot_workspace", REBOOT_WARNING)
    }
}

impl ConfirmationGate {
    pub fn empty() -> Self {
        Self { warnings: BTreeMap::new() }
    }

    pub fn with_destructive(mut self, tool: impl Into<String>, warning: impl Into<String>) -> Self {
        self.warnings.insert(tool.into(), warning.into());
        self
    }

    pub fn is_destructive(&self, tool: &str) -> bool {
        self.warnings.contains_key(tool)
    }

    pub fn warning_for(&self, tool: &str) -> Option<&str> {
        self.warnings.get(tool).map(String::as_str)
    }

    pub fn evaluate(&self, tool: &str, params: &Value) -> ConfirmationDecision {
        match self.warnings.get(tool) {
            Some(message) if !is_confirmed(params) => {
                ConfirmationDecision::RequireConfirmation { message: message.clone() }
            }
            _ => ConfirmationDecision::Proceed,
        }
    }
}
