use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    Greeting,
    Help,
    ProvisionResource,
    StartResource,
    StopResource,
    RebootResource,
    TerminateResource,
    ListResources,
    ResourceStatus,
    CostQuery,
    Recommend,
    Diagnose,
    SupportRequest,
    Unknown,
}

impl IntentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Help => "help",
            Self::ProvisionResource => "provision_resource",
            Self::StartResource => "start_resource",
            Self::StopResource => "stop_resource",
            Self::RebootResource => "reboot_resource",
            Self::TerminateResource => "terminate_resource",
            Self::ListResources => "list_resources",
            Self::ResourceStatus => "resource_status",
            Self::CostQuery => "cost_query",
            Self::Recommend => "recommend",
            Self::Diagnose => "diagnose",
            Self::SupportRequest => "support_request",
            Self::Unknown => "unknown",
        }
    }

    /// Phrase used when asking the user to choose between intents.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Greeting => "say hello",
            Self::Help => "get help",
            Self::ProvisionResource => "provision a new workspace",
            Self::StartResource => "start a workspace",
            Self::StopResource => "stop a workspace",
            Self::RebootResource => "reboot a workspace",
            Self::TerminateResource => "terminate a workspace",
            Self::ListResources => "list your workspaces",
            Self::ResourceStatus => "check a workspace's status",
            Self::CostQuery => "review costs",
            Self::Recommend => "get a bundle recommendation",
            Self::Diagnose => "troubleshoot a workspace",
            Self::SupportRequest => "open a support ticket",
            Self::Unknown => "do something else",
        }
    }

    /// Intents that act on one specific workspace.
    pub fn is_resource_scoped(&self) -> bool {
        matches!(
            self,
            Self::StartResource
                | Self::StopResource
                | Self::RebootResource
                | Self::TerminateResource
                | Self::ResourceStatus
                | Self::Diagnose
        )
    }
}

impl fmt::Display for IntentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Entities = BTreeMap<String, Value>;

/// Request-scoped classification of one user message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecognizedIntent {
    pub intent: IntentTag,
    pub confidence: f64,
    pub entities: Entities,
    pub suggested_tool: Option<String>,
    pub ambiguous: bool,
    pub clarification: Option<String>,
}

impl RecognizedIntent {
    pub fn unknown(clarification: impl Into<String>) -> Self {
        Self {
            intent: IntentTag::Unknown,
            confidence: 0.0,
            entities: Entities::new(),
            suggested_tool: None,
            ambiguous: true,
            clarification: Some(clarification.into()),
        }
    }

    pub fn entity_str(&self, name: &str) -> Option<&str> {
        self.entities.get(name).and_then(Value::as_str)
    }
}
