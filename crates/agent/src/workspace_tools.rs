//! Built-in workspace tools backed by a [`WorkspaceProvider`].

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use workdesk_core::domain::tool::{
    is_confirmed, ToolCategory, ToolDescriptor, ToolInvocationResult,
};
use workdesk_core::domain::workspace::BundleType;

use crate::confirmation::{REBOOT_WARNING, TERMINATE_WARNING};
use crate::intent::{recommend_bundles, requirements_from_value};
use crate::provider::{ProviderAction, WorkspaceProvider};
use crate::tools::{RegistryError, Tool, ToolRegistry};

const RESOURCE_TYPE: &str = "workspace";
const DEFAULT_TIME_PERIOD: &str = "current_month";
const TICKET_SUBJECT_LIMIT: usize = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkspaceToolKind {
    Provision,
    Start,
    Stop,
    Reboot,
    Terminate,
    List,
    Status,
    CostSummary,
    Recommend,
    Diagnose,
    SupportTicket,
}

impl WorkspaceToolKind {
    pub const ALL: [WorkspaceToolKind; 11] = [
        Self::Provision,
        Self::Start,
        Self::Stop,
        Self::Reboot,
        Self::Terminate,
        Self::List,
        Self::Status,
        Self::CostSummary,
        Self::Recommend,
        Self::Diagnose,
        Self::SupportTicket,
    ];

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Provision => "provision_workspace",
            Self::Start => "start_workspace",
            Self::Stop => "stop_workspace",
            Self::Reboot => "reboot_workspace",
            Self::Terminate => "terminate_workspace",
            Self::List => "list_workspaces",
            Self::Status => "get_workspace_status",
            Self::CostSummary => "get_cost_summary",
            Self::Recommend => "recommend_bundle",
            Self::Diagnose => "diagnose_workspace",
            Self::SupportTicket => "create_support_ticket",
        }
    }

    pub fn category(&self) -> ToolCategory {
        match self {
            Self::Provision => ToolCategory::Provisioning,
            Self::Start | Self::Stop | Self::Reboot | Self::Terminate => ToolCategory::Management,
            Self::List | Self::Status | Self::CostSummary | Self::Recommend => ToolCategory::Query,
            Self::Diagnose => ToolCategory::Diagnostics,
            Self::SupportTicket => ToolCategory::Support,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Provision => "Provision a new workspace with the given bundle type.",
            Self::Start => "Start a stopped workspace.",
            Self::Stop => "Stop a running workspace.",
            Self::Reboot => "Reboot a workspace. Requires confirmation.",
            Self::Terminate => "Permanently terminate a workspace. Requires confirmation.",
            Self::List => "List the caller's workspaces.",
            Self::Status => "Report the current state of a workspace.",
            Self::CostSummary => "Summarize workspace spend for a time period.",
            Self::Recommend => "Recommend up to three bundle types for a workload.",
            Self::Diagnose => "Run health and connectivity checks on a workspace.",
            Self::SupportTicket => "Open a support ticket.",
        }
    }

    fn parameters(&self) -> Value {
        let workspace_id = json!({
            "type": "string",
            "pattern": "^ws-[a-z0-9]+$",
            "description": "Workspace identifier, e.g. ws-abc123",
        });
        let confirmed = json!({
            "type": "boolean",
            "description": "Must be true to carry out this irreversible action",
        });
        let tags = json!({ "type": "string" });

        match self {
            Self::Provision => json!({
                "type": "object",
                "properties": {
                    "bundle_type": {
                        "type": "string",
                        "enum": BundleType::ALL.iter().map(BundleType::as_str).collect::<Vec<_>>(),
                    },
                    "team": tags,
                    "project": tags,
                },
                "required": ["bundle_type"],
            }),
            Self::Start | Self::Stop | Self::Status | Self::Diagnose => json!({
                "type": "object",
                "properties": { "workspace_id": workspace_id },
                "required": ["workspace_id"],
            }),
            Self::Reboot | Self::Terminate => json!({
                "type": "object",
                "properties": { "workspace_id": workspace_id, "confirmed": confirmed },
                "required": ["workspace_id"],
            }),
            Self::List => json!({ "type": "object", "properties": {} }),
            Self::CostSummary => json!({
                "type": "object",
                "properties": {
                    "time_period": {
                        "type": "string",
                        "description": "current_month, last_month, current_week, ...",
                    },
                    "team": tags,
                    "project": tags,
                },
            }),
            Self::Recommend => json!({
                "type": "object",
                "properties": {
                    "requirements": {
                        "type": "object",
                        "properties": {
                            "gpu": { "type": "boolean" },
                            "ml": { "type": "boolean" },
                            "intensity": { "type": "string", "enum": ["low", "medium", "high"] },
                            "use_case": {
                                "type": "string",
                                "enum": ["development", "design", "office", "data_analysis"],
                            },
                        },
                    },
                },
            }),
            Self::SupportTicket => json!({
                "type": "object",
                "properties": {
                    "description": { "type": "string" },
                    "subject": { "type": "string" },
                    "workspace_id": workspace_id,
                },
                "required": ["description"],
            }),
        }
    }
}

pub struct WorkspaceTool {
    kind: WorkspaceToolKind,
    provider: Arc<dyn WorkspaceProvider>,
}

impl WorkspaceTool {
    pub fn new(kind: WorkspaceToolKind, provider: Arc<dyn WorkspaceProvider>) -> Self {
        Self { kind, provider }
    }

    pub fn kind(&self) -> WorkspaceToolKind {
        self.kind
    }

    fn action(&self, user_id: &str, params: &Value) -> Result<ProviderAction, String> {
        let action = match self.kind {
            WorkspaceToolKind::Provision => {
                let raw = required_str(params, "bundle_type")?;
                let bundle = BundleType::from_str(raw).map_err(|error| error.to_string())?;
                ProviderAction::Provision {
                    user_id: user_id.to_string(),
                    bundle_type: bundle.as_str().to_string(),
                    team: optional_str(params, "team"),
                    project: optional_str(params, "project"),
                }
            }
            WorkspaceToolKind::Start => {
                ProviderAction::Start { workspace_id: workspace_id(params)? }
            }
            WorkspaceToolKind::Stop => ProviderAction::Stop { workspace_id: workspace_id(params)? },
            WorkspaceToolKind::Reboot => {
                ProviderAction::Reboot { workspace_id: workspace_id(params)? }
            }
            WorkspaceToolKind::Terminate => {
                ProviderAction::Terminate { workspace_id: workspace_id(params)? }
            }
            WorkspaceToolKind::Status => {
                ProviderAction::Describe { workspace_id: workspace_id(params)? }
            }
            WorkspaceToolKind::Diagnose => {
                ProviderAction::Diagnose { workspace_id: workspace_id(params)? }
            }
            WorkspaceToolKind::List => ProviderAction::List { user_id: user_id.to_string() },
            WorkspaceToolKind::CostSummary => ProviderAction::CostSummary {
                user_id: user_id.to_string(),
                time_period: optional_str(params, "time_period")
                    .unwrap_or_else(|| DEFAULT_TIME_PERIOD.to_string()),
                team: optional_str(params, "team"),
                project: optional_str(params, "project"),
            },
            WorkspaceToolKind::SupportTicket => {
                let description = required_str(params, "description")?.to_string();
                let subject = optional_str(params, "subject")
                    .unwrap_or_else(|| description.chars().take(TICKET_SUBJECT_LIMIT).collect());
                let workspace_id = match params.get("workspace_id") {
                    Some(_) => Some(workspace_id(params)?),
                    None => None,
                };
                ProviderAction::OpenTicket {
                    user_id: user_id.to_string(),
                    subject,
                    description,
                    workspace_id,
                }
            }
            WorkspaceToolKind::Recommend => {
                return Err("recommend_bundle does not call the provider".to_string())
            }
        };
        Ok(action)
    }
}

#[async_trait]
impl Tool for WorkspaceTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.kind.tool_name().to_string(),
            category: self.kind.category(),
            description: self.kind.description().to_string(),
            resource_type: RESOURCE_TYPE.to_string(),
            parameters: self.kind.parameters(),
        }
    }

    async fn execute(&self, user_id: &str, params: Value) -> Result<ToolInvocationResult> {
        if self.kind == WorkspaceToolKind::Recommend {
            let requirements = requirements_from_value(params.get("requirements"));
            let bundles = recommend_bundles(&requirements);
            return Ok(ToolInvocationResult::ok(json!({
                "recommendations": bundles.iter().map(BundleType::as_str).collect::<Vec<_>>(),
                "requirements": requirements.to_value(),
            })));
        }

        let action = match self.action(user_id, &params) {
            Ok(action) => action,
            Err(message) => return Ok(ToolInvocationResult::validation(message)),
        };

        match self.kind {
            WorkspaceToolKind::Terminate if !is_confirmed(&params) => {
                return Ok(ToolInvocationResult::needs_confirmation(TERMINATE_WARNING));
            }
            WorkspaceToolKind::Reboot if !is_confirmed(&params) => {
                return Ok(ToolInvocationResult::needs_confirmation(REBOOT_WARNING));
            }
            _ => {}
        }

        let payload = self.provider.call(action).await?;
        Ok(ToolInvocationResult::ok(payload))
    }
}

pub fn builtin_tools(provider: Arc<dyn WorkspaceProvider>) -> Vec<WorkspaceTool> {
    WorkspaceToolKind::ALL
        .into_iter()
        .map(|kind| WorkspaceTool::new(kind, Arc::clone(&provider)))
        .collect()
}

pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    provider: Arc<dyn WorkspaceProvider>,
) -> Result<(), RegistryError> {
    for tool in builtin_tools(provider) {
        registry.register(tool)?;
    }
    Ok(())
}

fn required_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, String> {
    match params.get(field) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.trim()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(format!("`{field}` is required"))
        }
        Some(_) => Err(format!("`{field}` must be a string")),
    }
}

fn optional_str(params: &Value, field: &str) -> Option<String> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn workspace_id(params: &Value) -> Result<String, String> {
    let raw = required_str(params, "workspace_id")?.to_ascii_lowercase();
    let valid = raw
        .strip_prefix("ws-")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()));
    if !valid {
        return Err(format!("`workspace_id` must look like ws-abc123, got `{raw}`"));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use workdesk_core::domain::tool::{DispatchError, ToolCategory};

    use super::{builtin_tools, WorkspaceTool, WorkspaceToolKind};
    use crate::provider::DryRunProvider;
    use crate::tools::{Tool, ToolRegistry};

    fn tool(kind: WorkspaceToolKind) -> (WorkspaceTool, DryRunProvider) {
        let provider = DryRunProvider::default();
        (WorkspaceTool::new(kind, Arc::new(provider.clone())), provider)
    }

    #[tokio::test]
    async fn terminate_without_confirmation_never_calls_provider() {
        let (terminate, provider) = tool(WorkspaceToolKind::Terminate);

        let result =
            terminate.execute("u1", json!({ "workspace_id": "ws-1" })).await.expect("execute");
        assert!(result.requires_confirmation);
        assert!(!result.success);
        assert_eq!(provider.call_count("terminate"), 0);

        let confirmed = terminate
            .execute("u1", json!({ "workspace_id": "ws-1", "confirmed": true }))
            .await
            .expect("execute");
        assert!(confirmed.success);
        assert_eq!(provider.call_count("terminate"), 1);
    }

    #[tokio::test]
    async fn missing_workspace_id_is_a_validation_result() {
        let (start, provider) = tool(WorkspaceToolKind::Start);
        let result = start.execute("u1", json!({})).await.expect("execute");

        assert!(matches!(
            result.error,
            Some(DispatchError::Validation { ref message }) if message.contains("workspace_id")
        ));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_workspace_id_is_rejected() {
        let (stop, _provider) = tool(WorkspaceToolKind::Stop);
        let result = stop.execute("u1", json!({ "workspace_id": "i-12345" })).await.expect("execute");
        assert_eq!(result.outcome_label(), "validation");
    }

    #[tokio::test]
    async fn provision_normalizes_bundle_type() {
        let (provision, provider) = tool(WorkspaceToolKind::Provision);
        let result = provision
            .execute("u1", json!({ "bundle_type": "power pro", "team": "platform" }))
            .await
            .expect("execute");

        assert!(result.success);
        let payload = result.payload.expect("payload");
        assert_eq!(payload["bundle_type"], json!("POWERPRO"));
        assert_eq!(provider.call_count("provision"), 1);
    }

    #[tokio::test]
    async fn provision_rejects_unknown_bundle() {
        let (provision, provider) = tool(WorkspaceToolKind::Provision);
        let result =
            provision.execute("u1", json!({ "bundle_type": "MEGA" })).await.expect("execute");
        assert_eq!(result.outcome_label(), "validation");
        assert_eq!(provider.call_count("provision"), 0);
    }

    #[tokio::test]
    async fn recommend_is_answered_locally() {
        let (recommend, provider) = tool(WorkspaceToolKind::Recommend);
        let result = recommend
            .execute("u1", json!({ "requirements": { "gpu": true } }))
            .await
            .expect("execute");

        assert_eq!(
            result.payload.expect("payload")["recommendations"],
            json!(["GRAPHICSPRO", "GRAPHICS"])
        );
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn support_ticket_defaults_subject_from_description() {
        let (ticket, provider) = tool(WorkspaceToolKind::SupportTicket);
        let result = ticket
            .execute("u1", json!({ "description": "My workspace keeps disconnecting" }))
            .await
            .expect("execute");
        assert!(result.success);
        assert_eq!(provider.call_count("open_ticket"), 1);
    }

    #[test]
    fn builtin_set_registers_cleanly_with_expected_categories() {
        let mut registry = ToolRegistry::default();
        for tool in builtin_tools(Arc::new(DryRunProvider::default())) {
            registry.register(tool).expect("unique names");
        }
        assert_eq!(registry.len(), WorkspaceToolKind::ALL.len());

        let category = |name: &str| registry.get(name).map(|entry| entry.descriptor.category);
        assert_eq!(category("provision_workspace"), Some(ToolCategory::Provisioning));
        assert_eq!(category("terminate_workspace"), Some(ToolCategory::Management));
        assert_eq!(category("get_cost_summary"), Some(ToolCategory::Query));
        assert_eq!(category("diagnose_workspace"), Some(ToolCategory::Diagnostics));
        assert_eq!(category("create_support_ticket"), Some(ToolCategory::Support));
    }
}
