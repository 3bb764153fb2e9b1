use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use workdesk_core::domain::tool::{ToolDescriptor, ToolInvocationResult};

#[async_trait]
pub trait Tool: Send + Sync {
    fn describe(&self) -> ToolDescriptor;

    /// Runs the tool. Parameter problems come back as a validation result;
    /// `Err` is reserved for failures of the underlying action.
    async fn execute(&self, user_id: &str, params: Value) -> Result<ToolInvocationResult>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    DuplicateName(String),
    #[error("tool names must not be empty")]
    EmptyName,
}

/// A registered tool together with the descriptor captured at registration.
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub tool: Arc<dyn Tool>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T) -> Result<(), RegistryError>
    where
        T: Tool + 'static,
    {
        self.register_shared(Arc::new(tool))
    }

    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let descriptor = tool.describe();
        if descriptor.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.tools.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateName(descriptor.name));
        }

        self.tools.insert(descriptor.name.clone(), RegisteredTool { descriptor, tool });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Every descriptor, sorted by tool name.
    pub fn schemas(&self) -> Vec<ToolDescriptor> {
        let mut descriptors =
            self.tools.values().map(|entry| entry.descriptor.clone()).collect::<Vec<_>>();
        descriptors.sort_by(|left, right| left.name.cmp(&right.name));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use workdesk_core::domain::tool::{ToolCategory, ToolDescriptor, ToolInvocationResult};

    use super::{RegistryError, Tool, ToolRegistry};

    struct NamedTool(&'static str, ToolCategory);

    #[async_trait]
    impl Tool for NamedTool {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: self.0.to_string(),
                category: self.1,
                description: "test tool".to_string(),
                resource_type: "workspace".to_string(),
                parameters: json!({ "type": "object" }),
            }
        }

        async fn execute(&self, _user_id: &str, params: Value) -> Result<ToolInvocationResult> {
            Ok(ToolInvocationResult::ok(params))
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::default();
        registry.register(NamedTool("list_workspaces", ToolCategory::Query)).expect("first");

        let error = registry
            .register(NamedTool("list_workspaces", ToolCategory::Management))
            .expect_err("duplicate");
        assert_eq!(error, RegistryError::DuplicateName("list_workspaces".to_string()));
        // the original category survives
        assert_eq!(
            registry.get("list_workspaces").map(|entry| entry.descriptor.category),
            Some(ToolCategory::Query)
        );
    }

    #[test]
    fn schemas_are_sorted_by_name() {
        let mut registry = ToolRegistry::default();
        for name in ["stop_workspace", "create_support_ticket", "list_workspaces"] {
            registry.register(NamedTool(name, ToolCategory::Query)).expect("register");
        }

        let names =
            registry.schemas().into_iter().map(|descriptor| descriptor.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["create_support_ticket", "list_workspaces", "stop_workspace"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut registry = ToolRegistry::default();
        assert_eq!(
            registry.register(NamedTool("  ", ToolCategory::Support)),
            Err(RegistryError::EmptyName)
        );
        assert!(registry.is_empty());
    }
}
