use std::sync::Arc;

use workdesk_agent::{register_builtin_tools, DryRunProvider, ToolRegistry};

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let mut registry = ToolRegistry::default();
    if let Err(error) = register_builtin_tools(&mut registry, Arc::new(DryRunProvider::default())) {
        return CommandResult::failure("tools", "registry", error.to_string(), 4);
    }

    let schemas = registry.schemas();
    CommandResult::success_with_data(
        "tools",
        format!("{} tools registered", schemas.len()),
        &schemas,
    )
}
