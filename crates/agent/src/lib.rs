//! Conversational tool dispatch for workspace management.
//!
//! The agent follows a constrained loop:
//! 1. **Intent recognition** (`intent`) - ordered rule table over free text
//! 2. **Dispatch** (`dispatcher`) - rate limits, confirmation gate, bounded execution, audit
//! 3. **Tools** (`workspace_tools`) - workspace actions carried out by a `WorkspaceProvider`
//!
//! `AgentRuntime` (see `runtime`) ties these to the conversation store.
//!
//! Recognition never performs side effects. Destructive actions run only when
//! the request itself carries `confirmed: true`.

pub mod confirmation;
pub mod dispatcher;
pub mod intent;
pub mod provider;
pub mod runtime;
pub mod tools;
pub mod workspace_tools;

pub use confirmation::{ConfirmationDecision, ConfirmationGate};
pub use dispatcher::Dispatcher;
pub use intent::{recommend_bundles, BundleRequirements, IntentRecognizer};
pub use provider::{DryRunProvider, HttpWorkspaceProvider, ProviderAction, WorkspaceProvider};
pub use runtime::{AgentRuntime, TurnOutcome};
pub use tools::{RegistryError, Tool, ToolRegistry};
pub use workspace_tools::{builtin_tools, register_builtin_tools, WorkspaceTool, WorkspaceToolKind};
