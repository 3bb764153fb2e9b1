//! Core types and shared-state services for the workdesk assistant.
//!
//! Everything here is transport-agnostic: conversation state, sliding-window
//! quotas, the audit seam, configuration and the backend traits the stateful
//! services are built on.

pub mod audit;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod rate_limit;
pub mod store;

pub use audit::{AuditOutcome, AuditRecord, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation::{ConversationError, ConversationStore};
pub use domain::conversation::{ConversationSession, Message, MessageRole};
pub use domain::intent::{Entities, IntentTag, RecognizedIntent};
pub use domain::tool::{DispatchError, ToolCategory, ToolDescriptor, ToolInvocationResult};
pub use domain::workspace::{BundleType, WorkspaceId};
pub use errors::{ApplicationError, InterfaceError};
pub use rate_limit::{CategoryLimit, RateLimitDecision, RateLimiter};
pub use store::{InMemoryStore, KeyValueStore, StoreError, StoreKey, WindowStore};

pub use chrono;
