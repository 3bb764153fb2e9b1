//! Single entry point for running a named tool on behalf of a user.
//!
//! Every call to [`Dispatcher::dispatch`] returns a structured result and
//! writes exactly one audit record, whatever path the call takes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use workdesk_core::audit::{AuditOutcome, AuditRecord, AuditSink};
use workdesk_core::clock::Clock;
use workdesk_core::domain::tool::{
    DispatchError, ToolCategory, ToolDescriptor, ToolInvocationResult,
};
use workdesk_core::rate_limit::{
    default_category_limits, CategoryLimit, QuotaSlot, RateLimiter, Reservation,
};

use crate::confirmation::{ConfirmationDecision, ConfirmationGate};
use crate::tools::{Tool, ToolRegistry};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const UNKNOWN_RESOURCE_TYPE: &str = "unknown";

pub struct Dispatcher {
    registry: ToolRegistry,
    rate_limiter: Arc<RateLimiter>,
    limits: BTreeMap<ToolCategory, CategoryLimit>,
    confirmation: ConfirmationGate,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    tool_timeout: Duration,
}

struct Attempt {
    result: ToolInvocationResult,
    resource_type: String,
    category: Option<ToolCategory>,
}

impl Dispatcher {
    pub fn new(
        registry: ToolRegistry,
        rate_limiter: Arc<RateLimiter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let clock = rate_limiter.clock();
        Self {
            registry,
            rate_limiter,
            limits: default_category_limits(),
            confirmation: ConfirmationGate::default(),
            audit,
            clock,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Replaces the per-category limits. Categories without an entry are unlimited.
    pub fn with_limits(mut self, limits: BTreeMap<ToolCategory, CategoryLimit>) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_confirmation_gate(mut self, confirmation: ConfirmationGate) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn schemas(&self) -> Vec<ToolDescriptor> {
        self.registry.schemas()
    }

    pub async fn dispatch(&self, tool: &str, user_id: &str, params: Value) -> ToolInvocationResult {
        self.dispatch_with_session(tool, user_id, params, None).await
    }

    pub async fn dispatch_with_session(
        &self,
        tool: &str,
        user_id: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> ToolInvocationResult {
        let attempt = self.attempt(tool, user_id, &params).await;

        if attempt.result.success {
            info!(
                event_name = "dispatch.tool.invoked",
                tool,
                user_id,
                category = attempt.category.map(|category| category.as_str()).unwrap_or("none"),
                "tool dispatched"
            );
        } else {
            warn!(
                event_name = "dispatch.tool.not_completed",
                tool,
                user_id,
                outcome = attempt.result.outcome_label(),
                error = attempt.result.error_message().as_deref().unwrap_or(""),
                "tool dispatch did not complete"
            );
        }

        self.write_audit(tool, user_id, &params, session_id, &attempt).await;
        attempt.result
    }

    async fn attempt(&self, tool: &str, user_id: &str, params: &Value) -> Attempt {
        let Some(entry) = self.registry.get(tool) else {
            return Attempt {
                result: ToolInvocationResult::failed(DispatchError::UnknownTool {
                    tool: tool.to_string(),
                }),
                resource_type: UNKNOWN_RESOURCE_TYPE.to_string(),
                category: None,
            };
        };

        let category = entry.descriptor.category;
        let resource_type = entry.descriptor.resource_type.clone();
        let finish = |result| Attempt {
            result,
            resource_type: resource_type.clone(),
            category: Some(category),
        };

        // the slot counts against the window while the call is in flight
        let mut slot = None;
        if let Some(limit) = self.limits.get(&category).copied() {
            match self.rate_limiter.reserve(user_id, category, limit.limit, limit.window()).await {
                Ok(Reservation::Granted(granted)) => slot = Some(granted),
                Ok(denied @ Reservation::Denied { .. }) => {
                    warn!(
                        event_name = "dispatch.rate_limited",
                        tool,
                        user_id,
                        category = category.as_str(),
                        limit = limit.limit,
                        "rate limit exceeded"
                    );
                    return finish(ToolInvocationResult::failed(
                        DispatchError::RateLimitExceeded {
                            limit: limit.limit,
                            window_secs: limit.window_secs,
                            retry_after_secs: denied.decision().retry_after_secs().unwrap_or(1),
                        },
                    ));
                }
                Err(error) => {
                    // quota state unknown, fail closed
                    return finish(ToolInvocationResult::failed(DispatchError::ExecutionFailure {
                        message: format!("rate limiter unavailable: {error}"),
                    }));
                }
            }
        }

        if let ConfirmationDecision::RequireConfirmation { message } =
            self.confirmation.evaluate(tool, params)
        {
            self.release(slot, tool, user_id).await;
            return finish(ToolInvocationResult::needs_confirmation(message));
        }

        let result = self.execute(entry.tool.clone(), user_id, params.clone()).await;
        if !result.success {
            self.release(slot, tool, user_id).await;
        }

        finish(result)
    }

    /// Gives back a quota slot held for a call that did not succeed.
    async fn release(&self, slot: Option<QuotaSlot>, tool: &str, user_id: &str) {
        let Some(slot) = slot else {
            return;
        };
        match self.rate_limiter.release(&slot).await {
            Ok(released) => debug!(
                event_name = "dispatch.quota_released",
                tool,
                user_id,
                released,
                "quota slot returned"
            ),
            Err(error) => warn!(
                event_name = "dispatch.quota_release_failed",
                tool,
                user_id,
                error = %error,
                "unsuccessful call still counts against quota"
            ),
        }
    }

    async fn execute(
        &self,
        tool: Arc<dyn Tool>,
        user_id: &str,
        params: Value,
    ) -> ToolInvocationResult {
        let user_id = user_id.to_string();
        let task = tokio::spawn(async move { tool.execute(&user_id, params).await });

        // an elapsed timeout drops the handle, which detaches the task without cancelling it
        match tokio::time::timeout(self.tool_timeout, task).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(error))) => ToolInvocationResult::failed(DispatchError::ExecutionFailure {
                message: format!("{error:#}"),
            }),
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    "tool panicked".to_string()
                } else {
                    join_error.to_string()
                };
                ToolInvocationResult::failed(DispatchError::ExecutionFailure { message })
            }
            Err(_) => ToolInvocationResult::failed(DispatchError::Timeout {
                after_ms: u64::try_from(self.tool_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn write_audit(
        &self,
        tool: &str,
        user_id: &str,
        params: &Value,
        session_id: Option<&str>,
        attempt: &Attempt,
    ) {
        let result = &attempt.result;
        let resource_id = params
            .get("workspace_id")
            .and_then(Value::as_str)
            .or_else(|| {
                result
                    .payload
                    .as_ref()
                    .and_then(|payload| payload.get("workspace_id"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string);

        let outcome = audit_outcome(result);
        let mut record = AuditRecord::new(
            user_id,
            tool,
            attempt.resource_type.clone(),
            outcome,
            self.clock.now(),
        )
            .with_resource_id(resource_id)
            .with_error(result.error_message())
            .with_conversation_id(session_id.map(str::to_string))
            .with_metadata("tool", tool)
            .with_metadata("parameters", params.to_string())
            .with_metadata("outcome", result.outcome_label());
        if let Some(category) = attempt.category {
            record = record.with_metadata("category", category.as_str());
        }

        if let Err(error) = self.audit.record(record).await {
            warn!(
                event_name = "dispatch.audit_failed",
                tool,
                user_id,
                error = %error,
                "audit sink rejected dispatch record"
            );
        }
    }
}

fn audit_outcome(result: &ToolInvocationResult) -> AuditOutcome {
    if result.success {
        return AuditOutcome::Success;
    }
    match result.error {
        Some(DispatchError::ExecutionFailure { .. }) | Some(DispatchError::Timeout { .. }) => {
            AuditOutcome::Failed
        }
        _ => AuditOutcome::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::json;
    use workdesk_core::audit::{AuditOutcome, InMemoryAuditSink};
    use workdesk_core::chrono::Duration as ChronoDuration;
    use workdesk_core::clock::{Clock, ManualClock};
    use workdesk_core::domain::tool::{DispatchError, ToolCategory};
    use workdesk_core::rate_limit::{CategoryLimit, RateLimiter};
    use workdesk_core::store::InMemoryStore;

    use super::Dispatcher;
    use crate::provider::DryRunProvider;
    use crate::tools::ToolRegistry;
    use crate::workspace_tools::register_builtin_tools;

    fn dispatcher() -> (Dispatcher, InMemoryAuditSink, DryRunProvider) {
        let (dispatcher, audit, provider, _clock) = dispatcher_with_clock();
        (dispatcher, audit, provider)
    }

    fn dispatcher_with_clock() -> (Dispatcher, InMemoryAuditSink, DryRunProvider, ManualClock) {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryStore::new(Arc::new(clock.clone())));
        let limiter = Arc::new(RateLimiter::new(store, Arc::new(clock.clone())));
        let provider = DryRunProvider::default();
        let mut registry = ToolRegistry::default();
        register_builtin_tools(&mut registry, Arc::new(provider.clone())).expect("register");
        let audit = InMemoryAuditSink::default();
        (Dispatcher::new(registry, limiter, Arc::new(audit.clone())), audit, provider, clock)
    }

    #[tokio::test]
    async fn unknown_tool_is_a_result_with_one_audit_record() {
        let (dispatcher, audit, _provider) = dispatcher();
        let result = dispatcher.dispatch("format_disk", "u1", json!({})).await;

        assert_eq!(
            result.error,
            Some(DispatchError::UnknownTool { tool: "format_disk".to_string() })
        );
        let records = audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Rejected);
        assert_eq!(records[0].resource_type, "unknown");
    }

    #[tokio::test]
    async fn session_id_and_workspace_land_in_the_audit_record() {
        let (dispatcher, audit, _provider) = dispatcher();
        let result = dispatcher
            .dispatch_with_session(
                "start_workspace",
                "u1",
                json!({ "workspace_id": "ws-9" }),
                Some("s1"),
            )
            .await;
        assert!(result.success);

        let records = audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].conversation_id.as_deref(), Some("s1"));
        assert_eq!(records[0].resource_id.as_deref(), Some("ws-9"));
        assert_eq!(records[0].metadata.get("outcome").map(String::as_str), Some("success"));
        assert_eq!(records[0].metadata.get("category").map(String::as_str), Some("management"));
    }

    #[tokio::test]
    async fn audit_records_are_stamped_by_the_injected_clock() {
        let (dispatcher, audit, _provider, clock) = dispatcher_with_clock();
        clock.advance(ChronoDuration::days(3));

        dispatcher.dispatch("list_workspaces", "u1", json!({})).await;
        dispatcher.dispatch("format_disk", "u1", json!({})).await;

        let stamps = audit.records().iter().map(|record| record.occurred_at).collect::<Vec<_>>();
        assert_eq!(stamps, vec![clock.now(), clock.now()]);
    }

    #[tokio::test]
    async fn categories_without_a_limit_are_not_metered() {
        let (dispatcher, _audit, _provider) = dispatcher();
        let dispatcher = dispatcher.with_limits(BTreeMap::from([(
            ToolCategory::Provisioning,
            CategoryLimit::new(1, 3600),
        )]));

        for _ in 0..5 {
            let result = dispatcher.dispatch("list_workspaces", "u1", json!({})).await;
            assert!(result.success);
        }
    }

    #[tokio::test]
    async fn validation_failures_do_not_consume_quota() {
        let (dispatcher, _audit, _provider) = dispatcher();
        let dispatcher = dispatcher.with_limits(BTreeMap::from([(
            ToolCategory::Provisioning,
            CategoryLimit::new(1, 3600),
        )]));

        let invalid = dispatcher.dispatch("provision_workspace", "u1", json!({})).await;
        assert_eq!(invalid.outcome_label(), "validation");

        let valid =
            dispatcher.dispatch("provision_workspace", "u1", json!({ "bundle_type": "VALUE" })).await;
        assert!(valid.success);
    }
}
