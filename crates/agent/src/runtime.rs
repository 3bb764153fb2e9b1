use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;
use workdesk_core::conversation::ConversationStore;
use workdesk_core::domain::conversation::MessageRole;
use workdesk_core::domain::intent::{IntentTag, RecognizedIntent};
use workdesk_core::domain::tool::{DispatchError, ToolInvocationResult};
use workdesk_core::errors::ApplicationError;

use crate::dispatcher::Dispatcher;
use crate::intent::IntentRecognizer;

const GREETING_REPLY: &str =
    "Hi! I can provision, start, stop, reboot or terminate workspaces, report status and costs, \
     recommend bundles and open support tickets. What do you need?";

/// What happened to one inbound message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub intent: RecognizedIntent,
    pub tool: Option<String>,
    pub result: Option<ToolInvocationResult>,
}

impl TurnOutcome {
    pub fn dispatched(&self) -> bool {
        self.result.is_some()
    }
}

pub struct AgentRuntime {
    recognizer: IntentRecognizer,
    dispatcher: Dispatcher,
    conversations: ConversationStore,
}

impl AgentRuntime {
    pub fn new(
        recognizer: IntentRecognizer,
        dispatcher: Dispatcher,
        conversations: ConversationStore,
    ) -> Self {
        Self { recognizer, dispatcher, conversations }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub async fn handle_message(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
    ) -> Result<TurnOutcome, ApplicationError> {
        let session =
            self.conversations.append_message(user_id, session_id, MessageRole::User, text).await?;

        let intent = self.recognizer.recognize_in_context(text, session.current_subject.as_deref());
        self.conversations.record_intent(user_id, session_id, intent.intent).await?;

        if let Some(workspace_id) = intent.entity_str("workspace_id") {
            if session.current_subject.as_deref() != Some(workspace_id) {
                self.conversations
                    .set_context(user_id, session_id, Some(workspace_id.to_string()))
                    .await?;
            }
        }

        info!(
            event_name = "agent.turn.recognized",
            user_id,
            session_id,
            intent = intent.intent.as_str(),
            ambiguous = intent.ambiguous,
            "message classified"
        );

        let tool = match (&intent.suggested_tool, intent.ambiguous) {
            (Some(tool), false) => tool.clone(),
            _ => {
                let reply = conversational_reply(&intent);
                self.conversations
                    .append_message(user_id, session_id, MessageRole::Assistant, &reply)
                    .await?;
                return Ok(TurnOutcome { reply, intent, tool: None, result: None });
            }
        };

        let params = Value::Object(intent.entities.clone().into_iter().collect::<Map<_, _>>());
        self.run_tool(user_id, session_id, intent, tool, params).await
    }

    /// Re-issues a destructive request with `confirmed: true`.
    ///
    /// The runtime keeps no pending-confirmation state; the caller supplies
    /// the same tool and parameters it was asked to confirm.
    pub async fn handle_confirmation(
        &self,
        user_id: &str,
        session_id: &str,
        tool: &str,
        params: Value,
    ) -> Result<TurnOutcome, ApplicationError> {
        let mut params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ApplicationError::Validation(format!(
                    "tool parameters must be a JSON object, got {other}"
                )))
            }
        };
        params.insert("confirmed".to_string(), Value::Bool(true));

        let intent = RecognizedIntent {
            intent: IntentTag::Unknown,
            confidence: 1.0,
            entities: params.clone().into_iter().collect(),
            suggested_tool: Some(tool.to_string()),
            ambiguous: false,
            clarification: None,
        };
        self.conversations
            .append_message(user_id, session_id, MessageRole::User, &format!("confirm {tool}"))
            .await?;
        self.run_tool(user_id, session_id, intent, tool.to_string(), Value::Object(params)).await
    }

    async fn run_tool(
        &self,
        user_id: &str,
        session_id: &str,
        intent: RecognizedIntent,
        tool: String,
        params: Value,
    ) -> Result<TurnOutcome, ApplicationError> {
        let result =
            self.dispatcher.dispatch_with_session(&tool, user_id, params, Some(session_id)).await;

        let tool_message = serde_json::to_string(&result)
            .unwrap_or_else(|_| format!("{tool}: {}", result.outcome_label()));
        self.conversations
            .append_message(user_id, session_id, MessageRole::Tool, &tool_message)
            .await?;

        let reply = tool_reply(&tool, &result);
        self.conversations
            .append_message(user_id, session_id, MessageRole::Assistant, &reply)
            .await?;

        Ok(TurnOutcome { reply, intent, tool: Some(tool), result: Some(result) })
    }
}

fn conversational_reply(intent: &RecognizedIntent) -> String {
    if let Some(clarification) = &intent.clarification {
        return clarification.clone();
    }
    match intent.intent {
        IntentTag::Greeting => GREETING_REPLY.to_string(),
        IntentTag::Help => format!(
            "{GREETING_REPLY} Mention a workspace id like ws-abc123 when acting on a specific workspace."
        ),
        _ => "Could you tell me a bit more about what you need?".to_string(),
    }
}

fn tool_reply(tool: &str, result: &ToolInvocationResult) -> String {
    if result.success {
        return match &result.payload {
            Some(payload) => format!("Done: `{tool}` completed. {payload}"),
            None => format!("Done: `{tool}` completed."),
        };
    }
    if let Some(message) = &result.confirmation_message {
        return message.clone();
    }
    match &result.error {
        Some(DispatchError::RateLimitExceeded { limit, window_secs, retry_after_secs }) => format!(
            "You've reached the limit of {limit} requests per {window_secs}s for this kind of \
             action. Please try again in {retry_after_secs}s."
        ),
        Some(DispatchError::UnknownTool { tool }) => format!("I don't know how to run `{tool}`."),
        Some(DispatchError::Validation { message }) => format!("I couldn't do that: {message}."),
        Some(DispatchError::Timeout { after_ms }) => format!(
            "`{tool}` did not finish within {}. It may still complete; check the status shortly.",
            human_duration(*after_ms)
        ),
        Some(error) => format!("`{tool}` failed: {error}"),
        None => format!("`{tool}` did not complete."),
    }
}

fn human_duration(millis: u64) -> String {
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use workdesk_core::audit::InMemoryAuditSink;
    use workdesk_core::clock::ManualClock;
    use workdesk_core::config::IntentConfig;
    use workdesk_core::conversation::ConversationStore;
    use workdesk_core::domain::conversation::MessageRole;
    use workdesk_core::domain::intent::IntentTag;
    use workdesk_core::rate_limit::RateLimiter;
    use workdesk_core::store::InMemoryStore;

    use workdesk_core::domain::tool::{DispatchError, ToolInvocationResult};

    use super::{tool_reply, AgentRuntime};
    use crate::dispatcher::Dispatcher;
    use crate::intent::IntentRecognizer;
    use crate::provider::DryRunProvider;
    use crate::tools::ToolRegistry;
    use crate::workspace_tools::register_builtin_tools;

    fn runtime() -> (AgentRuntime, DryRunProvider, InMemoryAuditSink) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let provider = DryRunProvider::default();
        let mut registry = ToolRegistry::default();
        register_builtin_tools(&mut registry, Arc::new(provider.clone())).expect("register");
        let audit = InMemoryAuditSink::default();
        let dispatcher = Dispatcher::new(
            registry,
            Arc::new(RateLimiter::new(store.clone(), clock.clone())),
            Arc::new(audit.clone()),
        );
        let conversations = ConversationStore::new(store, clock, Duration::from_secs(1800));
        let recognizer = IntentRecognizer::new(IntentConfig::default()).expect("rules");
        (AgentRuntime::new(recognizer, dispatcher, conversations), provider, audit)
    }

    #[tokio::test]
    async fn greeting_is_answered_without_dispatch() {
        let (runtime, provider, audit) = runtime();
        let outcome = runtime.handle_message("u1", "s1", "hello").await.expect("turn");

        assert_eq!(outcome.intent.intent, IntentTag::Greeting);
        assert!(!outcome.dispatched());
        assert!(provider.calls().is_empty());
        assert!(audit.records().is_empty());

        let session = runtime.conversations().get("u1", "s1").await.expect("get").expect("session");
        let roles = session.messages.iter().map(|message| message.role).collect::<Vec<_>>();
        assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
        assert_eq!(session.intent_history, vec![IntentTag::Greeting]);
    }

    #[tokio::test]
    async fn follow_up_reuses_current_subject() {
        let (runtime, provider, _audit) = runtime();
        let first = runtime.handle_message("u1", "s1", "start ws-42").await.expect("turn");
        assert!(first.result.as_ref().is_some_and(|result| result.success));

        let second = runtime.handle_message("u1", "s1", "now stop it").await.expect("turn");
        assert_eq!(second.tool.as_deref(), Some("stop_workspace"));
        assert!(second.result.as_ref().is_some_and(|result| result.success));
        assert_eq!(provider.call_count("stop"), 1);

        let session = runtime.conversations().get("u1", "s1").await.expect("get").expect("session");
        assert_eq!(session.current_subject.as_deref(), Some("ws-42"));
    }

    #[tokio::test]
    async fn terminate_asks_then_runs_after_confirmation() {
        let (runtime, provider, audit) = runtime();
        let asked = runtime.handle_message("u1", "s1", "terminate ws-7").await.expect("turn");
        let result = asked.result.expect("dispatched");
        assert!(result.requires_confirmation);
        assert_eq!(provider.call_count("terminate"), 0);

        let confirmed = runtime
            .handle_confirmation("u1", "s1", "terminate_workspace", json!({ "workspace_id": "ws-7" }))
            .await
            .expect("confirm");
        assert!(confirmed.result.expect("dispatched").success);
        assert_eq!(provider.call_count("terminate"), 1);
        assert_eq!(audit.records().len(), 2);
    }

    #[tokio::test]
    async fn ambiguous_request_gets_clarification() {
        let (runtime, provider, _audit) = runtime();
        let outcome = runtime.handle_message("u1", "s1", "reboot something").await.expect("turn");

        assert!(outcome.intent.ambiguous);
        assert!(!outcome.dispatched());
        assert!(outcome.reply.contains("ws-abc123"));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn timeout_reply_keeps_sub_second_precision() {
        let reply = |after_ms| {
            tool_reply("restart_workspace", &ToolInvocationResult::failed(DispatchError::Timeout { after_ms }))
        };

        assert!(reply(250).contains("within 250ms"));
        assert!(reply(30_000).contains("within 30s"));
    }
}
