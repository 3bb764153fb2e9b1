use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// Refused before the tool ran (unknown tool, quota, confirmation).
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: String,
    pub user_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    pub error: Option<String>,
    pub conversation_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    /// `occurred_at` comes from the caller's clock.
    pub fn new(
        user_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        outcome: AuditOutcome,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            outcome,
            error: None,
            conversation_id: None,
            metadata: BTreeMap::new(),
            occurred_at,
        }
    }

    pub fn with_resource_id(mut self, resource_id: Option<String>) -> Self {
        self.resource_id = resource_id;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}

/// Writes every record as a structured `tracing` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            event_name = "audit.tool_dispatch",
            event_id = %record.event_id,
            user_id = %record.user_id,
            action = %record.action,
            resource_type = %record.resource_type,
            resource_id = record.resource_id.as_deref().unwrap_or("none"),
            outcome = record.outcome.as_str(),
            error = record.error.as_deref().unwrap_or(""),
            conversation_id = record.conversation_id.as_deref().unwrap_or("none"),
            parameters = record.metadata.get("parameters").map(String::as_str).unwrap_or("{}"),
            "tool dispatch audited"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::audit::{AuditOutcome, AuditRecord, AuditSink, InMemoryAuditSink, TracingAuditSink};

    #[tokio::test]
    async fn in_memory_sink_records_dispatch_fields() {
        let occurred_at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 30, 0).single().expect("valid date");
        let sink = InMemoryAuditSink::default();
        sink.record(
            AuditRecord::new(
                "u1",
                "terminate_workspace",
                "workspace",
                AuditOutcome::Rejected,
                occurred_at,
            )
                .with_resource_id(Some("ws-1".to_owned()))
                .with_conversation_id(Some("s1".to_owned()))
                .with_error(Some("confirmation required".to_owned()))
                .with_metadata("tool", "terminate_workspace")
                .with_metadata("parameters", r#"{"workspace_id":"ws-1"}"#),
        )
        .await
        .expect("record");

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resource_id.as_deref(), Some("ws-1"));
        assert_eq!(records[0].conversation_id.as_deref(), Some("s1"));
        assert_eq!(records[0].outcome, AuditOutcome::Rejected);
        assert!(records[0].metadata.contains_key("parameters"));
        assert_eq!(records[0].occurred_at, occurred_at);
    }

    #[tokio::test]
    async fn tracing_sink_never_fails() {
        let result = TracingAuditSink
            .record(AuditRecord::new(
                "u1",
                "list_workspaces",
                "workspace",
                AuditOutcome::Success,
                Utc::now(),
            ))
            .await;
        assert!(result.is_ok());
    }
}
