use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::intent::IntentTag;
use crate::store::chrono_duration;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(1800);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub user_id: String,
    pub session_id: String,
    pub messages: Vec<Message>,
    /// Subject under discussion, usually a workspace id.
    pub current_subject: Option<String>,
    pub intent_history: Vec<IntentTag>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(with = "ttl_secs")]
    pub ttl: Duration,
}

impl ConversationSession {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            messages: Vec::new(),
            current_subject: None,
            intent_history: Vec::new(),
            created_at: now,
            last_activity: now,
            ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity > chrono_duration(self.ttl)
    }

    /// Refreshes activity without ever moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn push_message(&mut self, role: MessageRole, text: impl Into<String>, now: DateTime<Utc>) {
        self.messages.push(Message { role, text: text.into(), timestamp: now });
        self.touch(now);
    }

    pub fn push_intent(&mut self, intent: IntentTag, now: DateTime<Utc>) {
        self.intent_history.push(intent);
        self.touch(now);
    }

    pub fn set_subject(&mut self, subject: Option<String>, now: DateTime<Utc>) {
        self.current_subject = subject;
        self.touch(now);
    }

    pub fn last_intent(&self) -> Option<IntentTag> {
        self.intent_history.last().copied()
    }
}

mod ttl_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(ttl.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
