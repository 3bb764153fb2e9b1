//! TTL-bounded conversation state.
//!
//! Sessions are serialized into a [`KeyValueStore`] under the `conversation`
//! namespace. Every mutation refreshes `last_activity` and re-applies the TTL
//! on the backing key inside one [`KeyValueStore::update`], so concurrent
//! writers (in this process or another one sharing the backend) never drop
//! each other's changes. Reads expire lazily.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::domain::conversation::{ConversationSession, MessageRole};
use crate::domain::intent::IntentTag;
use crate::store::{KeyValueStore, StoreError, StoreKey};

pub const CONVERSATION_NAMESPACE: &str = "conversation";

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ConversationStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Starts a fresh session, replacing any existing one for the pair.
    pub async fn create(
        &self,
        user_id: &str,
        session_id: &str,
        context: Option<String>,
    ) -> Result<ConversationSession, ConversationError> {
        let key = session_key(user_id, session_id);
        let mut session = ConversationSession::new(user_id, session_id, self.clock.now(), self.ttl);
        session.current_subject = context;
        self.store.set(&key, encode(&key, &session)?, self.ttl).await?;
        Ok(session)
    }

    pub async fn get(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<ConversationSession>, ConversationError> {
        let key = session_key(user_id, session_id);
        let raw = self.store.get(&key).await?;
        Ok(decode_live(&key, raw, self.clock.now())?)
    }

    /// Appends a message, creating the session when it is absent or expired.
    pub async fn append_message(
        &self,
        user_id: &str,
        session_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<ConversationSession, ConversationError> {
        self.update(user_id, session_id, |session, now| session.push_message(role, text, now))
            .await
    }

    pub async fn set_context(
        &self,
        user_id: &str,
        session_id: &str,
        context: Option<String>,
    ) -> Result<ConversationSession, ConversationError> {
        self.update(user_id, session_id, |session, now| session.set_subject(context, now)).await
    }

    pub async fn record_intent(
        &self,
        user_id: &str,
        session_id: &str,
        intent: IntentTag,
    ) -> Result<ConversationSession, ConversationError> {
        self.update(user_id, session_id, |session, now| session.push_intent(intent, now)).await
    }

    pub async fn clear(&self, user_id: &str, session_id: &str) -> Result<bool, ConversationError> {
        let key = session_key(user_id, session_id);
        Ok(self.store.delete(&key).await?)
    }

    async fn update<F>(
        &self,
        user_id: &str,
        session_id: &str,
        apply: F,
    ) -> Result<ConversationSession, ConversationError>
    where
        F: FnOnce(&mut ConversationSession, DateTime<Utc>) + Send,
    {
        let key = session_key(user_id, session_id);
        let ttl = self.ttl;
        let clock = &self.clock;
        let edit_key = &key;

        let raw = self
            .store
            .update(
                &key,
                ttl,
                Box::new(move |current: Option<String>| -> Result<String, StoreError> {
                    // `now` is read inside the atomic step
                    let now = clock.now();
                    let mut session = decode_live(edit_key, current, now)?
                        .unwrap_or_else(|| ConversationSession::new(user_id, session_id, now, ttl));
                    apply(&mut session, now);
                    session.ttl = ttl;
                    encode(edit_key, &session)
                }),
            )
            .await?;
        Ok(decode(&key, &raw)?)
    }
}

fn session_key(user_id: &str, session_id: &str) -> StoreKey {
    StoreKey::new(CONVERSATION_NAMESPACE, user_id, session_id)
}

fn encode(key: &StoreKey, session: &ConversationSession) -> Result<String, StoreError> {
    serde_json::to_string(session).map_err(|source| StoreError::Encode { key: key.to_string(), source })
}

fn decode(key: &StoreKey, raw: &str) -> Result<ConversationSession, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Decode { key: key.to_string(), source })
}

/// Decodes a stored session, treating one idle past its TTL as absent.
fn decode_live(
    key: &StoreKey,
    raw: Option<String>,
    now: DateTime<Utc>,
) -> Result<Option<ConversationSession>, StoreError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let session = decode(key, &raw)?;
    if session.is_expired(now) {
        debug!(
            event_name = "conversation.session.expired",
            user_id = %session.user_id,
            session_id = %session.session_id,
            "ignoring expired conversation session"
        );
        return Ok(None);
    }
    Ok(Some(session))
}
