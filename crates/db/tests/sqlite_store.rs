use std::sync::Arc;
use std::time::Duration;

use workdesk_core::chrono::Duration as ChronoDuration;
use workdesk_core::clock::{Clock, ManualClock};
use workdesk_core::conversation::ConversationStore;
use workdesk_core::domain::conversation::MessageRole;
use workdesk_core::domain::tool::ToolCategory;
use workdesk_core::rate_limit::{RateLimitDecision, RateLimiter, Reservation};
use workdesk_core::store::{KeyValueStore, StoreError, StoreKey, WindowAdmission, WindowStore};
use workdesk_db::{connect_with_settings, migrations, SqliteStore};

async fn store(clock: &ManualClock) -> Arc<SqliteStore> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    Arc::new(SqliteStore::new(pool, Arc::new(clock.clone())))
}

#[tokio::test]
async fn values_expire_after_their_ttl() {
    let clock = ManualClock::default();
    let store = store(&clock).await;
    let key = StoreKey::new("conversation", "u1", "s1");

    store.set(&key, "{\"v\":1}".to_string(), Duration::from_secs(60)).await.expect("set");
    assert_eq!(store.get(&key).await.expect("get").as_deref(), Some("{\"v\":1}"));

    clock.advance(ChronoDuration::seconds(61));
    assert_eq!(store.get(&key).await.expect("get"), None);
    assert!(!store.delete(&key).await.expect("delete"), "expired row is removed on read");
}

#[tokio::test]
async fn set_overwrites_and_refreshes_expiry() {
    let clock = ManualClock::default();
    let store = store(&clock).await;
    let key = StoreKey::new("conversation", "u1", "s1");

    store.set(&key, "first".to_string(), Duration::from_secs(60)).await.expect("set");
    clock.advance(ChronoDuration::seconds(50));
    store.set(&key, "second".to_string(), Duration::from_secs(60)).await.expect("set");
    clock.advance(ChronoDuration::seconds(50));

    assert_eq!(store.get(&key).await.expect("get").as_deref(), Some("second"));
    assert!(store.delete(&key).await.expect("delete"));
    assert_eq!(store.get(&key).await.expect("get"), None);
}

#[tokio::test]
async fn window_entries_are_pruned_by_cutoff_and_listed_oldest_first() {
    let clock = ManualClock::default();
    let store = store(&clock).await;
    let key = StoreKey::new("ratelimit", "u1", "query");
    let start = clock.now();

    for offset in [0, 10, 20] {
        store
            .push(&key, start + ChronoDuration::seconds(offset), Duration::from_secs(3600))
            .await
            .expect("push");
    }

    let listed = store.prune_and_list(&key, start + ChronoDuration::seconds(5)).await.expect("list");
    assert_eq!(
        listed,
        vec![start + ChronoDuration::seconds(10), start + ChronoDuration::seconds(20)]
    );

    let other = StoreKey::new("ratelimit", "u2", "query");
    assert!(store.prune_and_list(&other, start).await.expect("list").is_empty());
}

#[tokio::test]
async fn purge_expired_removes_stale_rows() {
    let clock = ManualClock::default();
    let store = store(&clock).await;

    store
        .set(&StoreKey::new("conversation", "u1", "s1"), "x".to_string(), Duration::from_secs(10))
        .await
        .expect("set");
    store
        .push(&StoreKey::new("ratelimit", "u1", "query"), clock.now(), Duration::from_secs(10))
        .await
        .expect("push");

    assert_eq!(store.purge_expired().await.expect("purge"), 0);
    clock.advance(ChronoDuration::seconds(11));
    assert_eq!(store.purge_expired().await.expect("purge"), 2);
}

#[tokio::test]
async fn conversation_sessions_persist_and_expire() {
    let clock = ManualClock::default();
    let store = store(&clock).await;
    let conversations =
        ConversationStore::new(store.clone(), Arc::new(clock.clone()), Duration::from_secs(1800));

    conversations
        .append_message("u1", "s1", MessageRole::User, "status of ws-12")
        .await
        .expect("append");
    conversations.set_context("u1", "s1", Some("ws-12".to_string())).await.expect("context");

    let session = conversations.get("u1", "s1").await.expect("get").expect("session");
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.current_subject.as_deref(), Some("ws-12"));

    clock.advance(ChronoDuration::seconds(1801));
    assert!(conversations.get("u1", "s1").await.expect("get").is_none());
}

#[tokio::test]
async fn rate_limiter_counts_against_the_sqlite_window() {
    let clock = ManualClock::default();
    let store = store(&clock).await;
    let limiter = RateLimiter::new(store, Arc::new(clock.clone()));
    let window = Duration::from_secs(60);

    for _ in 0..2 {
        let decision =
            limiter.check("u1", ToolCategory::Support, 2, window).await.expect("check");
        assert!(decision.is_allowed());
        limiter.record("u1", ToolCategory::Support, window).await.expect("record");
        clock.advance(ChronoDuration::seconds(10));
    }

    let denied = limiter.check("u1", ToolCategory::Support, 2, window).await.expect("check");
    assert_eq!(denied, RateLimitDecision::Denied { retry_after: Duration::from_secs(40) });

    clock.advance(ChronoDuration::seconds(41));
    let allowed = limiter.check("u1", ToolCategory::Support, 2, window).await.expect("check");
    assert_eq!(allowed, RateLimitDecision::Allowed { remaining: 1 });
}

/// Two independent pools on one database file, as two processes would open it.
async fn shared_file_stores(
    clock: &ManualClock,
) -> (tempfile::TempDir, Arc<SqliteStore>, Arc<SqliteStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("workdesk.db").display());

    let first = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&first).await.expect("migrate");
    let second = connect_with_settings(&url, 4, 30).await.expect("connect");

    (
        dir,
        Arc::new(SqliteStore::new(first, Arc::new(clock.clone()))),
        Arc::new(SqliteStore::new(second, Arc::new(clock.clone()))),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conversations_on_separate_pools_keep_every_message() {
    let clock = ManualClock::default();
    let (_dir, first, second) = shared_file_stores(&clock).await;
    let ttl = Duration::from_secs(1800);
    let stores = [
        Arc::new(ConversationStore::new(first, Arc::new(clock.clone()), ttl)),
        Arc::new(ConversationStore::new(second, Arc::new(clock.clone()), ttl)),
    ];

    let mut handles = Vec::new();
    for index in 0..40 {
        let store = Arc::clone(&stores[index % 2]);
        handles.push(tokio::spawn(async move {
            store
                .append_message("u1", "s1", MessageRole::User, &format!("message {index}"))
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("append");
    }

    let session = stores[1].get("u1", "s1").await.expect("get").expect("session");
    assert_eq!(session.messages.len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reservations_on_separate_pools_respect_the_limit() {
    let clock = ManualClock::default();
    let (_dir, first, second) = shared_file_stores(&clock).await;
    let limiters = [
        Arc::new(RateLimiter::new(first, Arc::new(clock.clone()))),
        Arc::new(RateLimiter::new(second, Arc::new(clock.clone()))),
    ];

    let mut handles = Vec::new();
    for index in 0..12 {
        let limiter = Arc::clone(&limiters[index % 2]);
        handles.push(tokio::spawn(async move {
            limiter.reserve("u1", ToolCategory::Provisioning, 5, Duration::from_secs(3600)).await
        }));
    }

    let mut granted = Vec::new();
    for handle in handles {
        if let Reservation::Granted(slot) = handle.await.expect("join").expect("reserve") {
            granted.push(slot);
        }
    }
    assert_eq!(granted.len(), 5);

    assert!(limiters[0].release(&granted[0]).await.expect("release"));
    let again = limiters[1]
        .reserve("u1", ToolCategory::Provisioning, 5, Duration::from_secs(3600))
        .await
        .expect("reserve");
    assert!(again.decision().is_allowed());
}

#[tokio::test]
async fn try_push_and_remove_track_single_entries() {
    let clock = ManualClock::default();
    let store = store(&clock).await;
    let key = StoreKey::new("ratelimit", "u1", "support");
    let at = clock.now();
    let ttl = Duration::from_secs(60);

    for used in 1..=2 {
        let admission = store.try_push(&key, at, at, 2, ttl).await.expect("try_push");
        assert_eq!(admission, WindowAdmission::Admitted { used });
    }
    assert_eq!(
        store.try_push(&key, at, at, 2, ttl).await.expect("try_push"),
        WindowAdmission::Full { oldest: Some(at) }
    );

    assert!(store.remove(&key, at).await.expect("remove"));
    assert_eq!(store.prune_and_list(&key, at).await.expect("list"), vec![at]);
}

#[tokio::test]
async fn failed_update_rolls_back() {
    let clock = ManualClock::default();
    let store = store(&clock).await;
    let key = StoreKey::new("conversation", "u1", "s1");
    store.set(&key, "kept".to_string(), Duration::from_secs(60)).await.expect("set");

    let result = store
        .update(
            &key,
            Duration::from_secs(60),
            Box::new(|_current: Option<String>| -> Result<String, StoreError> {
                Err(StoreError::Backend("rejected".to_string()))
            }),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(store.get(&key).await.expect("get").as_deref(), Some("kept"));
}
