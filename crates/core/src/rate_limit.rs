//! Sliding-window invocation limits keyed by `(user, tool category)`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::domain::tool::ToolCategory;
use crate::store::{chrono_duration, StoreError, StoreKey, WindowAdmission, WindowStore};

pub const RATE_LIMIT_NAMESPACE: &str = "ratelimit";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimit {
    pub limit: u32,
    pub window_secs: u64,
}

impl CategoryLimit {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

pub fn default_category_limits() -> BTreeMap<ToolCategory, CategoryLimit> {
    BTreeMap::from([
        (ToolCategory::Provisioning, CategoryLimit::new(5, 3600)),
        (ToolCategory::Management, CategoryLimit::new(50, 3600)),
        (ToolCategory::Query, CategoryLimit::new(100, 3600)),
        (ToolCategory::Diagnostics, CategoryLimit::new(20, 3600)),
        (ToolCategory::Support, CategoryLimit::new(10, 3600)),
    ])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Whole seconds to wait, rounded up and never zero for a denial.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Allowed { .. } => None,
            Self::Denied { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
        }
    }
}

/// A window slot held for one in-flight call.
///
/// The slot already counts against the window. Hand it back with
/// [`RateLimiter::release`] when the call does not succeed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotaSlot {
    key: StoreKey,
    at: DateTime<Utc>,
    /// Slots left in the window after this one.
    pub remaining: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reservation {
    Granted(QuotaSlot),
    Denied { retry_after: Duration },
}

impl Reservation {
    pub fn decision(&self) -> RateLimitDecision {
        match self {
            Self::Granted(slot) => RateLimitDecision::Allowed { remaining: slot.remaining },
            Self::Denied { retry_after } => RateLimitDecision::Denied { retry_after: *retry_after },
        }
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub async fn check(
        &self,
        user_id: &str,
        category: ToolCategory,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let now = self.clock.now();
        let span = chrono_duration(window);
        let key = window_key(user_id, category);

        let remaining = self.store.prune_and_list(&key, now - span).await?;
        let used = u32::try_from(remaining.len()).unwrap_or(u32::MAX);

        if used < limit {
            return Ok(RateLimitDecision::Allowed { remaining: limit - used });
        }

        let retry_after = retry_after(remaining.first().copied(), window, now);
        log_denied(user_id, category, used, limit, retry_after);
        Ok(RateLimitDecision::Denied { retry_after })
    }

    pub async fn record(
        &self,
        user_id: &str,
        category: ToolCategory,
        window: Duration,
    ) -> Result<(), RateLimitError> {
        let key = window_key(user_id, category);
        self.store.push(&key, self.clock.now(), window).await?;
        Ok(())
    }

    /// Checks and records in one atomic step.
    ///
    /// Concurrent callers can never hold more than `limit` slots in a window
    /// between them.
    pub async fn reserve(
        &self,
        user_id: &str,
        category: ToolCategory,
        limit: u32,
        window: Duration,
    ) -> Result<Reservation, RateLimitError> {
        let now = self.clock.now();
        let key = window_key(user_id, category);

        match self.store.try_push(&key, now, now - chrono_duration(window), limit, window).await? {
            WindowAdmission::Admitted { used } => Ok(Reservation::Granted(QuotaSlot {
                key,
                at: now,
                remaining: limit.saturating_sub(used),
            })),
            WindowAdmission::Full { oldest } => {
                let retry_after = retry_after(oldest, window, now);
                log_denied(user_id, category, limit, limit, retry_after);
                Ok(Reservation::Denied { retry_after })
            }
        }
    }

    /// Returns a reserved slot to the window. Returns whether the slot was still held.
    pub async fn release(&self, slot: &QuotaSlot) -> Result<bool, RateLimitError> {
        Ok(self.store.remove(&slot.key, slot.at).await?)
    }
}

/// Time until the oldest entry leaves the window, or the full window when there is none.
fn retry_after(oldest: Option<DateTime<Utc>>, window: Duration, now: DateTime<Utc>) -> Duration {
    oldest
        .map(|oldest| oldest + chrono_duration(window) - now)
        .and_then(|delta| delta.to_std().ok())
        .unwrap_or(window)
}

fn log_denied(user_id: &str, category: ToolCategory, used: u32, limit: u32, retry_after: Duration) {
    debug!(
        event_name = "rate_limit.denied",
        user_id,
        category = category.as_str(),
        used,
        limit,
        retry_after_ms = retry_after.as_millis() as u64,
        "sliding window exhausted"
    );
}

fn window_key(user_id: &str, category: ToolCategory) -> StoreKey {
    StoreKey::new(RATE_LIMIT_NAMESPACE, user_id, category.as_str())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;

    use super::{
        default_category_limits, CategoryLimit, RateLimitDecision, RateLimiter, Reservation,
    };
    use crate::clock::ManualClock;
    use crate::domain::tool::ToolCategory;
    use crate::store::InMemoryStore;

    const HOUR: Duration = Duration::from_secs(3600);

    fn fixture() -> (RateLimiter, ManualClock) {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryStore::new(Arc::new(clock.clone())));
        (RateLimiter::new(store, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn allows_exactly_limit_calls_then_denies_with_positive_retry_after() {
        let (limiter, clock) = fixture();

        for _ in 0..5 {
            let decision =
                limiter.check("u1", ToolCategory::Provisioning, 5, HOUR).await.expect("check");
            assert!(decision.is_allowed());
            limiter.record("u1", ToolCategory::Provisioning, HOUR).await.expect("record");
            clock.advance(ChronoDuration::minutes(1));
        }

        let decision =
            limiter.check("u1", ToolCategory::Provisioning, 5, HOUR).await.expect("check");
        assert!(!decision.is_allowed());
        // oldest call was 5 minutes ago
        assert_eq!(decision, RateLimitDecision::Denied { retry_after: Duration::from_secs(55 * 60) });
        assert_eq!(decision.retry_after_secs(), Some(3300));
    }

    #[tokio::test]
    async fn window_slides_as_old_calls_age_out() {
        let (limiter, clock) = fixture();
        for _ in 0..3 {
            limiter.record("u1", ToolCategory::Support, HOUR).await.expect("record");
            clock.advance(ChronoDuration::minutes(10));
        }

        let denied = limiter.check("u1", ToolCategory::Support, 3, HOUR).await.expect("check");
        assert!(!denied.is_allowed());

        // first call (t=0) leaves the window, the other two remain
        clock.advance(ChronoDuration::minutes(31));
        let allowed = limiter.check("u1", ToolCategory::Support, 3, HOUR).await.expect("check");
        assert_eq!(allowed, RateLimitDecision::Allowed { remaining: 1 });
    }

    #[tokio::test]
    async fn check_alone_does_not_consume_quota() {
        let (limiter, _clock) = fixture();
        for _ in 0..10 {
            let decision = limiter.check("u1", ToolCategory::Query, 1, HOUR).await.expect("check");
            assert!(decision.is_allowed());
        }
    }

    #[tokio::test]
    async fn keys_are_independent_per_user_and_category() {
        let (limiter, _clock) = fixture();
        limiter.record("u1", ToolCategory::Provisioning, HOUR).await.expect("record");

        assert!(!limiter
            .check("u1", ToolCategory::Provisioning, 1, HOUR)
            .await
            .expect("check")
            .is_allowed());
        assert!(limiter
            .check("u2", ToolCategory::Provisioning, 1, HOUR)
            .await
            .expect("check")
            .is_allowed());
        assert!(limiter
            .check("u1", ToolCategory::Management, 1, HOUR)
            .await
            .expect("check")
            .is_allowed());
    }

    #[tokio::test]
    async fn zero_limit_denies_for_a_full_window() {
        let (limiter, _clock) = fixture();
        let decision = limiter.check("u1", ToolCategory::Support, 0, HOUR).await.expect("check");
        assert_eq!(decision, RateLimitDecision::Denied { retry_after: HOUR });
    }

    #[tokio::test]
    async fn concurrent_reservations_never_exceed_the_limit() {
        let (limiter, _clock) = fixture();
        let limiter = Arc::new(limiter);

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.reserve("u1", ToolCategory::Provisioning, 5, HOUR).await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if let Reservation::Granted(_) = handle.await.expect("join").expect("reserve") {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
    }

    #[tokio::test]
    async fn released_slot_can_be_reserved_again() {
        let (limiter, clock) = fixture();

        let Reservation::Granted(slot) =
            limiter.reserve("u1", ToolCategory::Support, 1, HOUR).await.expect("reserve")
        else {
            panic!("first reservation should be granted");
        };
        assert_eq!(slot.remaining, 0);

        clock.advance(ChronoDuration::minutes(15));
        let denied = limiter.reserve("u1", ToolCategory::Support, 1, HOUR).await.expect("reserve");
        assert_eq!(denied, Reservation::Denied { retry_after: Duration::from_secs(45 * 60) });
        assert_eq!(denied.decision().retry_after_secs(), Some(2700));

        assert!(limiter.release(&slot).await.expect("release"));
        assert!(!limiter.release(&slot).await.expect("release"));
        let again = limiter.reserve("u1", ToolCategory::Support, 1, HOUR).await.expect("reserve");
        assert!(again.decision().is_allowed());
    }

    #[test]
    fn default_table_matches_documented_limits() {
        let limits = default_category_limits();
        assert_eq!(limits[&ToolCategory::Provisioning], CategoryLimit::new(5, 3600));
        assert_eq!(limits[&ToolCategory::Management], CategoryLimit::new(50, 3600));
        assert_eq!(limits[&ToolCategory::Query], CategoryLimit::new(100, 3600));
        assert_eq!(limits[&ToolCategory::Diagnostics], CategoryLimit::new(20, 3600));
        assert_eq!(limits[&ToolCategory::Support], CategoryLimit::new(10, 3600));
    }
}
