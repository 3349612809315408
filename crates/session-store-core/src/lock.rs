use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::error::SessionError;
use crate::record::{FieldSet, RecordFilter};
use crate::storage::DocumentStore;

/// First backoff wait.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(5);

/// Longest single backoff wait.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1);

/// Total time spent waiting before giving up.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(30);

/// Floor for a single wait, so every wait counts against the budget.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Backoff schedule for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub budget: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            budget: DEFAULT_BUDGET,
        }
    }
}

impl LockPolicy {
    /// Wait durations in order: doubling from `initial_delay`, capped at `max_delay`,
    /// until their sum reaches `budget`. No wait is shorter than [`MIN_DELAY`].
    pub fn delays(&self) -> Backoff {
        Backoff {
            next: self.initial_delay,
            max: self.max_delay,
            remaining: self.budget,
        }
    }
}

/// Iterator over backoff waits.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    remaining: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining.is_zero() {
            return None;
        }
        let delay = self.next.max(MIN_DELAY);
        self.remaining = self.remaining.saturating_sub(delay);
        self.next = delay.saturating_mul(2).min(self.max);
        Some(delay)
    }
}

/// Cooperative per-session lock kept in the `lock` field of the record itself.
///
/// Acquisition is a compare-and-set (`lock == 0` → `lock = 1`) retried with capped
/// exponential backoff. Release has no call of its own: the session write clears the
/// flag in the same update that stores the data.
pub struct DocumentLock<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: LockPolicy,
}

// Arc<S> is Clone whether or not S is.
impl<S: DocumentStore + ?Sized> Clone for DocumentLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            policy: self.policy,
        }
    }
}

impl<S: DocumentStore + ?Sized> DocumentLock<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policy: LockPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Take the lock on `session_id`, waiting for a current holder to write.
    ///
    /// Succeeds immediately when no live record exists: there is nothing to lock and
    /// the first write creates the record unlocked.
    #[instrument(skip(self), level = "debug")]
    pub async fn acquire(&self, session_id: &str) -> Result<(), SessionError> {
        let now = self.clock.now();
        let live = self
            .store
            .find_one(&RecordFilter::by_session(session_id).live_at(now))
            .await?;
        if live.is_none() {
            debug!("No live record for {}, nothing to lock", session_id);
            return Ok(());
        }

        let filter = RecordFilter::by_session(session_id).unlocked();
        let fields = FieldSet::lock();
        let mut waited = Duration::ZERO;
        let mut attempts = 1u32;

        // One attempt up front and one after every wait, the last wait included.
        let mut locked = self.store.update_one(&filter, &fields, false).await?.matched > 0;
        let mut delays = self.policy.delays();
        while !locked {
            let Some(delay) = delays.next() else { break };
            tokio::time::sleep(delay).await;
            waited += delay;
            attempts += 1;
            locked = self.store.update_one(&filter, &fields, false).await?.matched > 0;
        }

        if locked {
            debug!(
                "Locked {} after {} attempt(s), waited {:?}",
                session_id, attempts, waited
            );
            return Ok(());
        }

        warn!(
            "Could not lock {} after {} attempts ({:?})",
            session_id, attempts, waited
        );
        Err(SessionError::LockTimeout {
            session_id: session_id.to_string(),
            waited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryStore;

    async fn setup(now: i64) -> (Arc<MemoryStore>, Arc<ManualClock>, DocumentLock<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let lock = DocumentLock::new(store.clone(), clock.clone());
        (store, clock, lock)
    }

    async fn put(store: &MemoryStore, id: &str, lock: bool, expiry: i64) {
        let mut fields = FieldSet::session_write(b"data", expiry);
        fields.lock = Some(lock);
        store
            .update_one(&RecordFilter::by_session(id), &fields, true)
            .await
            .unwrap();
    }

    #[test]
    fn test_default_schedule() {
        let delays: Vec<Duration> = LockPolicy::default().delays().collect();

        assert_eq!(delays[0], Duration::from_millis(5));
        assert_eq!(delays[1], Duration::from_millis(10));
        assert_eq!(delays[7], Duration::from_millis(640));
        assert_eq!(delays[8], Duration::from_secs(1));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(1)));

        let total: Duration = delays.iter().sum();
        assert!(total >= Duration::from_secs(30));
        assert!(total < Duration::from_secs(31));
    }

    #[test]
    fn test_zero_budget_has_no_waits() {
        let policy = LockPolicy {
            budget: Duration::ZERO,
            ..LockPolicy::default()
        };
        assert_eq!(policy.delays().count(), 0);
    }

    #[test]
    fn test_zero_delays_still_exhaust_budget() {
        let zero_initial = LockPolicy {
            initial_delay: Duration::ZERO,
            ..LockPolicy::default()
        };
        assert!(zero_initial.delays().all(|d| d == MIN_DELAY));
        assert_eq!(zero_initial.delays().count(), 30_000);

        let zero_max = LockPolicy {
            max_delay: Duration::ZERO,
            ..LockPolicy::default()
        };
        let delays: Vec<Duration> = zero_max.delays().collect();
        assert_eq!(delays[0], DEFAULT_INITIAL_DELAY);
        assert!(delays[1..].iter().all(|d| *d == MIN_DELAY));
        assert_eq!(delays.iter().sum::<Duration>(), DEFAULT_BUDGET);
    }

    #[tokio::test]
    async fn test_acquire_without_record() {
        let (store, _clock, lock) = setup(100).await;
        lock.acquire("missing").await.unwrap();
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_skips_expired_record() {
        let (store, _clock, lock) = setup(100).await;
        put(&store, "abc", true, 50).await;

        lock.acquire("abc").await.unwrap();
        // Nothing to lock: the stale flag is left for the next write to clear.
        assert!(store.records().await[0].lock);
    }

    #[tokio::test]
    async fn test_acquire_sets_flag() {
        let (store, _clock, lock) = setup(100).await;
        put(&store, "abc", false, 200).await;

        lock.acquire("abc").await.unwrap();
        assert!(store.records().await[0].lock);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_held() {
        let (store, _clock, lock) = setup(100).await;
        put(&store, "abc", true, 200).await;

        let started = tokio::time::Instant::now();
        let err = lock.acquire("abc").await.unwrap_err();

        match err {
            SessionError::LockTimeout { session_id, waited } => {
                assert_eq!(session_id, "abc");
                assert!(waited >= DEFAULT_BUDGET);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(started.elapsed() >= DEFAULT_BUDGET);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_after_release() {
        let (store, _clock, lock) = setup(100).await;
        put(&store, "abc", true, 200).await;

        let releaser = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                put(&store, "abc", false, 200).await;
            })
        };

        lock.acquire("abc").await.unwrap();
        releaser.await.unwrap();
        assert!(store.records().await[0].lock);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_during_last_wait() {
        let (store, _clock, lock) = setup(100).await;
        put(&store, "abc", true, 200).await;

        let releaser = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(29_600)).await;
                put(&store, "abc", false, 200).await;
            })
        };

        let started = tokio::time::Instant::now();
        lock.acquire("abc").await.unwrap();
        releaser.await.unwrap();

        assert!(store.records().await[0].lock);
        assert!(started.elapsed() >= Duration::from_millis(29_600));
        assert!(started.elapsed() <= DEFAULT_BUDGET + DEFAULT_MAX_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_policy_times_out() {
        let (store, _clock, lock) = setup(100).await;
        let lock = lock.with_policy(LockPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            budget: Duration::from_millis(20),
        });
        put(&store, "abc", true, 200).await;

        let err = lock.acquire("abc").await.unwrap_err();
        assert!(err.is_lock_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy_budget() {
        let (store, _clock, lock) = setup(100).await;
        let lock = lock.with_policy(LockPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            budget: Duration::from_millis(50),
        });
        put(&store, "abc", true, 200).await;

        let err = lock.acquire("abc").await.unwrap_err();
        assert!(err.is_lock_timeout());
    }
}
