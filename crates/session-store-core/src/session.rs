use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::lock::{DocumentLock, LockPolicy};
use crate::record::{merge, FieldSet, IndexSpec, RecordFilter, SessionRecord};
use crate::storage::DocumentStore;

/// Session persistence over a document store.
///
/// Holds nothing but the store handle and fixed settings, so it is cheap to clone
/// and safe to share between requests. Per-request state (the record cached between
/// `read` and `write`) lives in the [`SessionCycle`] returned by [`SessionStore::cycle`].
pub struct SessionStore<S: DocumentStore + ?Sized = dyn DocumentStore> {
    store: Arc<S>,
    lock: DocumentLock<S>,
    clock: Arc<dyn Clock>,
    lifetime: i64,
}

impl<S: DocumentStore + ?Sized> Clone for SessionStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock: self.lock.clone(),
            clock: Arc::clone(&self.clock),
            lifetime: self.lifetime,
        }
    }
}

impl<S: DocumentStore + ?Sized> SessionStore<S> {
    /// Create a store without declaring indexes. See [`SessionStore::connect`].
    pub fn new(store: Arc<S>, lifetime_secs: u64) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            lock: DocumentLock::new(store.clone(), clock.clone()),
            store,
            clock,
            lifetime: i64::try_from(lifetime_secs).unwrap_or(i64::MAX),
        }
    }

    /// Validate `config`, declare the required indexes and build the store.
    ///
    /// Any failure here is a [`SessionError::Configuration`]: the lock and uniqueness
    /// guarantees do not hold without the indexes.
    pub async fn connect(config: &SessionConfig, store: Arc<S>) -> Result<Self, SessionError> {
        config.validate()?;
        let session_store = Self::new(store, config.lifetime);
        session_store.ensure_indexes().await?;
        info!(
            "Session store ready on {} ({}.{}, lifetime {}s)",
            session_store.store.backend_name(),
            config.database,
            config.collection,
            config.lifetime
        );
        Ok(session_store)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.lock = DocumentLock::new(self.store.clone(), clock.clone()).with_policy(self.lock.policy());
        self.clock = clock;
        self
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock = self.lock.with_policy(policy);
        self
    }

    /// Declare the `expiry` and unique `session_id` indexes.
    pub async fn ensure_indexes(&self) -> Result<(), SessionError> {
        for index in [IndexSpec::expiry(), IndexSpec::session_id()] {
            self.store.ensure_index(&index).await.map_err(|e| {
                SessionError::Configuration(format!("Failed to declare index {}: {}", index.name, e))
            })?;
        }
        Ok(())
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime
    }

    /// Start a request-scoped cycle.
    pub fn cycle(&self) -> SessionCycle<S> {
        SessionCycle {
            store: self.clone(),
            cached: None,
        }
    }

    /// Hard-delete the record for `session_id`. A missing record is not an error.
    #[instrument(skip(self), level = "debug")]
    pub async fn destroy(&self, session_id: &str) -> Result<u64, SessionError> {
        let deleted = self.store.delete(&RecordFilter::by_session(session_id)).await?;
        debug!("Destroyed {} ({} record(s))", session_id, deleted);
        Ok(deleted)
    }

    /// Mark every expired record inactive. Records stay in place for an external sweep.
    ///
    /// Returns the number of records matched, including ones already inactive.
    #[instrument(skip(self), level = "debug")]
    pub async fn gc(&self) -> Result<u64, SessionError> {
        let now = self.clock.now();
        let matched = self
            .store
            .update_many(&RecordFilter::expired_before(now), &FieldSet::deactivate())
            .await?;
        debug!("gc matched {} expired record(s) before {}", matched, now);
        Ok(matched)
    }
}

/// One request's pass over the session: read, then write.
pub struct SessionCycle<S: DocumentStore + ?Sized = dyn DocumentStore> {
    store: SessionStore<S>,
    cached: Option<SessionRecord>,
}

impl<S: DocumentStore + ?Sized> SessionCycle<S> {
    /// Lock and load the session data. Absent or expired sessions read as empty.
    #[instrument(skip(self), level = "debug")]
    pub async fn read(&mut self, session_id: &str) -> Result<Vec<u8>, SessionError> {
        self.store.lock.acquire(session_id).await?;

        let now = self.store.clock.now();
        let found = self
            .store
            .store
            .find_one(&RecordFilter::by_session(session_id).live_at(now))
            .await?;

        match found {
            Some(record) => {
                debug!("Read {} ({} bytes)", session_id, record.data.len());
                let data = record.data.clone();
                self.cached = Some(record);
                Ok(data)
            }
            None => {
                debug!("No live session {}", session_id);
                Ok(Vec::new())
            }
        }
    }

    /// Store `data`, release the lock and refresh the expiry in one upsert.
    #[instrument(skip(self, data), level = "debug", fields(data_len = data.len()))]
    pub async fn write(&mut self, session_id: &str, data: &[u8]) -> Result<(), SessionError> {
        let expiry = self.store.clock.now().saturating_add(self.store.lifetime);
        let incoming = FieldSet::session_write(data, expiry);
        let merged = merge(self.cached.as_ref(), session_id, &incoming);

        let outcome = self
            .store
            .store
            .update_one(
                &RecordFilter::by_session(session_id),
                &FieldSet::from_record(&merged),
                true,
            )
            .await
            .map_err(|source| SessionError::Write {
                session_id: session_id.to_string(),
                source,
            })?;

        self.cached = None;
        debug!(
            "Wrote {} (expiry {}, inserted: {})",
            session_id, expiry, outcome.upserted
        );
        Ok(())
    }

    pub async fn destroy(&mut self, session_id: &str) -> Result<u64, SessionError> {
        if self
            .cached
            .as_ref()
            .is_some_and(|r| r.session_id == session_id)
        {
            self.cached = None;
        }
        self.store.destroy(session_id).await
    }

    pub async fn gc(&mut self) -> Result<u64, SessionError> {
        self.store.gc().await
    }

    /// Record cached by the last successful read, if any.
    pub fn cached(&self) -> Option<&SessionRecord> {
        self.cached.as_ref()
    }

    /// Drop cached state.
    pub fn reset(&mut self) {
        self.cached = None;
    }
}
