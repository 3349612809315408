//! Session persistence over a document store with a cooperative in-document lock.
//!
//! This crate defines the pieces shared by every backend:
//! - `DocumentStore`: the adapter contract (conditional update, bulk update, find, delete, indexes)
//! - `DocumentLock`: lock acquisition by compare-and-set with capped exponential backoff
//! - `SessionStore` / `SessionCycle`: read, merge-on-write, destroy and soft garbage collection
//! - `SessionHandler`: the save-handler hooks a host calls around each request
//!
//! Expired records are only flagged inactive by `gc`. Physical removal is left to an
//! out-of-band sweep so `gc` stays cheap enough to run often.

mod clock;
mod config;
mod error;
mod handler;
mod lock;
mod memory;
mod record;
mod session;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SessionConfig, DEFAULT_LIFETIME_SECS};
pub use error::{SessionError, StoreError};
pub use handler::SessionHandler;
pub use lock::{
    Backoff, DocumentLock, LockPolicy, DEFAULT_BUDGET, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY,
    MIN_DELAY,
};
pub use memory::{Collection, MemoryStore};
pub use record::{
    merge, ExpiryBound, FieldSet, IndexField, IndexSpec, RecordFilter, SessionRecord,
    UpdateOutcome,
};
pub use session::{SessionCycle, SessionStore};
pub use storage::DocumentStore;
