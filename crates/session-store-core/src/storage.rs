use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::{FieldSet, IndexSpec, RecordFilter, SessionRecord, UpdateOutcome};

/// Document store adapter over a single collection of session records.
///
/// Implementations must make `update_one` atomic per document: the filter check and
/// the assignment happen as one step with respect to every other caller, including
/// callers in other processes. That guarantee is the only primitive the session lock
/// is built on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the backend identifier (e.g., "memory", "file").
    fn backend_name(&self) -> &'static str;

    /// Find the first record matching `filter`.
    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<SessionRecord>, StoreError>;

    /// Conditionally update one record.
    ///
    /// With `upsert` set and no match, inserts a record built by
    /// [`SessionRecord::from_upsert`]. Unique indexes are enforced on insert.
    async fn update_one(
        &self,
        filter: &RecordFilter,
        fields: &FieldSet,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Update every matching record. Returns the matched count.
    async fn update_many(&self, filter: &RecordFilter, fields: &FieldSet)
        -> Result<u64, StoreError>;

    /// Delete every matching record. Returns the deleted count.
    async fn delete(&self, filter: &RecordFilter) -> Result<u64, StoreError>;

    /// Declare a secondary index. Declaring an existing index again is a no-op.
    async fn ensure_index(&self, index: &IndexSpec) -> Result<(), StoreError>;
}
