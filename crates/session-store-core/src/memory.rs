use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::record::{
    FieldSet, IndexField, IndexSpec, RecordFilter, SessionRecord, UpdateOutcome,
};
use crate::storage::DocumentStore;

/// In-process document store.
///
/// The whole collection sits behind one async mutex, which gives every operation
/// single-document (in fact whole-collection) atomicity. Only useful within one
/// process: tests, and the `memory://` connection target.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collection>,
}

/// Records plus declared indexes. Shared with adapters that persist a whole collection.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    #[serde(default)]
    pub records: Vec<SessionRecord>,
}

impl Collection {
    pub fn find_one(&self, filter: &RecordFilter) -> Option<SessionRecord> {
        self.records.iter().find(|r| filter.matches(r)).cloned()
    }

    pub fn update_one(
        &mut self,
        filter: &RecordFilter,
        fields: &FieldSet,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        if let Some(record) = self.records.iter_mut().find(|r| filter.matches(r)) {
            fields.apply(record);
            return Ok(UpdateOutcome {
                matched: 1,
                upserted: false,
            });
        }

        if !upsert {
            return Ok(UpdateOutcome::default());
        }

        let record = SessionRecord::from_upsert(filter, fields, uuid::Uuid::new_v4().to_string())?;
        self.insert(record)?;
        Ok(UpdateOutcome {
            matched: 0,
            upserted: true,
        })
    }

    pub fn update_many(&mut self, filter: &RecordFilter, fields: &FieldSet) -> u64 {
        let mut matched = 0;
        for record in self.records.iter_mut().filter(|r| filter.matches(r)) {
            fields.apply(record);
            matched += 1;
        }
        matched
    }

    pub fn delete(&mut self, filter: &RecordFilter) -> u64 {
        let before = self.records.len();
        self.records.retain(|r| !filter.matches(r));
        (before - self.records.len()) as u64
    }

    /// Returns whether the index was newly declared.
    pub fn ensure_index(&mut self, index: &IndexSpec) -> Result<bool, StoreError> {
        if let Some(existing) = self.indexes.iter().find(|i| i.name == index.name) {
            if existing != index {
                return Err(StoreError::InvalidArgument(format!(
                    "index {} already exists with different options",
                    index.name
                )));
            }
            return Ok(false);
        }

        if index.unique && index.field == IndexField::SessionId {
            let mut seen = std::collections::HashSet::new();
            if let Some(dup) = self.records.iter().find(|r| !seen.insert(r.session_id.as_str())) {
                return Err(StoreError::DuplicateKey(format!(
                    "cannot build unique index {}: duplicate session_id {}",
                    index.name, dup.session_id
                )));
            }
        }

        self.indexes.push(index.clone());
        Ok(true)
    }

    fn insert(&mut self, record: SessionRecord) -> Result<(), StoreError> {
        let session_unique = self
            .indexes
            .iter()
            .any(|i| i.unique && i.field == IndexField::SessionId);
        if session_unique && self.records.iter().any(|r| r.session_id == record.session_id) {
            return Err(StoreError::DuplicateKey(format!(
                "session_id {} already exists",
                record.session_id
            )));
        }
        self.records.push(record);
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, in insertion order.
    pub async fn records(&self) -> Vec<SessionRecord> {
        self.inner.lock().await.records.clone()
    }

    /// Declared indexes.
    pub async fn indexes(&self) -> Vec<IndexSpec> {
        self.inner.lock().await.indexes.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.inner.lock().await.find_one(filter))
    }

    #[instrument(skip(self, fields), level = "debug")]
    async fn update_one(
        &self,
        filter: &RecordFilter,
        fields: &FieldSet,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        let outcome = self.inner.lock().await.update_one(filter, fields, upsert)?;
        debug!("update_one matched {} (upserted: {})", outcome.matched, outcome.upserted);
        Ok(outcome)
    }

    async fn update_many(
        &self,
        filter: &RecordFilter,
        fields: &FieldSet,
    ) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.update_many(filter, fields))
    }

    async fn delete(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.delete(filter))
    }

    async fn ensure_index(&self, index: &IndexSpec) -> Result<(), StoreError> {
        self.inner.lock().await.ensure_index(index)?;
        Ok(())
    }
}
