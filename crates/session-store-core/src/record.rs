use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// One stored session document.
///
/// `lock` and `active` are persisted as the integers 0/1 and `data` as base64 text,
/// so JSON-backed adapters keep the document shape stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Adapter-internal identifier. Never written back by a session write.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    pub session_id: String,
    #[serde(with = "data_base64", default)]
    pub data: Vec<u8>,
    #[serde(with = "int_flag", default)]
    pub lock: bool,
    #[serde(with = "int_flag", default)]
    pub active: bool,
    /// Absolute expiration instant (unix seconds).
    #[serde(default)]
    pub expiry: i64,
}

impl SessionRecord {
    /// An empty, inactive and unlocked record for `session_id`.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            doc_id: None,
            session_id: session_id.into(),
            data: Vec::new(),
            lock: false,
            active: false,
            expiry: 0,
        }
    }

    /// Whether a read at `now` may see this record.
    pub fn is_live(&self, now: i64) -> bool {
        self.active && self.expiry >= now
    }

    /// Build the document an upsert inserts when its filter matched nothing.
    ///
    /// Equality conditions of the filter are copied first, then the field set is applied.
    pub fn from_upsert(
        filter: &RecordFilter,
        fields: &FieldSet,
        doc_id: String,
    ) -> Result<Self, StoreError> {
        let session_id = filter.session_id.as_deref().ok_or_else(|| {
            StoreError::InvalidArgument("upsert filter must name a session_id".to_string())
        })?;

        let mut record = Self::new(session_id);
        record.doc_id = Some(doc_id);
        if let Some(lock) = filter.lock {
            record.lock = lock;
        }
        if let Some(active) = filter.active {
            record.active = active;
        }
        fields.apply(&mut record);
        Ok(record)
    }
}

/// Bound on the `expiry` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryBound {
    /// `expiry >= t`
    AtLeast(i64),
    /// `expiry < t`
    Before(i64),
}

impl ExpiryBound {
    fn admits(self, expiry: i64) -> bool {
        match self {
            ExpiryBound::AtLeast(t) => expiry >= t,
            ExpiryBound::Before(t) => expiry < t,
        }
    }
}

/// Typed query over session records. Unset conditions match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub session_id: Option<String>,
    pub lock: Option<bool>,
    pub active: Option<bool>,
    pub expiry: Option<ExpiryBound>,
}

impl RecordFilter {
    /// Match the record with this session id.
    pub fn by_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    /// Match every record whose expiry lies strictly before `now`.
    pub fn expired_before(now: i64) -> Self {
        Self {
            expiry: Some(ExpiryBound::Before(now)),
            ..Self::default()
        }
    }

    /// Restrict to unlocked records.
    pub fn unlocked(mut self) -> Self {
        self.lock = Some(false);
        self
    }

    /// Restrict to records a read at `now` may see (`active == 1 && expiry >= now`).
    pub fn live_at(mut self, now: i64) -> Self {
        self.active = Some(true);
        self.expiry = Some(ExpiryBound::AtLeast(now));
        self
    }

    pub fn matches(&self, record: &SessionRecord) -> bool {
        self.session_id
            .as_deref()
            .map_or(true, |id| record.session_id == id)
            && self.lock.map_or(true, |lock| record.lock == lock)
            && self.active.map_or(true, |active| record.active == active)
            && self.expiry.map_or(true, |bound| bound.admits(record.expiry))
    }
}

/// Fields assigned by an update (`$set` semantics). `session_id` is never assignable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    pub data: Option<Vec<u8>>,
    pub lock: Option<bool>,
    pub active: Option<bool>,
    pub expiry: Option<i64>,
}

impl FieldSet {
    /// `{lock: 1}`
    pub fn lock() -> Self {
        Self {
            lock: Some(true),
            ..Self::default()
        }
    }

    /// `{active: 0}`
    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            ..Self::default()
        }
    }

    /// The fields a session write assigns: new data, released lock, live, fresh expiry.
    pub fn session_write(data: &[u8], expiry: i64) -> Self {
        Self {
            data: Some(data.to_vec()),
            lock: Some(false),
            active: Some(true),
            expiry: Some(expiry),
        }
    }

    /// Every assignable field of `record`.
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            data: Some(record.data.clone()),
            lock: Some(record.lock),
            active: Some(record.active),
            expiry: Some(record.expiry),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.lock.is_none() && self.active.is_none() && self.expiry.is_none()
    }

    /// Apply the assignments to `record`. Returns whether anything changed.
    pub fn apply(&self, record: &mut SessionRecord) -> bool {
        let before = record.clone();
        if let Some(data) = &self.data {
            record.data = data.clone();
        }
        if let Some(lock) = self.lock {
            record.lock = lock;
        }
        if let Some(active) = self.active {
            record.active = active;
        }
        if let Some(expiry) = self.expiry {
            record.expiry = expiry;
        }
        *record != before
    }
}

/// Merge the incoming write fields over the record cached by a prior read.
///
/// Cached fields are kept unless `incoming` assigns them; `session_id` is always the
/// written id and the internal `_id` is dropped. A cached record for another id is
/// ignored.
pub fn merge(cached: Option<&SessionRecord>, session_id: &str, incoming: &FieldSet) -> SessionRecord {
    let mut merged = match cached {
        Some(record) if record.session_id == session_id => record.clone(),
        _ => SessionRecord::new(session_id),
    };
    incoming.apply(&mut merged);
    merged.doc_id = None;
    merged
}

/// Result of a single-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents matched by the filter (0 or 1).
    pub matched: u64,
    /// Whether an upsert inserted a new document.
    pub upserted: bool,
}

/// Secondary index declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub field: IndexField,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
}

/// Indexable record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexField {
    SessionId,
    Expiry,
}

impl IndexSpec {
    /// Unique index on `session_id`.
    pub fn session_id() -> Self {
        Self {
            name: "session_id".to_string(),
            field: IndexField::SessionId,
            unique: true,
            sparse: false,
        }
    }

    /// Non-unique sparse index on `expiry`.
    pub fn expiry() -> Self {
        Self {
            name: "expiry".to_string(),
            field: IndexField::Expiry,
            unique: false,
            sparse: true,
        }
    }
}

mod int_flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(de::Error::custom(format!("expected 0 or 1, got {}", other))),
        }
    }
}

mod data_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(de::Error::custom)
    }
}
