use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fs2::FileExt;
use session_store_core::{
    Collection, DocumentStore, FieldSet, IndexSpec, RecordFilter, SessionRecord, StoreError,
    UpdateOutcome,
};
use tracing::{debug, instrument};

/// Filesystem-backed document store.
///
/// One collection is one JSON file:
/// ```text
/// {root}/
///   {database}/
///     {collection}.json
///     {collection}.lock
/// ```
///
/// Every operation takes an exclusive advisory lock on the `.lock` file for its whole
/// read-modify-write, so conditional updates stay atomic across processes sharing
/// the directory. The collection file is replaced via temp file + rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    collection_path: PathBuf,
    lock_path: PathBuf,
    /// Lock-file handle kept open for the life of the store (`persistent` mode).
    shared_lock: Option<Arc<Mutex<File>>>,
}

impl FileStore {
    /// Open (creating directories as needed) the collection under `root`.
    pub async fn open(
        root: impl AsRef<Path>,
        database: &str,
        collection: &str,
        persistent: bool,
    ) -> Result<Self, StoreError> {
        validate_name("database", database)?;
        validate_name("collection", collection)?;

        let dir = root.as_ref().join(database);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            StoreError::Io(format!("Failed to create database dir {}: {}", dir.display(), e))
        })?;

        let collection_path = dir.join(format!("{}.json", collection));
        let lock_path = dir.join(format!("{}.lock", collection));

        let shared_lock = if persistent {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .await
                .map_err(|e| {
                    StoreError::Io(format!("Failed to open {}: {}", lock_path.display(), e))
                })?
                .into_std()
                .await;
            Some(Arc::new(Mutex::new(file)))
        } else {
            None
        };

        debug!(
            "Opened file store {} (persistent: {})",
            collection_path.display(),
            persistent
        );
        Ok(Self {
            collection_path,
            lock_path,
            shared_lock,
        })
    }

    /// Path of the collection file.
    pub fn collection_path(&self) -> &Path {
        &self.collection_path
    }

    /// Run `op` against the collection under the exclusive lock.
    ///
    /// `op` returns its value and whether the collection must be written back.
    async fn with_collection<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Collection) -> Result<(T, bool), StoreError> + Send + 'static,
    {
        let collection_path = self.collection_path.clone();
        let lock_path = self.lock_path.clone();
        let shared_lock = self.shared_lock.clone();

        tokio::task::spawn_blocking(move || match shared_lock {
            Some(shared) => {
                // flock is per open file, so threads sharing one handle need the mutex too
                let file = shared
                    .lock()
                    .map_err(|_| StoreError::Internal("lock file mutex poisoned".to_string()))?;
                run_locked(&file, &collection_path, op)
            }
            None => {
                let file = open_lock_file(&lock_path)?;
                run_locked(&file, &collection_path, op)
            }
        })
        .await
        .map_err(|e| StoreError::Internal(format!("File store task failed: {}", e)))?
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "invalid {} name: {:?}",
            kind, name
        )))
    }
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| StoreError::Io(format!("Failed to open {}: {}", path.display(), e)))
}

fn run_locked<T, F>(lock_file: &File, path: &Path, op: F) -> Result<T, StoreError>
where
    F: FnOnce(&mut Collection) -> Result<(T, bool), StoreError>,
{
    FileExt::lock_exclusive(lock_file)
        .map_err(|e| StoreError::Io(format!("Failed to lock {}: {}", path.display(), e)))?;

    let result = read_collection(path).and_then(|mut collection| {
        let (value, dirty) = op(&mut collection)?;
        if dirty {
            write_collection(path, &collection)?;
        }
        Ok(value)
    });

    if let Err(e) = FileExt::unlock(lock_file) {
        debug!("Failed to unlock {}: {}", path.display(), e);
    }
    result
}

fn read_collection(path: &Path) -> Result<Collection, StoreError> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(Collection::default()),
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Collection::default()),
        Err(e) => Err(StoreError::Io(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn write_collection(path: &Path, collection: &Collection) -> Result<(), StoreError> {
    let content = serde_json::to_vec_pretty(collection).map_err(|e| {
        StoreError::Serialization(format!("Failed to serialize collection: {}", e))
    })?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content).map_err(|e| {
        StoreError::Io(format!("Failed to write {}: {}", temp_path.display(), e))
    })?;
    fs::rename(&temp_path, path).map_err(|e| {
        StoreError::Io(format!("Failed to rename {}: {}", temp_path.display(), e))
    })?;
    Ok(())
}

#[async_trait]
impl DocumentStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    #[instrument(skip(self), level = "debug")]
    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<SessionRecord>, StoreError> {
        let filter = filter.clone();
        self.with_collection(move |collection| Ok((collection.find_one(&filter), false)))
            .await
    }

    #[instrument(skip(self, fields), level = "debug")]
    async fn update_one(
        &self,
        filter: &RecordFilter,
        fields: &FieldSet,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        let filter = filter.clone();
        let fields = fields.clone();
        let outcome = self
            .with_collection(move |collection| {
                let outcome = collection.update_one(&filter, &fields, upsert)?;
                let dirty = outcome.matched > 0 || outcome.upserted;
                Ok((outcome, dirty))
            })
            .await?;
        debug!(
            "update_one matched {} (upserted: {})",
            outcome.matched, outcome.upserted
        );
        Ok(outcome)
    }

    #[instrument(skip(self, fields), level = "debug")]
    async fn update_many(
        &self,
        filter: &RecordFilter,
        fields: &FieldSet,
    ) -> Result<u64, StoreError> {
        let filter = filter.clone();
        let fields = fields.clone();
        self.with_collection(move |collection| {
            let matched = collection.update_many(&filter, &fields);
            Ok((matched, matched > 0))
        })
        .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let filter = filter.clone();
        self.with_collection(move |collection| {
            let deleted = collection.delete(&filter);
            Ok((deleted, deleted > 0))
        })
        .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn ensure_index(&self, index: &IndexSpec) -> Result<(), StoreError> {
        let index = index.clone();
        self.with_collection(move |collection| {
            let created = collection.ensure_index(&index)?;
            Ok(((), created))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup(persistent: bool) -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path(), "session", "session", persistent)
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let (store, _temp) = setup(false).await;

        let found = store.find_one(&RecordFilter::by_session("abc")).await.unwrap();
        assert!(found.is_none());
        assert!(!store.collection_path().exists());
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let (store, _temp) = setup(false).await;
        store.ensure_index(&IndexSpec::session_id()).await.unwrap();

        let outcome = store
            .update_one(
                &RecordFilter::by_session("abc"),
                &FieldSet::session_write(b"X", 10),
                true,
            )
            .await
            .unwrap();
        assert!(outcome.upserted);

        let found = store
            .find_one(&RecordFilter::by_session("abc").live_at(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.data, b"X");
        assert_eq!(found.expiry, 10);
        assert!(found.doc_id.is_some());
    }

    #[tokio::test]
    async fn test_document_on_disk() {
        let (store, _temp) = setup(false).await;
        store.ensure_index(&IndexSpec::expiry()).await.unwrap();
        store
            .update_one(
                &RecordFilter::by_session("abc"),
                &FieldSet::session_write(b"X", 10),
                true,
            )
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.collection_path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(json["indexes"][0]["name"], "expiry");
        assert_eq!(json["indexes"][0]["sparse"], true);
        let record = &json["records"][0];
        assert_eq!(record["session_id"], "abc");
        assert_eq!(record["data"], "WA==");
        assert_eq!(record["lock"], 0);
        assert_eq!(record["active"], 1);
        assert_eq!(record["expiry"], 10);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(temp_dir.path(), "db", "sessions", false)
                .await
                .unwrap();
            store
                .update_one(
                    &RecordFilter::by_session("abc"),
                    &FieldSet::session_write(b"kept", 100),
                    true,
                )
                .await
                .unwrap();
        }

        let reopened = FileStore::open(temp_dir.path(), "db", "sessions", true)
            .await
            .unwrap();
        let found = reopened
            .find_one(&RecordFilter::by_session("abc"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.data, b"kept");
    }

    #[tokio::test]
    async fn test_conditional_update_across_handles() {
        let temp_dir = TempDir::new().unwrap();
        let a = FileStore::open(temp_dir.path(), "db", "c", false).await.unwrap();
        let b = FileStore::open(temp_dir.path(), "db", "c", true).await.unwrap();

        a.update_one(
            &RecordFilter::by_session("abc"),
            &FieldSet::session_write(b"", 100),
            true,
        )
        .await
        .unwrap();

        let filter = RecordFilter::by_session("abc").unlocked();
        let lock = FieldSet::lock();
        let (first, second) = tokio::join!(
            a.update_one(&filter, &lock, false),
            b.update_one(&filter, &lock, false),
        );
        let matched = first.unwrap().matched + second.unwrap().matched;
        assert_eq!(matched, 1);
    }

    #[tokio::test]
    async fn test_update_many_and_delete() {
        let (store, _temp) = setup(true).await;
        for (id, expiry) in [("a", 5), ("b", 50)] {
            store
                .update_one(
                    &RecordFilter::by_session(id),
                    &FieldSet::session_write(b"", expiry),
                    true,
                )
                .await
                .unwrap();
        }

        let matched = store
            .update_many(&RecordFilter::expired_before(10), &FieldSet::deactivate())
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let a = store
            .find_one(&RecordFilter::by_session("a"))
            .await
            .unwrap()
            .unwrap();
        assert!(!a.active);

        assert_eq!(store.delete(&RecordFilter::by_session("a")).await.unwrap(), 1);
        assert_eq!(store.delete(&RecordFilter::by_session("a")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupted_collection() {
        let (store, _temp) = setup(false).await;
        std::fs::write(store.collection_path(), b"not json").unwrap();

        let err = store
            .find_one(&RecordFilter::by_session("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let temp_dir = TempDir::new().unwrap();
        for (db, coll) in [("../x", "c"), ("db", "a/b"), ("..", "c"), ("db", "")] {
            let err = FileStore::open(temp_dir.path(), db, coll, false)
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidArgument(_)));
        }
    }
}
