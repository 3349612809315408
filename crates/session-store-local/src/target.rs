use std::path::PathBuf;
use std::sync::Arc;

use session_store_core::{DocumentStore, MemoryStore, SessionConfig, SessionError, SessionStore};
use tracing::{debug, info};

use crate::file::FileStore;

/// Where a local adapter keeps its collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// `memory://`
    Memory,
    /// `file:///some/dir` or a bare path.
    File(PathBuf),
}

impl ConnectionTarget {
    pub fn parse(target: &str) -> Result<Self, SessionError> {
        let target = target.trim();
        match target.split_once("://") {
            Some(("memory", "")) => Ok(ConnectionTarget::Memory),
            Some(("memory", rest)) => Err(SessionError::Configuration(format!(
                "memory target takes no location, got {:?}",
                rest
            ))),
            Some(("file", "")) => Err(SessionError::Configuration(
                "file target needs a directory".to_string(),
            )),
            Some(("file", path)) => Ok(ConnectionTarget::File(PathBuf::from(path))),
            Some((scheme, _)) => Err(SessionError::Configuration(format!(
                "unsupported connection target scheme: {}",
                scheme
            ))),
            None if target.is_empty() => Err(SessionError::Configuration(
                "empty connection target".to_string(),
            )),
            None => Ok(ConnectionTarget::File(PathBuf::from(target))),
        }
    }
}

impl std::fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionTarget::Memory => write!(f, "memory://"),
            ConnectionTarget::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}

/// Resolve the configured connection target into a document store.
///
/// Local adapters serve exactly one target; credentials are accepted but unused.
pub async fn connect(config: &SessionConfig) -> Result<Arc<dyn DocumentStore>, SessionError> {
    config.validate()?;

    let hosts: Vec<&str> = config
        .hosts
        .iter()
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
        .collect();
    let [host] = hosts.as_slice() else {
        return Err(SessionError::Configuration(format!(
            "local stores take exactly one connection target, got {}",
            hosts.len()
        )));
    };

    if config.username.is_some() || config.password.is_some() {
        debug!("Credentials are not used by local stores");
    }

    let target = ConnectionTarget::parse(host)?;
    info!("Connecting session store to {}", target);

    let store: Arc<dyn DocumentStore> = match target {
        ConnectionTarget::Memory => Arc::new(MemoryStore::new()),
        ConnectionTarget::File(root) => Arc::new(
            FileStore::open(&root, &config.database, &config.collection, config.persistent)
                .await
                .map_err(|e| {
                    SessionError::Configuration(format!(
                        "Can't open session store at {}: {}",
                        root.display(),
                        e
                    ))
                })?,
        ),
    };
    Ok(store)
}

/// Connect and declare indexes: a ready-to-use session store.
pub async fn open_session_store(config: &SessionConfig) -> Result<SessionStore, SessionError> {
    let store = connect(config).await?;
    SessionStore::connect(config, store).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            ConnectionTarget::parse("memory://").unwrap(),
            ConnectionTarget::Memory
        );
        assert_eq!(
            ConnectionTarget::parse("file:///var/lib/sessions").unwrap(),
            ConnectionTarget::File(PathBuf::from("/var/lib/sessions"))
        );
        assert_eq!(
            ConnectionTarget::parse(" ./data ").unwrap(),
            ConnectionTarget::File(PathBuf::from("./data"))
        );

        for bad in ["mongodb://localhost:27017", "memory://x", "file://", ""] {
            assert!(
                matches!(ConnectionTarget::parse(bad), Err(SessionError::Configuration(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let config = SessionConfig::new("session", "session", "memory://");
        let store = connect(&config).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_connect_rejects_several_targets() {
        let mut config = SessionConfig::new("session", "session", "memory://");
        config.hosts.push("memory://".to_string());

        let err = connect(&config).await.err().unwrap();
        assert!(matches!(err, SessionError::Configuration(ref m) if m.contains("exactly one")));
    }

    #[tokio::test]
    async fn test_connect_requires_database() {
        let config = SessionConfig::new("", "session", "memory://");
        assert!(matches!(
            connect(&config).await.err().unwrap(),
            SessionError::Configuration(_)
        ));
    }

    #[tokio::test]
    async fn test_open_session_store_on_files() {
        let temp_dir = TempDir::new().unwrap();
        let target = format!("file://{}", temp_dir.path().display());
        let config = SessionConfig::new("session", "session", target).with_lifetime(60);

        let sessions = open_session_store(&config).await.unwrap();
        assert_eq!(sessions.backend_name(), "file");

        sessions.cycle().write("abc", b"on disk").await.unwrap();

        // A second store over the same directory sees the write.
        let other = open_session_store(&config).await.unwrap();
        assert_eq!(other.cycle().read("abc").await.unwrap(), b"on disk");

        let raw = std::fs::read_to_string(temp_dir.path().join("session/session.json")).unwrap();
        assert!(raw.contains("\"session_id\""));
    }
}
