use async_trait::async_trait;
use tracing::warn;

use crate::error::SessionError;
use crate::session::SessionCycle;
use crate::storage::DocumentStore;

/// Save-handler hooks a host session subsystem calls around each request.
///
/// Only `read` reports a typed failure (a lock timeout must not be mistaken for a
/// fresh session). `write` reports success as a flag; `destroy` and `gc` never fail
/// from the caller's point of view.
#[async_trait]
pub trait SessionHandler: Send {
    async fn open(&mut self) -> bool;

    async fn close(&mut self) -> bool;

    async fn read(&mut self, session_id: &str) -> Result<Vec<u8>, SessionError>;

    async fn write(&mut self, session_id: &str, data: &[u8]) -> bool;

    async fn destroy(&mut self, session_id: &str) -> bool;

    async fn gc(&mut self) -> bool;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> SessionHandler for SessionCycle<S> {
    async fn open(&mut self) -> bool {
        true
    }

    async fn close(&mut self) -> bool {
        self.reset();
        true
    }

    async fn read(&mut self, session_id: &str) -> Result<Vec<u8>, SessionError> {
        SessionCycle::read(self, session_id).await
    }

    async fn write(&mut self, session_id: &str, data: &[u8]) -> bool {
        match SessionCycle::write(self, session_id, data).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Session write failed: {}", e);
                false
            }
        }
    }

    async fn destroy(&mut self, session_id: &str) -> bool {
        if let Err(e) = SessionCycle::destroy(self, session_id).await {
            warn!("Session destroy for {} failed: {}", session_id, e);
        }
        true
    }

    async fn gc(&mut self) -> bool {
        if let Err(e) = SessionCycle::gc(self).await {
            warn!("Session gc failed: {}", e);
        }
        true
    }
}
