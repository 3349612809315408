//! Local document store adapters for session persistence.
//!
//! - `FileStore`: one JSON file per collection, guarded by an `fs2` advisory lock so
//!   several processes can share a directory
//! - `connect`: resolves a configured connection target (`memory://`, `file://...`
//!   or a bare path) into a `DocumentStore`

mod file;
mod target;

pub use file::FileStore;
pub use target::{connect, open_session_store, ConnectionTarget};
