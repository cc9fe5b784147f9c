//! Storage layer for persisting the step graph.
//!
//! The graph is kept as one opaque JSON blob under [`PROCESS_KEY`]. Backends:
//! - `MemStore`: in-memory storage for testing and ephemeral engines
//! - `FileStore`: one JSON file per key in a directory

mod file;
mod mem;
mod store;

use std::error::Error;

use crate::{ReplayflowError, Result};

pub use file::FileStore;
pub use mem::MemStore;
pub use store::Store;

/// Key the step graph is persisted under.
pub const PROCESS_KEY: &str = "replayflow.process";

/// Maps backend errors to ReplayflowError.
fn map_store_err(err: impl Error) -> ReplayflowError {
    ReplayflowError::Store(err.to_string())
}

/// Key-value storage for opaque blobs.
pub trait BlobStore: Send + Sync {
    /// Returns the blob stored under `key`, `None` when there is none.
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous blob.
    fn put(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// Removes the blob; returns whether one existed.
    fn delete(
        &self,
        key: &str,
    ) -> Result<bool>;
}
