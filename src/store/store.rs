use std::sync::Arc;

use tracing::trace;

use crate::{
    ReplayflowError, Result,
    config::{StoreConfig, StoreType},
    graph::GraphSnapshot,
    store::{BlobStore, FileStore, MemStore, PROCESS_KEY},
};

/// Typed access to the persisted step graph over any [`BlobStore`].
#[derive(Clone)]
pub struct Store {
    blobs: Arc<dyn BlobStore>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Arc::new(MemStore::new()))
    }
}

impl Store {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let blobs: Arc<dyn BlobStore> = match config.store_type {
            StoreType::Mem => Arc::new(MemStore::new()),
            StoreType::File => {
                let path = config.path.as_ref().ok_or_else(|| ReplayflowError::Config("file store requires store.path".to_string()))?;
                Arc::new(FileStore::new(path)?)
            }
        };
        Ok(Self::new(blobs))
    }

    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        self.blobs.clone()
    }

    pub fn save_snapshot(
        &self,
        snapshot: &GraphSnapshot,
    ) -> Result<()> {
        let data = snapshot.to_json()?;
        trace!(key = PROCESS_KEY, nodes = snapshot.nodes.len(), "save snapshot");
        self.blobs.put(PROCESS_KEY, &data)
    }

    /// The persisted graph; `None` means no prior session.
    pub fn load_snapshot(&self) -> Result<Option<GraphSnapshot>> {
        match self.blobs.get(PROCESS_KEY)? {
            Some(data) => Ok(Some(GraphSnapshot::from_json(&data)?)),
            None => Ok(None),
        }
    }

    pub fn clear_snapshot(&self) -> Result<bool> {
        self.blobs.delete(PROCESS_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_blob_means_no_session() {
        let store = Store::default();
        assert_eq!(store.load_snapshot().unwrap(), None);
        store.blobs().put(PROCESS_KEY, "not json").unwrap();
        assert!(matches!(store.load_snapshot(), Err(ReplayflowError::Convert(_))));
    }

    #[test]
    fn test_from_config() {
        let mut config = StoreConfig {
            store_type: StoreType::File,
            ..Default::default()
        };
        assert!(Store::from_config(&config).is_err());

        let dir = tempfile::tempdir().unwrap();
        config.path = Some(dir.path().to_string_lossy().to_string());
        let store = Store::from_config(&config).unwrap();
        store.save_snapshot(&GraphSnapshot::default()).unwrap();
        assert_eq!(store.load_snapshot().unwrap(), Some(GraphSnapshot::default()));
        assert!(store.clear_snapshot().unwrap());
    }
}
