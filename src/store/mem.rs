use tracing::trace;

use crate::{Result, common::MemCache, store::BlobStore};

const MEM_STORE_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct MemStore {
    blobs: MemCache<String, String>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            blobs: MemCache::new(MEM_STORE_CAPACITY),
        }
    }
}

impl BlobStore for MemStore {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        Ok(self.blobs.get(&key.to_string()))
    }

    fn put(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        trace!(key, len = value.len(), "mem store put");
        self.blobs.set(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        let key = key.to_string();
        let existed = self.blobs.contains(&key);
        self.blobs.remove(&key);
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_store() {
        let store = MemStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.put("k", "v1").unwrap();
        store.put("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
    }
}
