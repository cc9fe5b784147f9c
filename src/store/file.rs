use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::trace;

use crate::{
    ReplayflowError, Result,
    store::{BlobStore, map_store_err},
};

/// Stores each blob as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens the store, creating the directory when missing.
    pub fn new<T: AsRef<Path>>(dir: T) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(map_store_err)?;
        Ok(Self {
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(
        &self,
        key: &str,
    ) -> Result<PathBuf> {
        let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')) && !key.starts_with('.');
        if !valid {
            return Err(ReplayflowError::Validation(format!("invalid store key {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl BlobStore for FileStore {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_store_err(e)),
        }
    }

    fn put(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let path = self.path(key)?;
        // write then rename so readers never see a partial blob
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(map_store_err)?;
        fs::rename(&tmp, &path).map_err(map_store_err)?;
        trace!(path = %path.display(), len = value.len(), "file store put");
        Ok(())
    }

    fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        let path = self.path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_store_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PROCESS_KEY;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested")).unwrap();
        assert_eq!(store.get(PROCESS_KEY).unwrap(), None);

        store.put(PROCESS_KEY, "{\"nodes\":[]}").unwrap();
        assert!(dir.path().join("nested").join("replayflow.process.json").exists());
        assert_eq!(store.get(PROCESS_KEY).unwrap().as_deref(), Some("{\"nodes\":[]}"));

        // a second store on the same directory sees the blob
        let reopened = FileStore::new(store.dir()).unwrap();
        assert!(reopened.get(PROCESS_KEY).unwrap().is_some());

        assert!(store.delete(PROCESS_KEY).unwrap());
        assert!(!store.delete(PROCESS_KEY).unwrap());
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(store.put(key, "x"), Err(ReplayflowError::Validation(_))));
        }
    }
}
