use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{
    Config, Engine, ReplayflowError, Result,
    store::{BlobStore, Store},
};

pub struct EngineBuilder {
    config: Config,
    async_worker_thread_number: u16,
    rt: Option<Handle>,
    blobs: Option<Arc<dyn BlobStore>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            async_worker_thread_number: 2,
            rt: None,
            blobs: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    /// Worker threads of the runtime the engine creates when it is built
    /// outside of one.
    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.async_worker_thread_number = n;
        self
    }

    /// Runs replays on an existing runtime.
    pub fn runtime(
        mut self,
        runtime: Handle,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Persists into `blobs` instead of the store named by the config.
    pub fn store(
        mut self,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn build(&self) -> Result<Engine> {
        let store = match &self.blobs {
            Some(blobs) => Store::new(blobs.clone()),
            None => Store::from_config(&self.config.store)?,
        };

        let (handle, owned) = match self.rt.clone().or_else(|| Handle::try_current().ok()) {
            Some(handle) => (handle, None),
            None => {
                let runtime: Arc<Runtime> = Arc::new(
                    Builder::new_multi_thread()
                        .worker_threads(self.async_worker_thread_number.max(1).into())
                        .enable_all()
                        .build()
                        .map_err(|e| ReplayflowError::Engine(format!("failed to build runtime: {}", e)))?,
                );
                (runtime.handle().clone(), Some(runtime))
            }
        };

        Ok(Engine::new(self.config.clone(), store, handle, owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::GraphSnapshot,
        model::NodeDraft,
        store::{MemStore, PROCESS_KEY},
    };

    #[test]
    fn test_build_outside_a_runtime() {
        let engine = EngineBuilder::new().async_worker_thread_number(1).build().unwrap();
        engine.launch().unwrap();
        assert!(engine.is_running());
        engine.shutdown();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_custom_blob_store() {
        let blobs = Arc::new(MemStore::new());
        let engine = EngineBuilder::new().store(blobs.clone()).build().unwrap();
        engine.add_node(NodeDraft::action("a")).unwrap();
        engine.save().unwrap();
        let saved = GraphSnapshot::from_json(&blobs.get(PROCESS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(saved.nodes.len(), 1);
    }
}
