use std::sync::{Arc, RwLock};

use tracing::{trace, warn};

use crate::{
    Result, ShareLock,
    events::GraphEvent,
    graph::StepGraph,
    runtime::{Channel, ChannelEvent, ChannelOptions, SubscriptionId},
    store::{PROCESS_KEY, Store},
};

/// Persists the graph after every mutation.
pub struct Monitor {
    store: Store,
    graph: StepGraph,
    channel: Arc<Channel>,

    subscription: ShareLock<Option<SubscriptionId>>,
}

impl Monitor {
    pub fn new(
        store: Store,
        graph: StepGraph,
        channel: Arc<Channel>,
    ) -> Self {
        Self {
            store,
            graph,
            channel,
            subscription: Arc::new(RwLock::new(None)),
        }
    }

    pub fn monitor(&self) -> Result<()> {
        let mut subscription = self.subscription.write().unwrap();
        if subscription.is_some() {
            return Ok(());
        }

        let store = self.store.clone();
        let graph = self.graph.clone();
        let channel = self.channel.clone();
        let id = ChannelEvent::channel(self.channel.clone(), ChannelOptions::default())?.on_graph_event(move |e| {
            if !e.is_mutation() {
                return;
            }
            match store.save_snapshot(&graph.snapshot()) {
                Ok(()) => {
                    trace!(event = e.str(), "autosaved");
                    channel.emit_graph(GraphEvent::ProcessSaved {
                        key: PROCESS_KEY.to_string(),
                    });
                }
                Err(err) => warn!(event = e.str(), "autosave failed: {}", err),
            }
        });
        *subscription = Some(id);
        Ok(())
    }

    /// Unsubscribes; the handler holds the graph, so this also releases it.
    pub fn stop(&self) {
        if let Some(id) = self.subscription.write().unwrap().take() {
            self.channel.unsubscribe(id);
        }
    }
}
