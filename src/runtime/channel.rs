use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::broadcast;

use crate::{
    ReplayflowError, Result, ShareLock,
    common::BroadcastQueue,
    events::{Event, GraphEvent, ReplayStatus, StepEvent},
};

/// Handlers run on the publishing thread; the list is copied first so a
/// handler may subscribe or unsubscribe without deadlocking.
macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().unwrap().clone();
        for (_, handle) in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

/// Handle returned by every subscription, used to unsubscribe.
pub type SubscriptionId = u64;

pub type GraphEventHandle = Arc<dyn Fn(&Event<GraphEvent>) + Send + Sync>;
pub type StepEventHandle = Arc<dyn Fn(&Event<StepEvent>) + Send + Sync>;
pub type ReplayStatusHandle = Arc<dyn Fn(&Event<ReplayStatus>) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the node id
    /// eg. nid1*
    pub nid: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            nid: "*".to_string(),
        }
    }
}

impl ChannelOptions {
    pub fn with_nid(nid: &str) -> Self {
        Self {
            nid: nid.to_string(),
        }
    }
}

/// Publish/subscribe hub shared by the graph, the capture window and the
/// replay dispatcher.
pub struct Channel {
    graph: ShareLock<Vec<(SubscriptionId, GraphEventHandle)>>,
    step: ShareLock<Vec<(SubscriptionId, StepEventHandle)>>,
    replay: ShareLock<Vec<(SubscriptionId, ReplayStatusHandle)>>,
    replay_queue: Arc<BroadcastQueue<Event<ReplayStatus>>>,
    next_id: AtomicU64,
}

impl Channel {
    pub(crate) fn new(status_queue_size: usize) -> Self {
        Self {
            graph: Arc::new(RwLock::new(Vec::new())),
            step: Arc::new(RwLock::new(Vec::new())),
            replay: Arc::new(RwLock::new(Vec::new())),
            replay_queue: BroadcastQueue::new(status_queue_size.max(1)),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn emit_graph(
        &self,
        event: GraphEvent,
    ) {
        let e = Event::new(&event);
        dispatch_event!(self.graph, &e);
    }

    pub(crate) fn emit_step(
        &self,
        event: StepEvent,
    ) {
        let e = Event::new(&event);
        dispatch_event!(self.step, &e);
    }

    pub(crate) fn emit_replay(
        &self,
        status: ReplayStatus,
    ) {
        let e = Event::new(&status);
        dispatch_event!(self.replay, &e);
        self.replay_queue.send(e);
    }

    /// Async stream of every replay status published from now on.
    pub fn replay_stream(&self) -> broadcast::Receiver<Event<ReplayStatus>> {
        self.replay_queue.subscribe()
    }

    /// Removes a handler registered through any [`ChannelEvent`] method.
    pub fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> bool {
        let mut removed = false;
        removed |= remove(&self.graph, id);
        removed |= remove(&self.step, id);
        removed |= remove(&self.replay, id);
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.graph.read().unwrap().len() + self.step.read().unwrap().len() + self.replay.read().unwrap().len()
    }
}

fn remove<H>(
    handles: &ShareLock<Vec<(SubscriptionId, H)>>,
    id: SubscriptionId,
) -> bool {
    let mut handles = handles.write().unwrap();
    let before = handles.len();
    handles.retain(|(sid, _)| *sid != id);
    handles.len() != before
}

/// Typed subscription API over a [`Channel`].
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    glob: globset::GlobMatcher,
}

impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        let glob = globset::Glob::new(&options.nid).map_err(|e| ReplayflowError::Validation(format!("invalid node id pattern {}: {}", options.nid, e)))?.compile_matcher();
        Ok(Self {
            channel,
            glob,
        })
    }

    /// Every graph event whose node matches the pattern; events without a
    /// node (save, clear, restore) are always delivered.
    pub fn on_graph_event(
        &self,
        f: impl Fn(&Event<GraphEvent>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let glob = self.glob.clone();
        self.push_graph(Arc::new(move |e| {
            if is_match(&glob, e) {
                f(e);
            }
        }))
    }

    pub fn on_node_created(
        &self,
        f: impl Fn(&Event<GraphEvent>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let glob = self.glob.clone();
        self.push_graph(Arc::new(move |e| {
            if matches!(e.inner(), GraphEvent::NodeCreated { .. }) && is_match(&glob, e) {
                f(e);
            }
        }))
    }

    pub fn on_node_updated(
        &self,
        f: impl Fn(&Event<GraphEvent>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let glob = self.glob.clone();
        self.push_graph(Arc::new(move |e| {
            if matches!(e.inner(), GraphEvent::NodeUpdated { .. }) && is_match(&glob, e) {
                f(e);
            }
        }))
    }

    pub fn on_edge_added(
        &self,
        f: impl Fn(&Event<GraphEvent>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let glob = self.glob.clone();
        self.push_graph(Arc::new(move |e| {
            if matches!(e.inner(), GraphEvent::EdgeAdded { .. }) && is_match(&glob, e) {
                f(e);
            }
        }))
    }

    pub fn on_saved(
        &self,
        f: impl Fn(String) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.push_graph(Arc::new(move |e| {
            if let GraphEvent::ProcessSaved {
                key,
            } = e.inner()
            {
                f(key.clone());
            }
        }))
    }

    pub fn on_cleared(
        &self,
        f: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.push_graph(Arc::new(move |e| {
            if matches!(e.inner(), GraphEvent::ProcessCleared) {
                f();
            }
        }))
    }

    pub fn on_step(
        &self,
        f: impl Fn(&Event<StepEvent>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.channel.next_id();
        self.channel.step.write().unwrap().push((id, Arc::new(f)));
        id
    }

    pub fn on_replay_status(
        &self,
        f: impl Fn(&Event<ReplayStatus>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.push_replay(Arc::new(f))
    }

    pub fn on_replay_error(
        &self,
        f: impl Fn(&Event<ReplayStatus>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.push_replay(Arc::new(move |e| {
            if e.is_error() {
                f(e);
            }
        }))
    }

    pub fn on_replay_complete(
        &self,
        f: impl Fn(&Event<ReplayStatus>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.push_replay(Arc::new(move |e| {
            if e.is_terminal() {
                f(e);
            }
        }))
    }

    pub fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> bool {
        self.channel.unsubscribe(id)
    }

    fn push_graph(
        &self,
        handle: GraphEventHandle,
    ) -> SubscriptionId {
        let id = self.channel.next_id();
        self.channel.graph.write().unwrap().push((id, handle));
        id
    }

    fn push_replay(
        &self,
        handle: ReplayStatusHandle,
    ) -> SubscriptionId {
        let id = self.channel.next_id();
        self.channel.replay.write().unwrap().push((id, handle));
        id
    }
}

fn is_match(
    glob: &globset::GlobMatcher,
    e: &Event<GraphEvent>,
) -> bool {
    e.node_id().map(|nid| glob.is_match(nid)).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::model::Edge;

    #[test]
    fn test_glob_filter_and_unsubscribe() {
        let channel = Arc::new(Channel::new(8));
        let events = ChannelEvent::channel(channel.clone(), ChannelOptions::with_nid("step-*")).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let id = events.on_edge_added(move |e| {
            s.lock().unwrap().push(e.node_id().unwrap_or_default().to_string());
        });
        channel.emit_graph(GraphEvent::EdgeAdded {
            edge: Edge::sequence("a", "step-1"),
        });
        channel.emit_graph(GraphEvent::EdgeAdded {
            edge: Edge::sequence("a", "other"),
        });
        assert_eq!(*seen.lock().unwrap(), vec!["step-1".to_string()]);

        assert!(events.unsubscribe(id));
        assert!(!events.unsubscribe(id));
        channel.emit_graph(GraphEvent::EdgeAdded {
            edge: Edge::sequence("a", "step-2"),
        });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_glob() {
        let channel = Arc::new(Channel::new(8));
        assert!(ChannelEvent::channel(channel, ChannelOptions::with_nid("[")).is_err());
    }

    #[tokio::test]
    async fn test_replay_stream_and_handlers() {
        let channel = Arc::new(Channel::new(8));
        let events = ChannelEvent::channel(channel.clone(), ChannelOptions::default()).unwrap();
        let completes = Arc::new(AtomicUsize::new(0));
        let c = completes.clone();
        events.on_replay_complete(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let mut stream = channel.replay_stream();

        channel.emit_replay(ReplayStatus::Resumed {
            index: 0,
        });
        channel.emit_replay(ReplayStatus::Completed {
            executed: 1,
            failed: 0,
            elapsed_ms: 10,
        });

        assert_eq!(completes.load(Ordering::SeqCst), 1);
        assert_eq!(stream.recv().await.unwrap().str(), "Resumed");
        assert!(stream.recv().await.unwrap().is_terminal());
    }
}
