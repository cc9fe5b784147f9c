//! Replayflow engine - the main entry point.
//!
//! The engine wires the collaborators together:
//! - Capture: raw events are grouped by the recorder and appended to the graph
//! - Replay: the graph is frozen and played back against a target
//! - Persistence: the graph is saved to the store, on demand or by the monitor
//! - Events: everything is published on one channel

mod monitor;

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

use crate::{
    Config, ReplayflowError, Result, ShareLock,
    capture::{Recorded, Recorder, StepAggregator},
    events::{GraphEvent, StepEvent},
    graph::StepGraph,
    model::{Branch, ExportDocument, ExportFormat, NodeDraft, NodeId, NodePatch, RawEvent, SessionState, TargetContext},
    replay::{ReplayEngine, ReplayOptions, ReplayOutcome, ReplayState, ReplayTarget},
    runtime::{Channel, ChannelEvent, ChannelOptions},
    selector::SelectorResolver,
    store::{PROCESS_KEY, Store},
    utils::time::time_millis,
};

use monitor::Monitor;

/// How an open step window is closed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EndStepMode {
    /// keep the window as one step node
    Step,
    /// keep it as a decision point with the given branches
    Decision {
        reason_text: String,
        branches: Vec<Branch>,
    },
    /// drop everything captured in the window
    Discard,
}

/// The capture and replay engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// engine.launch()?;
///
/// engine.start_capture()?;
/// engine.start_step("Log in")?;
/// engine.record(event)?;
/// engine.end_step(EndStepMode::Step, TargetContext::application("Google Chrome"))?;
/// engine.stop_capture()?;
///
/// engine.start_replay(&ReplayOptions::default(), target)?;
/// let outcome = engine.wait_replay().await?;
/// ```
pub struct Engine {
    config: Config,
    /// Event channel for graph, step and replay events.
    channel: Arc<Channel>,
    graph: StepGraph,
    recorder: ShareLock<Recorder>,
    replay: ReplayEngine,
    resolver: SelectorResolver,
    store: Store,
    /// Autosaves the graph while the engine runs.
    monitor: Monitor,

    running: Arc<AtomicBool>,
    /// Runtime owned by the engine when none was supplied.
    _runtime: Option<Arc<Runtime>>,
}

impl Engine {
    pub(crate) fn new(
        config: Config,
        store: Store,
        handle: Handle,
        runtime: Option<Arc<Runtime>>,
    ) -> Self {
        let channel = Arc::new(Channel::new(config.replay.status_queue_size));
        let graph = StepGraph::new(channel.clone(), config.capture.history_limit);
        let monitor = Monitor::new(store.clone(), graph.clone(), channel.clone());

        Self {
            recorder: Arc::new(RwLock::new(Recorder::new(config.capture.clipboard_history))),
            replay: ReplayEngine::new(config.replay.clone(), channel.clone(), handle),
            resolver: SelectorResolver::new(&config.selector),
            channel,
            graph,
            store,
            monitor,
            running: Arc::new(AtomicBool::new(false)),
            _runtime: runtime,
            config,
        }
    }

    /// Starts the autosave monitor when it is enabled.
    pub fn launch(&self) -> Result<()> {
        if self.running.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        if self.config.store.autosave {
            self.monitor.monitor()?;
        }
        info!(autosave = self.config.store.autosave, "engine launched");
        Ok(())
    }

    /// Stops a running replay and the monitor.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }
        if self.replay.is_active() {
            let _ = self.replay.stop();
        }
        self.monitor.stop();
        info!("engine shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    /// Subscription handle filtered by `options`.
    pub fn events(
        &self,
        options: ChannelOptions,
    ) -> Result<ChannelEvent> {
        ChannelEvent::channel(self.channel.clone(), options)
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn resolver(&self) -> &SelectorResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn ensure_not_replaying(&self) -> Result<()> {
        if self.replay.is_active() {
            return Err(ReplayflowError::Busy("a replay is running".to_string()));
        }
        Ok(())
    }

    pub fn start_capture(&self) -> Result<()> {
        self.ensure_not_replaying()?;
        self.recorder.write().unwrap().start()
    }

    /// Stops capturing. A step window that is still open is kept as a step node.
    pub fn stop_capture(&self) -> Result<Option<NodeId>> {
        let open = self.recorder.write().unwrap().stop();
        match open {
            Some(window) => self.close_window(window, EndStepMode::Step, TargetContext::default()),
            None => Ok(None),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.recorder.read().unwrap().is_capturing()
    }

    pub fn open_step(&self) -> Option<String> {
        self.recorder.read().unwrap().open_step_name().map(|s| s.to_string())
    }

    pub fn start_step(
        &self,
        name: &str,
    ) -> Result<()> {
        self.ensure_not_replaying()?;
        let at = time_millis();
        self.recorder.write().unwrap().open_step(name, at)?;
        self.channel.emit_step(StepEvent::Started {
            name: name.to_string(),
            at,
        });
        Ok(())
    }

    /// Feeds one raw event. Returns the node id when the event became a node
    /// of its own.
    pub fn record(
        &self,
        event: RawEvent,
    ) -> Result<Option<NodeId>> {
        self.ensure_not_replaying()?;
        let kind = event.kind.name().to_string();
        let (recorded, name) = {
            let mut recorder = self.recorder.write().unwrap();
            let recorded = recorder.record(event)?;
            (recorded, recorder.open_step_name().map(|s| s.to_string()))
        };
        match recorded {
            Recorded::Attached {
                sub_step,
                event_count,
                ..
            } => {
                self.channel.emit_step(StepEvent::EventAdded {
                    name: name.unwrap_or_default(),
                    kind,
                    sub_step,
                    event_count,
                });
                Ok(None)
            }
            Recorded::Standalone(draft) => self.graph.add_node(draft).map(Some),
            Recorded::Ignored => Ok(None),
        }
    }

    /// Closes the open step window.
    pub fn end_step(
        &self,
        mode: EndStepMode,
        context: TargetContext,
    ) -> Result<Option<NodeId>> {
        let window = self.recorder.write().unwrap().take_step().ok_or_else(|| ReplayflowError::Capture("no step window is open".to_string()))?;
        self.close_window(window, mode, context)
    }

    fn close_window(
        &self,
        window: StepAggregator,
        mode: EndStepMode,
        context: TargetContext,
    ) -> Result<Option<NodeId>> {
        let step = window.end(time_millis());
        self.channel.emit_step(StepEvent::Completed {
            step: step.clone(),
        });
        let draft = match mode {
            EndStepMode::Discard => {
                debug!(name = %step.name, events = step.event_count, "step discarded");
                return Ok(None);
            }
            EndStepMode::Step => NodeDraft::step(&step.description, step.sub_steps),
            EndStepMode::Decision {
                reason_text,
                branches,
            } => NodeDraft::decision(&step.description, &reason_text, branches),
        };
        let draft = draft.with_timestamp(step.started_at).with_duration(step.duration_ms).with_context(context);
        self.graph.add_node(draft).map(Some)
    }

    /// Captures an explicitly marked action with the reason the user gave.
    pub fn mark_important(
        &self,
        description: &str,
        reason_text: &str,
        context: TargetContext,
    ) -> Result<NodeId> {
        self.ensure_not_replaying()?;
        self.graph.add_node(NodeDraft::marked(description, reason_text).with_context(context))
    }

    /// Appends an already built node.
    pub fn add_node(
        &self,
        draft: NodeDraft,
    ) -> Result<NodeId> {
        self.graph.add_node(draft)
    }

    pub fn update_node(
        &self,
        id: &str,
        patch: NodePatch,
    ) -> bool {
        self.graph.update_node(id, patch)
    }

    pub fn mark_authentication(
        &self,
        id: &str,
    ) -> bool {
        self.graph.mark_as_authentication(id)
    }

    pub fn set_replay_start_point(
        &self,
        id: &str,
    ) -> bool {
        self.graph.set_replay_start_point(id)
    }

    pub fn clear_replay_start_point(&self) -> bool {
        self.graph.clear_replay_start_point()
    }

    pub fn capture_session(
        &self,
        session: SessionState,
    ) -> Result<()> {
        self.graph.set_session(session)
    }

    pub fn clear_session(&self) -> Result<bool> {
        self.graph.clear_session()
    }

    /// Starts replaying the graph against `target`.
    pub fn start_replay(
        &self,
        options: &ReplayOptions,
        target: Arc<dyn ReplayTarget>,
    ) -> Result<String> {
        if let Some(name) = self.open_step() {
            return Err(ReplayflowError::Busy(format!("step {} is still being captured", name)));
        }
        self.replay.start(&self.graph, options, target)
    }

    pub fn pause_replay(&self) -> Result<()> {
        self.replay.pause()
    }

    pub fn resume_replay(&self) -> Result<()> {
        self.replay.resume()
    }

    pub fn stop_replay(&self) -> Result<()> {
        self.replay.stop()
    }

    pub fn next_replay_step(&self) -> Result<()> {
        self.replay.next_step()
    }

    pub fn replay_state(&self) -> ReplayState {
        self.replay.state()
    }

    pub async fn wait_replay(&self) -> Result<ReplayOutcome> {
        self.replay.wait().await
    }

    pub fn export(
        &self,
        format: ExportFormat,
    ) -> ExportDocument {
        self.graph.export_for_automation(format)
    }

    pub fn undo(&self) -> bool {
        self.graph.undo()
    }

    pub fn redo(&self) -> bool {
        self.graph.redo()
    }

    /// Persists the graph under [`PROCESS_KEY`].
    pub fn save(&self) -> Result<()> {
        self.store.save_snapshot(&self.graph.snapshot())?;
        self.channel.emit_graph(GraphEvent::ProcessSaved {
            key: PROCESS_KEY.to_string(),
        });
        Ok(())
    }

    /// Restores the persisted graph; `false` when nothing was saved.
    pub fn load(&self) -> Result<bool> {
        self.ensure_not_replaying()?;
        match self.store.load_snapshot()? {
            Some(snapshot) => {
                self.graph.restore(snapshot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resets the graph; not allowed while capturing or replaying.
    pub fn clear(&self) -> Result<()> {
        self.ensure_not_replaying()?;
        if self.is_capturing() {
            return Err(ReplayflowError::Busy("capture is running".to_string()));
        }
        self.graph.clear()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        EngineBuilder, StoreType,
        dom::Document,
        model::{NodeKind, RawEventKind},
        replay::DocumentTarget,
    };

    fn engine() -> Engine {
        EngineBuilder::new().build().unwrap()
    }

    fn click(
        at: i64,
        label: &str,
    ) -> RawEvent {
        RawEvent::new(
            at,
            RawEventKind::Click {
                locator: None,
                label: label.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_step_window_becomes_a_node() {
        let engine = engine();
        let steps = Arc::new(Mutex::new(Vec::new()));
        let s = steps.clone();
        engine.events(ChannelOptions::default()).unwrap().on_step(move |e| {
            s.lock().unwrap().push(e.str().to_string());
        });

        assert!(engine.start_step("too early").is_err());
        engine.start_capture().unwrap();
        engine.start_step("Search").unwrap();
        let now = time_millis();
        assert_eq!(engine.record(click(now, "search box")).unwrap(), None);
        assert_eq!(
            engine
                .record(RawEvent::new(
                    now + 1,
                    RawEventKind::KeyInput {
                        text: "rust".to_string(),
                    },
                ))
                .unwrap(),
            None
        );
        let id = engine.end_step(EndStepMode::Step, TargetContext::application("Firefox")).unwrap().unwrap();

        let node = engine.graph().get(&id).unwrap();
        assert_eq!(node.description, "Search (1 click, 1 key input)");
        assert_eq!(node.sub_steps().len(), 1);
        assert_eq!(node.context.application_name.as_deref(), Some("Firefox"));
        assert_eq!(*steps.lock().unwrap(), vec!["Started", "EventAdded", "EventAdded", "Completed"]);
        assert!(engine.end_step(EndStepMode::Step, TargetContext::default()).is_err());
    }

    #[tokio::test]
    async fn test_events_outside_a_window_stand_alone() {
        let engine = engine();
        engine.start_capture().unwrap();
        let id = engine.record(click(10, "Sign in")).unwrap().unwrap();
        assert_eq!(engine.graph().get(&id).unwrap().description, "Click Sign in");

        engine.start_step("Unfinished").unwrap();
        engine.record(click(time_millis(), "next")).unwrap();
        let closed = engine.stop_capture().unwrap().unwrap();
        assert!(matches!(engine.graph().get(&closed).unwrap().kind, NodeKind::Step { .. }));
        assert_eq!(engine.graph().len(), 2);
    }

    #[tokio::test]
    async fn test_decision_and_discard() {
        let engine = engine();
        engine.start_capture().unwrap();
        engine.start_step("Check stock").unwrap();
        let branches = vec![Branch::new("in stock", "ship"), Branch::new("out of stock", "backorder")];
        let decision = engine
            .end_step(
                EndStepMode::Decision {
                    reason_text: "If the item is in stock, then ship it".to_string(),
                    branches,
                },
                TargetContext::default(),
            )
            .unwrap()
            .unwrap();
        assert!(engine.graph().get(&decision).unwrap().is_decision());

        engine.start_step("Noise").unwrap();
        assert_eq!(engine.end_step(EndStepMode::Discard, TargetContext::default()).unwrap(), None);
        assert_eq!(engine.graph().len(), 1);

        let marked = engine.mark_important("Approve invoice", "needs manager sign-off", TargetContext::default()).unwrap();
        assert!(matches!(engine.graph().get(&marked).unwrap().kind, NodeKind::MarkedAction { .. }));
    }

    #[tokio::test]
    async fn test_capture_and_replay_exclude_each_other() {
        let engine = engine();
        engine.start_capture().unwrap();
        engine.record(click(0, "one")).unwrap();
        engine.start_step("open window").unwrap();
        let target = Arc::new(DocumentTarget::new(Document::new()));
        assert!(matches!(engine.start_replay(&ReplayOptions::default(), target.clone()), Err(ReplayflowError::Busy(_))));

        engine.end_step(EndStepMode::Discard, TargetContext::default()).unwrap();
        engine.start_replay(&ReplayOptions::default().step_through(), target).unwrap();
        assert!(matches!(engine.start_step("during replay"), Err(ReplayflowError::Busy(_))));
        assert!(matches!(engine.record(click(1, "two")), Err(ReplayflowError::Busy(_))));
        assert!(matches!(engine.clear(), Err(ReplayflowError::Busy(_))));

        engine.stop_replay().unwrap();
        let outcome = engine.wait_replay().await.unwrap();
        assert_eq!(outcome.state, ReplayState::Stopped);
        assert!(engine.record(click(2, "three")).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_autosave_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.store_type = StoreType::File;
        config.store.path = Some(dir.path().to_string_lossy().to_string());

        let engine = EngineBuilder::new().config(config.clone()).build().unwrap();
        engine.launch().unwrap();
        let saved = Arc::new(Mutex::new(Vec::new()));
        let s = saved.clone();
        engine.events(ChannelOptions::default()).unwrap().on_saved(move |key| {
            s.lock().unwrap().push(key);
        });
        let id = engine.add_node(NodeDraft::action("open the ledger")).unwrap();
        engine.mark_authentication(&id);
        let before_session = saved.lock().unwrap().len();
        engine.capture_session(SessionState::new("https://ledger.example.com", 0, serde_json::json!({ "token": "t" }))).unwrap();
        assert_eq!(saved.lock().unwrap().len(), before_session + 1);
        assert_eq!(saved.lock().unwrap().first().map(|s| s.as_str()), Some(PROCESS_KEY));
        drop(engine);

        let restored = EngineBuilder::new().config(config).build().unwrap();
        assert!(restored.load().unwrap());
        assert_eq!(restored.graph().len(), 1);
        assert!(restored.graph().get(&id).unwrap().metadata.is_authentication_step);
        assert!(restored.graph().session().is_some());
    }

    #[tokio::test]
    async fn test_load_without_saved_graph() {
        let engine = engine();
        assert!(!engine.load().unwrap());
        engine.add_node(NodeDraft::action("a")).unwrap();
        engine.clear().unwrap();
        assert!(engine.graph().is_empty());
        assert!(engine.undo());
        assert_eq!(engine.graph().len(), 1);
    }
}
