use std::sync::{Arc, RwLock};

use tokio::{runtime::Handle, task::JoinHandle};
use tracing::info;

use crate::{
    ReplayflowError, Result, ShareLock,
    common::Queue,
    config::ReplayConfig,
    events::ReplayStatus,
    graph::StepGraph,
    replay::{
        ReplayCommand, ReplayOptions, ReplayState,
        dispatcher::{ReplayDispatcher, ReplayOutcome},
        session::{ReplaySession, filter_steps},
        target::ReplayTarget,
    },
    runtime::Channel,
};

struct ActiveReplay {
    session_id: String,
    command_queue: Arc<Queue<ReplayCommand>>,
    handle: Option<JoinHandle<ReplayOutcome>>,
}

/// Starts replays and forwards control commands to the running one.
///
/// Commands are checked against the published state before they are queued,
/// so an invalid command fails here and never reaches the dispatcher.
pub struct ReplayEngine {
    config: ReplayConfig,
    state: ShareLock<ReplayState>,
    active: ShareLock<Option<ActiveReplay>>,
    channel: Arc<Channel>,
    runtime: Handle,
}

impl ReplayEngine {
    pub fn new(
        config: ReplayConfig,
        channel: Arc<Channel>,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ReplayState::Idle)),
            active: Arc::new(RwLock::new(None)),
            channel,
            runtime,
        }
    }

    pub fn state(&self) -> ReplayState {
        *self.state.read().unwrap()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Id of the current or last replay session.
    pub fn session_id(&self) -> Option<String> {
        self.active.read().unwrap().as_ref().map(|a| a.session_id.clone())
    }

    /// Freezes `graph`, builds the session and spawns its dispatcher.
    pub fn start(
        &self,
        graph: &StepGraph,
        options: &ReplayOptions,
        target: Arc<dyn ReplayTarget>,
    ) -> Result<String> {
        let speed = options.effective_speed(&self.config)?;
        let continue_on_error = options.effective_continue_on_error(&self.config);

        let mut active = self.active.write().unwrap();
        if self.is_active() {
            return Err(ReplayflowError::Busy("a replay is already running".to_string()));
        }
        let snapshot = graph.begin_replay()?;
        *self.state.write().unwrap() = ReplayState::Starting;

        let steps = filter_steps(&snapshot);
        let session = ReplaySession::new(steps, speed, options.step_through, continue_on_error, std::time::Duration::from_millis(self.config.max_step_wait_ms));
        let session_id = session.id().to_string();
        let total = session.total();
        info!(session = %session_id, total, speed, step_through = options.step_through, "replay started");

        self.channel.emit_replay(ReplayStatus::Started {
            session_id: session_id.clone(),
            total,
            speed,
            step_through: options.step_through,
        });
        if options.step_through && total > 0 {
            *self.state.write().unwrap() = ReplayState::WaitingForNext;
            self.channel.emit_replay(ReplayStatus::WaitingForNext {
                index: 0,
            });
        } else {
            *self.state.write().unwrap() = ReplayState::Playing;
        }

        let command_queue = Queue::new(self.config.command_queue_size.max(1));
        let dispatcher = ReplayDispatcher::new(session, target, command_queue.clone(), self.state.clone(), graph.clone(), self.channel.clone());
        let handle = self.runtime.spawn(dispatcher.run());

        *active = Some(ActiveReplay {
            session_id: session_id.clone(),
            command_queue,
            handle: Some(handle),
        });
        Ok(session_id)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(ReplayCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(ReplayCommand::Resume)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(ReplayCommand::Stop)
    }

    pub fn next_step(&self) -> Result<()> {
        self.send(ReplayCommand::Next)
    }

    fn send(
        &self,
        cmd: ReplayCommand,
    ) -> Result<()> {
        let active = self.active.read().unwrap();
        cmd.transition(self.state())?;
        match active.as_ref() {
            Some(replay) => replay.command_queue.send(cmd),
            None => Err(ReplayflowError::InvalidTransition {
                state: ReplayState::Idle.as_ref().to_string(),
                command: cmd.as_ref().to_string(),
            }),
        }
    }

    /// Waits for the current replay to end.
    pub async fn wait(&self) -> Result<ReplayOutcome> {
        let handle = self.active.write().unwrap().as_mut().and_then(|a| a.handle.take());
        match handle {
            Some(handle) => handle.await.map_err(|e| ReplayflowError::Engine(format!("replay task failed: {}", e))),
            None => Err(ReplayflowError::Engine("no replay to wait for".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use tokio::time::{Instant, sleep};

    use super::*;
    use crate::{
        dom::Document,
        model::{NodeDraft, SessionState},
        replay::DocumentTarget,
        runtime::{ChannelEvent, ChannelOptions},
        selector::SelectorResolver,
    };

    struct Fixture {
        engine: ReplayEngine,
        graph: StepGraph,
        statuses: Arc<Mutex<Vec<ReplayStatus>>>,
    }

    fn fixture() -> Fixture {
        let channel = Arc::new(Channel::new(64));
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let s = statuses.clone();
        ChannelEvent::channel(channel.clone(), ChannelOptions::default()).unwrap().on_replay_status(move |e| {
            s.lock().unwrap().push(e.inner().clone());
        });
        Fixture {
            engine: ReplayEngine::new(ReplayConfig::default(), channel.clone(), Handle::current()),
            graph: StepGraph::new(channel, 50),
            statuses,
        }
    }

    fn add_steps(
        graph: &StepGraph,
        timestamps: &[i64],
    ) -> Vec<String> {
        timestamps.iter().enumerate().map(|(i, ts)| graph.add_node(NodeDraft::action(&format!("step {}", i + 1)).with_timestamp(*ts)).unwrap()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_scales_waits() {
        let f = fixture();
        add_steps(&f.graph, &[0, 1000, 3000]);
        let target = Arc::new(DocumentTarget::new(Document::new()));

        let t0 = Instant::now();
        f.engine.start(&f.graph, &ReplayOptions::default().with_speed(2.0), target.clone()).unwrap();
        let outcome = f.engine.wait().await.unwrap();

        let at: Vec<Duration> = target.performed().iter().map(|p| p.at - t0).collect();
        assert_eq!(at, vec![Duration::ZERO, Duration::from_millis(500), Duration::from_millis(1500)]);
        assert_eq!(outcome.state, ReplayState::Completed);
        assert_eq!(outcome.executed, 3);
        assert_eq!(outcome.elapsed_ms, 1500);
        assert!(!f.graph.is_frozen());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_speed_doubles_waits() {
        let f = fixture();
        add_steps(&f.graph, &[0, 1000]);
        let target = Arc::new(DocumentTarget::new(Document::new()));

        let t0 = Instant::now();
        f.engine.start(&f.graph, &ReplayOptions::default().with_speed(0.5), target.clone()).unwrap();
        f.engine.wait().await.unwrap();
        assert_eq!(target.performed()[1].at - t0, Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_through_waits_for_next() {
        let f = fixture();
        add_steps(&f.graph, &[0, 1000, 2000]);
        let target = Arc::new(DocumentTarget::new(Document::new()));

        f.engine.start(&f.graph, &ReplayOptions::default().step_through(), target.clone()).unwrap();
        assert_eq!(f.engine.state(), ReplayState::WaitingForNext);
        sleep(Duration::from_secs(10)).await;
        assert!(target.performed().is_empty());
        assert!(matches!(f.engine.pause(), Err(ReplayflowError::InvalidTransition { .. })));

        for expected in 1..=3 {
            f.engine.next_step().unwrap();
            sleep(Duration::from_millis(1)).await;
            assert_eq!(target.performed().len(), expected);
        }
        let outcome = f.engine.wait().await.unwrap();
        assert_eq!(outcome.state, ReplayState::Completed);
        assert_eq!(f.engine.state(), ReplayState::Completed);

        let waiting = f.statuses.lock().unwrap().iter().filter(|s| matches!(s, ReplayStatus::WaitingForNext { .. })).count();
        assert_eq!(waiting, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_excludes_paused_time() {
        let f = fixture();
        add_steps(&f.graph, &[0, 1000]);
        let target = Arc::new(DocumentTarget::new(Document::new()));

        let t0 = Instant::now();
        f.engine.start(&f.graph, &ReplayOptions::default(), target.clone()).unwrap();
        sleep(Duration::from_millis(400)).await;
        f.engine.pause().unwrap();
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(f.engine.state(), ReplayState::Paused);
        assert_eq!(target.performed().len(), 1);
        assert!(f.engine.pause().is_err());

        f.engine.resume().unwrap();
        let outcome = f.engine.wait().await.unwrap();

        // the interrupted wait resumes with its remaining 600ms
        assert_eq!(target.performed()[1].at - t0, Duration::from_millis(6000));
        assert_eq!(outcome.elapsed_ms, 1000);
        let statuses = f.statuses.lock().unwrap();
        assert!(statuses.contains(&ReplayStatus::Paused {
            index: 1,
            elapsed_ms: 400,
        }));
        assert!(statuses.contains(&ReplayStatus::Resumed {
            index: 1,
        }));
    }

    /// Takes `delay` to carry out every action.
    struct SlowTarget {
        inner: DocumentTarget,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ReplayTarget for SlowTarget {
        async fn resolve(
            &self,
            selector: &crate::dom::Selector,
        ) -> Result<Option<crate::replay::ElementHandle>> {
            self.inner.resolve(selector).await
        }

        async fn execute(
            &self,
            node: &crate::model::ActionNode,
            element: Option<&crate::replay::ElementHandle>,
        ) -> Result<()> {
            sleep(self.delay).await;
            self.inner.execute(node, element).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_a_step_holds_at_the_gate() {
        let f = fixture();
        add_steps(&f.graph, &[0, 1000, 2000]);
        let target = Arc::new(SlowTarget {
            inner: DocumentTarget::new(Document::new()),
            delay: Duration::from_millis(100),
        });

        f.engine.start(&f.graph, &ReplayOptions::default().step_through(), target.clone()).unwrap();
        f.engine.next_step().unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(f.engine.state(), ReplayState::Playing);
        f.engine.pause().unwrap();

        sleep(Duration::from_millis(200)).await;
        assert_eq!(f.engine.state(), ReplayState::Paused);
        assert_eq!(target.inner.performed().len(), 1);
        assert!(f.statuses.lock().unwrap().iter().any(|s| matches!(s, ReplayStatus::Paused { index: 1, .. })));

        f.engine.resume().unwrap();
        sleep(Duration::from_millis(1)).await;
        assert_eq!(f.engine.state(), ReplayState::WaitingForNext);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(target.inner.performed().len(), 1);

        f.engine.next_step().unwrap();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(target.inner.performed().len(), 2);
        f.engine.stop().unwrap();
        assert_eq!(f.engine.wait().await.unwrap().state, ReplayState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_sent_during_a_step_releases_the_following_gate() {
        let f = fixture();
        add_steps(&f.graph, &[0, 1000, 2000]);
        let target = Arc::new(SlowTarget {
            inner: DocumentTarget::new(Document::new()),
            delay: Duration::from_millis(100),
        });

        f.engine.start(&f.graph, &ReplayOptions::default().step_through(), target.clone()).unwrap();
        f.engine.next_step().unwrap();
        f.engine.next_step().unwrap();
        sleep(Duration::from_millis(250)).await;

        assert_eq!(target.inner.performed().len(), 2);
        assert_eq!(f.engine.state(), ReplayState::WaitingForNext);
        f.engine.stop().unwrap();
        f.engine.wait().await.unwrap();
    }

    fn ghost_locator() -> crate::model::ElementLocator {
        let mut doc = Document::new();
        let root = doc.root();
        let ghost = doc.append_element(root, "button", &[("id", "ghost")]).unwrap();
        SelectorResolver::default().locate(&doc, ghost).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_element_halts_by_default() {
        let f = fixture();
        f.graph.add_node(NodeDraft::action("open").with_timestamp(0)).unwrap();
        let missing = f.graph.add_node(NodeDraft::action("press ghost").with_timestamp(10).with_locator(ghost_locator())).unwrap();
        f.graph.add_node(NodeDraft::action("close").with_timestamp(20)).unwrap();
        let target = Arc::new(DocumentTarget::new(Document::new()));

        f.engine.start(&f.graph, &ReplayOptions::default(), target.clone()).unwrap();
        let outcome = f.engine.wait().await.unwrap();

        assert_eq!(outcome.state, ReplayState::Stopped);
        assert_eq!((outcome.executed, outcome.failed), (1, 1));
        assert_eq!(target.performed().len(), 1);
        let statuses = f.statuses.lock().unwrap();
        assert!(statuses.iter().any(|s| matches!(s, ReplayStatus::Error { index: 1, node_id, can_continue: false, .. } if *node_id == missing)));
        assert!(matches!(statuses.last(), Some(ReplayStatus::Stopped { index: 1, .. })));
        assert!(!f.graph.is_frozen());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_element_continues_when_allowed() {
        let f = fixture();
        f.graph.add_node(NodeDraft::action("open").with_timestamp(0)).unwrap();
        f.graph.add_node(NodeDraft::action("press ghost").with_timestamp(10).with_locator(ghost_locator())).unwrap();
        f.graph.add_node(NodeDraft::action("close").with_timestamp(20)).unwrap();
        let target = Arc::new(DocumentTarget::new(Document::new()));

        f.engine.start(&f.graph, &ReplayOptions::default().continue_on_error(true), target.clone()).unwrap();
        let outcome = f.engine.wait().await.unwrap();

        assert_eq!(outcome.state, ReplayState::Completed);
        assert_eq!((outcome.executed, outcome.failed), (2, 1));
        assert!(outcome.log[1].message.starts_with("element not found at step 1"));
        assert!(matches!(f.statuses.lock().unwrap().last(), Some(ReplayStatus::Completed { executed: 2, failed: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_when_the_page_drifts() {
        let mut doc = Document::new();
        let root = doc.root();
        let form = doc.append_element(root, "form", &[]).unwrap();
        let save = doc.append_element(form, "button", &[("id", "save"), ("data-testid", "save-button")]).unwrap();
        doc.set_text(save, "Save").unwrap();
        let locator = SelectorResolver::default().locate(&doc, save).unwrap();
        let primary = locator.replay_selectors()[0].to_string();

        let f = fixture();
        f.graph.add_node(NodeDraft::action("save").with_locator(locator)).unwrap();
        let target = Arc::new(DocumentTarget::new(doc));
        {
            let doc = target.document();
            let mut doc = doc.write().unwrap();
            doc.set_attr(save, "id", "save-v2").unwrap();
            doc.set_attr(save, "data-testid", "persist").unwrap();
        }

        f.engine.start(&f.graph, &ReplayOptions::default(), target.clone()).unwrap();
        let outcome = f.engine.wait().await.unwrap();

        assert_eq!(outcome.executed, 1);
        let performed = target.performed();
        assert_eq!(performed[0].element, Some(save));
        assert_ne!(performed[0].selector.as_deref(), Some(primary.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_skips_authentication_steps() {
        let f = fixture();
        let ids = add_steps(&f.graph, &[0, 10, 20, 30, 40]);
        f.graph.mark_as_authentication(&ids[1]);
        f.graph.mark_as_authentication(&ids[3]);

        let target = Arc::new(DocumentTarget::new(Document::new()));
        f.engine.start(&f.graph, &ReplayOptions::default(), target.clone()).unwrap();
        f.engine.wait().await.unwrap();
        assert_eq!(target.performed().len(), 5);

        f.graph.set_session(SessionState::new("https://app.example.com", 0, serde_json::json!({}))).unwrap();
        let target = Arc::new(DocumentTarget::new(Document::new()));
        f.engine.start(&f.graph, &ReplayOptions::default(), target.clone()).unwrap();
        f.engine.wait().await.unwrap();

        let replayed: Vec<String> = target.performed().into_iter().map(|p| p.node_id).collect();
        assert_eq!(replayed, vec![ids[0].clone(), ids[2].clone(), ids[4].clone()]);
        assert!(f.statuses.lock().unwrap().iter().any(|s| matches!(s, ReplayStatus::Started { total: 3, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_replay_holds_the_graph() {
        let f = fixture();
        add_steps(&f.graph, &[0, 1000]);
        let target = Arc::new(DocumentTarget::new(Document::new()));

        assert!(matches!(f.engine.stop(), Err(ReplayflowError::InvalidTransition { .. })));
        assert!(f.engine.start(&f.graph, &ReplayOptions::default().with_speed(0.0), target.clone()).is_err());
        assert!(!f.graph.is_frozen());

        f.engine.start(&f.graph, &ReplayOptions::default().step_through(), target.clone()).unwrap();
        assert!(matches!(f.engine.start(&f.graph, &ReplayOptions::default(), target.clone()), Err(ReplayflowError::Busy(_))));
        assert!(matches!(f.graph.add_node(NodeDraft::action("late")), Err(ReplayflowError::Busy(_))));

        f.engine.stop().unwrap();
        let outcome = f.engine.wait().await.unwrap();
        assert_eq!(outcome.state, ReplayState::Stopped);
        assert!(matches!(f.statuses.lock().unwrap().last(), Some(ReplayStatus::Stopped { index: 0, reason }) if reason == "stopped by user"));
        assert!(f.graph.add_node(NodeDraft::action("late")).is_ok());
    }

    #[tokio::test]
    async fn test_empty_graph_completes_immediately() {
        let f = fixture();
        let target = Arc::new(DocumentTarget::new(Document::new()));
        f.engine.start(&f.graph, &ReplayOptions::default(), target).unwrap();
        let outcome = f.engine.wait().await.unwrap();
        assert_eq!(outcome.state, ReplayState::Completed);
        assert_eq!(outcome.executed, 0);
    }
}
