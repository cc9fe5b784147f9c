//! Replay dispatcher.
//!
//! The dispatcher owns the [`ReplaySession`] for the whole run and is the
//! only place replay state changes. It:
//! - Waits out the scaled gap before each step
//! - Reacts to pause, resume, stop and next commands at any point
//! - Resolves each step's element, falling back through the alternatives
//! - Applies the continue or halt policy when a step fails
//!
//! Commands are validated by the engine against the published state, but the
//! dispatcher may have moved on by the time one arrives. Every queued command
//! is still honored: a pause that raced with the end of a step pauses at the
//! step-through gate, and a `Next` that arrives while playing releases the
//! following gate in advance.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    ReplayflowError, Result, ShareLock,
    common::Queue,
    events::ReplayStatus,
    graph::StepGraph,
    model::ActionNode,
    replay::{
        ReplayCommand, ReplayState,
        session::{ReplayLogEntry, ReplaySession},
        target::ReplayTarget,
    },
    runtime::Channel,
    utils::time::format_millis,
};

/// How a replay ended.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub session_id: String,
    pub state: ReplayState,
    pub executed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub log: Vec<ReplayLogEntry>,
}

/// What the loop does after handling a command.
enum Flow {
    Continue,
    Stop(String),
}

pub struct ReplayDispatcher {
    session: ReplaySession,
    target: Arc<dyn ReplayTarget>,
    command_queue: Arc<Queue<ReplayCommand>>,
    state: ShareLock<ReplayState>,
    graph: StepGraph,
    channel: Arc<Channel>,

    // state restored by the next resume
    resume_to: ReplayState,
    // step-through gates released ahead of time
    next_credits: usize,
}

impl ReplayDispatcher {
    pub fn new(
        session: ReplaySession,
        target: Arc<dyn ReplayTarget>,
        command_queue: Arc<Queue<ReplayCommand>>,
        state: ShareLock<ReplayState>,
        graph: StepGraph,
        channel: Arc<Channel>,
    ) -> Self {
        Self {
            session,
            target,
            command_queue,
            state,
            graph,
            channel,
            resume_to: ReplayState::Playing,
            next_credits: 0,
        }
    }

    fn state(&self) -> ReplayState {
        *self.state.read().unwrap()
    }

    fn set_state(
        &self,
        state: ReplayState,
    ) {
        *self.state.write().unwrap() = state;
    }

    /// Runs the session to its end and releases the graph.
    pub async fn run(mut self) -> ReplayOutcome {
        // remaining wait of a gap that a command interrupted
        let mut pending_wait: Option<Duration> = None;
        let command_queue = self.command_queue.clone();

        let stopped = loop {
            if self.session.is_finished() {
                break None;
            }

            match self.state() {
                ReplayState::WaitingForNext | ReplayState::Paused => {
                    let cmd_opt = command_queue.next_async().await;
                    let flow = match cmd_opt {
                        Some(cmd) => self.handle_command(cmd),
                        None => Flow::Stop("command queue closed".to_string()),
                    };
                    if let Flow::Stop(reason) = flow {
                        break Some(reason);
                    }
                    continue;
                }
                _ => {}
            }

            if let Some(cmd) = command_queue.try_next() {
                if let Flow::Stop(reason) = self.handle_command(cmd) {
                    break Some(reason);
                }
                continue;
            }

            let wait = pending_wait.take().unwrap_or_else(|| self.session.gap_before(self.session.index));
            if !wait.is_zero() {
                let deadline = tokio::time::Instant::now() + wait;
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}

                    cmd_opt = command_queue.next_async() => {
                        pending_wait = Some(deadline.saturating_duration_since(tokio::time::Instant::now()));
                        let flow = match cmd_opt {
                            Some(cmd) => self.handle_command(cmd),
                            None => Flow::Stop("command queue closed".to_string()),
                        };
                        if let Flow::Stop(reason) = flow {
                            break Some(reason);
                        }
                        continue;
                    }
                }
            }

            if let Flow::Stop(reason) = self.step().await {
                break Some(reason);
            }
        };

        self.finish(stopped)
    }

    fn handle_command(
        &mut self,
        cmd: ReplayCommand,
    ) -> Flow {
        let state = self.state();
        let index = self.session.index;
        match (cmd, state) {
            (ReplayCommand::Stop, _) => return Flow::Stop("stopped by user".to_string()),
            (ReplayCommand::Pause, ReplayState::Playing | ReplayState::WaitingForNext) => {
                self.resume_to = state;
                self.session.pause();
                self.set_state(ReplayState::Paused);
                self.channel.emit_replay(ReplayStatus::Paused {
                    index,
                    elapsed_ms: self.session.elapsed_ms(),
                });
            }
            (ReplayCommand::Resume, ReplayState::Paused) => {
                let next = std::mem::replace(&mut self.resume_to, ReplayState::Playing);
                self.session.resume();
                self.set_state(next);
                self.channel.emit_replay(ReplayStatus::Resumed {
                    index,
                });
                if next == ReplayState::WaitingForNext {
                    self.channel.emit_replay(ReplayStatus::WaitingForNext {
                        index,
                    });
                }
            }
            (ReplayCommand::Next, ReplayState::WaitingForNext) => self.set_state(ReplayState::Playing),
            (ReplayCommand::Next, ReplayState::Paused) if self.resume_to == ReplayState::WaitingForNext => {
                self.resume_to = ReplayState::Playing;
            }
            (ReplayCommand::Next, _) => self.next_credits += 1,
            (cmd, state) => {
                // a repeated pause or resume; already in effect
                debug!(command = cmd.as_ref(), state = state.as_ref(), "replay command already applied");
            }
        }
        Flow::Continue
    }

    /// Executes the step at the cursor and advances it.
    async fn step(&mut self) -> Flow {
        let index = self.session.index;
        let total = self.session.total();
        let node = self.session.steps[index].clone();
        self.channel.emit_replay(ReplayStatus::Action {
            index,
            node_id: node.id.clone(),
            description: node.description.clone(),
        });

        match self.perform(index, &node).await {
            Ok(()) => {
                self.session.executed += 1;
                self.session.log("ok");
                self.channel.emit_replay(ReplayStatus::Progress {
                    index,
                    total,
                    elapsed_ms: self.session.elapsed_ms(),
                });
            }
            Err(err) => {
                self.session.failed += 1;
                self.session.log(&err.to_string());
                self.set_state(ReplayState::Error);
                let can_continue = self.session.continue_on_error;
                warn!(index, id = %node.id, can_continue, "replay step failed: {}", err);
                self.channel.emit_replay(ReplayStatus::Error {
                    index,
                    node_id: node.id.clone(),
                    message: err.to_string(),
                    can_continue,
                });
                if !can_continue {
                    return Flow::Stop(err.to_string());
                }
                self.set_state(ReplayState::Playing);
            }
        }

        self.session.index += 1;
        if self.session.step_through && !self.session.is_finished() {
            if self.next_credits > 0 {
                self.next_credits -= 1;
                return Flow::Continue;
            }
            self.set_state(ReplayState::WaitingForNext);
            self.channel.emit_replay(ReplayStatus::WaitingForNext {
                index: self.session.index,
            });
        }
        Flow::Continue
    }

    /// Resolves the node's element through its selectors in order and hands
    /// the first hit to the target.
    async fn perform(
        &self,
        index: usize,
        node: &ActionNode,
    ) -> Result<()> {
        let Some(locator) = &node.locator else {
            return self.target.execute(node, None).await;
        };
        let selectors = locator.replay_selectors();
        for (attempt, selector) in selectors.iter().enumerate() {
            if let Some(element) = self.target.resolve(selector).await? {
                if attempt > 0 {
                    debug!(index, selector = %selector, attempt, "resolved through fallback selector");
                }
                return self.target.execute(node, Some(&element)).await;
            }
        }
        Err(ReplayflowError::ElementNotFound {
            step: index,
            selector: selectors.first().map(|s| s.to_string()).unwrap_or_else(|| "<empty locator>".to_string()),
        })
    }

    fn finish(
        mut self,
        stopped: Option<String>,
    ) -> ReplayOutcome {
        while let Some(cmd) = self.command_queue.try_next() {
            debug!(command = cmd.as_ref(), "replay ended before command was handled");
        }
        self.session.resume();
        let elapsed_ms = self.session.elapsed_ms();
        let state = if stopped.is_some() { ReplayState::Stopped } else { ReplayState::Completed };
        self.set_state(state);
        self.graph.unfreeze();

        match stopped {
            Some(reason) => {
                info!(session = %self.session.id, index = self.session.index, reason = %reason, "replay stopped");
                self.channel.emit_replay(ReplayStatus::Stopped {
                    index: self.session.index,
                    reason,
                });
            }
            None => {
                info!(session = %self.session.id, executed = self.session.executed, failed = self.session.failed, elapsed = %format_millis(elapsed_ms), "replay completed");
                self.channel.emit_replay(ReplayStatus::Completed {
                    executed: self.session.executed,
                    failed: self.session.failed,
                    elapsed_ms,
                });
            }
        }

        ReplayOutcome {
            session_id: self.session.id,
            state,
            executed: self.session.executed,
            failed: self.session.failed,
            elapsed_ms,
            log: self.session.log,
        }
    }
}
