use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::{graph::GraphSnapshot, model::ActionNode};

/// Steps a replay runs, in recorded order.
///
/// With a captured session the authentication steps are skipped, since the
/// restored session already stands in for them, and a replay start point cuts
/// off everything recorded before it. Without a session every step runs.
pub fn filter_steps(snapshot: &GraphSnapshot) -> Vec<ActionNode> {
    if snapshot.session.is_none() {
        return snapshot.nodes.clone();
    }
    let start = snapshot.replay_start.as_ref().and_then(|id| snapshot.nodes.iter().position(|n| &n.id == id)).unwrap_or(0);
    snapshot.nodes[start..].iter().filter(|n| !n.metadata.is_authentication_step).cloned().collect()
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReplayLogEntry {
    pub index: usize,
    pub node_id: String,
    pub message: String,
    pub elapsed_ms: u64,
}

/// Progress and timing of one replay.
#[derive(Debug)]
pub struct ReplaySession {
    pub(crate) id: String,
    pub(crate) steps: Vec<ActionNode>,
    pub(crate) index: usize,
    pub(crate) speed: f64,
    pub(crate) step_through: bool,
    pub(crate) continue_on_error: bool,
    pub(crate) executed: usize,
    pub(crate) failed: usize,
    pub(crate) log: Vec<ReplayLogEntry>,
    max_step_wait: Duration,
    started_at: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl ReplaySession {
    pub fn new(
        steps: Vec<ActionNode>,
        speed: f64,
        step_through: bool,
        continue_on_error: bool,
        max_step_wait: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            steps,
            index: 0,
            speed,
            step_through,
            continue_on_error,
            executed: 0,
            failed: 0,
            log: Vec::new(),
            max_step_wait,
            started_at: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn total(&self) -> usize {
        self.steps.len()
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.steps.len()
    }

    /// Wait before step `index`: the recorded gap to the previous step,
    /// capped and scaled by the speed. Step-through replays never wait.
    pub fn gap_before(
        &self,
        index: usize,
    ) -> Duration {
        if self.step_through || index == 0 || index >= self.steps.len() {
            return Duration::ZERO;
        }
        let gap = self.steps[index].timestamp - self.steps[index - 1].timestamp;
        let gap = Duration::from_millis(u64::try_from(gap).unwrap_or(0)).min(self.max_step_wait);
        gap.div_f64(self.speed)
    }

    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&mut self) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += at.elapsed();
        }
    }

    /// Time spent replaying, not counting pauses.
    pub fn elapsed_ms(&self) -> u64 {
        let now = Instant::now();
        let paused = self.paused_total + self.paused_at.map(|at| now - at).unwrap_or_default();
        let active = now.saturating_duration_since(self.started_at).saturating_sub(paused);
        u64::try_from(active.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn log(
        &mut self,
        message: &str,
    ) {
        let entry = ReplayLogEntry {
            index: self.index,
            node_id: self.steps.get(self.index).map(|n| n.id.clone()).unwrap_or_default(),
            message: message.to_string(),
            elapsed_ms: self.elapsed_ms(),
        };
        self.log.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeKind, NodeMetadata, SessionState};

    fn node(
        n: usize,
        timestamp: i64,
    ) -> ActionNode {
        ActionNode {
            id: format!("n{}", n),
            description: format!("step {}", n),
            timestamp,
            duration_ms: 0,
            kind: NodeKind::Action,
            locator: None,
            context: Default::default(),
            metadata: NodeMetadata::default(),
            previous_id: if n > 1 { Some(format!("n{}", n - 1)) } else { None },
        }
    }

    #[test]
    fn test_gaps_scale_with_speed() {
        let steps = vec![node(1, 0), node(2, 1000), node(3, 3000)];
        let fast = ReplaySession::new(steps.clone(), 2.0, false, false, Duration::from_secs(30));
        assert_eq!(fast.gap_before(0), Duration::ZERO);
        assert_eq!(fast.gap_before(1), Duration::from_millis(500));
        assert_eq!(fast.gap_before(2), Duration::from_millis(1000));

        let slow = ReplaySession::new(steps.clone(), 0.5, false, false, Duration::from_secs(30));
        assert_eq!(slow.gap_before(1), Duration::from_millis(2000));
        assert_eq!(slow.gap_before(2), Duration::from_millis(4000));

        let stepping = ReplaySession::new(steps, 1.0, true, false, Duration::from_secs(30));
        assert_eq!(stepping.gap_before(2), Duration::ZERO);
    }

    #[test]
    fn test_gaps_are_clamped() {
        let steps = vec![node(1, 5000), node(2, 1000), node(3, 120_000)];
        let session = ReplaySession::new(steps, 1.0, false, false, Duration::from_secs(10));
        assert_eq!(session.gap_before(1), Duration::ZERO);
        assert_eq!(session.gap_before(2), Duration::from_secs(10));
    }

    #[test]
    fn test_filter_steps() {
        let mut snapshot = GraphSnapshot {
            nodes: (1..=5).map(|n| node(n, n as i64 * 100)).collect(),
            ..Default::default()
        };
        snapshot.nodes[1].metadata.is_authentication_step = true;
        snapshot.nodes[3].metadata.is_authentication_step = true;

        let ids = |steps: Vec<ActionNode>| steps.into_iter().map(|n| n.id).collect::<Vec<_>>();
        assert_eq!(ids(filter_steps(&snapshot)).len(), 5);

        snapshot.session = Some(SessionState::new("https://app.example.com", 0, serde_json::json!({ "cookies": [] })));
        assert_eq!(ids(filter_steps(&snapshot)), vec!["n1", "n3", "n5"]);

        snapshot.replay_start = Some("n3".to_string());
        assert_eq!(ids(filter_steps(&snapshot)), vec!["n3", "n5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_excludes_pauses() {
        let mut session = ReplaySession::new(vec![node(1, 0)], 1.0, false, false, Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(300)).await;
        session.pause();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(session.elapsed_ms(), 300);
        session.resume();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.elapsed_ms(), 500);
    }
}
