//! The step graph: captured nodes, their edges and replay metadata.
//!
//! Nodes are kept in insertion order with an id index beside them. All
//! mutation goes through one write lock; events are published only after the
//! lock is released so subscribers may read the graph from their handler.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::Bfs,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    ReplayflowError, Result, ShareLock,
    events::GraphEvent,
    graph::history::{History, Mutation},
    model::{ActionNode, Edge, EdgeKind, ExportDocument, ExportFormat, ExportNode, NodeDraft, NodeId, NodeKind, NodeMetadata, NodePatch, Predecessor, SessionState, validate_branches},
    runtime::Channel,
    utils::{self, time::time_millis},
};

/// Everything that makes up a graph, as persisted.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: Vec<ActionNode>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_start: Option<NodeId>,
}

impl GraphSnapshot {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Checks the invariants a graph must hold before it is adopted.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if let Some(prev) = &node.previous_id
                && !seen.contains(prev.as_str())
            {
                return Err(ReplayflowError::Validation(format!("node {} follows unknown node {}", node.id, prev)));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(ReplayflowError::Validation(format!("duplicate node id {}", node.id)));
            }
            if let NodeKind::Decision {
                branches,
                ..
            } = &node.kind
            {
                validate_branches(branches)?;
            }
        }
        for edge in &self.edges {
            if !seen.contains(edge.from.as_str()) || !seen.contains(edge.to.as_str()) {
                return Err(ReplayflowError::Validation(format!("edge {} -> {} references an unknown node", edge.from, edge.to)));
            }
        }
        let starts = self.nodes.iter().filter(|n| n.metadata.is_replay_start_point).count();
        if starts > 1 {
            return Err(ReplayflowError::Validation(format!("{} replay start points", starts)));
        }
        for id in self.current.iter().chain(self.replay_start.iter()) {
            if !seen.contains(id.as_str()) {
                return Err(ReplayflowError::Validation(format!("unknown node {}", id)));
            }
        }
        if let Some(session) = &self.session {
            session.validate()?;
        }
        Ok(())
    }
}

struct GraphState {
    content: GraphSnapshot,
    index: HashMap<NodeId, usize>,
    history: History,
    frozen: bool,
}

impl GraphState {
    fn node(
        &self,
        id: &str,
    ) -> Option<&ActionNode> {
        self.index.get(id).and_then(|i| self.content.nodes.get(*i))
    }

    fn node_mut(
        &mut self,
        id: &str,
    ) -> Option<&mut ActionNode> {
        let i = *self.index.get(id)?;
        self.content.nodes.get_mut(i)
    }

    fn reindex(&mut self) {
        self.index = self.content.nodes.iter().enumerate().map(|(i, n)| (n.id.clone(), i)).collect();
    }

    fn remove_node(
        &mut self,
        id: &str,
    ) -> Option<ActionNode> {
        let i = *self.index.get(id)?;
        let node = self.content.nodes.remove(i);
        if self.content.replay_start.as_deref() == Some(id) {
            self.content.replay_start = None;
        }
        self.reindex();
        Some(node)
    }

    fn remove_edge(
        &mut self,
        edge: &Edge,
    ) -> bool {
        match self.content.edges.iter().rposition(|e| e == edge) {
            Some(i) => {
                self.content.edges.remove(i);
                true
            }
            None => false,
        }
    }

    fn set_branch_recorded(
        &mut self,
        decision_id: &str,
        branch_id: &str,
        recorded: bool,
    ) {
        if let Some(NodeKind::Decision {
            branches,
            ..
        }) = self.node_mut(decision_id).map(|n| &mut n.kind)
            && let Some(branch) = branches.iter_mut().find(|b| b.id == branch_id)
        {
            branch.recorded = recorded;
        }
    }

    fn new_id(&self) -> NodeId {
        loop {
            let id = utils::longid();
            if !self.index.contains_key(&id) {
                return id;
            }
        }
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.frozen {
            return Err(ReplayflowError::Busy("the graph is held by a running replay".to_string()));
        }
        Ok(())
    }
}

/// Ordered, branchable sequence of captured actions.
#[derive(Clone)]
pub struct StepGraph {
    state: ShareLock<GraphState>,
    channel: Arc<Channel>,
}

impl StepGraph {
    pub fn new(
        channel: Arc<Channel>,
        history_limit: usize,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(GraphState {
                content: GraphSnapshot::default(),
                index: HashMap::new(),
                history: History::new(history_limit),
                frozen: false,
            })),
            channel,
        }
    }

    fn publish(
        &self,
        events: Vec<GraphEvent>,
    ) {
        for event in events {
            self.channel.emit_graph(event);
        }
    }

    /// Appends a node after the cursor, or after the draft's explicit predecessor.
    pub fn add_node(
        &self,
        draft: NodeDraft,
    ) -> Result<NodeId> {
        let mut events = Vec::new();
        let id = {
            let mut state = self.state.write().unwrap();
            state.ensure_mutable()?;
            if let NodeKind::Decision {
                branches,
                ..
            } = &draft.kind
            {
                validate_branches(branches)?;
            }

            let id = state.new_id();
            let (previous_id, edge, branch) = match &draft.predecessor {
                None => {
                    let previous = state.content.current.clone();
                    let edge = previous.as_ref().map(|p| Edge::sequence(p, &id));
                    (previous, edge, None)
                }
                Some(Predecessor::Node {
                    id: prev,
                }) => {
                    if state.node(prev).is_none() {
                        return Err(ReplayflowError::Validation(format!("unknown predecessor {}", prev)));
                    }
                    (Some(prev.clone()), Some(Edge::sequence(prev, &id)), None)
                }
                Some(Predecessor::Branch {
                    decision_id,
                    branch_id,
                }) => {
                    let Some(decision) = state.node(decision_id) else {
                        return Err(ReplayflowError::Validation(format!("unknown decision {}", decision_id)));
                    };
                    let Some(b) = decision.branches().iter().find(|b| &b.id == branch_id) else {
                        return Err(ReplayflowError::Validation(format!("decision {} has no branch {}", decision_id, branch_id)));
                    };
                    let edge = Edge::branch(decision_id, &id, &b.label);
                    (Some(decision_id.clone()), Some(edge), Some((decision_id.clone(), branch_id.clone(), b.recorded)))
                }
            };

            let node = ActionNode {
                id: id.clone(),
                description: draft.description,
                timestamp: draft.timestamp.unwrap_or_else(time_millis),
                duration_ms: draft.duration_ms,
                kind: draft.kind,
                locator: draft.locator,
                context: draft.context,
                metadata: NodeMetadata {
                    is_authentication_step: draft.is_authentication_step,
                    is_replay_start_point: false,
                    user_context: draft.user_context,
                },
                previous_id,
            };

            let previous_cursor = state.content.current.replace(id.clone());
            let position = state.content.nodes.len();
            state.content.nodes.push(node.clone());
            state.index.insert(id.clone(), position);
            events.push(GraphEvent::NodeCreated {
                node: node.clone(),
            });
            if let Some(edge) = &edge {
                state.content.edges.push(edge.clone());
                events.push(GraphEvent::EdgeAdded {
                    edge: edge.clone(),
                });
            }
            if let Some((decision_id, branch_id, _)) = &branch {
                state.set_branch_recorded(decision_id, branch_id, true);
                if let Some(decision) = state.node(decision_id) {
                    events.push(GraphEvent::NodeUpdated {
                        node: decision.clone(),
                    });
                }
            }
            state.history.record(Mutation::AddNode {
                node,
                edge,
                previous_cursor,
                branch,
            });
            trace!(id = %id, events = events.len(), "add node");
            id
        };
        self.publish(events);
        Ok(id)
    }

    /// Merges metadata into a node. Unknown ids and a frozen graph are no-ops.
    pub fn update_node(
        &self,
        id: &str,
        patch: NodePatch,
    ) -> bool {
        let updated = {
            let mut state = self.state.write().unwrap();
            if state.frozen {
                return false;
            }
            let Some(node) = state.node_mut(id) else {
                return false;
            };
            if let Some(description) = patch.description {
                node.description = description;
            }
            if let Some(user_context) = patch.user_context {
                node.metadata.user_context = Some(user_context);
            }
            if let Some(auth) = patch.is_authentication_step {
                node.metadata.is_authentication_step = auth;
            }
            node.clone()
        };
        trace!(id, "update node");
        self.publish(vec![GraphEvent::NodeUpdated {
            node: updated,
        }]);
        true
    }

    /// Adds an explicit edge. Branches may reconverge, so cycles are allowed.
    pub fn add_edge(
        &self,
        from: &str,
        to: &str,
        kind: EdgeKind,
        label: Option<&str>,
    ) -> Result<()> {
        let edge = {
            let mut state = self.state.write().unwrap();
            state.ensure_mutable()?;
            for id in [from, to] {
                if state.node(id).is_none() {
                    return Err(ReplayflowError::Validation(format!("unknown node {}", id)));
                }
            }
            let edge = Edge {
                from: from.to_string(),
                to: to.to_string(),
                kind,
                label: label.map(|l| l.to_string()),
            };
            state.content.edges.push(edge.clone());
            state.history.record(Mutation::AddEdge {
                edge: edge.clone(),
            });
            edge
        };
        trace!(from, to, "add edge");
        self.publish(vec![GraphEvent::EdgeAdded {
            edge,
        }]);
        Ok(())
    }

    pub fn mark_as_authentication(
        &self,
        id: &str,
    ) -> bool {
        self.update_node(
            id,
            NodePatch {
                is_authentication_step: Some(true),
                ..Default::default()
            },
        )
    }

    /// Makes `id` the only replay start point.
    pub fn set_replay_start_point(
        &self,
        id: &str,
    ) -> bool {
        let events = {
            let mut state = self.state.write().unwrap();
            if state.frozen || state.node(id).is_none() {
                return false;
            }
            let mut events = Vec::new();
            if let Some(previous) = state.content.replay_start.take()
                && previous != id
                && let Some(node) = state.node_mut(&previous)
            {
                node.metadata.is_replay_start_point = false;
                events.push(GraphEvent::NodeUpdated {
                    node: node.clone(),
                });
            }
            state.content.replay_start = Some(id.to_string());
            if let Some(node) = state.node_mut(id) {
                node.metadata.is_replay_start_point = true;
                events.push(GraphEvent::NodeUpdated {
                    node: node.clone(),
                });
            }
            events
        };
        self.publish(events);
        true
    }

    pub fn clear_replay_start_point(&self) -> bool {
        let events = {
            let mut state = self.state.write().unwrap();
            if state.frozen {
                return false;
            }
            let Some(previous) = state.content.replay_start.take() else {
                return false;
            };
            match state.node_mut(&previous) {
                Some(node) => {
                    node.metadata.is_replay_start_point = false;
                    vec![GraphEvent::NodeUpdated {
                        node: node.clone(),
                    }]
                }
                None => Vec::new(),
            }
        };
        self.publish(events);
        true
    }

    pub fn replay_start_point(&self) -> Option<NodeId> {
        self.state.read().unwrap().content.replay_start.clone()
    }

    pub fn set_session(
        &self,
        session: SessionState,
    ) -> Result<()> {
        session.validate()?;
        {
            let mut state = self.state.write().unwrap();
            state.ensure_mutable()?;
            trace!(origin = %session.origin, "set session");
            state.content.session = Some(session);
        }
        self.publish(vec![GraphEvent::SessionChanged {
            present: true,
        }]);
        Ok(())
    }

    pub fn clear_session(&self) -> Result<bool> {
        let cleared = {
            let mut state = self.state.write().unwrap();
            state.ensure_mutable()?;
            state.content.session.take().is_some()
        };
        if cleared {
            self.publish(vec![GraphEvent::SessionChanged {
                present: false,
            }]);
        }
        Ok(cleared)
    }

    pub fn session(&self) -> Option<SessionState> {
        self.state.read().unwrap().content.session.clone()
    }

    /// Resets the whole graph at once. Undo brings it back.
    pub fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.write().unwrap();
            state.ensure_mutable()?;
            let before = std::mem::take(&mut state.content);
            state.index.clear();
            state.history.record(Mutation::Clear {
                before: Box::new(before),
            });
        }
        trace!("clear graph");
        self.publish(vec![GraphEvent::ProcessCleared]);
        Ok(())
    }

    pub fn undo(&self) -> bool {
        let events = {
            let mut state = self.state.write().unwrap();
            if state.frozen {
                return false;
            }
            let Some(mutation) = state.history.pop_undo() else {
                return false;
            };
            let mut events = Vec::new();
            let redo = match mutation {
                Mutation::AddNode {
                    node,
                    edge,
                    previous_cursor,
                    branch,
                } => {
                    let node = state.remove_node(&node.id).unwrap_or(node);
                    if let Some(edge) = &edge
                        && state.remove_edge(edge)
                    {
                        events.push(GraphEvent::EdgeRemoved {
                            edge: edge.clone(),
                        });
                    }
                    if let Some((decision_id, branch_id, recorded)) = &branch {
                        state.set_branch_recorded(decision_id, branch_id, *recorded);
                    }
                    state.content.current = previous_cursor.clone();
                    events.push(GraphEvent::NodeRemoved {
                        id: node.id.clone(),
                    });
                    Mutation::AddNode {
                        node,
                        edge,
                        previous_cursor,
                        branch,
                    }
                }
                Mutation::AddEdge {
                    edge,
                } => {
                    if state.remove_edge(&edge) {
                        events.push(GraphEvent::EdgeRemoved {
                            edge: edge.clone(),
                        });
                    }
                    Mutation::AddEdge {
                        edge,
                    }
                }
                Mutation::Clear {
                    before,
                } => {
                    let cleared = std::mem::replace(&mut state.content, *before);
                    state.reindex();
                    events.push(GraphEvent::Restored {
                        nodes: state.content.nodes.len(),
                    });
                    Mutation::Clear {
                        before: Box::new(cleared),
                    }
                }
            };
            state.history.push_redo(redo);
            events
        };
        trace!(events = events.len(), "undo");
        self.publish(events);
        true
    }

    pub fn redo(&self) -> bool {
        let events = {
            let mut state = self.state.write().unwrap();
            if state.frozen {
                return false;
            }
            let Some(mutation) = state.history.pop_redo() else {
                return false;
            };
            let mut events = Vec::new();
            let undo = match mutation {
                Mutation::AddNode {
                    mut node,
                    edge,
                    previous_cursor,
                    branch,
                } => {
                    // a start point chosen since the undo wins
                    if node.metadata.is_replay_start_point {
                        if state.content.replay_start.is_some() {
                            node.metadata.is_replay_start_point = false;
                        } else {
                            state.content.replay_start = Some(node.id.clone());
                        }
                    }
                    let position = state.content.nodes.len();
                    state.index.insert(node.id.clone(), position);
                    state.content.nodes.push(node.clone());
                    state.content.current = Some(node.id.clone());
                    events.push(GraphEvent::NodeCreated {
                        node: node.clone(),
                    });
                    if let Some(edge) = &edge {
                        state.content.edges.push(edge.clone());
                        events.push(GraphEvent::EdgeAdded {
                            edge: edge.clone(),
                        });
                    }
                    if let Some((decision_id, branch_id, _)) = &branch {
                        state.set_branch_recorded(decision_id, branch_id, true);
                    }
                    Mutation::AddNode {
                        node,
                        edge,
                        previous_cursor,
                        branch,
                    }
                }
                Mutation::AddEdge {
                    edge,
                } => {
                    state.content.edges.push(edge.clone());
                    events.push(GraphEvent::EdgeAdded {
                        edge: edge.clone(),
                    });
                    Mutation::AddEdge {
                        edge,
                    }
                }
                Mutation::Clear {
                    ..
                } => {
                    let before = std::mem::take(&mut state.content);
                    state.index.clear();
                    events.push(GraphEvent::ProcessCleared);
                    Mutation::Clear {
                        before: Box::new(before),
                    }
                }
            };
            state.history.push_undo(undo);
            events
        };
        trace!(events = events.len(), "redo");
        self.publish(events);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.state.read().unwrap().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.state.read().unwrap().history.can_redo()
    }

    pub fn get(
        &self,
        id: &str,
    ) -> Option<ActionNode> {
        self.state.read().unwrap().node(id).cloned()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> Vec<ActionNode> {
        self.state.read().unwrap().content.nodes.clone()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.state.read().unwrap().content.edges.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().content.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Node new nodes are appended after.
    pub fn current(&self) -> Option<NodeId> {
        self.state.read().unwrap().content.current.clone()
    }

    /// First node, in insertion order, whose predecessor is `id`.
    pub fn next_id(
        &self,
        id: &str,
    ) -> Option<NodeId> {
        let state = self.state.read().unwrap();
        state.content.nodes.iter().find(|n| n.previous_id.as_deref() == Some(id)).map(|n| n.id.clone())
    }

    fn to_digraph(content: &GraphSnapshot) -> (DiGraph<NodeId, ()>, HashMap<&str, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for node in &content.nodes {
            indices.insert(node.id.as_str(), graph.add_node(node.id.clone()));
        }
        for edge in &content.edges {
            if let (Some(from), Some(to)) = (indices.get(edge.from.as_str()), indices.get(edge.to.as_str())) {
                graph.add_edge(*from, *to, ());
            }
        }
        (graph, indices)
    }

    /// Direct successors over the edge list, in insertion order.
    pub fn successors(
        &self,
        id: &str,
    ) -> Vec<NodeId> {
        let state = self.state.read().unwrap();
        let (graph, indices) = Self::to_digraph(&state.content);
        let Some(start) = indices.get(id) else {
            return Vec::new();
        };
        let next: HashSet<&NodeId> = graph.neighbors_directed(*start, Direction::Outgoing).map(|i| &graph[i]).collect();
        state.content.nodes.iter().filter(|n| next.contains(&n.id)).map(|n| n.id.clone()).collect()
    }

    /// Every node reachable from `id` (excluding it), in insertion order.
    pub fn reachable_from(
        &self,
        id: &str,
    ) -> Vec<NodeId> {
        let state = self.state.read().unwrap();
        let (graph, indices) = Self::to_digraph(&state.content);
        let Some(start) = indices.get(id) else {
            return Vec::new();
        };
        let mut reached = HashSet::new();
        let mut bfs = Bfs::new(&graph, *start);
        while let Some(idx) = bfs.next(&graph) {
            if idx != *start {
                reached.insert(graph[idx].clone());
            }
        }
        state.content.nodes.iter().filter(|n| reached.contains(&n.id)).map(|n| n.id.clone()).collect()
    }

    /// Output a human-readable representation of the step graph
    pub fn schema(&self) -> String {
        let state = self.state.read().unwrap();
        let content = &state.content;
        let mut lines = Vec::new();

        lines.push("=== Step Graph ===".to_string());
        lines.push(format!("Nodes: {}, Edges: {}", content.nodes.len(), content.edges.len()));
        if let Some(session) = &content.session {
            lines.push(format!("Session: {}", session.origin));
        }
        lines.push(String::new());

        lines.push("--- Nodes ---".to_string());
        for node in &content.nodes {
            let mut flags = Vec::new();
            if node.metadata.is_authentication_step {
                flags.push("auth");
            }
            if node.metadata.is_replay_start_point {
                flags.push("start");
            }
            lines.push(format!("[{}] {} (type: {}{})", node.id, node.description, node.kind.as_ref(), if flags.is_empty() { String::new() } else { format!(", {}", flags.join(", ")) }));
        }
        lines.push(String::new());

        lines.push("--- Edges ---".to_string());
        for edge in &content.edges {
            lines.push(format!("{} --[{}]--> {}", edge.from, edge.label.as_deref().unwrap_or(edge.kind.as_ref()), edge.to));
        }
        lines.push(String::new());

        lines.push("--- Graph Structure ---".to_string());
        for node in &content.nodes {
            let outgoing: Vec<String> = content
                .edges
                .iter()
                .filter(|e| e.from == node.id)
                .map(|e| format!("{}({})", e.to, e.label.as_deref().unwrap_or(e.kind.as_ref())))
                .collect();
            if outgoing.is_empty() {
                lines.push(format!("{} -> (end)", node.id));
            } else {
                lines.push(format!("{} -> {}", node.id, outgoing.join(", ")));
            }
        }

        lines.join("\n")
    }

    /// Pure projection of the graph for automation tooling.
    pub fn export_for_automation(
        &self,
        format: ExportFormat,
    ) -> ExportDocument {
        let state = self.state.read().unwrap();
        let content = &state.content;
        ExportDocument {
            format,
            generated_at: time_millis(),
            nodes: content
                .nodes
                .iter()
                .map(|n| ExportNode {
                    id: n.id.clone(),
                    description: n.description.clone(),
                    kind: n.kind.as_ref().to_string(),
                    locator: n.locator.clone(),
                    timestamp: n.timestamp,
                    duration_ms: n.duration_ms,
                    sub_steps: match &n.kind {
                        NodeKind::Step {
                            sub_steps,
                        } => Some(sub_steps.clone()),
                        _ => None,
                    },
                })
                .collect(),
            edges: content.edges.clone(),
            session: content.session.clone(),
            replay_start_point_id: content.replay_start.clone(),
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.state.read().unwrap().content.clone()
    }

    /// Replaces the graph with a persisted snapshot and forgets history.
    pub fn restore(
        &self,
        snapshot: GraphSnapshot,
    ) -> Result<()> {
        snapshot.validate()?;
        let nodes = snapshot.nodes.len();
        {
            let mut state = self.state.write().unwrap();
            state.ensure_mutable()?;
            state.content = snapshot;
            state.reindex();
            state.history.reset();
        }
        trace!(nodes, "restore graph");
        self.publish(vec![GraphEvent::Restored {
            nodes,
        }]);
        Ok(())
    }

    /// Freezes the graph and hands out the snapshot a replay runs on.
    pub(crate) fn begin_replay(&self) -> Result<GraphSnapshot> {
        let mut state = self.state.write().unwrap();
        state.ensure_mutable()?;
        state.frozen = true;
        Ok(state.content.clone())
    }

    pub(crate) fn unfreeze(&self) {
        self.state.write().unwrap().frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.state.read().unwrap().frozen
    }
}
