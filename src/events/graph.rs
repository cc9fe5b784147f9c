use serde::Serialize;

use crate::model::{ActionNode, Edge, NodeId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeCreated {
        node: ActionNode,
    },
    NodeUpdated {
        node: ActionNode,
    },
    EdgeAdded {
        edge: Edge,
    },
    /// a node was taken out by undo
    NodeRemoved {
        id: NodeId,
    },
    /// an edge was taken out by undo
    EdgeRemoved {
        edge: Edge,
    },
    /// the whole graph was replaced (load, undo of clear)
    Restored {
        nodes: usize,
    },
    /// the captured session was set or cleared
    SessionChanged {
        present: bool,
    },
    ProcessSaved {
        key: String,
    },
    ProcessCleared,
}

impl GraphEvent {
    pub fn str(&self) -> &str {
        match self {
            GraphEvent::NodeCreated { .. } => "NodeCreated",
            GraphEvent::NodeUpdated { .. } => "NodeUpdated",
            GraphEvent::EdgeAdded { .. } => "EdgeAdded",
            GraphEvent::NodeRemoved { .. } => "NodeRemoved",
            GraphEvent::EdgeRemoved { .. } => "EdgeRemoved",
            GraphEvent::Restored { .. } => "Restored",
            GraphEvent::SessionChanged { .. } => "SessionChanged",
            GraphEvent::ProcessSaved { .. } => "ProcessSaved",
            GraphEvent::ProcessCleared => "ProcessCleared",
        }
    }

    /// Node the event is about; edges report their target.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            GraphEvent::NodeCreated {
                node,
            }
            | GraphEvent::NodeUpdated {
                node,
            } => Some(&node.id),
            GraphEvent::NodeRemoved {
                id,
            } => Some(id),
            GraphEvent::EdgeAdded {
                edge,
            }
            | GraphEvent::EdgeRemoved {
                edge,
            } => Some(&edge.to),
            _ => None,
        }
    }

    /// Whether the graph content changed.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, GraphEvent::ProcessSaved { .. })
    }
}
