use std::collections::VecDeque;

use crate::{
    graph::GraphSnapshot,
    model::{ActionNode, Edge, NodeId},
};

/// A structural change that can be undone.
#[derive(Debug, Clone)]
pub(crate) enum Mutation {
    AddNode {
        node: ActionNode,
        edge: Option<Edge>,
        previous_cursor: Option<NodeId>,
        /// decision id, branch id and the branch's `recorded` flag before the add
        branch: Option<(NodeId, String, bool)>,
    },
    AddEdge {
        edge: Edge,
    },
    Clear {
        before: Box<GraphSnapshot>,
    },
}

/// Bounded undo stack plus the redo stack it feeds.
#[derive(Debug)]
pub(crate) struct History {
    undo: VecDeque<Mutation>,
    redo: Vec<Mutation>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Records a new mutation; the redo stack no longer applies.
    pub fn record(
        &mut self,
        mutation: Mutation,
    ) {
        self.redo.clear();
        if self.limit == 0 {
            return;
        }
        self.undo.push_back(mutation);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    pub fn pop_undo(&mut self) -> Option<Mutation> {
        self.undo.pop_back()
    }

    pub fn push_undo(
        &mut self,
        mutation: Mutation,
    ) {
        self.undo.push_back(mutation);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    pub fn pop_redo(&mut self) -> Option<Mutation> {
        self.redo.pop()
    }

    pub fn push_redo(
        &mut self,
        mutation: Mutation,
    ) {
        self.redo.push(mutation);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn reset(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
