use serde::Serialize;

use crate::model::NodeId;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplayStatus {
    Started {
        session_id: String,
        total: usize,
        speed: f64,
        step_through: bool,
    },
    Action {
        index: usize,
        node_id: NodeId,
        description: String,
    },
    Progress {
        index: usize,
        total: usize,
        elapsed_ms: u64,
    },
    Paused {
        index: usize,
        elapsed_ms: u64,
    },
    Resumed {
        index: usize,
    },
    WaitingForNext {
        index: usize,
    },
    Error {
        index: usize,
        node_id: NodeId,
        message: String,
        can_continue: bool,
    },
    Completed {
        executed: usize,
        failed: usize,
        elapsed_ms: u64,
    },
    Stopped {
        index: usize,
        reason: String,
    },
}

impl ReplayStatus {
    pub fn str(&self) -> &str {
        match self {
            ReplayStatus::Started { .. } => "Started",
            ReplayStatus::Action { .. } => "Action",
            ReplayStatus::Progress { .. } => "Progress",
            ReplayStatus::Paused { .. } => "Paused",
            ReplayStatus::Resumed { .. } => "Resumed",
            ReplayStatus::WaitingForNext { .. } => "WaitingForNext",
            ReplayStatus::Error { .. } => "Error",
            ReplayStatus::Completed { .. } => "Completed",
            ReplayStatus::Stopped { .. } => "Stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplayStatus::Completed { .. } | ReplayStatus::Stopped { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ReplayStatus::Error { .. })
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ReplayStatus::Completed { .. })
    }
}
