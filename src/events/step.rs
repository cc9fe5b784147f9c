use serde::Serialize;

use crate::capture::AggregatedStep;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    Started {
        name: String,
        at: i64,
    },
    EventAdded {
        name: String,
        /// raw event kind, e.g. `click`
        kind: String,
        /// 0-based sub-step the event was attached to
        sub_step: usize,
        event_count: usize,
    },
    Completed {
        step: AggregatedStep,
    },
}

impl StepEvent {
    pub fn str(&self) -> &str {
        match self {
            StepEvent::Started { .. } => "Started",
            StepEvent::EventAdded { .. } => "EventAdded",
            StepEvent::Completed { .. } => "Completed",
        }
    }
}
