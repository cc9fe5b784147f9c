//! Capture session state: whether capture runs, the open step window and
//! the clipboard history that outlives individual windows.

use tracing::debug;

use crate::{
    ReplayflowError, Result,
    capture::{
        aggregator::{StepAggregator, describe_event},
        classify::{ClipboardTracker, PasteFlow},
    },
    model::{NodeDraft, RawEvent, RawEventKind},
};

/// What became of a recorded raw event.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    /// attached to the open step window
    Attached {
        sub_step: usize,
        event_count: usize,
        paste: Option<PasteFlow>,
    },
    /// no window is open; the event stands as its own node
    Standalone(NodeDraft),
    /// not worth a node on its own
    Ignored,
}

#[derive(Debug)]
pub struct Recorder {
    capturing: bool,
    window: Option<StepAggregator>,
    clipboard: ClipboardTracker,
}

impl Recorder {
    pub fn new(clipboard_history: usize) -> Self {
        Self {
            capturing: false,
            window: None,
            clipboard: ClipboardTracker::new(clipboard_history),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn has_open_step(&self) -> bool {
        self.window.is_some()
    }

    pub fn open_step_name(&self) -> Option<&str> {
        self.window.as_ref().map(|w| w.name())
    }

    pub fn start(&mut self) -> Result<()> {
        if self.capturing {
            return Err(ReplayflowError::Busy("capture is already running".to_string()));
        }
        self.capturing = true;
        debug!("capture started");
        Ok(())
    }

    /// Stops capturing and hands back the window that was still open.
    pub fn stop(&mut self) -> Option<StepAggregator> {
        self.capturing = false;
        debug!("capture stopped");
        self.window.take()
    }

    pub fn open_step(
        &mut self,
        name: &str,
        at: i64,
    ) -> Result<()> {
        if !self.capturing {
            return Err(ReplayflowError::Capture("capture is not running".to_string()));
        }
        if let Some(open) = &self.window {
            return Err(ReplayflowError::Busy(format!("step {} is still open", open.name())));
        }
        self.window = Some(StepAggregator::start(name, at));
        Ok(())
    }

    pub fn take_step(&mut self) -> Option<StepAggregator> {
        self.window.take()
    }

    pub fn record(
        &mut self,
        event: RawEvent,
    ) -> Result<Recorded> {
        if !self.capturing {
            return Err(ReplayflowError::Capture("capture is not running".to_string()));
        }
        let paste = self.clipboard.observe(&event);

        if let Some(window) = self.window.as_mut() {
            let sub_step = window.push(event)?;
            if let Some(flow) = &paste {
                window.annotate(&flow.description);
            }
            return Ok(Recorded::Attached {
                sub_step,
                event_count: window.event_count(),
                paste,
            });
        }

        if let Some(problem) = event.malformed() {
            return Err(ReplayflowError::Capture(problem));
        }
        if matches!(event.kind, RawEventKind::Scroll { .. }) {
            return Ok(Recorded::Ignored);
        }
        let description = paste.map(|p| p.description).unwrap_or_else(|| describe_event(&event));
        let mut draft = NodeDraft::action(&description).with_timestamp(event.timestamp).with_context(event.context);
        if let RawEventKind::Click {
            locator: Some(locator),
            ..
        } = event.kind
        {
            draft = draft.with_locator(locator);
        }
        Ok(Recorded::Standalone(draft))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetContext;

    #[test]
    fn test_record_requires_capture() {
        let mut recorder = Recorder::new(10);
        let event = RawEvent::new(
            1,
            RawEventKind::Navigation {
                url: "https://example.com".to_string(),
            },
        );
        assert!(recorder.record(event.clone()).is_err());
        assert!(recorder.open_step("x", 0).is_err());

        recorder.start().unwrap();
        assert!(recorder.start().is_err());
        match recorder.record(event).unwrap() {
            Recorded::Standalone(draft) => assert_eq!(draft.description, "Navigate to https://example.com"),
            other => panic!("unexpected {:?}", other),
        }
        let scroll = RawEvent::new(
            2,
            RawEventKind::Scroll {
                delta_x: 0.0,
                delta_y: 120.0,
            },
        );
        assert_eq!(recorder.record(scroll).unwrap(), Recorded::Ignored);
    }

    #[test]
    fn test_window_lifecycle() {
        let mut recorder = Recorder::new(10);
        recorder.start().unwrap();
        recorder.open_step("Checkout", 100).unwrap();
        assert!(recorder.open_step("Other", 100).is_err());
        let click = RawEvent::new(
            150,
            RawEventKind::Click {
                locator: None,
                label: "Buy".to_string(),
            },
        )
        .with_context(TargetContext::application("Google Chrome"));
        assert!(matches!(recorder.record(click).unwrap(), Recorded::Attached { sub_step: 0, event_count: 1, paste: None }));

        let open = recorder.stop().unwrap();
        assert_eq!(open.name(), "Checkout");
        assert!(!recorder.is_capturing());
        assert!(!recorder.has_open_step());
    }
}
