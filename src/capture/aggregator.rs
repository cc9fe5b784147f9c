//! Groups the raw events of one step window into a single step.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    ReplayflowError, Result,
    capture::classify::spreadsheet_location,
    model::{ClipboardAction, RawEvent, RawEventKind, SubStep},
};

/// Result of closing a step window.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AggregatedStep {
    pub name: String,
    pub description: String,
    pub event_count: usize,
    pub started_at: i64,
    pub duration_ms: u64,
    pub sub_steps: Vec<SubStep>,
}

/// Open step window.
///
/// Every click or navigation opens a new sub-step; other events attach to
/// the open one, or open the first sub-step of the window.
#[derive(Debug, Clone)]
pub struct StepAggregator {
    name: String,
    started_at: i64,
    sub_steps: Vec<SubStep>,
    event_count: usize,
}

impl StepAggregator {
    pub fn start(
        name: &str,
        at: i64,
    ) -> Self {
        debug!(name, at, "step window opened");
        Self {
            name: name.to_string(),
            started_at: at,
            sub_steps: Vec::new(),
            event_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// Adds an event and returns the index of the sub-step it landed in.
    ///
    /// A malformed event is dropped and the window stays open.
    pub fn push(
        &mut self,
        event: RawEvent,
    ) -> Result<usize> {
        let problem = if event.timestamp < self.started_at {
            Some(format!("event at {} precedes the step window opened at {}", event.timestamp, self.started_at))
        } else {
            event.malformed()
        };
        if let Some(problem) = problem {
            warn!(step = %self.name, kind = event.kind.name(), problem = %problem, "dropped raw event");
            return Err(ReplayflowError::Capture(problem));
        }

        if event.starts_sub_step() || self.sub_steps.is_empty() {
            self.sub_steps.push(SubStep {
                description: describe_event(&event),
                raw_events: Vec::new(),
            });
        }
        let index = self.sub_steps.len() - 1;
        if let Some(sub_step) = self.sub_steps.last_mut() {
            sub_step.raw_events.push(event);
        }
        self.event_count += 1;
        Ok(index)
    }

    /// Appends a note to the open sub-step's description.
    pub fn annotate(
        &mut self,
        note: &str,
    ) {
        if let Some(sub_step) = self.sub_steps.last_mut() {
            sub_step.description = format!("{}; {}", sub_step.description, note);
        }
    }

    pub fn end(
        self,
        at: i64,
    ) -> AggregatedStep {
        let duration_ms = u64::try_from(at - self.started_at).unwrap_or(0);
        let description = summarize(&self.name, &self.sub_steps);
        debug!(name = %self.name, events = self.event_count, duration_ms, "step window closed");
        AggregatedStep {
            name: self.name,
            description,
            event_count: self.event_count,
            started_at: self.started_at,
            duration_ms,
            sub_steps: self.sub_steps,
        }
    }
}

/// One-line description of a single raw event.
pub fn describe_event(event: &RawEvent) -> String {
    match &event.kind {
        RawEventKind::Click {
            label,
            ..
        } if !label.trim().is_empty() => format!("Click {}", label.trim()),
        RawEventKind::Click {
            ..
        } => "Click element".to_string(),
        RawEventKind::KeyInput {
            text,
        } => format!("Type \"{}\"", text),
        RawEventKind::Navigation {
            url,
        } => format!("Navigate to {}", url),
        RawEventKind::Clipboard {
            action,
            ..
        } => match action {
            ClipboardAction::Copy => "Copy to clipboard".to_string(),
            ClipboardAction::Cut => "Cut to clipboard".to_string(),
            ClipboardAction::Paste => "Paste from clipboard".to_string(),
        },
        RawEventKind::Spreadsheet {
            operation,
            document,
            sheet,
            address,
        } => format!("{} {}", operation, spreadsheet_location(document, sheet, address)),
        RawEventKind::Scroll {
            ..
        } => "Scroll".to_string(),
        RawEventKind::File {
            operation,
            path,
            dest_path,
        } => match dest_path {
            Some(dest) => format!("File {} {} -> {}", operation.as_ref(), path, dest),
            None => format!("File {} {}", operation.as_ref(), path),
        },
    }
}

/// `name (2 clicks, 1 navigation)` from the kinds present in the window.
fn summarize(
    name: &str,
    sub_steps: &[SubStep],
) -> String {
    const ORDER: [(&str, &str, &str); 7] = [
        ("click", "click", "clicks"),
        ("navigation", "navigation", "navigations"),
        ("key_input", "key input", "key inputs"),
        ("clipboard", "clipboard action", "clipboard actions"),
        ("spreadsheet", "spreadsheet action", "spreadsheet actions"),
        ("file", "file change", "file changes"),
        ("scroll", "scroll", "scrolls"),
    ];
    let parts: Vec<String> = ORDER
        .iter()
        .filter_map(|(kind, one, many)| {
            let count = sub_steps.iter().flat_map(|s| s.raw_events.iter()).filter(|e| e.kind.name() == *kind).count();
            match count {
                0 => None,
                1 => Some(format!("1 {}", one)),
                n => Some(format!("{} {}", n, many)),
            }
        })
        .collect();
    if parts.is_empty() { name.to_string() } else { format!("{} ({})", name, parts.join(", ")) }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn typed(
        at: i64,
        text: &str,
    ) -> RawEvent {
        RawEvent::new(
            at,
            RawEventKind::KeyInput {
                text: text.to_string(),
            },
        )
    }

    #[test]
    fn test_sub_steps_split_on_click_and_navigation() {
        let mut step = StepAggregator::start("Log in", 1000);
        assert_eq!(step.push(typed(1001, "warm-up")).unwrap(), 0);
        assert_eq!(step.push(click(1100, "username")).unwrap(), 1);
        assert_eq!(step.push(typed(1200, "jane")).unwrap(), 1);
        assert_eq!(step.push(click(1300, "Sign in")).unwrap(), 2);
        let nav = RawEvent::new(
            1400,
            RawEventKind::Navigation {
                url: "https://app.example.com/home".to_string(),
            },
        );
        assert_eq!(step.push(nav).unwrap(), 3);

        let done = step.end(1500);
        assert_eq!(done.event_count, 5);
        assert_eq!(done.duration_ms, 500);
        assert_eq!(done.sub_steps.len(), 4);
        assert_eq!(done.sub_steps[1].description, "Click username");
        assert_eq!(done.sub_steps[1].raw_events.len(), 2);
        assert_eq!(done.description, "Log in (2 clicks, 1 navigation, 2 key inputs)");
    }

    #[test]
    fn test_malformed_events_are_dropped() {
        let mut step = StepAggregator::start("Search", 1000);
        assert!(matches!(step.push(click(999, "early")), Err(ReplayflowError::Capture(_))));
        assert!(step.push(typed(1001, "")).is_err());
        let blank = RawEvent::new(
            1002,
            RawEventKind::Navigation {
                url: " ".to_string(),
            },
        );
        assert!(step.push(blank).is_err());
        assert_eq!(step.event_count(), 0);

        step.push(click(1003, "search")).unwrap();
        step.annotate("Pasted text from Notes to Search");
        let done = step.end(1003);
        assert_eq!(done.event_count, 1);
        assert_eq!(done.sub_steps[0].description, "Click search; Pasted text from Notes to Search");
    }
}
