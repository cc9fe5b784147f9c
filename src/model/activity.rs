use serde::{Deserialize, Serialize};

use crate::model::{ElementLocator, TargetContext};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileOperation {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// Typed activity record delivered by the external capture source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEventKind {
    Click {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        locator: Option<ElementLocator>,
        #[serde(default)]
        label: String,
    },
    KeyInput {
        text: String,
    },
    Navigation {
        url: String,
    },
    Clipboard {
        action: ClipboardAction,
        content: String,
    },
    Spreadsheet {
        operation: String,
        document: String,
        sheet: String,
        address: String,
    },
    Scroll {
        delta_x: f64,
        delta_y: f64,
    },
    File {
        operation: FileOperation,
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dest_path: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// epoch millis
    pub timestamp: i64,
    #[serde(flatten)]
    pub kind: RawEventKind,
    #[serde(default)]
    pub context: TargetContext,
}

impl RawEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            RawEventKind::Click { .. } => "click",
            RawEventKind::KeyInput { .. } => "key_input",
            RawEventKind::Navigation { .. } => "navigation",
            RawEventKind::Clipboard { .. } => "clipboard",
            RawEventKind::Spreadsheet { .. } => "spreadsheet",
            RawEventKind::Scroll { .. } => "scroll",
            RawEventKind::File { .. } => "file",
        }
    }
}

impl RawEvent {
    pub fn new(
        timestamp: i64,
        kind: RawEventKind,
    ) -> Self {
        Self {
            timestamp,
            kind,
            context: TargetContext::default(),
        }
    }

    pub fn with_context(
        mut self,
        context: TargetContext,
    ) -> Self {
        self.context = context;
        self
    }

    /// Clicks and navigations open a new sub-step.
    pub fn starts_sub_step(&self) -> bool {
        matches!(self.kind, RawEventKind::Click { .. } | RawEventKind::Navigation { .. })
    }

    /// Reason the event cannot be recorded, if any.
    pub fn malformed(&self) -> Option<String> {
        match &self.kind {
            RawEventKind::Navigation {
                url,
            } if url.trim().is_empty() => Some("navigation without url".to_string()),
            RawEventKind::KeyInput {
                text,
            } if text.is_empty() => Some("empty key input".to_string()),
            RawEventKind::File {
                path,
                ..
            } if path.trim().is_empty() => Some("file event without path".to_string()),
            _ => None,
        }
    }
}
