//! Clipboard content and application classification.
//!
//! Used to describe data moving between applications: what kind of content
//! was copied, from where, and how it changes shape when pasted elsewhere.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::model::{ClipboardAction, RawEvent, RawEventKind, TargetContext};

/// Longest preview kept for a clipboard entry.
pub const PREVIEW_LEN: usize = 50;

/// Longest clipboard content kept in history.
const CONTENT_LIMIT: usize = 1000;

const TITLE_SUFFIXES: [&str; 8] = [" - Excel", " - Word", " - PowerPoint", " - Google Chrome", " - Mozilla Firefox", " - Safari", " \u{2014} ", " \u{2013} "];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentKind {
    Email,
    Phone,
    Url,
    Number,
    Date,
    Tabular,
    Multiline,
    Text,
}

impl ContentKind {
    /// First matching kind, checked in a fixed order.
    pub fn detect(content: &str) -> Self {
        let trimmed = content.trim();
        let lower = trimmed.to_lowercase();

        if let Some((_, domain)) = content.rsplit_once('@')
            && domain.contains('.')
        {
            return ContentKind::Email;
        }
        let digits = content.chars().filter(|c| c.is_ascii_digit()).count();
        if (7..=15).contains(&digits) {
            return ContentKind::Phone;
        }
        if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www.") {
            return ContentKind::Url;
        }
        if content.replace([',', '$'], "").trim().parse::<f64>().is_ok() {
            return ContentKind::Number;
        }
        if (content.contains('/') || content.contains('-')) && content.chars().count() < 20 {
            let normalized = content.replace('/', "-");
            let parts: Vec<&str> = normalized.split('-').collect();
            if parts.len() == 3 && parts.iter().all(|p| !p.trim().is_empty() && p.trim().chars().all(|c| c.is_ascii_digit())) {
                return ContentKind::Date;
            }
        }
        if content.contains('\t') {
            return ContentKind::Tabular;
        }
        if content.contains('\n') {
            return ContentKind::Multiline;
        }
        ContentKind::Text
    }
}

/// Content cut to `max_len` characters; multiline content shows its first line.
pub fn preview(
    content: &str,
    max_len: usize,
) -> String {
    if content.chars().count() <= max_len {
        return content.to_string();
    }
    let head = match content.split_once('\n') {
        Some((first, _)) => first,
        None => content,
    };
    if head.chars().count() <= max_len {
        return format!("{}...", head);
    }
    format!("{}...", head.chars().take(max_len).collect::<String>())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AppKind {
    Spreadsheet,
    Document,
    Presentation,
    WebApplication,
    CodeEditor,
    #[default]
    Unknown,
}

impl AppKind {
    pub fn infer(application: &str) -> Self {
        let name = application.to_lowercase();
        if name.contains("excel") || name.contains("sheets") {
            AppKind::Spreadsheet
        } else if name.contains("word") || name.contains("docs") {
            AppKind::Document
        } else if name.contains("powerpoint") || name.contains("slides") {
            AppKind::Presentation
        } else if ["chrome", "safari", "firefox", "edge"].iter().any(|b| name.contains(b)) {
            AppKind::WebApplication
        } else if ["code", "sublime", "atom"].iter().any(|e| name.contains(e)) {
            AppKind::CodeEditor
        } else {
            AppKind::Unknown
        }
    }
}

/// How pasted data changes shape between two kinds of application.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Transformation {
    TableToText,
    DataToSlide,
    DataToForm,
    TextToCells,
    TextToSlide,
    TextToForm,
    WebToData,
    WebToText,
    DirectPaste,
}

impl Transformation {
    pub fn between(
        source: AppKind,
        destination: AppKind,
    ) -> Self {
        match (source, destination) {
            (AppKind::Spreadsheet, AppKind::Document) => Transformation::TableToText,
            (AppKind::Spreadsheet, AppKind::Presentation) => Transformation::DataToSlide,
            (AppKind::Spreadsheet, AppKind::WebApplication) => Transformation::DataToForm,
            (AppKind::Document, AppKind::Spreadsheet) => Transformation::TextToCells,
            (AppKind::Document, AppKind::Presentation) => Transformation::TextToSlide,
            (AppKind::Document, AppKind::WebApplication) => Transformation::TextToForm,
            (AppKind::WebApplication, AppKind::Spreadsheet) => Transformation::WebToData,
            (AppKind::WebApplication, AppKind::Document) => Transformation::WebToText,
            _ => Transformation::DirectPaste,
        }
    }
}

/// `document!sheet!address`
pub fn spreadsheet_location(
    document: &str,
    sheet: &str,
    address: &str,
) -> String {
    format!("{}!{}!{}", document, sheet, address)
}

/// Document name from a window title such as `Book1.xlsx - Excel`.
pub fn document_name(window_title: &str) -> Option<String> {
    if window_title.trim().is_empty() {
        return None;
    }
    for suffix in TITLE_SUFFIXES {
        if let Some((head, _)) = window_title.split_once(suffix) {
            return Some(head.to_string());
        }
    }
    Some(window_title.to_string())
}

/// Human-readable location of a context.
pub fn describe_location(context: &TargetContext) -> String {
    let app = context.application_name.as_deref().unwrap_or("Unknown");
    let document = context.window_title.as_deref().and_then(document_name);
    match AppKind::infer(app) {
        AppKind::WebApplication => format!("{}: {}", context.url.as_deref().unwrap_or(app), document.as_deref().unwrap_or("Unknown page")),
        _ => document.unwrap_or_else(|| app.to_string()),
    }
}

/// One copy or cut remembered until it is pasted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClipboardEntry {
    pub timestamp: i64,
    pub content: String,
    pub preview: String,
    pub kind: ContentKind,
    pub lines: usize,
    pub application: String,
    pub app_kind: AppKind,
    /// source description, `document!sheet!address` for spreadsheet cells
    pub location: String,
}

/// Data flow of a paste whose content came from another application.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PasteFlow {
    pub from: String,
    pub to: String,
    pub kind: ContentKind,
    pub transformation: Transformation,
    pub description: String,
}

/// Remembers recent copies so that pastes can be traced to their source.
#[derive(Debug, Clone)]
pub struct ClipboardTracker {
    history: VecDeque<ClipboardEntry>,
    limit: usize,
    /// last spreadsheet selection seen, per application
    selection: Option<(String, String)>,
}

impl ClipboardTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            history: VecDeque::new(),
            limit: limit.max(1),
            selection: None,
        }
    }

    /// Feeds an event; returns the paste flow when a cross-application paste
    /// can be traced to an earlier copy.
    pub fn observe(
        &mut self,
        event: &RawEvent,
    ) -> Option<PasteFlow> {
        let application = event.context.application_name.clone().unwrap_or_else(|| "Unknown".to_string());
        match &event.kind {
            RawEventKind::Spreadsheet {
                document,
                sheet,
                address,
                ..
            } => {
                self.selection = Some((application, spreadsheet_location(document, sheet, address)));
                None
            }
            RawEventKind::Clipboard {
                action: ClipboardAction::Copy | ClipboardAction::Cut,
                content,
            } => {
                let location = match &self.selection {
                    Some((app, location)) if *app == application => location.clone(),
                    _ => describe_location(&event.context),
                };
                self.history.push_back(ClipboardEntry {
                    timestamp: event.timestamp,
                    content: content.chars().take(CONTENT_LIMIT).collect(),
                    preview: preview(content, PREVIEW_LEN),
                    kind: ContentKind::detect(content),
                    lines: content.lines().count().max(1),
                    app_kind: AppKind::infer(&application),
                    application,
                    location,
                });
                while self.history.len() > self.limit {
                    self.history.pop_front();
                }
                None
            }
            RawEventKind::Clipboard {
                action: ClipboardAction::Paste,
                ..
            } => {
                let source = self.source_for(event.timestamp)?;
                if source.application == application {
                    return None;
                }
                let destination = AppKind::infer(&application);
                let to = describe_location(&event.context);
                Some(PasteFlow {
                    description: format!("Pasted {} from {} to {}", source.kind.as_ref(), source.location, to),
                    from: source.location.clone(),
                    to,
                    kind: source.kind,
                    transformation: Transformation::between(source.app_kind, destination),
                })
            }
            _ => None,
        }
    }

    pub fn last(&self) -> Option<&ClipboardEntry> {
        self.history.back()
    }

    /// Most recent copy made at or before `timestamp`.
    pub fn source_for(
        &self,
        timestamp: i64,
    ) -> Option<&ClipboardEntry> {
        self.history.iter().rev().find(|e| e.timestamp <= timestamp)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_content_kind() {
        assert_eq!(ContentKind::detect("jane@example.com"), ContentKind::Email);
        assert_eq!(ContentKind::detect("+1 (555) 123-4567"), ContentKind::Phone);
        assert_eq!(ContentKind::detect("https://example.com/a"), ContentKind::Url);
        assert_eq!(ContentKind::detect("$1,234"), ContentKind::Number);
        assert_eq!(ContentKind::detect("1/2/24"), ContentKind::Date);
        assert_eq!(ContentKind::detect("a\tb\nc\td"), ContentKind::Tabular);
        assert_eq!(ContentKind::detect("first\nsecond"), ContentKind::Multiline);
        assert_eq!(ContentKind::detect("hello"), ContentKind::Text);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", PREVIEW_LEN), "short");
        let long_line = "x".repeat(60);
        assert_eq!(preview(&long_line, PREVIEW_LEN), format!("{}...", "x".repeat(50)));
        let multi = format!("header\n{}", "y".repeat(60));
        assert_eq!(preview(&multi, PREVIEW_LEN), "header...");
    }

    #[test]
    fn test_app_kind_and_transformation() {
        assert_eq!(AppKind::infer("Microsoft Excel"), AppKind::Spreadsheet);
        assert_eq!(AppKind::infer("Google Chrome"), AppKind::WebApplication);
        assert_eq!(AppKind::infer("Visual Studio Code"), AppKind::CodeEditor);
        assert_eq!(AppKind::infer("Finder"), AppKind::Unknown);
        assert_eq!(Transformation::between(AppKind::Spreadsheet, AppKind::WebApplication), Transformation::DataToForm);
        assert_eq!(Transformation::between(AppKind::CodeEditor, AppKind::Document), Transformation::DirectPaste);
        assert_eq!(Transformation::TableToText.as_ref(), "table_to_text");
    }

    #[test]
    fn test_cross_app_paste_flow() {
        let mut tracker = ClipboardTracker::new(50);
        let excel = TargetContext::application("Microsoft Excel").with_window_title("Budget.xlsx - Excel");
        let chrome = TargetContext::application("Google Chrome").with_url("https://crm.example.com").with_window_title("New Lead - Google Chrome");

        let select = RawEvent::new(
            1,
            RawEventKind::Spreadsheet {
                operation: "select".to_string(),
                document: "Budget.xlsx".to_string(),
                sheet: "Q1".to_string(),
                address: "B2:B4".to_string(),
            },
        )
        .with_context(excel.clone());
        let copy = RawEvent::new(
            2,
            RawEventKind::Clipboard {
                action: ClipboardAction::Copy,
                content: "10\n20\n30".to_string(),
            },
        )
        .with_context(excel.clone());
        let paste = RawEvent::new(
            3,
            RawEventKind::Clipboard {
                action: ClipboardAction::Paste,
                content: String::new(),
            },
        )
        .with_context(chrome);

        assert!(tracker.observe(&select).is_none());
        assert!(tracker.observe(&copy).is_none());
        let flow = tracker.observe(&paste).unwrap();
        assert_eq!(flow.from, "Budget.xlsx!Q1!B2:B4");
        assert_eq!(flow.to, "https://crm.example.com: New Lead");
        assert_eq!(flow.transformation, Transformation::DataToForm);
        assert_eq!(flow.description, "Pasted multiline from Budget.xlsx!Q1!B2:B4 to https://crm.example.com: New Lead");

        let same_app = RawEvent::new(
            4,
            RawEventKind::Clipboard {
                action: ClipboardAction::Paste,
                content: String::new(),
            },
        )
        .with_context(excel);
        assert!(tracker.observe(&same_app).is_none());
    }
}
