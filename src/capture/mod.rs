//! Turning raw activity into graph nodes.
//!
//! - `aggregator`: step windows and their sub-steps
//! - `classify`: clipboard content, application kinds, paste data flow
//! - `recorder`: capture on/off, the open window and clipboard history

mod aggregator;
mod classify;
mod recorder;

pub use aggregator::{AggregatedStep, StepAggregator, describe_event};
pub use classify::{AppKind, ClipboardEntry, ClipboardTracker, ContentKind, PREVIEW_LEN, PasteFlow, Transformation, describe_location, document_name, preview, spreadsheet_location};
pub use recorder::{Recorded, Recorder};
