mod activity;
mod edge;
mod export;
mod locator;
mod node;
mod session;

pub use activity::{ClipboardAction, FileOperation, RawEvent, RawEventKind};
pub use edge::{Edge, EdgeKind};
pub use export::{ExportDocument, ExportFormat, ExportNode};
pub use locator::{ElementLocator, LocatorCandidate, SelectorDescriptor, SelectorStrategy, ShadowHop, ShadowMode, ShadowPath};
pub use node::{ActionNode, Branch, NodeDraft, NodeId, NodeKind, NodeMetadata, NodePatch, Predecessor, Rule, SubStep, TargetContext, validate_branches};
pub use session::SessionState;
