//! Element tree snapshots and the selector query engine.

mod document;
mod query;
mod selector;

pub(crate) use document::MAX_ANCESTOR_WALK;
pub use document::{Document, DomId, DomNode, DomNodeKind};
pub use selector::{AttrMatch, Combinator, Compound, Selector, SelectorStep};
