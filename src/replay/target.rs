//! The surface a replay drives.
//!
//! A [`ReplayTarget`] is whatever can find elements and perform actions: a
//! browser automation session, an accessibility bridge, or the in-memory
//! [`DocumentTarget`] used for dry runs and tests.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    Result, ShareLock,
    dom::{Document, DomId, Selector},
    model::{ActionNode, NodeId},
};

/// An element the target resolved a selector to.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementHandle {
    /// the selector that found the element
    pub selector: Selector,
    /// target-specific element id, when the target has one
    pub id: Option<DomId>,
}

#[async_trait]
pub trait ReplayTarget: Send + Sync {
    /// Finds the single element `selector` points at, or `None` when no
    /// element or more than one element matches.
    async fn resolve(
        &self,
        selector: &Selector,
    ) -> Result<Option<ElementHandle>>;

    /// Performs the node's action. `element` is `None` for nodes recorded
    /// without a target element (navigation, typing into the focused field,
    /// decisions).
    async fn execute(
        &self,
        node: &ActionNode,
        element: Option<&ElementHandle>,
    ) -> Result<()>;
}

/// One action a [`DocumentTarget`] carried out.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformedAction {
    pub node_id: NodeId,
    pub description: String,
    pub element: Option<DomId>,
    pub selector: Option<String>,
    pub at: Instant,
}

/// Replays against an in-memory [`Document`], recording what it did.
///
/// The document stays shared so it can change between steps, the way a
/// live page does.
#[derive(Clone)]
pub struct DocumentTarget {
    doc: ShareLock<Document>,
    performed: ShareLock<Vec<PerformedAction>>,
}

impl DocumentTarget {
    pub fn new(doc: Document) -> Self {
        Self {
            doc: Arc::new(RwLock::new(doc)),
            performed: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn document(&self) -> ShareLock<Document> {
        self.doc.clone()
    }

    pub fn performed(&self) -> Vec<PerformedAction> {
        self.performed.read().unwrap().clone()
    }
}

#[async_trait]
impl ReplayTarget for DocumentTarget {
    async fn resolve(
        &self,
        selector: &Selector,
    ) -> Result<Option<ElementHandle>> {
        let doc = self.doc.read().unwrap();
        Ok(doc.query_unique(doc.root(), selector).map(|id| ElementHandle {
            selector: selector.clone(),
            id: Some(id),
        }))
    }

    async fn execute(
        &self,
        node: &ActionNode,
        element: Option<&ElementHandle>,
    ) -> Result<()> {
        debug!(id = %node.id, kind = node.kind.as_ref(), "perform");
        self.performed.write().unwrap().push(PerformedAction {
            node_id: node.id.clone(),
            description: node.description.clone(),
            element: element.and_then(|e| e.id),
            selector: element.map(|e| e.selector.to_string()),
            at: Instant::now(),
        });
        Ok(())
    }
}
