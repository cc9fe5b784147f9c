//! Arena snapshot of a live target's element tree.
//!
//! A `Document` holds light-DOM elements and shadow roots in one arena.
//! Shadow roots hang off their host through `shadow_root` and are never part
//! of the host's `children`, so ordinary tree walks stop at the boundary.

use serde::{Deserialize, Serialize};

use crate::{ReplayflowError, Result, model::ShadowMode};

/// Index of a node inside a [`Document`].
pub type DomId = usize;

/// Guard for any walk up the ancestor chain.
pub(crate) const MAX_ANCESTOR_WALK: usize = 1024;

/// Tags whose visible text is a reasonable way to find them again.
const INTERACTIVE_TAGS: [&str; 7] = ["a", "button", "label", "option", "summary", "legend", "th"];

/// Kind of a node in the arena.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomNodeKind {
    Document,
    Element {
        tag: String,
        #[serde(default)]
        attrs: Vec<(String, String)>,
        #[serde(default)]
        text: String,
    },
    ShadowRoot {
        mode: ShadowMode,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DomNode {
    pub kind: DomNodeKind,
    pub parent: Option<DomId>,
    #[serde(default)]
    pub children: Vec<DomId>,
    #[serde(default)]
    pub shadow_root: Option<DomId>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    nodes: Vec<DomNode>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document containing only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![DomNode {
                kind: DomNodeKind::Document,
                parent: None,
                children: Vec::new(),
                shadow_root: None,
            }],
        }
    }

    /// Parses a document snapshot produced by a target adapter.
    pub fn from_json(s: &str) -> Result<Self> {
        let doc = serde_json::from_str::<Document>(s)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Checks that parent, child and shadow links describe one tree rooted
    /// at node 0.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ReplayflowError::Validation(msg));
        match self.nodes.first() {
            Some(DomNode {
                kind: DomNodeKind::Document,
                parent: None,
                ..
            }) => {}
            _ => return invalid("document snapshot must start with the root node".to_string()),
        }
        let len = self.nodes.len();
        for (id, node) in self.nodes.iter().enumerate() {
            if node.children.iter().chain(node.shadow_root.iter()).any(|c| *c >= len) {
                return invalid(format!("dom node {} references a missing node", id));
            }
            if node.children.iter().any(|c| self.nodes[*c].parent != Some(id) || self.is_shadow_root(*c)) {
                return invalid(format!("dom node {} lists a child that does not point back to it", id));
            }
            if let Some(root) = node.shadow_root
                && (self.nodes[root].parent != Some(id) || !self.is_shadow_root(root) || !self.is_element(id))
            {
                return invalid(format!("dom node {} has a malformed shadow root", id));
            }
            if id == 0 {
                continue;
            }
            let Some(parent) = node.parent.filter(|p| *p < len) else {
                return invalid(format!("dom node {} has no valid parent", id));
            };
            let linked = if self.is_shadow_root(id) { self.nodes[parent].shadow_root == Some(id) } else { self.nodes[parent].children.contains(&id) };
            if !linked || matches!(node.kind, DomNodeKind::Document) {
                return invalid(format!("dom node {} is not linked from its parent {}", id, parent));
            }
        }
        // every parent chain must reach the root
        for id in 1..len {
            let mut current = id;
            let mut steps = 0;
            while let Some(parent) = self.parent(current) {
                steps += 1;
                if steps > len {
                    return invalid(format!("dom node {} sits on a parent cycle", id));
                }
                current = parent;
            }
            if current != 0 {
                return invalid(format!("dom node {} is detached from the root", id));
            }
        }
        Ok(())
    }

    pub fn root(&self) -> DomId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Appends an element as the last child of `parent`.
    pub fn append_element(
        &mut self,
        parent: DomId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> Result<DomId> {
        match self.nodes.get(parent).map(|n| &n.kind) {
            Some(DomNodeKind::Document) | Some(DomNodeKind::Element { .. }) | Some(DomNodeKind::ShadowRoot { .. }) => {}
            None => return Err(ReplayflowError::Validation(format!("dom node {} not found", parent))),
        }
        let id = self.nodes.len();
        self.nodes.push(DomNode {
            kind: DomNodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                text: String::new(),
            },
            parent: Some(parent),
            children: Vec::new(),
            shadow_root: None,
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Sets the element's own text (not including descendants).
    pub fn set_text(
        &mut self,
        id: DomId,
        value: &str,
    ) -> Result<()> {
        match self.nodes.get_mut(id).map(|n| &mut n.kind) {
            Some(DomNodeKind::Element { text, .. }) => {
                *text = value.to_string();
                Ok(())
            }
            _ => Err(ReplayflowError::Validation(format!("dom node {} is not an element", id))),
        }
    }

    /// Sets or replaces an attribute.
    pub fn set_attr(
        &mut self,
        id: DomId,
        name: &str,
        value: &str,
    ) -> Result<()> {
        match self.nodes.get_mut(id).map(|n| &mut n.kind) {
            Some(DomNodeKind::Element { attrs, .. }) => {
                match attrs.iter_mut().find(|(k, _)| k == name) {
                    Some(entry) => entry.1 = value.to_string(),
                    None => attrs.push((name.to_string(), value.to_string())),
                }
                Ok(())
            }
            _ => Err(ReplayflowError::Validation(format!("dom node {} is not an element", id))),
        }
    }

    /// Attaches a shadow root to `host` and returns it.
    pub fn attach_shadow(
        &mut self,
        host: DomId,
        mode: ShadowMode,
    ) -> Result<DomId> {
        if !self.is_element(host) {
            return Err(ReplayflowError::Validation(format!("dom node {} cannot host a shadow root", host)));
        }
        if self.nodes[host].shadow_root.is_some() {
            return Err(ReplayflowError::Validation(format!("dom node {} already hosts a shadow root", host)));
        }
        let id = self.nodes.len();
        self.nodes.push(DomNode {
            kind: DomNodeKind::ShadowRoot {
                mode,
            },
            parent: Some(host),
            children: Vec::new(),
            shadow_root: None,
        });
        self.nodes[host].shadow_root = Some(id);
        Ok(id)
    }

    pub fn is_element(
        &self,
        id: DomId,
    ) -> bool {
        matches!(self.nodes.get(id).map(|n| &n.kind), Some(DomNodeKind::Element { .. }))
    }

    pub fn is_shadow_root(
        &self,
        id: DomId,
    ) -> bool {
        matches!(self.nodes.get(id).map(|n| &n.kind), Some(DomNodeKind::ShadowRoot { .. }))
    }

    pub fn tag(
        &self,
        id: DomId,
    ) -> Option<&str> {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(DomNodeKind::Element { tag, .. }) => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn attr(
        &self,
        id: DomId,
        name: &str,
    ) -> Option<&str> {
        self.attrs(id).iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn attrs(
        &self,
        id: DomId,
    ) -> &[(String, String)] {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(DomNodeKind::Element { attrs, .. }) => attrs.as_slice(),
            _ => &[],
        }
    }

    pub fn classes(
        &self,
        id: DomId,
    ) -> Vec<&str> {
        self.attr(id, "class").map(|c| c.split_whitespace().collect()).unwrap_or_default()
    }

    pub fn shadow_mode(
        &self,
        root: DomId,
    ) -> Option<ShadowMode> {
        match self.nodes.get(root).map(|n| &n.kind) {
            Some(DomNodeKind::ShadowRoot { mode }) => Some(*mode),
            _ => None,
        }
    }

    pub fn parent(
        &self,
        id: DomId,
    ) -> Option<DomId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Parent when it is an element; `None` at a document or shadow root.
    pub fn parent_element(
        &self,
        id: DomId,
    ) -> Option<DomId> {
        self.parent(id).filter(|p| self.is_element(*p))
    }

    /// Shadow root attached to `host`, if any.
    pub fn shadow_root(
        &self,
        host: DomId,
    ) -> Option<DomId> {
        self.nodes.get(host).and_then(|n| n.shadow_root)
    }

    /// Host element of a shadow root.
    pub fn shadow_host(
        &self,
        root: DomId,
    ) -> Option<DomId> {
        if self.is_shadow_root(root) { self.parent(root) } else { None }
    }

    /// Nearest enclosing document or shadow root.
    pub fn scope_of(
        &self,
        id: DomId,
    ) -> Result<DomId> {
        let mut current = id;
        for _ in 0..MAX_ANCESTOR_WALK {
            match self.parent(current) {
                Some(parent) if !self.is_element(parent) => return Ok(parent),
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
        Err(ReplayflowError::ShadowTraversalLimit(MAX_ANCESTOR_WALK))
    }

    /// Whether `id` sits below `ancestor` without crossing a shadow boundary.
    pub fn is_within(
        &self,
        ancestor: DomId,
        id: DomId,
    ) -> Result<bool> {
        let mut current = id;
        for _ in 0..MAX_ANCESTOR_WALK {
            match self.parent(current) {
                Some(parent) if parent == ancestor => return Ok(true),
                Some(parent) if self.is_element(parent) => current = parent,
                _ => return Ok(false),
            }
        }
        Err(ReplayflowError::ShadowTraversalLimit(MAX_ANCESTOR_WALK))
    }

    pub fn element_children(
        &self,
        id: DomId,
    ) -> Vec<DomId> {
        self.nodes.get(id).map(|n| n.children.iter().copied().filter(|c| self.is_element(*c)).collect()).unwrap_or_default()
    }

    /// Element descendants of `id` in tree order, staying inside its tree.
    pub fn descendants(
        &self,
        id: DomId,
    ) -> Vec<DomId> {
        let mut out = Vec::new();
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<DomId> = self.element_children(id).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            if std::mem::replace(&mut seen[next], true) {
                continue;
            }
            out.push(next);
            stack.extend(self.element_children(next).into_iter().rev());
        }
        out
    }

    /// 1-based position among siblings that share the same tag.
    pub fn nth_of_type(
        &self,
        id: DomId,
    ) -> usize {
        let Some(tag) = self.tag(id) else {
            return 0;
        };
        let Some(parent) = self.parent(id) else {
            return 1;
        };
        self.element_children(parent).into_iter().filter(|s| self.tag(*s) == Some(tag)).position(|s| s == id).map(|p| p + 1).unwrap_or(1)
    }

    /// Number of siblings (including `id`) that share its tag.
    pub fn count_of_type(
        &self,
        id: DomId,
    ) -> usize {
        let (Some(tag), Some(parent)) = (self.tag(id), self.parent(id)) else {
            return 1;
        };
        self.element_children(parent).into_iter().filter(|s| self.tag(*s) == Some(tag)).count()
    }

    /// Whitespace-normalized text of the element and its light descendants.
    pub fn text_content(
        &self,
        id: DomId,
    ) -> String {
        let mut parts = Vec::new();
        for node in std::iter::once(id).chain(self.descendants(id)) {
            if let Some(DomNodeKind::Element { text, .. }) = self.nodes.get(node).map(|n| &n.kind) {
                parts.extend(text.split_whitespace());
            }
        }
        parts.join(" ")
    }

    pub fn is_interactive(
        &self,
        id: DomId,
    ) -> bool {
        match self.tag(id) {
            Some(tag) if INTERACTIVE_TAGS.contains(&tag) => true,
            Some(_) => matches!(self.attr(id, "role"), Some("button" | "link" | "tab" | "menuitem" | "option" | "checkbox")),
            None => false,
        }
    }
}
