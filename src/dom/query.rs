//! Selector evaluation over a [`Document`].
//!
//! Evaluation is scoped and left-to-right: each step expands the set of
//! context nodes produced by the previous one. Ordinary combinators never
//! leave the tree they start in; only the shadow combinators enter a host's
//! shadow root.

use std::collections::HashSet;

use crate::dom::{
    Document, DomId,
    selector::{Combinator, Compound, Selector},
};

impl Document {
    /// All elements matched by `selector` relative to `scope`.
    pub fn query_all(
        &self,
        scope: DomId,
        selector: &Selector,
    ) -> Vec<DomId> {
        if selector.is_empty() {
            return Vec::new();
        }
        let mut contexts = vec![scope];
        for step in &selector.steps {
            let mut seen = HashSet::new();
            let mut next = Vec::new();
            for ctx in &contexts {
                let candidates = match step.combinator {
                    Combinator::Descendant => self.descendants(*ctx),
                    Combinator::Child => self.element_children(*ctx),
                    Combinator::ShadowDescendant => self.shadow_root(*ctx).map(|root| self.descendants(root)).unwrap_or_default(),
                    Combinator::ShadowChild => self.shadow_root(*ctx).map(|root| self.element_children(root)).unwrap_or_default(),
                };
                for candidate in candidates {
                    if self.matches(candidate, &step.compound) && seen.insert(candidate) {
                        next.push(candidate);
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            contexts = next;
        }
        contexts
    }

    /// The element matched by `selector` when exactly one matches.
    pub fn query_unique(
        &self,
        scope: DomId,
        selector: &Selector,
    ) -> Option<DomId> {
        let matches = self.query_all(scope, selector);
        if matches.len() == 1 { matches.first().copied() } else { None }
    }

    /// Whether `selector` resolves to exactly `element` inside `scope`.
    pub fn selects_exactly(
        &self,
        scope: DomId,
        selector: &Selector,
        element: DomId,
    ) -> bool {
        self.query_unique(scope, selector) == Some(element)
    }

    fn matches(
        &self,
        id: DomId,
        compound: &Compound,
    ) -> bool {
        let Some(tag) = self.tag(id) else {
            return false;
        };
        if compound.tag.as_deref().is_some_and(|t| t != tag) {
            return false;
        }
        if compound.id.as_deref().is_some_and(|v| self.attr(id, "id") != Some(v)) {
            return false;
        }
        if !compound.classes.is_empty() {
            let classes = self.classes(id);
            if !compound.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        if !compound.attrs.iter().all(|a| self.attr(id, &a.name) == Some(a.value.as_str())) {
            return false;
        }
        if compound.nth_of_type.is_some_and(|n| self.nth_of_type(id) != n) {
            return false;
        }
        if compound.text.as_deref().is_some_and(|t| self.text_content(id) != t) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ShadowMode;

    fn sample() -> (Document, DomId, DomId) {
        let mut doc = Document::new();
        let form = doc.append_element(doc.root(), "form", &[("id", "login")]).unwrap();
        let first = doc.append_element(form, "button", &[("class", "btn primary")]).unwrap();
        let second = doc.append_element(form, "button", &[("class", "btn")]).unwrap();
        doc.set_text(second, "Cancel").unwrap();
        (doc, first, second)
    }

    #[test]
    fn test_query_by_class_and_nth() {
        let (doc, first, second) = sample();
        let root = doc.root();
        assert_eq!(doc.query_all(root, &Selector::compound(Compound::tag("button").with_class("btn"))), vec![first, second]);
        assert_eq!(doc.query_unique(root, &Selector::compound(Compound::tag("button").with_class("primary"))), Some(first));
        let by_parent = Selector::compound(Compound::default().with_id("login")).then(Combinator::Child, Compound::tag("button").nth(2));
        assert!(doc.selects_exactly(root, &by_parent, second));
        assert!(doc.selects_exactly(root, &Selector::compound(Compound::tag("button").with_text("Cancel")), second));
    }

    #[test]
    fn test_child_path_is_anchored_at_scope() {
        let (doc, first, _) = sample();
        let path = Selector::child_path(vec![Compound::tag("form").nth(1), Compound::tag("button").nth(1)]);
        assert_eq!(doc.query_all(doc.root(), &path), vec![first]);
        let not_anchored = Selector::child_path(vec![Compound::tag("button").nth(1)]);
        assert!(doc.query_all(doc.root(), &not_anchored).is_empty());
    }

    #[test]
    fn test_plain_query_does_not_cross_shadow() {
        let mut doc = Document::new();
        let host = doc.append_element(doc.root(), "x-panel", &[]).unwrap();
        let shadow = doc.attach_shadow(host, ShadowMode::Open).unwrap();
        let inner = doc.append_element(shadow, "input", &[("name", "q")]).unwrap();

        let plain = Selector::compound(Compound::tag("input"));
        assert!(doc.query_all(doc.root(), &plain).is_empty());
        assert_eq!(doc.query_all(shadow, &plain), vec![inner]);

        let pierced = Selector::compound(Compound::tag("x-panel")).pierce(&plain);
        assert_eq!(doc.query_unique(doc.root(), &pierced), Some(inner));
    }
}
