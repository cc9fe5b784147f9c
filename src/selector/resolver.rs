//! Stable locator resolution.
//!
//! Every candidate is accepted only if re-querying its scope yields exactly
//! the target element. The structural path from the scope is always unique,
//! so a descriptor is never empty.

use tracing::trace;

use crate::{
    ReplayflowError, Result,
    config::SelectorConfig,
    dom::{Combinator, Compound, Document, DomId, MAX_ANCESTOR_WALK, Selector},
    model::{ElementLocator, LocatorCandidate, SelectorDescriptor, SelectorStrategy, ShadowPath},
    selector::patterns::NoiseFilter,
};

/// Attributes that exist only to be selected by tests and automation.
pub const TEST_ID_ATTRS: [&str; 7] = ["data-testid", "data-test-id", "data-test", "data-cy", "data-qa", "data-automation-id", "data-automation"];

/// Attributes stable enough to identify an element on their own.
pub const STABLE_ATTRS: [&str; 7] = ["aria-label", "name", "placeholder", "title", "alt", "role", "type"];

#[derive(Debug, Clone)]
pub struct SelectorResolver {
    config: SelectorConfig,
    noise: NoiseFilter,
}

impl Default for SelectorResolver {
    fn default() -> Self {
        Self::new(&SelectorConfig::default())
    }
}

impl SelectorResolver {
    pub fn new(config: &SelectorConfig) -> Self {
        Self {
            config: config.clone(),
            noise: NoiseFilter::new(config),
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn noise(&self) -> &NoiseFilter {
        &self.noise
    }

    /// Ranked candidates that find `element` again inside `scope`.
    pub fn resolve(
        &self,
        doc: &Document,
        element: DomId,
        scope: DomId,
    ) -> Result<SelectorDescriptor> {
        let Some(tag) = doc.tag(element) else {
            return Err(ReplayflowError::Validation(format!("node {} is not an element", element)));
        };
        if !doc.is_within(scope, element)? {
            return Err(ReplayflowError::Validation(format!("element {} is outside scope {}", element, scope)));
        }

        let mut descriptor = SelectorDescriptor::default();
        let mut accept = |strategy: SelectorStrategy, selector: Selector| {
            if doc.selects_exactly(scope, &selector, element) {
                descriptor.push(LocatorCandidate::new(strategy, selector));
            }
        };

        for compound in self.test_id_compounds(doc, element) {
            accept(SelectorStrategy::TestId, Selector::compound(compound));
        }
        if let Some(compound) = self.id_compound(doc, element) {
            accept(SelectorStrategy::Id, Selector::compound(compound));
        }
        for compound in self.attribute_compounds(doc, element) {
            accept(SelectorStrategy::Attribute, Selector::compound(compound));
        }
        for compound in self.class_compounds(doc, element) {
            accept(SelectorStrategy::ClassName, Selector::compound(compound));
        }
        if let Some(selector) = self.parent_combinator(doc, element, scope) {
            accept(SelectorStrategy::ParentCombinator, selector);
        }
        if let Some(compound) = self.text_compound(doc, element) {
            accept(SelectorStrategy::Text, Selector::compound(compound));
        }
        let structural = self.structural_path(doc, element, scope)?;
        accept(SelectorStrategy::NthOfType, structural);

        trace!(element, tag, candidates = descriptor.candidates.len(), "resolve selector");
        Ok(descriptor)
    }

    /// Resolves against the element's own tree (document or shadow root).
    pub fn resolve_in_scope(
        &self,
        doc: &Document,
        element: DomId,
    ) -> Result<SelectorDescriptor> {
        self.resolve(doc, element, doc.scope_of(element)?)
    }

    /// `:scope > tag:nth-of-type(n) > ...` from `scope` down to `element`.
    pub fn structural_path(
        &self,
        doc: &Document,
        element: DomId,
        scope: DomId,
    ) -> Result<Selector> {
        let mut compounds = Vec::new();
        let mut current = element;
        for _ in 0..MAX_ANCESTOR_WALK {
            let Some(tag) = doc.tag(current) else {
                return Err(ReplayflowError::Validation(format!("node {} is not an element", current)));
            };
            compounds.push(Compound::tag(tag).nth(doc.nth_of_type(current)));
            match doc.parent(current) {
                Some(parent) if parent == scope => {
                    compounds.reverse();
                    return Ok(Selector::child_path(compounds));
                }
                Some(parent) if doc.is_element(parent) => current = parent,
                _ => return Err(ReplayflowError::Validation(format!("element {} is outside scope {}", element, scope))),
            }
        }
        Err(ReplayflowError::ShadowTraversalLimit(MAX_ANCESTOR_WALK))
    }

    /// Independent fallbacks tried after the descriptor's candidates.
    pub fn alternatives(
        &self,
        doc: &Document,
        element: DomId,
        shadow_path: Option<&ShadowPath>,
    ) -> Vec<LocatorCandidate> {
        let mut out: Vec<LocatorCandidate> = Vec::new();
        let Some(tag) = doc.tag(element) else {
            return out;
        };
        let Ok(scope) = doc.scope_of(element) else {
            return out;
        };
        let mut accept = |strategy: SelectorStrategy, selector: Selector, root: DomId| {
            if doc.selects_exactly(root, &selector, element) && !out.iter().any(|c| c.selector == selector) {
                out.push(LocatorCandidate::new(strategy, selector));
            }
        };

        for (name, value) in doc.attrs(element) {
            if name.starts_with("data-") && !self.noise.is_generated(value) {
                accept(SelectorStrategy::DataAttribute, Selector::compound(Compound::tag(tag).with_attr(name, value)), scope);
            }
        }
        for (name, value) in doc.attrs(element) {
            if (name.starts_with("aria-") || name == "role") && !value.trim().is_empty() {
                accept(SelectorStrategy::Aria, Selector::compound(Compound::tag(tag).with_attr(name, value)), scope);
            }
        }
        if let Some(parent) = doc.parent_element(element)
            && let Some(anchor) = self.anchor(doc, parent, scope)
        {
            accept(SelectorStrategy::ParentCombinator, Selector::compound(anchor).then(Combinator::Child, Compound::tag(tag)), scope);
        }
        if let Some(compound) = self.text_compound(doc, element) {
            accept(SelectorStrategy::Text, Selector::compound(compound), scope);
        }
        if let Some(path) = shadow_path.filter(|p| p.is_shadowed()) {
            accept(SelectorStrategy::ShadowPierce, path.pierce_selector(), doc.root());
        }
        if let Ok(structural) = self.structural_path(doc, element, scope) {
            accept(SelectorStrategy::NthOfType, structural, scope);
        }
        out
    }

    /// Descriptor, shadow path and alternatives for `element`.
    pub fn locate(
        &self,
        doc: &Document,
        element: DomId,
    ) -> Result<ElementLocator> {
        let descriptor = self.resolve_in_scope(doc, element)?;
        let shadow_path = self.build_shadow_path(doc, element)?;
        let alternatives = self.alternatives(doc, element, Some(&shadow_path));
        Ok(ElementLocator {
            descriptor,
            shadow_path: Some(shadow_path),
            alternatives,
        })
    }

    /// First of the test-id, id, attribute and class strategies that is unique.
    fn anchor(
        &self,
        doc: &Document,
        element: DomId,
        scope: DomId,
    ) -> Option<Compound> {
        self.test_id_compounds(doc, element)
            .into_iter()
            .chain(self.id_compound(doc, element))
            .chain(self.attribute_compounds(doc, element))
            .chain(self.class_compounds(doc, element))
            .find(|c| doc.selects_exactly(scope, &Selector::compound(c.clone()), element))
    }

    fn test_id_compounds(
        &self,
        doc: &Document,
        element: DomId,
    ) -> Vec<Compound> {
        TEST_ID_ATTRS
            .iter()
            .filter_map(|name| doc.attr(element, name).filter(|v| !v.trim().is_empty()).map(|v| Compound::default().with_attr(name, v)))
            .collect()
    }

    fn id_compound(
        &self,
        doc: &Document,
        element: DomId,
    ) -> Option<Compound> {
        doc.attr(element, "id").filter(|id| !self.noise.is_generated(id)).map(|id| Compound::default().with_id(id))
    }

    fn attribute_compounds(
        &self,
        doc: &Document,
        element: DomId,
    ) -> Vec<Compound> {
        let Some(tag) = doc.tag(element) else {
            return Vec::new();
        };
        STABLE_ATTRS
            .iter()
            .filter_map(|name| {
                let value = doc.attr(element, name)?;
                if value.trim().is_empty() || (*name == "name" && self.noise.is_generated(value)) {
                    return None;
                }
                Some(Compound::tag(tag).with_attr(name, value))
            })
            .collect()
    }

    /// Single classes first, then combinations up to `max_class_names`.
    fn class_compounds(
        &self,
        doc: &Document,
        element: DomId,
    ) -> Vec<Compound> {
        let Some(tag) = doc.tag(element) else {
            return Vec::new();
        };
        let classes: Vec<&str> = doc.classes(element).into_iter().filter(|c| !self.noise.is_generated(c)).collect();
        let mut out: Vec<Compound> = classes.iter().map(|c| Compound::tag(tag).with_class(c)).collect();
        if self.config.max_class_names >= 2 {
            for (i, first) in classes.iter().enumerate() {
                for second in classes.iter().skip(i + 1) {
                    out.push(Compound::tag(tag).with_class(first).with_class(second));
                }
            }
        }
        if self.config.max_class_names == 0 {
            out.clear();
        }
        out
    }

    /// `anchor > tag`, with a position when the tag repeats under the parent.
    fn parent_combinator(
        &self,
        doc: &Document,
        element: DomId,
        scope: DomId,
    ) -> Option<Selector> {
        let tag = doc.tag(element)?;
        let parent = doc.parent_element(element)?;
        let anchor = self.anchor(doc, parent, scope)?;
        let mut compound = Compound::tag(tag);
        if doc.count_of_type(element) > 1 {
            compound = compound.nth(doc.nth_of_type(element));
        }
        Some(Selector::compound(anchor).then(Combinator::Child, compound))
    }

    fn text_compound(
        &self,
        doc: &Document,
        element: DomId,
    ) -> Option<Compound> {
        if !doc.is_interactive(element) {
            return None;
        }
        let text = doc.text_content(element);
        if text.is_empty() || text.chars().count() > self.config.max_text_len {
            return None;
        }
        Some(Compound::tag(doc.tag(element)?).with_text(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ShadowMode;

    #[test]
    fn test_every_candidate_is_unique() {
        let mut doc = Document::new();
        let form = doc.append_element(doc.root(), "form", &[("id", "checkout")]).unwrap();
        doc.append_element(form, "button", &[("class", "btn secondary")]).unwrap();
        let target = doc.append_element(form, "button", &[("class", "btn primary"), ("data-testid", "pay"), ("type", "submit")]).unwrap();
        doc.set_text(target, "Pay now").unwrap();

        let resolver = SelectorResolver::default();
        let descriptor = resolver.resolve(&doc, target, doc.root()).unwrap();
        assert_eq!(descriptor.primary().unwrap().strategy, SelectorStrategy::TestId);
        assert_eq!(descriptor.primary().unwrap().value, "[data-testid=\"pay\"]");
        for candidate in &descriptor.candidates {
            assert_eq!(doc.query_all(doc.root(), &candidate.selector), vec![target], "{}", candidate.value);
        }
        let strategies: Vec<_> = descriptor.candidates.iter().map(|c| c.strategy).collect();
        assert!(strategies.contains(&SelectorStrategy::ClassName));
        assert!(strategies.contains(&SelectorStrategy::Text));
        assert_eq!(strategies.last(), Some(&SelectorStrategy::NthOfType));
    }

    #[test]
    fn test_framework_ids_are_excluded() {
        let mut doc = Document::new();
        let list = doc.append_element(doc.root(), "ul", &[]).unwrap();
        let target = doc.append_element(list, "li", &[("id", "ember650"), ("class", "css-1hwfws3")]).unwrap();
        let other = doc.append_element(list, "li", &[("id", "9b2c1f4e-3d2a-4c5b-8e9f-0a1b2c3d4e5f")]).unwrap();

        let resolver = SelectorResolver::default();
        for element in [target, other] {
            let descriptor = resolver.resolve(&doc, element, doc.root()).unwrap();
            assert!(!descriptor.is_empty());
            for candidate in &descriptor.candidates {
                assert!(!candidate.value.contains("ember650"));
                assert!(!candidate.value.contains("9b2c1f4e"));
                assert!(!candidate.value.contains("css-1hwfws3"));
            }
            assert_eq!(descriptor.primary().unwrap().strategy, SelectorStrategy::NthOfType);
        }
    }

    #[test]
    fn test_parent_combinator_when_element_has_no_anchor() {
        let mut doc = Document::new();
        let nav = doc.append_element(doc.root(), "nav", &[("id", "main-nav")]).unwrap();
        doc.append_element(nav, "span", &[]).unwrap();
        let target = doc.append_element(nav, "span", &[]).unwrap();
        let aside = doc.append_element(doc.root(), "aside", &[]).unwrap();
        doc.append_element(aside, "span", &[]).unwrap();

        let descriptor = SelectorResolver::default().resolve(&doc, target, doc.root()).unwrap();
        let primary = descriptor.primary().unwrap();
        assert_eq!(primary.strategy, SelectorStrategy::ParentCombinator);
        assert_eq!(primary.value, "#main-nav > span:nth-of-type(2)");
    }

    #[test]
    fn test_resolve_in_shadow_scope() {
        let mut doc = Document::new();
        let host = doc.append_element(doc.root(), "x-login", &[]).unwrap();
        let shadow = doc.attach_shadow(host, ShadowMode::Open).unwrap();
        let input = doc.append_element(shadow, "input", &[("name", "username")]).unwrap();

        let resolver = SelectorResolver::default();
        assert!(resolver.resolve(&doc, input, doc.root()).is_err());
        let descriptor = resolver.resolve_in_scope(&doc, input).unwrap();
        assert_eq!(descriptor.primary().unwrap().value, "input[name=\"username\"]");
    }
}
