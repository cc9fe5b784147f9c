//! Shadow-boundary-aware paths from the document root to an element.

use tracing::trace;

use crate::{
    ReplayflowError, Result,
    dom::{Combinator, Document, DomId, MAX_ANCESTOR_WALK, Selector},
    model::{SelectorStrategy, ShadowHop, ShadowPath},
    selector::SelectorResolver,
};

impl SelectorResolver {
    /// Walks up from `element`, recording one hop per shadow boundary.
    ///
    /// Light ancestors inside a tree are collapsed into the selector of the
    /// next host (or of the target). A target that never crosses a boundary
    /// yields a single light hop. Hop selectors are plain CSS so that
    /// [`ShadowPath::traversal_script`] can hand them to `querySelector`.
    pub fn build_shadow_path(
        &self,
        doc: &Document,
        element: DomId,
    ) -> Result<ShadowPath> {
        if !doc.is_element(element) {
            return Err(ReplayflowError::Validation(format!("node {} is not an element", element)));
        }
        let max_depth = self.config().max_shadow_depth;
        let mut hops = Vec::new();
        let mut current = element;
        for _ in 0..MAX_ANCESTOR_WALK {
            let scope = doc.scope_of(current)?;
            let inner_selector = self.hop_selector(doc, current, scope)?;
            if !doc.is_shadow_root(scope) {
                if hops.is_empty() {
                    hops.push(ShadowHop::Light {
                        selector: inner_selector,
                    });
                }
                hops.reverse();
                let mut depth = 0;
                for hop in hops.iter_mut() {
                    if let ShadowHop::Shadow {
                        depth: d,
                        ..
                    } = hop
                    {
                        depth += 1;
                        *d = depth;
                    }
                }
                trace!(element, depth, "build shadow path");
                return Ok(ShadowPath {
                    hops,
                });
            }

            if hops.len() >= max_depth {
                return Err(ReplayflowError::ShadowTraversalLimit(max_depth));
            }
            let (Some(host), Some(mode)) = (doc.shadow_host(scope), doc.shadow_mode(scope)) else {
                return Err(ReplayflowError::Validation(format!("shadow root {} has no host", scope)));
            };
            let host_tag = doc.tag(host).unwrap_or_default().to_string();
            let host_selector = self.hop_selector(doc, host, doc.scope_of(host)?)?;
            hops.push(ShadowHop::Shadow {
                host_tag,
                host_selector,
                inner_selector,
                mode,
                depth: 0,
            });
            current = host;
        }
        Err(ReplayflowError::ShadowTraversalLimit(MAX_ANCESTOR_WALK))
    }

    /// Best candidate that a browser's `querySelector` understands.
    fn hop_selector(
        &self,
        doc: &Document,
        element: DomId,
        scope: DomId,
    ) -> Result<Selector> {
        let descriptor = self.resolve(doc, element, scope)?;
        match descriptor.candidates.iter().find(|c| c.strategy != SelectorStrategy::Text) {
            Some(candidate) => Ok(candidate.selector.clone()),
            None => self.structural_path(doc, element, scope),
        }
    }
}

/// Escapes a selector for a single-quoted JavaScript string.
fn escape_selector(selector: &str) -> String {
    selector.replace('\\', "\\\\").replace('\'', "\\'")
}

/// JavaScript evaluating to the element `selector` finds below `root`.
///
/// `:scope` means nothing on a document or shadow root, so a path anchored at
/// the root picks its first element among `root.children` and continues from
/// there.
fn query_expression(
    root: &str,
    selector: &Selector,
) -> String {
    let Some((first, rest)) = selector.steps.split_first().filter(|(first, _)| first.combinator == Combinator::Child) else {
        return format!("{}.querySelector('{}')", root, escape_selector(&selector.to_string()));
    };
    let head = format!("(Array.from({}.children).find((c) => c.matches('{}')) ?? null)", root, escape_selector(&first.compound.to_string()));
    if rest.is_empty() {
        return head;
    }
    let tail = Selector {
        steps: rest.to_vec(),
    };
    let tail = match rest[0].combinator {
        Combinator::Descendant => format!(":scope {}", tail),
        _ => tail.to_string(),
    };
    format!("({}?.querySelector('{}') ?? null)", head, escape_selector(&tail))
}

impl ShadowPath {
    /// Selectors of the hosts, outermost first.
    pub fn host_chain(&self) -> Vec<&Selector> {
        self.hops
            .iter()
            .filter_map(|hop| match hop {
                ShadowHop::Shadow {
                    host_selector,
                    ..
                } => Some(host_selector),
                ShadowHop::Light {
                    ..
                } => None,
            })
            .collect()
    }

    /// Selector of the target inside its innermost tree.
    pub fn target_selector(&self) -> Option<&Selector> {
        self.hops.last().map(|hop| match hop {
            ShadowHop::Light {
                selector,
            } => selector,
            ShadowHop::Shadow {
                inner_selector,
                ..
            } => inner_selector,
        })
    }

    /// `host >>> host >>> target` as one document-absolute selector.
    pub fn pierce_selector(&self) -> Selector {
        let mut out: Option<Selector> = None;
        for host in self.host_chain() {
            out = Some(match out {
                None => host.clone(),
                Some(prefix) => prefix.pierce(host),
            });
        }
        match (out, self.target_selector()) {
            (Some(prefix), Some(target)) => prefix.pierce(target),
            (None, Some(target)) => target.clone(),
            (prefix, None) => prefix.unwrap_or_default(),
        }
    }

    /// JavaScript expression that re-enters each `shadowRoot` explicitly and
    /// evaluates to the target element or `null`.
    pub fn traversal_script(&self) -> String {
        let mut lines = vec!["(() => {".to_string(), "  let root = document;".to_string(), "  let el = null;".to_string()];
        for host in self.host_chain() {
            lines.push(format!("  el = {};", query_expression("root", host)));
            lines.push("  if (!el || !el.shadowRoot) return null;".to_string());
            lines.push("  root = el.shadowRoot;".to_string());
        }
        if let Some(target) = self.target_selector() {
            lines.push(format!("  return {};", query_expression("root", target)));
        } else {
            lines.push("  return null;".to_string());
        }
        lines.push("})()".to_string());
        lines.join("\n")
    }

    /// Native equivalent of [`ShadowPath::traversal_script`].
    pub fn resolve(
        &self,
        doc: &Document,
    ) -> Option<DomId> {
        let mut scope = doc.root();
        for host in self.host_chain() {
            let element = doc.query_unique(scope, host)?;
            scope = doc.shadow_root(element)?;
        }
        doc.query_unique(scope, self.target_selector()?)
    }
}
