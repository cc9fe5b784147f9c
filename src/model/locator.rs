use serde::{Deserialize, Serialize};

use crate::dom::Selector;

/// Locator strategy, in descending preference.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SelectorStrategy {
    TestId,
    Id,
    Attribute,
    ClassName,
    ParentCombinator,
    Text,
    NthOfType,
    DataAttribute,
    Aria,
    ShadowPierce,
}

impl SelectorStrategy {
    /// Lower is preferred.
    pub fn rank(&self) -> u8 {
        match self {
            SelectorStrategy::TestId => 0,
            SelectorStrategy::Id => 1,
            SelectorStrategy::Attribute => 2,
            SelectorStrategy::ClassName => 3,
            SelectorStrategy::ParentCombinator => 4,
            SelectorStrategy::Text => 5,
            SelectorStrategy::NthOfType => 6,
            SelectorStrategy::DataAttribute => 0,
            SelectorStrategy::Aria => 2,
            SelectorStrategy::ShadowPierce => 4,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LocatorCandidate {
    pub strategy: SelectorStrategy,
    /// rendered selector text
    pub value: String,
    /// structured form evaluated by the query engine
    pub selector: Selector,
    pub rank: u8,
}

impl LocatorCandidate {
    pub fn new(
        strategy: SelectorStrategy,
        selector: Selector,
    ) -> Self {
        Self {
            strategy,
            value: selector.to_string(),
            selector,
            rank: strategy.rank(),
        }
    }
}

/// Ranked candidates for re-finding one element inside its scope.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SelectorDescriptor {
    pub candidates: Vec<LocatorCandidate>,
}

impl SelectorDescriptor {
    /// Appends a candidate unless one with the same value is present.
    pub fn push(
        &mut self,
        candidate: LocatorCandidate,
    ) -> bool {
        if self.candidates.iter().any(|c| c.value == candidate.value) {
            return false;
        }
        self.candidates.push(candidate);
        true
    }

    pub fn primary(&self) -> Option<&LocatorCandidate> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShadowMode {
    #[default]
    Open,
    Closed,
}

/// One segment of the way from the document root down to an element.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShadowHop {
    /// target reached without leaving the current tree
    Light {
        selector: Selector,
    },
    /// enter the shadow root of the host matched by `host_selector`
    Shadow {
        host_tag: String,
        host_selector: Selector,
        inner_selector: Selector,
        mode: ShadowMode,
        depth: usize,
    },
}

/// Route from the document root to an element, one hop per shadow boundary.
///
/// Light ancestors are folded into the selector of the next hop, so a
/// `Light` hop appears only as the single hop of a target that never crosses
/// a shadow boundary. Every other path is made of `Shadow` hops alone.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ShadowPath {
    pub hops: Vec<ShadowHop>,
}

impl ShadowPath {
    /// Number of shadow boundaries crossed.
    pub fn depth(&self) -> usize {
        self.hops.iter().filter(|h| matches!(h, ShadowHop::Shadow { .. })).count()
    }

    pub fn is_shadowed(&self) -> bool {
        self.depth() > 0
    }
}

/// Everything stored on a node to find its target element again.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ElementLocator {
    pub descriptor: SelectorDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_path: Option<ShadowPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<LocatorCandidate>,
}

impl ElementLocator {
    /// Document-absolute selectors in the order replay tries them.
    ///
    /// Descriptor candidates are scoped to the element's innermost tree, so
    /// they are prefixed with the host chain of the shadow path. Shadow-pierce
    /// alternatives are already absolute.
    pub fn replay_selectors(&self) -> Vec<Selector> {
        let hosts = self.host_prefix();
        let absolute = |c: &LocatorCandidate| match (&hosts, c.strategy) {
            (_, SelectorStrategy::ShadowPierce) | (None, _) => c.selector.clone(),
            (Some(prefix), _) => prefix.pierce(&c.selector),
        };

        let mut out: Vec<Selector> = Vec::new();
        for candidate in self.descriptor.candidates.iter().chain(self.alternatives.iter()) {
            let selector = absolute(candidate);
            if !out.contains(&selector) {
                out.push(selector);
            }
        }
        out
    }

    fn host_prefix(&self) -> Option<Selector> {
        let path = self.shadow_path.as_ref()?;
        let mut prefix: Option<Selector> = None;
        for hop in &path.hops {
            if let ShadowHop::Shadow {
                host_selector,
                ..
            } = hop
            {
                prefix = Some(match prefix {
                    None => host_selector.clone(),
                    Some(p) => p.pierce(host_selector),
                });
            }
        }
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Compound;

    #[test]
    fn test_descriptor_dedups_by_value() {
        let mut d = SelectorDescriptor::default();
        let sel = Selector::compound(Compound::default().with_id("go"));
        assert!(d.push(LocatorCandidate::new(SelectorStrategy::Id, sel.clone())));
        assert!(!d.push(LocatorCandidate::new(SelectorStrategy::Id, sel)));
        assert_eq!(d.primary().unwrap().value, "#go");
    }

    #[test]
    fn test_replay_selectors_prefix_host_chain() {
        let inner = Selector::compound(Compound::default().with_id("go"));
        let host = Selector::compound(Compound::tag("x-app"));
        let mut locator = ElementLocator::default();
        locator.descriptor.push(LocatorCandidate::new(SelectorStrategy::Id, inner.clone()));
        locator.shadow_path = Some(ShadowPath {
            hops: vec![ShadowHop::Shadow {
                host_tag: "x-app".to_string(),
                host_selector: host.clone(),
                inner_selector: inner.clone(),
                mode: ShadowMode::Open,
                depth: 1,
            }],
        });
        locator.alternatives.push(LocatorCandidate::new(SelectorStrategy::ShadowPierce, host.pierce(&inner)));

        let selectors = locator.replay_selectors();
        assert_eq!(selectors.len(), 1);
        assert_eq!(selectors[0].to_string(), "x-app >>> #go");
    }
}
