//! Structured selectors.
//!
//! A `Selector` is a chain of compound selectors joined by combinators. It
//! renders to CSS-like text for external tools, and the crate's own query
//! engine evaluates the structured form directly so that no parser is
//! needed on the replay path.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a compound relates to the nodes matched by the previous step.
///
/// The first step of a selector is relative to the query scope.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    /// any element below, inside the same tree
    #[default]
    Descendant,
    /// direct element child
    Child,
    /// any element inside the shadow tree hosted by the previous match
    ShadowDescendant,
    /// direct child of the shadow root hosted by the previous match
    ShadowChild,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrMatch {
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Compound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<AttrMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth_of_type: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectorStep {
    pub combinator: Combinator,
    pub compound: Compound,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Selector {
    pub steps: Vec<SelectorStep>,
}

impl Compound {
    pub fn tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_ascii_lowercase()),
            ..Default::default()
        }
    }

    pub fn with_id(
        mut self,
        id: &str,
    ) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_class(
        mut self,
        class: &str,
    ) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_attr(
        mut self,
        name: &str,
        value: &str,
    ) -> Self {
        self.attrs.push(AttrMatch {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn nth(
        mut self,
        n: usize,
    ) -> Self {
        self.nth_of_type = Some(n);
        self
    }

    pub fn with_text(
        mut self,
        text: &str,
    ) -> Self {
        self.text = Some(text.to_string());
        self
    }
}

impl Selector {
    /// A single compound matched anywhere below the scope.
    pub fn compound(compound: Compound) -> Self {
        Self {
            steps: vec![SelectorStep {
                combinator: Combinator::Descendant,
                compound,
            }],
        }
    }

    /// A chain of direct children starting at the scope.
    pub fn child_path(compounds: Vec<Compound>) -> Self {
        Self {
            steps: compounds
                .into_iter()
                .map(|compound| SelectorStep {
                    combinator: Combinator::Child,
                    compound,
                })
                .collect(),
        }
    }

    pub fn then(
        mut self,
        combinator: Combinator,
        compound: Compound,
    ) -> Self {
        self.steps.push(SelectorStep {
            combinator,
            compound,
        });
        self
    }

    /// Continues this selector inside the shadow tree of whatever it matches.
    ///
    /// `inner` is interpreted relative to that shadow root.
    pub fn pierce(
        &self,
        inner: &Selector,
    ) -> Selector {
        let mut steps = self.steps.clone();
        for (i, step) in inner.steps.iter().enumerate() {
            let combinator = match (i, step.combinator) {
                (0, Combinator::Descendant) => Combinator::ShadowDescendant,
                (0, Combinator::Child) => Combinator::ShadowChild,
                (_, c) => c,
            };
            steps.push(SelectorStep {
                combinator,
                compound: step.compound.clone(),
            });
        }
        Selector {
            steps,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether evaluating the selector crosses a shadow boundary.
    pub fn crosses_shadow(&self) -> bool {
        self.steps.iter().any(|s| matches!(s.combinator, Combinator::ShadowDescendant | Combinator::ShadowChild))
    }
}

/// Quotes a string for an attribute or text pseudo-class value.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Whether `value` can be written as a bare CSS identifier.
fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some('-') => match chars.clone().next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        },
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for Compound {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut wrote = false;
        if let Some(tag) = &self.tag {
            write!(f, "{}", tag)?;
            wrote = true;
        }
        if let Some(id) = &self.id {
            if is_css_ident(id) {
                write!(f, "#{}", id)?;
            } else {
                write!(f, "[id={}]", quote(id))?;
            }
            wrote = true;
        }
        for class in &self.classes {
            if is_css_ident(class) {
                write!(f, ".{}", class)?;
            } else {
                write!(f, "[class~={}]", quote(class))?;
            }
            wrote = true;
        }
        for attr in &self.attrs {
            write!(f, "[{}={}]", attr.name, quote(&attr.value))?;
            wrote = true;
        }
        if let Some(n) = self.nth_of_type {
            if !wrote {
                write!(f, "*")?;
            }
            write!(f, ":nth-of-type({})", n)?;
            wrote = true;
        }
        if let Some(text) = &self.text {
            write!(f, ":text-is({})", quote(text))?;
            wrote = true;
        }
        if !wrote {
            write!(f, "*")?;
        }
        Ok(())
    }
}

impl fmt::Display for Selector {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            let sep = match (i, step.combinator) {
                (0, Combinator::Descendant) => "",
                (0, Combinator::Child) => ":scope > ",
                (0, Combinator::ShadowDescendant) => ">>> ",
                (0, Combinator::ShadowChild) => ">>> :scope > ",
                (_, Combinator::Descendant) => " ",
                (_, Combinator::Child) => " > ",
                (_, Combinator::ShadowDescendant) => " >>> ",
                (_, Combinator::ShadowChild) => " >>> :scope > ",
            };
            write!(f, "{}{}", sep, step.compound)?;
        }
        Ok(())
    }
}
