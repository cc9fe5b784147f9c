use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    ReplayflowError, Result,
    model::{ElementLocator, RawEvent},
    utils,
};

/// node id
pub type NodeId = String;

static RULE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)^\s*if\s+(.+?),?\s+then\s+(.+?)\s*$").unwrap());

/// Where the captured action happened.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TargetContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
}

impl TargetContext {
    pub fn application(name: &str) -> Self {
        Self {
            application_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_url(
        mut self,
        url: &str,
    ) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_window_title(
        mut self,
        title: &str,
    ) -> Self {
        self.window_title = Some(title.to_string());
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NodeMetadata {
    #[serde(default)]
    pub is_authentication_step: bool,
    #[serde(default)]
    pub is_replay_start_point: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<String>,
}

/// IF/THEN rule attached to a decision.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Rule {
    pub condition: String,
    pub outcome: String,
}

impl Rule {
    /// Parses `"if <condition>[,] then <outcome>"`, case-insensitive.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = RULE_PATTERN.captures(text)?;
        Some(Self {
            condition: caps.get(1)?.as_str().trim().to_string(),
            outcome: caps.get(2)?.as_str().trim().to_string(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Branch {
    pub id: String,
    pub condition: String,
    pub label: String,
    /// whether any node has been recorded on this branch
    #[serde(default)]
    pub recorded: bool,
}

impl Branch {
    pub fn new(
        condition: &str,
        label: &str,
    ) -> Self {
        Self {
            id: utils::shortid(),
            condition: condition.to_string(),
            label: label.to_string(),
            recorded: false,
        }
    }
}

/// Checks that a decision's branch set is usable.
pub fn validate_branches(branches: &[Branch]) -> Result<()> {
    if branches.is_empty() {
        return Err(ReplayflowError::Validation("a decision needs at least one branch".to_string()));
    }
    let mut seen = HashSet::new();
    for branch in branches {
        if branch.label.trim().is_empty() {
            return Err(ReplayflowError::Validation(format!("branch {} has a blank label", branch.id)));
        }
        if !seen.insert(branch.id.as_str()) {
            return Err(ReplayflowError::Validation(format!("duplicate branch id {}", branch.id)));
        }
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubStep {
    pub description: String,
    pub raw_events: Vec<RawEvent>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, strum::AsRefStr)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NodeKind {
    Action,
    Decision {
        reason_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rule: Option<Rule>,
        branches: Vec<Branch>,
    },
    MarkedAction {
        reason_text: String,
    },
    Step {
        sub_steps: Vec<SubStep>,
    },
}

/// One captured unit of user work.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActionNode {
    /// node id
    pub id: NodeId,
    /// what the user did
    pub description: String,
    /// epoch millis
    pub timestamp: i64,
    pub duration_ms: u64,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<ElementLocator>,
    #[serde(default)]
    pub context: TargetContext,
    #[serde(default)]
    pub metadata: NodeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<NodeId>,
}

impl ActionNode {
    pub fn branches(&self) -> &[Branch] {
        match &self.kind {
            NodeKind::Decision {
                branches,
                ..
            } => branches,
            _ => &[],
        }
    }

    pub fn sub_steps(&self) -> &[SubStep] {
        match &self.kind {
            NodeKind::Step {
                sub_steps,
            } => sub_steps,
            _ => &[],
        }
    }

    pub fn is_decision(&self) -> bool {
        matches!(self.kind, NodeKind::Decision { .. })
    }
}

/// Explicit predecessor of a new node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predecessor {
    Node {
        id: NodeId,
    },
    Branch {
        decision_id: NodeId,
        branch_id: String,
    },
}

/// A node that has not been inserted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraft {
    pub description: String,
    pub timestamp: Option<i64>,
    pub duration_ms: u64,
    pub kind: NodeKind,
    pub locator: Option<ElementLocator>,
    pub context: TargetContext,
    pub is_authentication_step: bool,
    pub user_context: Option<String>,
    pub predecessor: Option<Predecessor>,
}

impl NodeDraft {
    fn new(
        description: &str,
        kind: NodeKind,
    ) -> Self {
        Self {
            description: description.to_string(),
            timestamp: None,
            duration_ms: 0,
            kind,
            locator: None,
            context: TargetContext::default(),
            is_authentication_step: false,
            user_context: None,
            predecessor: None,
        }
    }

    pub fn action(description: &str) -> Self {
        Self::new(description, NodeKind::Action)
    }

    /// A decision point; the rule is parsed from `reason_text` when it reads as IF/THEN.
    pub fn decision(
        description: &str,
        reason_text: &str,
        branches: Vec<Branch>,
    ) -> Self {
        Self::new(
            description,
            NodeKind::Decision {
                reason_text: reason_text.to_string(),
                rule: Rule::parse(reason_text),
                branches,
            },
        )
    }

    pub fn marked(
        description: &str,
        reason_text: &str,
    ) -> Self {
        Self::new(
            description,
            NodeKind::MarkedAction {
                reason_text: reason_text.to_string(),
            },
        )
    }

    pub fn step(
        description: &str,
        sub_steps: Vec<SubStep>,
    ) -> Self {
        Self::new(
            description,
            NodeKind::Step {
                sub_steps,
            },
        )
    }

    pub fn with_timestamp(
        mut self,
        timestamp: i64,
    ) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_duration(
        mut self,
        duration_ms: u64,
    ) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_locator(
        mut self,
        locator: ElementLocator,
    ) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_context(
        mut self,
        context: TargetContext,
    ) -> Self {
        self.context = context;
        self
    }

    pub fn with_user_context(
        mut self,
        user_context: &str,
    ) -> Self {
        self.user_context = Some(user_context.to_string());
        self
    }

    pub fn authentication(mut self) -> Self {
        self.is_authentication_step = true;
        self
    }

    pub fn after(
        mut self,
        id: &str,
    ) -> Self {
        self.predecessor = Some(Predecessor::Node {
            id: id.to_string(),
        });
        self
    }

    pub fn on_branch(
        mut self,
        decision_id: &str,
        branch_id: &str,
    ) -> Self {
        self.predecessor = Some(Predecessor::Branch {
            decision_id: decision_id.to_string(),
            branch_id: branch_id.to_string(),
        });
        self
    }
}

/// Metadata merged into an existing node.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_authentication_step: Option<bool>,
}
