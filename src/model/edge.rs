use serde::{Deserialize, Serialize};

use crate::model::NodeId;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EdgeKind {
    #[default]
    Sequence,
    Branch,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default)]
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    pub fn sequence(
        from: &str,
        to: &str,
    ) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            kind: EdgeKind::Sequence,
            label: None,
        }
    }

    pub fn branch(
        from: &str,
        to: &str,
        label: &str,
    ) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            kind: EdgeKind::Branch,
            label: Some(label.to_string()),
        }
    }
}
