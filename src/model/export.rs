use serde::{Deserialize, Serialize};

use crate::{
    Result,
    model::{Edge, ElementLocator, NodeId, SessionState, SubStep},
};

/// Target format of an automation export. Only the document shape is
/// produced here; rendering to text is done by the caller.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
    Markdown,
    Mermaid,
    Playwright,
    Selenium,
    Puppeteer,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExportNode {
    pub id: NodeId,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<ElementLocator>,
    pub timestamp: i64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_steps: Option<Vec<SubStep>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExportDocument {
    pub format: ExportFormat,
    pub generated_at: i64,
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_start_point_id: Option<NodeId>,
}

impl ExportDocument {
    /// The replayable JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
