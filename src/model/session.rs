use serde::{Deserialize, Serialize};

use crate::{ReplayflowError, Result};

/// Captured authentication/storage state used to skip login steps on replay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionState {
    /// origin the state belongs to, e.g. `https://app.example.com`
    pub origin: String,
    /// epoch millis
    pub captured_at: i64,
    /// cookies, local storage and whatever else the source captured
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SessionState {
    pub fn new(
        origin: &str,
        captured_at: i64,
        data: serde_json::Value,
    ) -> Self {
        Self {
            origin: origin.to_string(),
            captured_at,
            data,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.origin.trim().is_empty() {
            return Err(ReplayflowError::Validation("session origin is empty".to_string()));
        }
        Ok(())
    }
}
