use serde::{Deserialize, Serialize};

use crate::{ReplayflowError, Result, config::ReplayConfig};

/// Lifecycle of a replay session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReplayState {
    #[default]
    Idle,
    Starting,
    Playing,
    Paused,
    WaitingForNext,
    /// a step failed; left again as soon as the policy is applied
    Error,
    Completed,
    Stopped,
}

impl ReplayState {
    /// A session exists and holds the graph.
    pub fn is_active(&self) -> bool {
        matches!(self, ReplayState::Starting | ReplayState::Playing | ReplayState::Paused | ReplayState::WaitingForNext | ReplayState::Error)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplayState::Completed | ReplayState::Stopped)
    }
}

/// Control messages sent to the replay dispatcher.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReplayCommand {
    Pause,
    Resume,
    Stop,
    Next,
}

impl ReplayCommand {
    /// The state the command leads to from `state`.
    pub fn transition(
        &self,
        state: ReplayState,
    ) -> Result<ReplayState> {
        match (self, state) {
            (ReplayCommand::Pause, ReplayState::Playing) => Ok(ReplayState::Paused),
            (ReplayCommand::Resume, ReplayState::Paused) => Ok(ReplayState::Playing),
            (ReplayCommand::Next, ReplayState::WaitingForNext) => Ok(ReplayState::Playing),
            (ReplayCommand::Stop, s) if s.is_active() => Ok(ReplayState::Stopped),
            (command, state) => Err(ReplayflowError::InvalidTransition {
                state: state.as_ref().to_string(),
                command: command.as_ref().to_string(),
            }),
        }
    }
}

/// Per-replay settings; unset fields fall back to [`ReplayConfig`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ReplayOptions {
    pub speed: Option<f64>,
    pub step_through: bool,
    pub continue_on_error: Option<bool>,
}

impl ReplayOptions {
    pub fn with_speed(
        mut self,
        speed: f64,
    ) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn step_through(mut self) -> Self {
        self.step_through = true;
        self
    }

    pub fn continue_on_error(
        mut self,
        enabled: bool,
    ) -> Self {
        self.continue_on_error = Some(enabled);
        self
    }

    /// Speed to use, rejecting zero, negative and non-finite multipliers.
    pub fn effective_speed(
        &self,
        config: &ReplayConfig,
    ) -> Result<f64> {
        let speed = self.speed.unwrap_or(config.default_speed);
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ReplayflowError::Validation(format!("replay speed must be greater than 0, got {}", speed)));
        }
        Ok(speed)
    }

    pub fn effective_continue_on_error(
        &self,
        config: &ReplayConfig,
    ) -> bool {
        self.continue_on_error.unwrap_or(config.continue_on_error)
    }
}
