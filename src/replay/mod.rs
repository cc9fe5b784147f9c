//! Timed, cancellable replay of a step graph against a live target.

mod dispatcher;
mod engine;
mod session;
mod state;
mod target;

pub use dispatcher::ReplayOutcome;
pub use engine::ReplayEngine;
pub use session::{ReplayLogEntry, ReplaySession, filter_steps};
pub use state::{ReplayCommand, ReplayOptions, ReplayState};
pub use target::{DocumentTarget, ElementHandle, PerformedAction, ReplayTarget};
