//! # Replayflow
//!
//! Replayflow records a user's on-screen work as a step graph and replays it
//! against a live target surface to validate or re-execute the process.
//! It is designed to be embedded behind a capture source and a presentation
//! layer, which call into the engine and render its events.
//!
//! ## Core Features
//!
//! - **Step Graph**: ordered, branchable actions with undo/redo, authentication
//!   and replay-start annotations, and an automation export document
//! - **Stable Selectors**: ranked locators that skip framework-generated noise
//!   and cross shadow-DOM boundaries
//! - **Replay**: timed, speed-scaled, pausable playback with step-through
//!   debugging and per-step failure recovery
//! - **Event-Driven**: graph, step and replay events on one channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use replayflow::{EngineBuilder, EndStepMode, TargetContext};
//!
//! let engine = EngineBuilder::new().build()?;
//! engine.launch()?;
//!
//! engine.start_capture()?;
//! engine.start_step("Log in")?;
//! engine.record(raw_event)?;
//! engine.end_step(EndStepMode::Step, TargetContext::application("Google Chrome"))?;
//! engine.stop_capture()?;
//!
//! engine.start_replay(&ReplayOptions::default().with_speed(2.0), target)?;
//! ```

mod builder;
pub mod capture;
mod common;
mod config;
pub mod dom;
mod engine;
mod error;
pub mod events;
pub mod graph;
mod model;
pub mod replay;
mod runtime;
pub mod selector;
pub mod store;
mod utils;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use config::{CaptureConfig, Config, ReplayConfig, SelectorConfig, StoreConfig, StoreType};
pub use engine::{EndStepMode, Engine};
pub use error::ReplayflowError;
pub use model::*;
pub use runtime::{Channel, ChannelEvent, ChannelOptions, SubscriptionId};

/// Result type alias for Replayflow operations.
pub type Result<T> = std::result::Result<T, ReplayflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
