//! Event types published on the channel.
//!
//! Graph events follow structural and metadata changes of the step graph,
//! step events follow the capture window, and replay statuses follow a
//! running replay session.

mod graph;
mod replay;
mod step;

pub use graph::GraphEvent;
pub use replay::ReplayStatus;
pub use step::StepEvent;

use crate::utils::time::time_millis;

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
    /// epoch millis at publication
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
            timestamp: time_millis(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}
