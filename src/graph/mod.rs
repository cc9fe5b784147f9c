mod history;
mod step_graph;

pub use step_graph::{GraphSnapshot, StepGraph};
