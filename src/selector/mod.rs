//! Stable selector resolution.
//!
//! - `patterns`: framework-generated identifier detection
//! - `resolver`: ranked locator candidates and alternatives
//! - `shadow`: shadow-boundary-aware paths and their derived artifacts

mod patterns;
mod resolver;
mod shadow;

pub use patterns::NoiseFilter;
pub use resolver::{STABLE_ATTRS, SelectorResolver, TEST_ID_ATTRS};
