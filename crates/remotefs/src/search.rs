//! Name search under a root folder.
//!
//! This module provides:
//! - `SearchCoordinator`, which tries the strategies in order with fallback
//! - The global, indexed and naive strategies
//! - Result shaping shared by all strategies

mod coordinator;
mod global;
mod indexed;
mod naive;
mod shaper;

#[cfg(test)]
mod tests;

// Re-export main types
pub use coordinator::SearchCoordinator;
pub use shaper::{HitCollector, ResultShaper};
