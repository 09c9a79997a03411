//! Campaign progression engine.
//!
//! On each scheduling tick the engine computes the due set, drives one
//! delivery attempt per due recipient, and commits cursor advancement per
//! recipient on confirmed success. One recipient's failure never blocks
//! the rest of the batch.

pub mod engine;
pub mod tick;
pub mod trigger;

pub use engine::{ProgressionEngine, TickError};
pub use tick::{TickPhase, TickStateMachine};
pub use trigger::DailyTrigger;
