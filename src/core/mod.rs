//! Core Module - Business Logic
//!
//! Feature extraction, risk scoring, collection, checkpointing and the
//! batch orchestrator.

pub mod checkpoint;
pub mod collector;
pub mod features;
pub mod orchestrator;
pub mod risk_score;
pub mod sink;
pub mod summary;

pub use checkpoint::*;
pub use collector::*;
pub use features::*;
pub use orchestrator::*;
pub use risk_score::*;
pub use sink::*;
pub use summary::*;
