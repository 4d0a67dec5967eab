//! `homestead-turnqueue` — the TQ component. Per-chat bounded FIFO that
//! serializes conversation turns and drives them through the dispatcher,
//! bounding backpressure and honoring per-turn cancellation.

pub mod error;
pub mod queue;
pub mod types;
pub mod worker;

pub use error::{Result, TurnQueueError};
pub use queue::TurnQueue;
pub use types::{Turn, TurnOutcome};
