//! Event-loop simulation for looplens.
//!
//! [`TimelineGenerator`] runs a script once synchronously, then drains the
//! deferred (microtask) queue and promotes timers one at a time, recording a
//! [`Snapshot`](looplens_core::Snapshot) at every sub-step.

pub mod config;
pub mod generator;
pub mod locate;
pub mod queue;
mod session;

pub use config::{GeneratorConfig, LineMode};
pub use generator::{TimelineGenerator, generate};
pub use locate::LineLocator;
pub use queue::{TaskQueue, TimerSet};
