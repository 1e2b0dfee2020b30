//! Cooperative inference cycle: frame-sliced execution and output readback.

mod error;
mod readback;
mod scheduler;

pub use error::CycleError;
pub use readback::{ReadbackPoll, ResultReader};
pub use scheduler::{CyclePhase, InferenceScheduler, SchedulerStats, DEFAULT_LAYERS_PER_FRAME};
