//! Pipeline engine: the unified job processor, the bounded task queue with
//! its worker pool, the per-job progress broadcaster, and speaker
//! alignment.

pub mod align;
pub mod broadcast;
pub mod processor;
pub mod queue;
pub mod subprocess;

pub use broadcast::ProgressBroadcaster;
pub use processor::JobProcessor;
pub use queue::{QueueStats, TaskQueue};
