pub mod queue;
pub mod types;

pub use queue::TaskQueue;
pub use types::{MessageTask, QueueStats, TaskStatus};
