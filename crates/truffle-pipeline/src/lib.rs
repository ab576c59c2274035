pub mod context;
pub mod error;
pub mod processor;
pub mod worker;

pub use error::PipelineError;
pub use processor::{MessageProcessor, ProcessOutcome};
pub use worker::WorkerPool;
