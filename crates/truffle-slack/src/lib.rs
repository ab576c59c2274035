pub mod client;
pub mod error;
pub mod limiter;
pub mod mentions;
pub mod types;

pub use client::{SlackClient, SlackTransport};
pub use error::SlackError;
pub use limiter::BatchLimiter;
