pub mod admin;
pub mod queue;
pub mod scores;
pub mod status;
pub mod workers;
