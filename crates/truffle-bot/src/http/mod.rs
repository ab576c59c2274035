pub mod debug;
pub mod events;
pub mod oauth;
