//! State fan-out to connected viewers

pub mod hub;

pub use hub::{Broadcaster, Subscription};
