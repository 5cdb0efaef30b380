//! Viewer commands and their forwarding to the engine

pub mod command;
pub mod forwarder;
pub mod status;

pub use command::{CommandKind, ControlCommand};
pub use forwarder::CommandForwarder;
pub use status::ControlStatus;
