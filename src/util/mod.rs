//! Small helpers shared by the parser and stylesheet layers.

pub mod message;

pub use message::{format_message, MESSAGE_BUFFER_SIZE};
