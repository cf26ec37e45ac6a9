//! Signaling event types produced by the decoders

pub mod message;

pub use message::*;
