//! Tracing conventions shared by the clients.
//!
//! The library only emits `tracing` spans and events; installing a subscriber
//! is left to the binary embedding it.

pub mod keys;
#[cfg(test)]
pub mod test_span;

pub use keys::*;
