//! Channel abstraction for message I/O.

pub mod channel;
pub mod line;

pub use channel::*;
pub use line::LineClient;
