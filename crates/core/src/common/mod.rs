//! Common types shared across the simulator.
//!
//! Error taxonomy, host clock access, the event-wait semaphore, and register
//! name tables.

/// Simulator error taxonomy and `Result` alias.
pub mod error;
/// Host monotonic clock in microseconds.
pub mod host;
/// ABI register names for consoles and dumps.
pub mod reg;
/// Counting semaphore for event completion waits.
pub mod sem;

pub use error::{Error, Result};
pub use sem::Semaphore;
