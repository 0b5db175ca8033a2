//! User-space machine simulator for small RISC-V systems.
//!
//! This crate models a machine as cores, a memory/MMIO bus with address
//! translation, and memory-mapped devices, and dispatches guest
//! instructions until the guest halts, traps, or the host requests exit:
//! 1. **Execution:** Per-core fetch/decode/execute with privilege levels,
//!    exceptions, CSRs, atomics, and barriers (`core`, `riscv`).
//! 2. **Translation:** Chained mappers routing bus addresses to memory
//!    regions or device endpoints, reconfigurable from device context
//!    (`mapper`, `mem`, `bus`).
//! 3. **Concurrency:** One cooperative worker thread per core fed by an
//!    asynchronous event queue; IRQs flow device → engine → exception
//!    (`event`, `worker`, `engine`, `irq`).
//! 4. **Timers:** An ordered expiry queue on a dedicated thread serving
//!    all device timer models (`chrono`).

/// Root interconnect.
pub mod bus;
/// Shared timer service.
pub mod chrono;
/// Common types: errors, host clock, semaphore, register names.
pub mod common;
/// Machine configuration structures and platform defaults.
pub mod config;
/// Architecture-neutral core state.
pub mod core;
/// Device wrapper and capability trait.
pub mod device;
/// Reference platform device models.
pub mod devices;
/// Per-core engine state and the steppable-core trait.
pub mod engine;
/// Events, the event queue, and event endpoints.
pub mod event;
/// Bus transaction value type.
pub mod io;
/// Interrupt endpoints.
pub mod irq;
/// Guest ELF loading.
pub mod loader;
/// Top-level machine aggregate.
pub mod machine;
/// Address translation stages.
pub mod mapper;
/// Guest memory regions.
pub mod mem;
/// RISC-V concrete core.
pub mod riscv;
/// Worker threads and event loops.
pub mod worker;

pub use crate::common::{Error, Result};
pub use crate::config::MachineConfig;
pub use crate::machine::Machine;
