//! Per-core execution engine state.
//!
//! An `Engine` is the shared face of one executing core: run-state bits,
//! the core's interrupt endpoint, and the link to the worker that owns the
//! core. It provides:
//! 1. **Run state:** `interrupts_enabled` and `wfi` bits; the engine is
//!    runnable exactly when it is not in WFI.
//! 2. **Asynchronous IRQ delivery:** The engine is an [`IrqSink`] whose
//!    assert path enqueues an event on the owning worker, so device-context
//!    callers never touch core state directly.
//! 3. **Commands:** `Run`/`Halt`/`Exit` control events, optionally waiting
//!    for the worker to process them.
//!
//! The architectural core behind an engine implements [`EngineCore`] and is
//! owned exclusively by the worker thread; everything here is safe to call
//! from any thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::common::sem::lock_unpoisoned;
use crate::common::{Error, Result};
use crate::event::{Event, EventKind, EventQueue, RunCommand};
use crate::irq::{IrqEndpoint, IrqSink};

const STATE_INTERRUPTS_EN: u32 = 1 << 0;
const STATE_WFI: u32 = 1 << 1;

/// Link from an engine (or device) back to the worker that services it.
#[derive(Clone)]
pub struct WorkerLink {
    /// The worker's event queue.
    pub queue: Arc<EventQueue>,
    /// Endpoint id assigned at registration.
    pub epid: u32,
}

/// Shared per-core execution state.
pub struct Engine {
    name: String,
    // Only the owning worker thread mutates these bits during dispatch;
    // atomics give cross-thread readers (state dumps, tests) a coherent
    // view without a lock.
    state: AtomicU32,
    irq_ep: IrqEndpoint,
    link: Mutex<Option<WorkerLink>>,
}

impl Engine {
    /// Creates an engine with all interrupt lines enabled at its endpoint
    /// and no worker attached.
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            state: AtomicU32::new(0),
            irq_ep: IrqEndpoint::new_enabled(),
            link: Mutex::new(None),
        })
    }

    /// Returns the engine name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the engine's interrupt endpoint.
    pub fn irq_ep(&self) -> &IrqEndpoint {
        &self.irq_ep
    }

    /// Attaches the engine to its servicing worker.
    pub fn attach(&self, link: WorkerLink) {
        *lock_unpoisoned(&self.link) = Some(link);
    }

    /// Returns the worker link, or `State` if the engine is unattached.
    pub fn link(&self) -> Result<WorkerLink> {
        lock_unpoisoned(&self.link).clone().ok_or(Error::State)
    }

    /// Returns whether guest interrupts are enabled.
    pub fn interrupts_enabled(&self) -> bool {
        self.state.load(Ordering::Relaxed) & STATE_INTERRUPTS_EN != 0
    }

    /// Enables or disables guest interrupt recognition.
    pub fn set_interrupts_enabled(&self, enable: bool) {
        if enable {
            let _ = self.state.fetch_or(STATE_INTERRUPTS_EN, Ordering::Relaxed);
        } else {
            let _ = self.state.fetch_and(!STATE_INTERRUPTS_EN, Ordering::Relaxed);
        }
    }

    /// Returns whether the engine is waiting for an interrupt.
    pub fn wfi(&self) -> bool {
        self.state.load(Ordering::Relaxed) & STATE_WFI != 0
    }

    /// Enters or leaves WFI.
    pub fn set_wfi(&self, enable: bool) {
        if enable {
            let _ = self.state.fetch_or(STATE_WFI, Ordering::Relaxed);
        } else {
            let _ = self.state.fetch_and(!STATE_WFI, Ordering::Relaxed);
        }
    }

    /// `runnable <=> not WFI`.
    pub fn is_runnable(&self) -> bool {
        !self.wfi()
    }

    /// Implements the WFI instruction: enter WFI unless an interrupt is
    /// already active.
    pub fn wait_for_interrupt(&self) {
        if self.irq_ep.active() != 0 {
            return;
        }
        trace!(engine = %self.name, "wfi");
        self.set_wfi(true);
    }

    /// Enqueues a run-mode command on the owning worker.
    ///
    /// With `wait` set, blocks until the worker has processed the command.
    pub fn async_command(&self, cmd: RunCommand, wait: bool) -> Result<()> {
        let link = self.link()?;
        let ev = Event::new(link.epid, EventKind::Command(cmd));
        if wait {
            link.queue.send_wait(ev);
        } else {
            link.queue.send(ev);
        }
        Ok(())
    }
}

impl IrqSink for Engine {
    /// Called in device context: forwards the line transition to the
    /// dispatch loop as an event.
    fn irq_assert(&self, num: u32, high: bool) -> Result<()> {
        let link = self.link()?;
        link.queue
            .send(Event::new(link.epid, EventKind::Irq { num, high }));
        Ok(())
    }
}

/// The architectural core driven by a worker.
///
/// Implementations own all architectural state; the worker thread is the
/// only caller of `step` and `interrupt`. The core header accessors exist
/// for loaders, consoles, and tests, which only touch a core while its
/// worker loop is not running.
pub trait EngineCore: Send {
    /// Returns the shared engine state.
    fn engine(&self) -> &Arc<Engine>;

    /// Dispatches one instruction.
    fn step(&mut self) -> Result<()>;

    /// Vectors the highest-priority pending interrupt into the guest.
    fn interrupt(&mut self) -> Result<()>;

    /// Returns the architecture-neutral core header.
    fn core_state(&self) -> &crate::core::Core;

    /// Mutable access to the core header.
    fn core_state_mut(&mut self) -> &mut crate::core::Core;

    /// Reads back the construction parameters.
    fn config_get(&self) -> crate::core::CoreParams;

    /// Reconfigures the core. Only legal while the dispatch loop is not
    /// running; the architecture cannot change.
    fn config_set(&mut self, params: &crate::core::CoreParams) -> Result<()>;

    /// Returns the concrete RISC-V core, if this is one.
    fn as_riscv(&self) -> Option<&crate::riscv::RvCore> {
        None
    }

    /// Mutable variant of [`as_riscv`](Self::as_riscv).
    fn as_riscv_mut(&mut self) -> Option<&mut crate::riscv::RvCore> {
        None
    }
}

/// Handles the interrupt-pending transition for a core.
///
/// Leaves WFI and invokes the core's interrupt hook if any line is active.
pub fn handle_interrupts(core: &mut dyn EngineCore) -> Result<()> {
    let engine = Arc::clone(core.engine());
    if engine.irq_ep().active() == 0 {
        return Ok(());
    }
    engine.set_wfi(false);
    core.interrupt()
}

/// Dispatches one engine-bound event on the worker thread.
pub fn handle_engine_event(core: &mut dyn EngineCore, ev: Event) -> Result<()> {
    match ev.kind {
        EventKind::Irq { num, high } => {
            let engine = Arc::clone(core.engine());
            engine.irq_ep().assert_line(num, high)?;
            if engine.interrupts_enabled() {
                handle_interrupts(core)?;
            }
            Ok(())
        }
        EventKind::Command(cmd) => {
            trace!(cmd = ?cmd, "engine command");
            match cmd {
                RunCommand::Run => {
                    core.engine().set_wfi(false);
                    Ok(())
                }
                RunCommand::Halt => {
                    core.engine().set_wfi(true);
                    Ok(())
                }
                RunCommand::Exit => Err(Error::Exited),
            }
        }
        _ => Err(Error::Arg),
    }
}
