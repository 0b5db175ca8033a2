//! Top-level machine aggregate.
//!
//! A `Machine` owns the bus, the chrono timer service, the device list, and
//! one worker slot per core. It sequences setup (memory, devices, cores,
//! IRQ wiring), loads guest images, and drives execution either
//! synchronously (`core_step`) or on per-core worker threads
//! (`core_thread_run` / `core_join`).
//!
//! Ownership is a strict tree: machine → bus + chrono + core slots; each
//! slot's worker owns its engine core; devices are owned by the machine
//! and referenced from the bus mapper. Cross-references (engine→worker,
//! IRQ client edges) are non-owning.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bus::Bus;
use crate::chrono::Chrono;
use crate::common::reg::REG_SP;
use crate::common::{Error, Result};
use crate::core::CoreParams;
use crate::devices::{Intc, Mpu, Rtc, Timer, Uart};
use crate::device::Device;
use crate::engine::{Engine, EngineCore};
use crate::event::{EventEndpoint, RunCommand};
use crate::irq::IrqSink;
use crate::loader::LoadedImage;
use crate::mem::MemRegion;
use crate::worker::{Worker, WorkerThread};

/// Maximum cores per machine.
pub const MACHINE_MAX_CORES: usize = 4;

/// Interrupt line the INTC output drives at a core engine (machine
/// external interrupt).
pub const INTC_CORE_IRQ: u32 = 11;

struct CoreSlot {
    worker: Option<Worker>,
    thread: Option<WorkerThread>,
    engine: Arc<Engine>,
}

/// Top-level aggregate of bus, chrono, devices, and cores.
pub struct Machine {
    bus: Arc<Bus>,
    chrono: Arc<Chrono>,
    intc: Option<Arc<Intc>>,
    cores: Vec<CoreSlot>,
    devices: Vec<Arc<Device>>,
}

impl Machine {
    /// Creates an empty machine with a running chrono service.
    pub fn new() -> Result<Self> {
        let chrono = Chrono::new("tm0");
        chrono.run()?;
        Ok(Self {
            bus: Bus::new("bus0"),
            chrono,
            intc: None,
            cores: Vec::new(),
            devices: Vec::new(),
        })
    }

    /// Returns the machine's bus.
    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// Returns the shared timer service.
    pub fn chrono(&self) -> &Arc<Chrono> {
        &self.chrono
    }

    /// Returns the number of installed cores.
    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Installs a zero-filled memory region at `[base, base + size)`.
    pub fn add_mem(&mut self, base: u64, size: u64) -> Result<()> {
        self.bus.add_mem_region(MemRegion::new(base, size)?)
    }

    /// Installs an interrupt controller. Added cores are wired to its
    /// output.
    pub fn add_intc(&mut self, base: u64, name: &str) -> Result<Arc<Intc>> {
        let (intc, dev) = Intc::create(name);
        self.bus.add_device(&dev, base)?;
        self.devices.push(dev);
        self.intc = Some(Arc::clone(&intc));
        Ok(intc)
    }

    /// Installs a real-time clock.
    pub fn add_rtc(&mut self, base: u64, name: &str) -> Result<Arc<Rtc>> {
        let (rtc, dev) = Rtc::create(name);
        self.bus.add_device(&dev, base)?;
        self.devices.push(dev);
        Ok(rtc)
    }

    /// Installs a UART.
    pub fn add_uart(&mut self, base: u64, name: &str) -> Result<Arc<Uart>> {
        let (uart, dev) = Uart::create(name);
        self.bus.add_device(&dev, base)?;
        self.devices.push(dev);
        Ok(uart)
    }

    /// Installs a countdown timer block over the machine's chrono. Its
    /// IRQ mux feeds the interrupt controller on `irq_line`.
    pub fn add_timer(&mut self, base: u64, name: &str, irq_line: u32) -> Result<Arc<Timer>> {
        let (timer, dev) = Timer::create(name, Arc::clone(&self.chrono));
        self.bus.add_device(&dev, base)?;
        if let Some(intc) = &self.intc {
            let sink = Arc::clone(intc.irq_ep()) as Arc<dyn IrqSink>;
            dev.irq_mux().set_client(&sink, irq_line)?;
        }
        self.devices.push(dev);
        Ok(timer)
    }

    /// Installs an MPU and splices its translation stage ahead of
    /// `core_id`'s current chain. Mapper updates are delivered on that
    /// core's worker.
    pub fn add_mpu(&mut self, base: u64, name: &str, core_id: usize) -> Result<Arc<Mpu>> {
        let (mpu, dev) = Mpu::create(name);
        self.bus.add_device(&dev, base)?;

        let slot = self.cores.get_mut(core_id).ok_or(Error::Arg)?;
        let worker = slot.worker.as_mut().ok_or(Error::State)?;
        let epid = worker.add_event_endpoint(Arc::clone(&dev) as Arc<dyn EventEndpoint>)?;
        dev.set_worker(worker.link_for(epid));

        let core = worker.core_mut()?.core_state_mut();
        mpu.mapper().set_next(Some(Arc::clone(&core.mapper)));
        core.mapper = Arc::clone(mpu.mapper());

        self.devices.push(dev);
        Ok(mpu)
    }

    /// Looks up a registered device by name.
    pub fn device_by_name(&self, name: &str) -> Option<&Arc<Device>> {
        self.devices.iter().find(|d| d.name() == name)
    }

    /// Adds a core behind the bus mapper and wires the INTC output to its
    /// engine. Returns the core id.
    pub fn add_core(&mut self, params: &CoreParams) -> Result<usize> {
        if self.cores.len() >= MACHINE_MAX_CORES {
            return Err(Error::Full);
        }
        let id = self.cores.len();
        let mut params = params.clone();
        params.id = id as u32;

        let mut worker = Worker::new(&format!("core{id}_worker"));
        let core = crate::riscv::create_core(&params, Arc::clone(self.bus.mapper()))?;
        let engine = Arc::clone(core.engine());
        let _ = worker.add_engine(core)?;

        if let Some(intc) = &self.intc {
            let sink = Arc::clone(&engine) as Arc<dyn IrqSink>;
            intc.irq_ep().set_client(&sink, INTC_CORE_IRQ)?;
        }

        debug!(core = id, name = %params.name, "core added");
        self.cores.push(CoreSlot {
            worker: Some(worker),
            thread: None,
            engine,
        });
        Ok(id)
    }

    fn slot(&self, id: usize) -> Result<&CoreSlot> {
        self.cores.get(id).ok_or(Error::Arg)
    }

    fn slot_mut(&mut self, id: usize) -> Result<&mut CoreSlot> {
        self.cores.get_mut(id).ok_or(Error::Arg)
    }

    /// Immutable access to a core. Only valid while its worker loop is not
    /// running.
    pub fn core(&self, id: usize) -> Result<&dyn EngineCore> {
        self.slot(id)?.worker.as_ref().ok_or(Error::Busy)?.core()
    }

    /// Mutable access to a core. Only valid while its worker loop is not
    /// running.
    pub fn core_mut(&mut self, id: usize) -> Result<&mut (dyn EngineCore + 'static)> {
        self.slot_mut(id)?
            .worker
            .as_mut()
            .ok_or(Error::Busy)?
            .core_mut()
    }

    /// Returns a core's shared engine handle.
    pub fn engine(&self, id: usize) -> Result<Arc<Engine>> {
        Ok(Arc::clone(&self.slot(id)?.engine))
    }

    /// Steps a core synchronously by up to `num` instructions.
    pub fn core_step(&mut self, id: usize, num: u64) -> Result<()> {
        self.slot_mut(id)?
            .worker
            .as_mut()
            .ok_or(Error::Busy)?
            .step(num)
    }

    /// Runs a core synchronously until it faults or exits.
    pub fn core_run(&mut self, id: usize) -> Result<()> {
        self.slot_mut(id)?
            .worker
            .as_mut()
            .ok_or(Error::Busy)?
            .run()
    }

    /// Moves a core's worker onto its own host thread.
    pub fn core_thread_run(&mut self, id: usize) -> Result<()> {
        let slot = self.slot_mut(id)?;
        let worker = slot.worker.take().ok_or(Error::Busy)?;
        match worker.thread_run() {
            Ok(thread) => {
                slot.thread = Some(thread);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Joins a core's worker thread and returns the loop status.
    pub fn core_join(&mut self, id: usize) -> Result<()> {
        let slot = self.slot_mut(id)?;
        let thread = slot.thread.take().ok_or(Error::State)?;
        let (worker, status) = thread.join();
        slot.worker = Some(worker);
        status
    }

    /// Sends a run-mode command to a core's engine from any thread.
    pub fn core_command(&self, id: usize, cmd: RunCommand, wait: bool) -> Result<()> {
        self.slot(id)?.engine.async_command(cmd, wait)
    }

    /// Raises or lowers an interrupt controller input line.
    pub fn set_interrupt(&self, num: u32, high: bool) -> Result<()> {
        match &self.intc {
            Some(intc) => intc.set_input(num, high),
            None => Err(Error::IoNoDev),
        }
    }

    /// Loads an ELF image into a core's address space; with `configure`,
    /// also applies the image's mode and extensions and sets the entry
    /// point.
    pub fn load_core(&mut self, id: usize, image: &LoadedImage, configure: bool) -> Result<()> {
        let core = self.core_mut(id)?;
        for seg in &image.segments {
            core.core_state().mem_write(seg.addr, &seg.data)?;
        }
        if !configure {
            return Ok(());
        }

        let mut params = core.config_get();
        if params.arch != image.arch {
            return Err(Error::Arg);
        }
        params.mode = image.mode;
        if params.arch_options == 0 {
            params.arch_options = image.arch_options;
        } else if image.arch_options & !params.arch_options != 0 {
            return Err(Error::Unsupported);
        }
        core.config_set(&params)?;

        if image.entry == 0 {
            return Err(Error::Arg);
        }
        let entry = image.entry;
        let core = self.core_mut(id)?;
        core.core_state_mut().pc = entry;
        info!(core = id, entry = format_args!("{entry:#x}"), mode = ?image.mode, "image configured");
        Ok(())
    }

    /// Loads a flat binary at a guest address through a core's translation
    /// chain.
    pub fn load_core_raw(&mut self, id: usize, addr: u64, data: &[u8]) -> Result<()> {
        self.core(id)?.core_state().mem_write(addr, data)
    }

    /// Convenience: sets a core's stack pointer.
    pub fn set_core_sp(&mut self, id: usize, sp: u64) -> Result<()> {
        self.core_mut(id)?.core_state_mut().set_reg(REG_SP, sp);
        Ok(())
    }

    /// Stops everything: exits running worker threads and the chrono
    /// service.
    pub fn stop(&mut self) -> Result<()> {
        for id in 0..self.cores.len() {
            if self.cores[id].thread.is_some() {
                let _ = self.core_command(id, RunCommand::Exit, false);
                let _ = self.core_join(id);
            }
        }
        self.chrono.stop()
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
