//! Memory-mapped device wrapper.
//!
//! `Device` carries everything common to bus-attached models: name,
//! aperture, assigned base, an IRQ mux endpoint, an optional owned mapper
//! stage, and an optional link to a worker for asynchronous event delivery.
//! Concrete models implement [`DeviceOps`] and serialize their own register
//! state internally.

use std::sync::{Arc, Mutex};

use crate::common::sem::lock_unpoisoned;
use crate::common::{Error, Result};
use crate::engine::WorkerLink;
use crate::event::{Event, EventEndpoint, EventKind};
use crate::io::{IoBuf, IoOp, OpKind};
use crate::irq::IrqEndpoint;
use crate::mapper::{MapEndpoint, Mapper, MapperUpdate};

/// Register access capabilities of a device model.
///
/// `read`/`write` receive device-relative addresses; the wrapper has
/// already validated that the access falls inside the aperture window the
/// bus mapped. Models that mutate shared state must serialize internally.
pub trait DeviceOps: Send + Sync {
    /// Reads `count` entries of `size` bytes at a device-relative address.
    fn read(&self, addr: u64, size: u16, count: u32, buf: &mut [u8]) -> Result<()> {
        let _ = (addr, size, count, buf);
        Err(Error::IoNoRd)
    }

    /// Writes `count` entries of `size` bytes at a device-relative address.
    fn write(&self, addr: u64, size: u16, count: u32, buf: &[u8]) -> Result<()> {
        let _ = (addr, size, count, buf);
        Err(Error::IoNoWr)
    }
}

/// A bus-attachable device: IO endpoint, IRQ mux, optional mapper, optional
/// worker attachment.
pub struct Device {
    name: String,
    aperture: u64,
    base: Mutex<u64>,
    ops: Arc<dyn DeviceOps>,
    irq_mux: Arc<IrqEndpoint>,
    mapper: Mutex<Option<Arc<Mapper>>>,
    worker: Mutex<Option<WorkerLink>>,
}

impl Device {
    /// Wraps a device model with the given name and MMIO aperture.
    pub fn new(name: &str, aperture: u64, ops: Arc<dyn DeviceOps>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            aperture,
            base: Mutex::new(0),
            ops,
            irq_mux: Arc::new(IrqEndpoint::new()),
            mapper: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the MMIO aperture width in bytes.
    pub fn aperture(&self) -> u64 {
        self.aperture
    }

    /// Returns the bus base address assigned at registration.
    pub fn base(&self) -> u64 {
        *lock_unpoisoned(&self.base)
    }

    /// Records the bus base address. Called by the bus at registration.
    pub(crate) fn set_base(&self, base: u64) {
        *lock_unpoisoned(&self.base) = base;
    }

    /// Returns the device's interrupt mux endpoint.
    pub fn irq_mux(&self) -> &Arc<IrqEndpoint> {
        &self.irq_mux
    }

    /// Returns the device's owned mapper stage, if any.
    pub fn mapper(&self) -> Option<Arc<Mapper>> {
        lock_unpoisoned(&self.mapper).clone()
    }

    /// Installs the device's owned mapper stage.
    pub fn set_mapper(&self, m: Arc<Mapper>) {
        *lock_unpoisoned(&self.mapper) = Some(m);
    }

    /// Attaches the device to a worker for asynchronous event delivery.
    pub fn set_worker(&self, link: WorkerLink) {
        *lock_unpoisoned(&self.worker) = Some(link);
    }

    /// Enqueues an event on the attached worker.
    pub fn send_event_async(&self, mut ev: Event) -> Result<()> {
        let link = lock_unpoisoned(&self.worker)
            .clone()
            .ok_or(Error::Unsupported)?;
        ev.epid = link.epid;
        link.queue.send(ev);
        Ok(())
    }

    /// Submits a mapper reconfiguration to the worker consuming this
    /// device's mapper.
    ///
    /// The update takes effect when that worker observes the event, never
    /// mid-instruction.
    pub fn update_mapper_async(&self, update: MapperUpdate) -> Result<()> {
        if self.mapper().is_none() {
            return Err(Error::Unsupported);
        }
        self.send_event_async(Event::new(0, EventKind::MapperUpdate(update)))
    }
}

impl MapEndpoint for Device {
    fn io(&self, op: &mut IoOp<'_>) -> Result<()> {
        match op.kind {
            OpKind::In => {
                let IoBuf::In(ref mut buf) = op.buf else {
                    return Err(Error::Arg);
                };
                self.ops.read(op.addr, op.size, op.count, buf)
            }
            OpKind::Out => {
                let IoBuf::Out(buf) = &op.buf else {
                    return Err(Error::Arg);
                };
                self.ops.write(op.addr, op.size, op.count, buf)
            }
            _ => Err(Error::IoInvalid),
        }
    }
}

impl EventEndpoint for Device {
    /// Handles events delivered on the owning worker: currently mapper
    /// reconfiguration only.
    fn handle_event(&self, ev: Event) -> Result<()> {
        match ev.kind {
            EventKind::MapperUpdate(update) => {
                let mapper = self.mapper().ok_or(Error::Unsupported)?;
                mapper.apply_update(update)
            }
            _ => Err(Error::Arg),
        }
    }
}
