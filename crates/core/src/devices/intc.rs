//! Interrupt controller.
//!
//! Aggregates up to 32 device interrupt lines into one IRQ endpoint whose
//! output feeds a core engine. The guest observes and acknowledges lines
//! through four registers:
//!
//! # Memory Map
//!
//! * `0x0`: `DEV_TYPE` (RO)
//! * `0x4`: `DEV_VERSION` (RO)
//! * `0x8`: `ASSERTED` (RW): retained lines; write-1-to-clear, still-
//!   asserted lines cannot be cleared
//! * `0xC`: `MASK` (RW): set bits mask a line; default all masked

use std::sync::Arc;

use crate::common::{Error, Result};
use crate::device::{Device, DeviceOps};
use crate::irq::IrqEndpoint;

use super::{check_reg32, get32, put32};

/// `DEV_TYPE` register value.
pub const INTC_TYPE: u32 = u32::from_le_bytes(*b"intc");
/// `DEV_VERSION` register value.
pub const INTC_VERSION: u32 = 0;
/// Number of input lines.
pub const INTC_NUM_SUPPORTED: u32 = 32;
/// MMIO window width.
pub const INTC_APERTURE: u64 = 0x10;

const REG_DEV_TYPE: u64 = 0x0;
const REG_DEV_VERSION: u64 = 0x4;
const REG_ASSERTED: u64 = 0x8;
const REG_MASK: u64 = 0xc;

/// Interrupt controller model.
pub struct Intc {
    ep: Arc<IrqEndpoint>,
}

impl Intc {
    /// Creates the model and its bus-facing device wrapper.
    pub fn create(name: &str) -> (Arc<Self>, Arc<Device>) {
        let intc = Arc::new(Self {
            ep: Arc::new(IrqEndpoint::new()),
        });
        let dev = Device::new(name, INTC_APERTURE, Arc::clone(&intc) as Arc<dyn DeviceOps>);
        (intc, dev)
    }

    /// The controller's aggregation endpoint. Device IRQ muxes set this as
    /// their client; its own client is a core engine.
    pub fn irq_ep(&self) -> &Arc<IrqEndpoint> {
        &self.ep
    }

    /// Raises or lowers input line `num`, as a device would.
    pub fn set_input(&self, num: u32, high: bool) -> Result<()> {
        if num >= INTC_NUM_SUPPORTED {
            return Err(Error::Range);
        }
        self.ep.assert_line(num, high)
    }
}

impl DeviceOps for Intc {
    fn read(&self, addr: u64, size: u16, count: u32, buf: &mut [u8]) -> Result<()> {
        check_reg32(addr, size, count)?;
        let val = match addr {
            REG_DEV_TYPE => INTC_TYPE,
            REG_DEV_VERSION => INTC_VERSION,
            REG_ASSERTED => self.ep.asserted(),
            REG_MASK => !self.ep.enabled(),
            _ => return Err(Error::IoInvalid),
        };
        put32(buf, val);
        Ok(())
    }

    fn write(&self, addr: u64, size: u16, count: u32, buf: &[u8]) -> Result<()> {
        check_reg32(addr, size, count)?;
        let val = get32(buf);
        match addr {
            REG_DEV_TYPE | REG_DEV_VERSION => Err(Error::IoNoWr),
            REG_ASSERTED => self.ep.clear(val),
            REG_MASK => self.ep.set_enabled(!val),
            _ => Err(Error::IoInvalid),
        }
    }
}
