//! Countdown timer block.
//!
//! Up to eight independent units, each an asynchronous countdown in host
//! microseconds backed by the machine's chrono service. A unit runs one
//! shot or continuous; expiry latches the unit's `LOOPED` bit and raises
//! the unit's line on the device IRQ mux.
//!
//! # Memory Map
//!
//! * `0x0`: `DEV_TYPE` (RO)
//! * `0x4`: `DEV_VERSION` (RO)
//! * `0x8`: `CONFIG` (RW)
//! * `0xC`: `STATUS` (RO)
//! * `0x10`: `IRQ_MASK` (RW): write 1 masks a unit's interrupt
//! * `0x14`: `IRQ_STATUS` (RW): write 1 clears a pending bit
//! * `0x18`: `RT_SCALER_US` (RW)
//! * `0x1C`: `NUM_UNITS` (RO)
//! * `0x20 + 0x20u`: per-unit `CONFIG`, `RESET_VAL_LO/HI`,
//!   `CURRENT_VAL_LO/HI`

use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use crate::chrono::{Chrono, TimerAction, TimerSignal};
use crate::common::sem::lock_unpoisoned;
use crate::common::{Error, Result};
use crate::device::{Device, DeviceOps};

use super::{check_reg32, get32, put32};

/// `DEV_TYPE` register value.
pub const TIMER_TYPE: u32 = u32::from_le_bytes(*b"timr");
/// `DEV_VERSION` register value.
pub const TIMER_VERSION: u32 = 0;
/// Number of countdown units.
pub const TIMER_MAX_UNITS: usize = 8;
/// MMIO window width: the common block plus one 32-byte window per unit.
pub const TIMER_APERTURE: u64 = 0x20 + 0x20 * TIMER_MAX_UNITS as u64;

/// Start (set) or stop (clear) the unit.
pub const TIMER_UNIT_CONFIG_RUN: u32 = 1 << 0;
/// Restart immediately on expiry instead of stopping.
pub const TIMER_UNIT_CONFIG_CONTINUOUS: u32 = 1 << 1;
/// Latched on every expiry; write 1 to clear.
pub const TIMER_UNIT_CONFIG_LOOPED: u32 = 1 << 2;

const REG_DEV_TYPE: u64 = 0x0;
const REG_DEV_VERSION: u64 = 0x4;
const REG_CONFIG: u64 = 0x8;
const REG_STATUS: u64 = 0xc;
const REG_IRQ_MASK: u64 = 0x10;
const REG_IRQ_STATUS: u64 = 0x14;
const REG_RT_SCALER_US: u64 = 0x18;
const REG_NUM_UNITS: u64 = 0x1c;
const UNIT_BASE: u64 = 0x20;

#[derive(Clone, Copy, Default)]
struct TimerUnit {
    config: u32,
    reset_val: u64,
    tid: u64,
    count: u64,
}

struct TimerState {
    config: u32,
    status: u32,
    scalar: u32,
    num_units: u32,
    units: [TimerUnit; TIMER_MAX_UNITS],
}

/// Countdown timer model.
pub struct Timer {
    state: Mutex<TimerState>,
    chrono: Arc<Chrono>,
    dev: Mutex<Weak<Device>>,
    this: Weak<Self>,
}

impl Timer {
    /// Creates the model over the given chrono service and its bus-facing
    /// device wrapper.
    pub fn create(name: &str, chrono: Arc<Chrono>) -> (Arc<Self>, Arc<Device>) {
        let timer = Arc::new_cyclic(|this| Self {
            state: Mutex::new(TimerState {
                config: 0,
                status: 0,
                scalar: 1,
                num_units: TIMER_MAX_UNITS as u32,
                units: [TimerUnit::default(); TIMER_MAX_UNITS],
            }),
            chrono,
            dev: Mutex::new(Weak::new()),
            this: this.clone(),
        });
        let dev = Device::new(name, TIMER_APERTURE, Arc::clone(&timer) as Arc<dyn DeviceOps>);
        *lock_unpoisoned(&timer.dev) = Arc::downgrade(&dev);
        (timer, dev)
    }

    fn device(&self) -> Option<Arc<Device>> {
        lock_unpoisoned(&self.dev).upgrade()
    }

    /// Fires unit `index`: bookkeeping under the state lock, then the IRQ
    /// pulse on the device mux.
    fn unit_expired(&self, index: usize) -> TimerAction {
        let action = {
            let mut st = lock_unpoisoned(&self.state);
            let unit = &mut st.units[index];
            let action = if unit.config & TIMER_UNIT_CONFIG_CONTINUOUS != 0 {
                TimerAction::Restart
            } else {
                unit.config &= !TIMER_UNIT_CONFIG_RUN;
                TimerAction::Done
            };
            unit.config |= TIMER_UNIT_CONFIG_LOOPED;
            unit.count += 1;
            action
        };
        if let Some(dev) = self.device() {
            // Pulse: the pending bit latches in the mux and is cleared by
            // the guest through IRQ_STATUS.
            let _ = dev.irq_mux().assert_line(index as u32, true);
            let _ = dev.irq_mux().assert_line(index as u32, false);
        }
        action
    }

    fn set_unit_config(&self, st: &mut TimerState, index: usize, val: u32) {
        let mut config = st.units[index].config;

        config &= !TIMER_UNIT_CONFIG_CONTINUOUS;
        config |= val & TIMER_UNIT_CONFIG_CONTINUOUS;
        // Write 1 to clear the latched loop indicator.
        if val & TIMER_UNIT_CONFIG_LOOPED != 0 {
            config &= !TIMER_UNIT_CONFIG_LOOPED;
        }

        if config & TIMER_UNIT_CONFIG_RUN != 0 {
            if val & TIMER_UNIT_CONFIG_RUN == 0 {
                config &= !TIMER_UNIT_CONFIG_RUN;
                let _ = self.chrono.timer_cancel(st.units[index].tid);
            }
        } else if val & TIMER_UNIT_CONFIG_RUN != 0 {
            config &= !TIMER_UNIT_CONFIG_LOOPED;
            config |= TIMER_UNIT_CONFIG_RUN;
            let us = st.units[index]
                .reset_val
                .saturating_mul(u64::from(st.scalar.max(1)));
            let this = self.this.clone();
            match self.chrono.timer_set(us, move |signal| {
                if signal == TimerSignal::Exited {
                    return TimerAction::Done;
                }
                match this.upgrade() {
                    Some(t) => t.unit_expired(index),
                    None => TimerAction::Done,
                }
            }) {
                Ok(tid) => st.units[index].tid = tid,
                Err(e) => {
                    warn!(unit = index, %e, "failed to arm system timer");
                }
            }
        }
        st.units[index].config = config;
    }

    fn unit_remaining(&self, tid: u64) -> u64 {
        self.chrono.timer_get_remaining(tid).unwrap_or(0)
    }
}

fn unit_reg(addr: u64) -> (usize, u64) {
    let off = addr - UNIT_BASE;
    ((off / 0x20) as usize, (off & 0x1f) >> 2)
}

impl DeviceOps for Timer {
    fn read(&self, addr: u64, size: u16, count: u32, buf: &mut [u8]) -> Result<()> {
        check_reg32(addr, size, count)?;
        let dev = self.device().ok_or(Error::State)?;
        let st = lock_unpoisoned(&self.state);
        let val = match addr {
            REG_DEV_TYPE => TIMER_TYPE,
            REG_DEV_VERSION => TIMER_VERSION,
            REG_CONFIG => st.config,
            REG_STATUS => st.status,
            REG_IRQ_MASK => !dev.irq_mux().enabled(),
            REG_IRQ_STATUS => dev.irq_mux().asserted(),
            REG_RT_SCALER_US => st.scalar,
            REG_NUM_UNITS => st.num_units,
            _ => {
                if addr < UNIT_BASE || addr >= TIMER_APERTURE {
                    return Err(Error::IoInvalid);
                }
                let (index, reg) = unit_reg(addr);
                let unit = st.units[index];
                let remaining = match reg {
                    3 | 4 => {
                        drop(st);
                        self.unit_remaining(unit.tid)
                    }
                    _ => 0,
                };
                let v = match reg {
                    0 => unit.config,
                    1 => unit.reset_val as u32,
                    2 => (unit.reset_val >> 32) as u32,
                    3 => remaining as u32,
                    4 => (remaining >> 32) as u32,
                    _ => return Err(Error::IoInvalid),
                };
                put32(buf, v);
                return Ok(());
            }
        };
        put32(buf, val);
        Ok(())
    }

    fn write(&self, addr: u64, size: u16, count: u32, buf: &[u8]) -> Result<()> {
        check_reg32(addr, size, count)?;
        let dev = self.device().ok_or(Error::State)?;
        let val = get32(buf);
        let mut st = lock_unpoisoned(&self.state);
        match addr {
            REG_CONFIG => {
                st.config = val;
                Ok(())
            }
            REG_RT_SCALER_US => {
                st.scalar = val;
                Ok(())
            }
            REG_IRQ_MASK => {
                drop(st);
                dev.irq_mux().set_enabled(!val)
            }
            REG_IRQ_STATUS => {
                drop(st);
                dev.irq_mux().clear(val)
            }
            REG_DEV_TYPE | REG_DEV_VERSION | REG_STATUS | REG_NUM_UNITS => Err(Error::IoNoWr),
            _ => {
                if addr < UNIT_BASE || addr >= TIMER_APERTURE {
                    return Err(Error::IoInvalid);
                }
                let (index, reg) = unit_reg(addr);
                match reg {
                    0 => {
                        self.set_unit_config(&mut st, index, val);
                        Ok(())
                    }
                    1 => {
                        st.units[index].reset_val =
                            (st.units[index].reset_val & 0xffff_ffff_0000_0000) | u64::from(val);
                        Ok(())
                    }
                    2 => {
                        st.units[index].reset_val =
                            (st.units[index].reset_val & 0xffff_ffff) | (u64::from(val) << 32);
                        Ok(())
                    }
                    3 | 4 => Err(Error::IoNoWr),
                    _ => Err(Error::IoInvalid),
                }
            }
        }
    }
}
