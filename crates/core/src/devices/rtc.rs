//! Real-time clock.
//!
//! Exposes the host's monotonic microsecond counter. The 64-bit register
//! accepts a single 8-byte read; the LO/HI pair serves 32-bit guests.
//!
//! # Memory Map
//!
//! * `0x0`: `DEV_TYPE` (RO, 32-bit)
//! * `0x4`: `DEV_VERSION` (RO, 32-bit)
//! * `0x8`: `MONOTONIC64` (RO, 64-bit)
//! * `0x10`: `MONOTONIC_LO` (RO, 32-bit)
//! * `0x14`: `MONOTONIC_HI` (RO, 32-bit)

use std::sync::Arc;

use crate::common::{Error, Result, host};
use crate::device::{Device, DeviceOps};

use super::put32;

/// `DEV_TYPE` register value.
pub const RTC_TYPE: u32 = u32::from_le_bytes(*b"time");
/// `DEV_VERSION` register value.
pub const RTC_VERSION: u32 = 0;
/// MMIO window width.
pub const RTC_APERTURE: u64 = 0x18;

const REG_DEV_TYPE: u64 = 0x0;
const REG_DEV_VERSION: u64 = 0x4;
const REG_MONOTONIC64: u64 = 0x8;
const REG_MONOTONIC_LO: u64 = 0x10;
const REG_MONOTONIC_HI: u64 = 0x14;

/// Real-time clock model. Stateless; every read samples the host clock.
pub struct Rtc;

impl Rtc {
    /// Creates the model and its bus-facing device wrapper.
    pub fn create(name: &str) -> (Arc<Self>, Arc<Device>) {
        let rtc = Arc::new(Self);
        let dev = Device::new(name, RTC_APERTURE, Arc::clone(&rtc) as Arc<dyn DeviceOps>);
        (rtc, dev)
    }
}

impl DeviceOps for Rtc {
    fn read(&self, addr: u64, size: u16, count: u32, buf: &mut [u8]) -> Result<()> {
        if count != 1 {
            return Err(Error::IoCount);
        }
        match addr {
            REG_DEV_TYPE => {
                if size != 4 {
                    return Err(Error::IoSize);
                }
                put32(buf, RTC_TYPE);
                Ok(())
            }
            REG_DEV_VERSION => {
                if size != 4 {
                    return Err(Error::IoSize);
                }
                put32(buf, RTC_VERSION);
                Ok(())
            }
            REG_MONOTONIC64 => {
                if size != 8 {
                    return Err(Error::IoSize);
                }
                buf[..8].copy_from_slice(&host::time_us().to_le_bytes());
                Ok(())
            }
            REG_MONOTONIC_LO => {
                if size != 4 {
                    return Err(Error::IoSize);
                }
                put32(buf, host::time_us() as u32);
                Ok(())
            }
            REG_MONOTONIC_HI => {
                if size != 4 {
                    return Err(Error::IoSize);
                }
                put32(buf, (host::time_us() >> 32) as u32);
                Ok(())
            }
            _ => Err(Error::IoInvalid),
        }
    }
}
