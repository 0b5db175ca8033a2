//! UART.
//!
//! A single byte-wide transmit FIFO register. Written bytes accumulate in a
//! line buffer that flushes to the configured sink on newline or when 255
//! bytes are pending. Receive is not modeled; the FIFO read register
//! returns zero.
//!
//! # Memory Map
//!
//! * `0x0`: `DEV_TYPE` (RO)
//! * `0x4`: `DEV_VERSION` (RO)
//! * `0x8`: `CONFIG` (RW)
//! * `0xC`: `STATUS` (RO)
//! * `0x10`: `FIFO_READ` (RO)
//! * `0x14`: `FIFO_WRITE` (WO)

use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::common::sem::lock_unpoisoned;
use crate::common::{Error, Result};
use crate::device::{Device, DeviceOps};

use super::{check_reg32, get32, put32};

/// `DEV_TYPE` register value.
pub const UART_TYPE: u32 = u32::from_le_bytes(*b"rxtx");
/// `DEV_VERSION` register value.
pub const UART_VERSION: u32 = 0;
/// MMIO window width.
pub const UART_APERTURE: u64 = 0x18;

const REG_DEV_TYPE: u64 = 0x0;
const REG_DEV_VERSION: u64 = 0x4;
const REG_CONFIG: u64 = 0x8;
const REG_STATUS: u64 = 0xc;
const REG_FIFO_READ: u64 = 0x10;
const REG_FIFO_WRITE: u64 = 0x14;

const LINE_BUF_MAX: usize = 255;

/// Where transmitted bytes go.
pub enum UartChannel {
    /// Host standard output.
    Console,
    /// Discard.
    Null,
    /// Append to a file.
    File(File),
    /// Any writer, for tests and custom routing.
    Writer(Box<dyn Write + Send>),
}

struct UartState {
    config: u32,
    status: u32,
    buf: Vec<u8>,
}

/// UART model.
pub struct Uart {
    state: Mutex<UartState>,
    channel: Mutex<UartChannel>,
}

impl Uart {
    /// Creates the model (routed to the console) and its bus-facing device
    /// wrapper.
    pub fn create(name: &str) -> (Arc<Self>, Arc<Device>) {
        let uart = Arc::new(Self {
            state: Mutex::new(UartState {
                config: 0,
                status: 0,
                buf: Vec::with_capacity(LINE_BUF_MAX),
            }),
            channel: Mutex::new(UartChannel::Console),
        });
        let dev = Device::new(name, UART_APERTURE, Arc::clone(&uart) as Arc<dyn DeviceOps>);
        (uart, dev)
    }

    /// Reroutes output. Pending bytes are flushed to the old channel first.
    pub fn set_channel(&self, channel: UartChannel) {
        self.flush();
        *lock_unpoisoned(&self.channel) = channel;
    }

    /// Flushes the pending line buffer to the sink.
    pub fn flush(&self) {
        let pending: Vec<u8> = {
            let mut st = lock_unpoisoned(&self.state);
            std::mem::take(&mut st.buf)
        };
        if pending.is_empty() {
            return;
        }
        let mut ch = lock_unpoisoned(&self.channel);
        let _ = match &mut *ch {
            UartChannel::Console => std::io::stdout().write_all(&pending),
            UartChannel::Null => Ok(()),
            UartChannel::File(f) => f.write_all(&pending),
            UartChannel::Writer(w) => w.write_all(&pending),
        };
    }

    fn push_byte(&self, byte: u8) {
        let full = {
            let mut st = lock_unpoisoned(&self.state);
            st.buf.push(byte);
            byte == b'\n' || st.buf.len() >= LINE_BUF_MAX
        };
        if full {
            self.flush();
        }
    }
}

impl DeviceOps for Uart {
    fn read(&self, addr: u64, size: u16, count: u32, buf: &mut [u8]) -> Result<()> {
        check_reg32(addr, size, count)?;
        let st = lock_unpoisoned(&self.state);
        let val = match addr {
            REG_DEV_TYPE => UART_TYPE,
            REG_DEV_VERSION => UART_VERSION,
            REG_CONFIG => st.config,
            REG_STATUS => st.status,
            REG_FIFO_READ => 0,
            REG_FIFO_WRITE => return Err(Error::IoNoRd),
            _ => return Err(Error::IoInvalid),
        };
        put32(buf, val);
        Ok(())
    }

    fn write(&self, addr: u64, size: u16, count: u32, buf: &[u8]) -> Result<()> {
        check_reg32(addr, size, count)?;
        let val = get32(buf);
        match addr {
            REG_CONFIG => {
                lock_unpoisoned(&self.state).config = val;
                Ok(())
            }
            REG_FIFO_WRITE => {
                self.push_byte(val as u8);
                Ok(())
            }
            REG_DEV_TYPE | REG_DEV_VERSION | REG_STATUS | REG_FIFO_READ => Err(Error::IoNoWr),
            _ => Err(Error::IoInvalid),
        }
    }
}

impl Drop for Uart {
    fn drop(&mut self) {
        self.flush();
    }
}
