//! Interrupt endpoint.
//!
//! An `IrqEndpoint` tracks up to 32 interrupt lines for one receiver:
//! 1. **Level state:** `asserted` mirrors the current line levels.
//! 2. **Sticky state:** `retained` latches every assertion until cleared;
//!    a clear cannot remove a line that is still asserted.
//! 3. **Masking:** `enabled` gates which retained lines become `active`.
//!
//! When the derived `active` set transitions between zero and non-zero, the
//! edge is propagated to an optional downstream client sink as an assertion
//! or de-assertion of a single line. Engines install a sink whose assert
//! path crosses threads by enqueuing an event on their worker.

use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::common::sem::lock_unpoisoned;
use crate::common::{Error, Result};

/// All 32 interrupt lines.
pub const IRQ_VEC_ALL: u32 = u32::MAX;

/// Receiver of interrupt line transitions.
///
/// Implemented by `IrqEndpoint` itself (synchronous bitmask update) and by
/// engine sinks (asynchronous delivery via the owning worker's event queue).
pub trait IrqSink: Send + Sync {
    /// Raises or lowers interrupt line `num` at this receiver.
    fn irq_assert(&self, num: u32, high: bool) -> Result<()>;
}

#[derive(Default)]
struct IrqState {
    asserted: u32,
    retained: u32,
    enabled: u32,
    high: bool,
    client: Option<(Weak<dyn IrqSink>, u32)>,
}

impl IrqState {
    fn active(&self) -> u32 {
        self.retained & self.enabled
    }

    /// Recomputes the output level and returns the client edge to deliver,
    /// if the level changed.
    fn update_output(&mut self) -> Option<(Arc<dyn IrqSink>, u32, bool)> {
        let level = self.active() != 0;
        if level == self.high {
            return None;
        }
        self.high = level;
        let (client, num) = self.client.as_ref()?;
        let client = client.upgrade()?;
        Some((client, *num, level))
    }
}

/// Per-receiver interrupt line state with optional downstream delivery.
#[derive(Default)]
pub struct IrqEndpoint {
    state: Mutex<IrqState>,
}

impl IrqEndpoint {
    /// Creates an endpoint with all lines deasserted and masked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an endpoint with all lines enabled.
    pub fn new_enabled() -> Self {
        let ep = Self::default();
        lock_unpoisoned(&ep.state).enabled = IRQ_VEC_ALL;
        ep
    }

    /// Returns the sticky (retained) assertion mask.
    pub fn asserted(&self) -> u32 {
        lock_unpoisoned(&self.state).retained
    }

    /// Returns the current line levels.
    pub fn level(&self) -> u32 {
        lock_unpoisoned(&self.state).asserted
    }

    /// Returns the enabled-line mask.
    pub fn enabled(&self) -> u32 {
        lock_unpoisoned(&self.state).enabled
    }

    /// Returns the active set, `retained & enabled`.
    pub fn active(&self) -> u32 {
        lock_unpoisoned(&self.state).active()
    }

    /// Raises or lowers line `num`.
    ///
    /// Raising latches the line into `retained`. Lowering only drops the
    /// level; the sticky bit stays until [`clear`](Self::clear).
    pub fn assert_line(&self, num: u32, high: bool) -> Result<()> {
        if num > 31 {
            return Err(Error::Arg);
        }
        let bit = 1u32 << num;
        let edge = {
            let mut st = lock_unpoisoned(&self.state);
            if high {
                if st.asserted & bit != 0 {
                    return Ok(());
                }
                st.asserted |= bit;
                st.retained |= bit;
            } else {
                if st.asserted & bit == 0 {
                    return Ok(());
                }
                st.asserted &= !bit;
            }
            st.update_output()
        };
        deliver(edge)
    }

    /// Replaces the enabled-line mask.
    pub fn set_enabled(&self, vec: u32) -> Result<()> {
        let edge = {
            let mut st = lock_unpoisoned(&self.state);
            st.enabled = vec;
            st.update_output()
        };
        deliver(edge)
    }

    /// Clears the selected retained bits. Lines that are still asserted
    /// cannot be cleared.
    pub fn clear(&self, vec: u32) -> Result<()> {
        let edge = {
            let mut st = lock_unpoisoned(&self.state);
            st.retained &= !vec;
            st.retained |= st.asserted;
            st.update_output()
        };
        deliver(edge)
    }

    /// Connects the downstream client sink and the line number this
    /// endpoint drives in it. The reference is non-owning; the client must
    /// outlive this edge.
    pub fn set_client(&self, client: &Arc<dyn IrqSink>, num: u32) -> Result<()> {
        if num > 31 {
            return Err(Error::Arg);
        }
        let edge = {
            let mut st = lock_unpoisoned(&self.state);
            st.client = Some((Arc::downgrade(client), num));
            st.update_output()
        };
        deliver(edge)
    }
}

fn deliver(edge: Option<(Arc<dyn IrqSink>, u32, bool)>) -> Result<()> {
    match edge {
        Some((client, num, high)) => {
            trace!(num, high, "irq edge");
            client.irq_assert(num, high)
        }
        None => Ok(()),
    }
}

impl IrqSink for IrqEndpoint {
    fn irq_assert(&self, num: u32, high: bool) -> Result<()> {
        self.assert_line(num, high)
    }
}
