//! Address translation stage.
//!
//! A mapper is one stage in a core's translation chain. It holds a sorted
//! table of non-overlapping mappings from input ranges to IO endpoints, a
//! mode, and an optional next stage. It provides:
//! 1. **Lookup:** Binary search by input base, confirming the probed
//!    mapping's end covers the address.
//! 2. **Translation:** Input address minus mapping base plus output base;
//!    `In`/`Out` operations that span mappings are split at boundaries,
//!    atomics and resolves must lie within one mapping.
//! 3. **Chaining:** `Passthrough` forwards untranslated to the next stage;
//!    `Block` fails all IO.
//! 4. **Reconfiguration:** A replacement table and mode arrive as a
//!    [`MapperUpdate`] event on the consuming worker, so mutation is
//!    serialized with IO from that worker.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::common::sem::lock_unpoisoned;
use crate::common::{Error, Result};
use crate::io::{IoOp, OpKind};

/// Mappings are allocated in blocks of this many entries to amortize table
/// growth.
pub const MAP_ALLOC_INCREMENT: usize = 256;

/// What a mapping's endpoint resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapType {
    /// A memory region.
    Memory,
    /// A device endpoint.
    Device,
    /// Another mapper stage.
    Mapper,
}

/// Mapper operating mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MapperMode {
    /// All IO fails with `IoNoMap`.
    #[default]
    Block,
    /// All IO is forwarded unchanged to the next stage.
    Passthrough,
    /// IO is translated through the mapping table.
    Translate,
}

/// Anything that can terminate a bus transaction.
pub trait MapEndpoint: Send + Sync {
    /// Executes one (possibly already translated) IO operation.
    fn io(&self, op: &mut IoOp<'_>) -> Result<()>;
}

/// One `(input range -> output base on some endpoint)` row.
#[derive(Clone)]
pub struct Mapping {
    /// First input address covered.
    pub input_base: u64,
    /// Length of the range in bytes.
    pub length: u64,
    /// Output base the input base translates to.
    pub output_base: u64,
    /// Translation domain tag.
    pub domain: u32,
    /// Permission bits for this range.
    pub permissions: u16,
    /// Endpoint category.
    pub kind: MapType,
    /// Target endpoint.
    pub ep: Arc<dyn MapEndpoint>,
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("input_base", &self.input_base)
            .field("length", &self.length)
            .field("output_base", &self.output_base)
            .field("kind", &self.kind)
            .finish()
    }
}

struct MapEnt {
    input_base: u64,
    input_end: u64,
    output_base: u64,
    #[allow(dead_code)]
    domain: u32,
    #[allow(dead_code)]
    permissions: u16,
    ep: Arc<dyn MapEndpoint>,
}

impl MapEnt {
    fn from_mapping(m: &Mapping) -> Self {
        Self {
            input_base: m.input_base,
            input_end: m.input_base + m.length,
            output_base: m.output_base,
            domain: m.domain,
            permissions: m.permissions,
            ep: Arc::clone(&m.ep),
        }
    }
}

/// Asynchronous reconfiguration request for a mapper.
///
/// Applied on the worker thread that consumes the mapper, atomically with
/// respect to IO issued from that worker.
pub struct MapperUpdate {
    /// New operating mode.
    pub mode: MapperMode,
    /// Replacement mapping table, if the table is to be swapped.
    pub replace: Option<Vec<Mapping>>,
}

struct MapperState {
    mode: MapperMode,
    ents: Vec<MapEnt>,
}

/// A chainable translation stage.
pub struct Mapper {
    state: Mutex<MapperState>,
    next: Mutex<Option<Arc<Mapper>>>,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new(MapperMode::Block)
    }
}

impl Mapper {
    /// Creates an empty mapper in the given mode with no next stage.
    pub fn new(mode: MapperMode) -> Self {
        Self {
            state: Mutex::new(MapperState {
                mode,
                ents: Vec::with_capacity(MAP_ALLOC_INCREMENT),
            }),
            next: Mutex::new(None),
        }
    }

    /// Returns the current mode.
    pub fn mode(&self) -> MapperMode {
        lock_unpoisoned(&self.state).mode
    }

    /// Sets the operating mode.
    pub fn set_mode(&self, mode: MapperMode) {
        lock_unpoisoned(&self.state).mode = mode;
    }

    /// Returns the next stage in the chain, if any.
    pub fn next(&self) -> Option<Arc<Self>> {
        lock_unpoisoned(&self.next).clone()
    }

    /// Installs the next stage in the chain.
    pub fn set_next(&self, next: Option<Arc<Self>>) {
        *lock_unpoisoned(&self.next) = next;
    }

    /// Returns the number of installed mappings.
    pub fn num_mappings(&self) -> usize {
        lock_unpoisoned(&self.state).ents.len()
    }

    /// Adds one mapping, keeping the table sorted.
    ///
    /// Fails with `Arg` if the new range overlaps an installed mapping.
    pub fn add_mapping(&self, mapping: &Mapping) -> Result<()> {
        let ent = MapEnt::from_mapping(mapping);
        let mut st = lock_unpoisoned(&self.state);
        let idx = st.ents.partition_point(|e| e.input_base <= ent.input_base);
        if idx > 0 && st.ents[idx - 1].input_end > ent.input_base {
            return Err(Error::Arg);
        }
        if idx < st.ents.len() && st.ents[idx].input_base < ent.input_end {
            return Err(Error::Arg);
        }
        if st.ents.len() == st.ents.capacity() {
            st.ents.reserve(MAP_ALLOC_INCREMENT);
        }
        st.ents.insert(idx, ent);
        Ok(())
    }

    /// Applies a reconfiguration: swap the table if requested, then switch
    /// mode.
    pub fn apply_update(&self, update: MapperUpdate) -> Result<()> {
        let mut st = lock_unpoisoned(&self.state);
        if let Some(list) = update.replace {
            let mut ents: Vec<MapEnt> = list.iter().map(MapEnt::from_mapping).collect();
            finalize(&mut ents)?;
            debug!(count = ents.len(), mode = ?update.mode, "mapper table replaced");
            st.ents = ents;
        }
        st.mode = update.mode;
        Ok(())
    }

    fn io_locked(&self, st: &MapperState, op: &mut IoOp<'_>) -> Result<()> {
        let size = u64::from(op.size);
        let mut addr = op.addr;

        if op.kind.is_atomic() || op.kind == OpKind::Resolve {
            let ent = ent_for_address(&st.ents, addr).ok_or(Error::IoNoMap)?;
            let offset = addr - ent.input_base;
            let avail = ent.input_end - addr;
            if op.kind.is_atomic() && avail < size {
                return Err(Error::IoInvalid);
            }
            op.addr = ent.output_base + offset;
            let err = ent.ep.io(op);
            op.addr = addr;
            return err;
        }

        let mut len = u64::from(op.count) * size;
        let mut buf = std::mem::take(&mut op.buf);
        while len > 0 {
            let Some(ent) = ent_for_address(&st.ents, addr) else {
                return Err(Error::IoNoMap);
            };
            let offset = addr - ent.input_base;
            let mut avail = ent.input_end - addr;
            if avail > len {
                avail = len;
            }
            if !avail.is_multiple_of(size) {
                return Err(Error::IoInvalid);
            }

            let (head, tail) = buf.split_front(avail as usize);
            let mut subop = IoOp {
                addr: ent.output_base + offset,
                size: op.size,
                count: (avail / size) as u32,
                kind: op.kind,
                align: op.align,
                buf: head,
                arg: op.arg,
                order: op.order,
                order_fail: op.order_fail,
                agent: op.agent,
            };
            ent.ep.io(&mut subop)?;

            buf = tail;
            len -= avail;
            addr += avail;
        }
        Ok(())
    }
}

impl MapEndpoint for Mapper {
    fn io(&self, op: &mut IoOp<'_>) -> Result<()> {
        op.check()?;
        let st = lock_unpoisoned(&self.state);
        match st.mode {
            MapperMode::Block => Err(Error::IoNoMap),
            MapperMode::Passthrough => {
                drop(st);
                let next = self.next().ok_or(Error::IoNoMap)?;
                next.io(op)
            }
            MapperMode::Translate => self.io_locked(&st, op),
        }
    }
}

/// Sorts the table and verifies that no two mappings overlap.
fn finalize(ents: &mut [MapEnt]) -> Result<()> {
    ents.sort_by_key(|e| e.input_base);
    for pair in ents.windows(2) {
        if pair[1].input_base < pair[0].input_end {
            return Err(Error::Arg);
        }
    }
    Ok(())
}

/// Binary search for the mapping covering `addr`.
fn ent_for_address(ents: &[MapEnt], addr: u64) -> Option<&MapEnt> {
    let idx = ents.partition_point(|e| e.input_base <= addr);
    if idx == 0 {
        return None;
    }
    let ent = &ents[idx - 1];
    (ent.input_end > addr).then_some(ent)
}
