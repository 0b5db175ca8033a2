//! System bus.
//!
//! The bus is a device whose IO endpoint is a Translate-mode mapper holding
//! the machine's memory regions and child devices. Its mapper is the root
//! of the translation chain every core fetches and loads through;
//! additional stages (MPU, MMU) splice themselves ahead of it.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::common::Result;
use crate::common::sem::lock_unpoisoned;
use crate::device::Device;
use crate::io::IoOp;
use crate::mapper::{MapEndpoint, Mapper, MapperMode, MapType, Mapping};
use crate::mem::MemRegion;

/// The machine's root interconnect.
pub struct Bus {
    name: String,
    mapper: Arc<Mapper>,
    mems: Mutex<Vec<Arc<MemRegion>>>,
}

impl Bus {
    /// Creates an empty bus with a Translate-mode root mapper.
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            mapper: Arc::new(Mapper::new(MapperMode::Translate)),
            mems: Mutex::new(Vec::new()),
        })
    }

    /// Returns the bus name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the root mapper cores chain behind.
    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    /// Installs a memory region over `[region.base, region.base + length)`.
    pub fn add_mem_region(&self, region: MemRegion) -> Result<()> {
        let region = Arc::new(region);
        self.mapper.add_mapping(&Mapping {
            input_base: region.base(),
            length: region.length(),
            output_base: 0,
            domain: 0,
            permissions: 0,
            kind: MapType::Memory,
            ep: Arc::clone(&region) as Arc<dyn MapEndpoint>,
        })?;
        debug!(bus = %self.name, base = region.base(), length = region.length(), "memory region added");
        lock_unpoisoned(&self.mems).push(region);
        Ok(())
    }

    /// Installs a device over `[base, base + aperture)`.
    pub fn add_device(&self, dev: &Arc<Device>, base: u64) -> Result<()> {
        dev.set_base(base);
        self.mapper.add_mapping(&Mapping {
            input_base: base,
            length: dev.aperture(),
            output_base: 0,
            domain: 0,
            permissions: 0,
            kind: MapType::Device,
            ep: Arc::clone(dev) as Arc<dyn MapEndpoint>,
        })?;
        debug!(bus = %self.name, device = dev.name(), base, "device added");
        Ok(())
    }

    /// Reads bytes from the bus address space, unit size 1.
    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.mapper.io(&mut IoOp::read(addr, 1, buf))
    }

    /// Writes bytes into the bus address space, unit size 1.
    pub fn write(&self, addr: u64, buf: &[u8]) -> Result<()> {
        self.mapper.io(&mut IoOp::write(addr, 1, buf))
    }
}
