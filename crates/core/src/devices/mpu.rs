//! Memory protection unit.
//!
//! Owns a translation stage spliced ahead of the bus mapper in a core's
//! chain. The guest programs up to 64 `(virtual base, physical base,
//! length)` entries, then applies them through the config register; the
//! replacement table travels to the consuming engine's worker as a mapper
//! update event and takes effect between instructions.
//!
//! # Memory Map
//!
//! * `0x0`: `DEV_TYPE` (RO)
//! * `0x4`: `DEV_VERSION` (RO)
//! * `0x8`: `CONFIG` (RW): `ENABLE`/`APPLY`/`CLEAR`
//! * `0xC`: `STATUS` (RO)
//! * `0x10`: `MAP_ENTS` (RO)
//! * `0x100 + 8i`: `VA_BASE` entry i (RW, LO/HI pair)
//! * `0x300 + 8i`: `PA_BASE` entry i (RW, LO/HI pair)
//! * `0x500 + 4i`: `LEN` entry i (RW)

use std::sync::{Arc, Mutex, Weak};

use crate::common::sem::lock_unpoisoned;
use crate::common::{Error, Result};
use crate::device::{Device, DeviceOps};
use crate::mapper::{MapEndpoint, MapType, Mapper, MapperMode, MapperUpdate, Mapping};

use super::{check_reg32, get32, put32};

/// `DEV_TYPE` register value.
pub const MPU_TYPE: u32 = u32::from_le_bytes(*b"mpux");
/// `DEV_VERSION` register value.
pub const MPU_VERSION: u32 = 0;
/// Maximum mapping entries.
pub const MPU_MAX_MAPPINGS: usize = 64;
/// MMIO window width.
pub const MPU_APERTURE: u64 = 0x600;

/// Enable translation using the last applied table.
pub const MPU_CONFIG_ENABLE: u32 = 1 << 0;
/// Apply the current mapping registers.
pub const MPU_CONFIG_APPLY: u32 = 1 << 1;
/// Clear the mapping registers (applied mappings are unaffected).
pub const MPU_CONFIG_CLEAR: u32 = 1 << 2;

const REG_DEV_TYPE: u64 = 0x0;
const REG_DEV_VERSION: u64 = 0x4;
const REG_CONFIG: u64 = 0x8;
const REG_STATUS: u64 = 0xc;
const REG_MAP_ENTS: u64 = 0x10;
const REG_VA_BASE: u64 = 0x100;
const REG_PA_BASE: u64 = 0x300;
const REG_LEN_BASE: u64 = 0x500;

struct MpuState {
    config: u32,
    va_base: [u64; MPU_MAX_MAPPINGS],
    pa_base: [u64; MPU_MAX_MAPPINGS],
    map_len: [u32; MPU_MAX_MAPPINGS],
}

/// Memory protection unit model.
pub struct Mpu {
    state: Mutex<MpuState>,
    mapper: Arc<Mapper>,
    dev: Mutex<Weak<Device>>,
}

impl Mpu {
    /// Creates the model with a fresh Passthrough stage and its bus-facing
    /// device wrapper.
    pub fn create(name: &str) -> (Arc<Self>, Arc<Device>) {
        let mpu = Arc::new(Self {
            state: Mutex::new(MpuState {
                config: 0,
                va_base: [0; MPU_MAX_MAPPINGS],
                pa_base: [0; MPU_MAX_MAPPINGS],
                map_len: [0; MPU_MAX_MAPPINGS],
            }),
            mapper: Arc::new(Mapper::new(MapperMode::Passthrough)),
            dev: Mutex::new(Weak::new()),
        });
        let dev = Device::new(name, MPU_APERTURE, Arc::clone(&mpu) as Arc<dyn DeviceOps>);
        dev.set_mapper(Arc::clone(&mpu.mapper));
        *lock_unpoisoned(&mpu.dev) = Arc::downgrade(&dev);
        (mpu, dev)
    }

    /// The translation stage this MPU controls.
    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    fn device(&self) -> Result<Arc<Device>> {
        lock_unpoisoned(&self.dev).upgrade().ok_or(Error::State)
    }

    fn update_config(&self, st: &mut MpuState, val: u32) -> Result<()> {
        if val & MPU_CONFIG_ENABLE != 0 {
            st.config |= MPU_CONFIG_ENABLE;
        } else {
            st.config &= !MPU_CONFIG_ENABLE;
        }

        let mut replace = None;
        if val & MPU_CONFIG_APPLY != 0 {
            let next = self.mapper.next().ok_or(Error::State)?;
            let mut list = Vec::new();
            for i in 0..MPU_MAX_MAPPINGS {
                if st.map_len[i] == 0 {
                    continue;
                }
                list.push(Mapping {
                    input_base: st.va_base[i],
                    length: u64::from(st.map_len[i]),
                    output_base: st.pa_base[i],
                    domain: 0,
                    permissions: 0,
                    kind: MapType::Mapper,
                    ep: Arc::clone(&next) as Arc<dyn MapEndpoint>,
                });
            }
            if !list.is_empty() {
                replace = Some(list);
            }
        }

        let mode = if st.config & MPU_CONFIG_ENABLE != 0 {
            MapperMode::Translate
        } else {
            MapperMode::Passthrough
        };
        self.device()?.update_mapper_async(MapperUpdate { mode, replace })?;

        if val & MPU_CONFIG_CLEAR != 0 {
            st.va_base = [0; MPU_MAX_MAPPINGS];
            st.pa_base = [0; MPU_MAX_MAPPINGS];
            st.map_len = [0; MPU_MAX_MAPPINGS];
        }
        Ok(())
    }
}

/// 32-bit word view over a pair-of-words array register bank.
fn word_of(arr: &[u64], word_idx: usize) -> u32 {
    let v = arr[word_idx / 2];
    if word_idx % 2 == 0 {
        v as u32
    } else {
        (v >> 32) as u32
    }
}

fn set_word(arr: &mut [u64], word_idx: usize, val: u32) {
    let v = &mut arr[word_idx / 2];
    if word_idx % 2 == 0 {
        *v = (*v & 0xffff_ffff_0000_0000) | u64::from(val);
    } else {
        *v = (*v & 0xffff_ffff) | (u64::from(val) << 32);
    }
}

impl DeviceOps for Mpu {
    fn read(&self, addr: u64, size: u16, count: u32, buf: &mut [u8]) -> Result<()> {
        check_reg32(addr, size, count)?;
        let st = lock_unpoisoned(&self.state);
        let val = match addr {
            REG_DEV_TYPE => MPU_TYPE,
            REG_DEV_VERSION => MPU_VERSION,
            REG_CONFIG => st.config,
            REG_STATUS => st.config & MPU_CONFIG_ENABLE,
            REG_MAP_ENTS => MPU_MAX_MAPPINGS as u32,
            a if (REG_VA_BASE..REG_VA_BASE + 8 * MPU_MAX_MAPPINGS as u64).contains(&a) => {
                word_of(&st.va_base, ((a - REG_VA_BASE) >> 2) as usize)
            }
            a if (REG_PA_BASE..REG_PA_BASE + 8 * MPU_MAX_MAPPINGS as u64).contains(&a) => {
                word_of(&st.pa_base, ((a - REG_PA_BASE) >> 2) as usize)
            }
            a if (REG_LEN_BASE..REG_LEN_BASE + 4 * MPU_MAX_MAPPINGS as u64).contains(&a) => {
                st.map_len[((a - REG_LEN_BASE) >> 2) as usize]
            }
            _ => return Err(Error::IoInvalid),
        };
        put32(buf, val);
        Ok(())
    }

    fn write(&self, addr: u64, size: u16, count: u32, buf: &[u8]) -> Result<()> {
        check_reg32(addr, size, count)?;
        let val = get32(buf);
        let mut st = lock_unpoisoned(&self.state);
        match addr {
            REG_CONFIG => self.update_config(&mut st, val),
            REG_DEV_TYPE | REG_DEV_VERSION | REG_STATUS | REG_MAP_ENTS => Err(Error::IoNoWr),
            a if (REG_VA_BASE..REG_VA_BASE + 8 * MPU_MAX_MAPPINGS as u64).contains(&a) => {
                set_word(&mut st.va_base, ((a - REG_VA_BASE) >> 2) as usize, val);
                Ok(())
            }
            a if (REG_PA_BASE..REG_PA_BASE + 8 * MPU_MAX_MAPPINGS as u64).contains(&a) => {
                set_word(&mut st.pa_base, ((a - REG_PA_BASE) >> 2) as usize, val);
                Ok(())
            }
            a if (REG_LEN_BASE..REG_LEN_BASE + 4 * MPU_MAX_MAPPINGS as u64).contains(&a) => {
                st.map_len[((a - REG_LEN_BASE) >> 2) as usize] = val;
                Ok(())
            }
            _ => Err(Error::IoInvalid),
        }
    }
}
