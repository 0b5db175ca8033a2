//! RISC-V concrete core.
//!
//! `RvCore` embeds the architecture-neutral [`Core`] header and adds the
//! RISC-V privileged state: `mstatus`, the per-level CSR blocks,
//! identification registers, PMP arrays, and counter offsets. It implements
//! [`EngineCore`], so a worker can drive it:
//! 1. **Instruction cycle:** interrupt check, fetch, compressed expansion,
//!    dispatch, tick, pc advance.
//! 2. **Interrupt vectoring:** fixed priority order over the engine
//!    endpoint's active set.
//! 3. **Width handling:** one dispatcher serves RV32 and RV64; in 32-bit
//!    mode integer registers are kept sign-extended to 64 bits and the pc
//!    wraps modulo 2^32.

/// Control and status register file and access semantics.
pub mod csr;
/// Integer and system instruction dispatch.
pub mod dispatch;
/// Floating-point instruction dispatch.
pub mod dispatch_fp;
/// Exception entry, return, and synchronous exception mapping.
pub mod ex;
/// Compressed (C extension) instruction expansion.
pub mod rvc;

use std::sync::Arc;

use tracing::trace;

use crate::common::{Error, Result};
use crate::core::{ARCH_OPT_RV_C, Arch, Core, CoreMode, CoreParams};
use crate::engine::{Engine, EngineCore};
use crate::mapper::Mapper;

/// Interrupt cause priority order: ExternalM, TimerM, SoftwareM,
/// ExternalS, TimerS, SoftwareS.
pub const IRQ_PRIORITY: [u32; 6] = [11, 7, 3, 9, 5, 1];

/// Per-exception-level CSR block (S/H/M).
#[derive(Clone, Copy, Debug, Default)]
pub struct SrLevel {
    /// Scratch register.
    pub scratch: u64,
    /// Exception program counter.
    pub epc: u64,
    /// Trap cause.
    pub cause: u64,
    /// Trap value.
    pub tval: u64,
    /// Interrupt pending.
    pub ip: u64,
    /// ISA register (machine level only).
    pub isa: u64,
    /// Exception delegation.
    pub edeleg: u64,
    /// Interrupt delegation.
    pub ideleg: u64,
    /// Interrupt enable.
    pub ie: u64,
    /// Trap vector base.
    pub tvec: u64,
    /// Counter enable.
    pub counteren: u64,
}

/// A RISC-V hart.
pub struct RvCore {
    /// Architecture-neutral state.
    pub core: Core,
    /// `mstatus` backing store (64-bit layout; 32-bit views are fixed up
    /// at CSR access).
    pub status: u64,
    /// Per-level CSR blocks, indexed S=0, H=1, M=2.
    pub sr: [SrLevel; 3],
    /// Vendor id.
    pub mvendorid: u64,
    /// Architecture id.
    pub marchid: u64,
    /// Implementation id.
    pub mimpid: u64,
    /// Hart id.
    pub mhartid: u64,
    /// Configuration pointer.
    pub mconfigptr: u64,
    /// Supervisor address translation and protection register, stored raw.
    pub satp: u64,
    /// Offset subtracted from `ticks` to form `mcycle`.
    pub mcycle_offset: i64,
    /// Offset subtracted from `ticks` to form `minstret`.
    pub minstret_offset: i64,
    /// PMP configuration registers, stored raw.
    pub pmpcfg: [u64; 16],
    /// PMP address registers, stored raw.
    pub pmpaddr: [u64; 64],
    /// Hardware performance counters 3..=31, stored raw.
    pub mhpmcounter: [u64; 29],
    /// Hardware performance event selectors 3..=31, stored raw.
    pub mhpmevent: [u64; 29],
}

impl RvCore {
    /// Creates a hart behind the given translation chain head.
    pub fn new(params: &CoreParams, mapper: Arc<Mapper>) -> Box<Self> {
        let mut rc = Box::new(Self {
            core: Core::new(params, mapper),
            status: 0,
            sr: [SrLevel::default(); 3],
            mvendorid: 0,
            marchid: 0,
            mimpid: u64::from_le_bytes(*b"rvmach\0\0"),
            mhartid: u64::from(params.id),
            mconfigptr: 0,
            satp: 0,
            mcycle_offset: 0,
            minstret_offset: 0,
            pmpcfg: [0; 16],
            pmpaddr: [0; 64],
            mhpmcounter: [0; 29],
            mhpmevent: [0; 29],
        });
        rc.sr[2].isa = csr::misa_for(params.mode, params.arch_options);
        rc
    }

    /// Returns `true` in 32-bit register mode.
    pub fn mode32(&self) -> bool {
        self.core.mode == CoreMode::Mode32
    }

    /// Register width in bits.
    pub fn xlen(&self) -> u32 {
        if self.mode32() { 32 } else { 64 }
    }

    /// Per-level CSR block for S/H/M.
    pub(crate) fn sr(&self, el: crate::core::El) -> &SrLevel {
        &self.sr[el as usize - 1]
    }

    /// Mutable per-level CSR block for S/H/M.
    pub(crate) fn sr_mut(&mut self, el: crate::core::El) -> &mut SrLevel {
        &mut self.sr[el as usize - 1]
    }

    /// Raw register value; canonical (zero-extended) in 32-bit mode.
    pub fn xr(&self, reg: usize) -> u64 {
        self.core.get_reg(reg)
    }

    /// Unsigned operand view: zero-extended to the register width.
    pub fn ux(&self, reg: usize) -> u64 {
        let v = self.core.get_reg(reg);
        if self.mode32() { u64::from(v as u32) } else { v }
    }

    /// Signed operand view at the register width.
    pub fn sx(&self, reg: usize) -> i64 {
        let v = self.core.get_reg(reg);
        if self.mode32() {
            i64::from(v as u32 as i32)
        } else {
            v as i64
        }
    }

    /// Canonicalizing register write: results are truncated to 32 bits in
    /// 32-bit mode and stored zero-extended.
    pub fn set_xr(&mut self, reg: usize, value: u64) {
        let v = if self.mode32() {
            u64::from(value as u32)
        } else {
            value
        };
        self.core.set_reg(reg, v);
    }

    /// Masks an address or pc value to the register width.
    pub fn mask_addr(&self, addr: u64) -> u64 {
        if self.mode32() {
            u64::from(addr as u32)
        } else {
            addr
        }
    }

    /// Redirects the pc; on RV32 the target wraps modulo 2^32.
    pub fn set_pc_branch(&mut self, target: u64) {
        self.core.pc = self.mask_addr(target);
        self.core.branch_taken = true;
    }

    /// Fetches the instruction at pc.
    ///
    /// Reads the low halfword first: a compressed encoding never needs the
    /// high half, which also keeps a final 16-bit instruction at the end of
    /// a region from over-reading.
    fn fetch(&mut self) -> Result<(u32, u64)> {
        let pc = self.core.pc;
        let lo = match self.core.mem_read_single::<2>(pc) {
            Ok(b) => u16::from_le_bytes(b),
            Err(e) => return self.fetch_fault(pc, e).map(|()| (0, 0)),
        };
        if lo & 3 != 3 {
            return Ok((u32::from(lo), 2));
        }
        let hi = match self.core.mem_read_single::<2>(pc.wrapping_add(2)) {
            Ok(b) => u16::from_le_bytes(b),
            Err(e) => return self.fetch_fault(pc, e).map(|()| (0, 0)),
        };
        Ok(((u32::from(hi) << 16) | u32::from(lo), 4))
    }

    fn fetch_fault(&mut self, addr: u64, err: Error) -> Result<()> {
        self.synchronous_exception(crate::core::CoreEx::AbortInst, addr, err)
    }
}

impl EngineCore for RvCore {
    fn engine(&self) -> &Arc<Engine> {
        &self.core.engine
    }

    fn step(&mut self) -> Result<()> {
        if self.core.engine.interrupts_enabled() && self.core.engine.irq_ep().active() != 0 {
            self.interrupt()?;
        }

        let (raw, len) = self.fetch()?;
        if len == 0 {
            // Fetch fault vectored into the guest; dispatch nothing this
            // cycle.
            return Ok(());
        }

        let inst = if len == 2 {
            if self.core.arch_options & ARCH_OPT_RV_C == 0 {
                return self.synchronous_exception(
                    crate::core::CoreEx::Undefined,
                    u64::from(raw),
                    Error::Undef,
                );
            }
            match rvc::expand(raw as u16, self.core.mode) {
                Some(x) => x,
                None => {
                    return self.synchronous_exception(
                        crate::core::CoreEx::Undefined,
                        u64::from(raw),
                        Error::Undef,
                    );
                }
            }
        } else {
            raw
        };

        self.core.prev_len = len;
        self.core.branch_taken = false;
        self.dispatch(dispatch::Inst(inst))?;
        self.core.ticks += 1;
        if !self.core.branch_taken {
            self.core.pc = self.mask_addr(self.core.pc.wrapping_add(self.core.prev_len));
        }
        Ok(())
    }

    /// Enters the exception for the highest-priority active interrupt.
    fn interrupt(&mut self) -> Result<()> {
        let active = self.core.engine.irq_ep().active();
        for bit in IRQ_PRIORITY {
            if active & (1 << bit) != 0 {
                trace!(core = %self.core.name, irq = bit, "interrupt taken");
                return self.exception_enter(ex::CAUSE_INTERRUPT | u64::from(bit), 0);
            }
        }
        Err(Error::State)
    }

    fn core_state(&self) -> &Core {
        &self.core
    }

    fn core_state_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    fn config_get(&self) -> CoreParams {
        CoreParams {
            arch: Arch::Riscv,
            mode: self.core.mode,
            id: self.core.id,
            options: self.core.options,
            arch_options: self.core.arch_options,
            name: self.core.name.clone(),
        }
    }

    fn config_set(&mut self, params: &CoreParams) -> Result<()> {
        if params.arch != Arch::Riscv {
            return Err(Error::Arg);
        }
        self.core.mode = params.mode;
        self.core.id = params.id;
        self.core.options = params.options;
        self.core.arch_options = params.arch_options;
        self.core.name = params.name.clone();
        self.mhartid = u64::from(params.id);
        self.sr[2].isa = csr::misa_for(params.mode, params.arch_options);
        Ok(())
    }

    fn as_riscv(&self) -> Option<&RvCore> {
        Some(self)
    }

    fn as_riscv_mut(&mut self) -> Option<&mut RvCore> {
        Some(self)
    }
}

/// Creates a core of the requested architecture.
pub fn create_core(params: &CoreParams, mapper: Arc<Mapper>) -> Result<Box<dyn EngineCore>> {
    match params.arch {
        Arch::Riscv => Ok(RvCore::new(params, mapper)),
    }
}
