//! Shared architectural core state.
//!
//! `Core` is the architecture-neutral header every concrete core embeds:
//! program counter, integer and floating-point register files, exception
//! level, execution mode, the LR/SC monitor, the tick counter, and handles
//! to the engine and the translation chain. Memory accesses and barriers
//! issued by dispatchers go through the helpers here.

use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

use crate::common::Result;
use crate::engine::Engine;
use crate::io::{AtomicKind, IoOp, MemOrder};
use crate::mapper::{MapEndpoint, Mapper};

/// Trap on guest syscalls instead of vectoring.
pub const CORE_OPT_TRAP_SYSCALL: u32 = 1 << 0;
/// Trap on undefined instructions instead of vectoring.
pub const CORE_OPT_TRAP_UNDEF: u32 = 1 << 1;
/// Trap on data aborts instead of vectoring.
pub const CORE_OPT_TRAP_ABORT: u32 = 1 << 2;
/// Trap on instruction fetch aborts instead of vectoring.
pub const CORE_OPT_TRAP_PREFETCH_ABORT: u32 = 1 << 3;
/// Trap on breakpoints instead of vectoring.
pub const CORE_OPT_TRAP_BREAKPOINT: u32 = 1 << 4;

/// M extension (integer multiply/divide).
pub const ARCH_OPT_RV_M: u32 = 1 << 0;
/// A extension (atomics).
pub const ARCH_OPT_RV_A: u32 = 1 << 1;
/// F extension (single-precision floating point).
pub const ARCH_OPT_RV_F: u32 = 1 << 2;
/// D extension (double-precision floating point).
pub const ARCH_OPT_RV_D: u32 = 1 << 3;
/// C extension (compressed instructions).
pub const ARCH_OPT_RV_C: u32 = 1 << 4;
/// Zicsr extension (CSR instructions).
pub const ARCH_OPT_RV_ZICSR: u32 = 1 << 5;

/// Barrier affects loads.
pub const BARRIER_LOAD: u32 = 1 << 0;
/// Barrier affects stores.
pub const BARRIER_STORE: u32 = 1 << 1;
/// Barrier affects system operations.
pub const BARRIER_SYSTEM: u32 = 1 << 2;
/// Barrier synchronizes instruction fetch.
pub const BARRIER_SYNC: u32 = 1 << 3;

/// Exception level (privilege mode).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum El {
    /// User mode.
    User = 0,
    /// Supervisor mode.
    Supervisor = 1,
    /// Hypervisor mode.
    Hypervisor = 2,
    /// Monitor (machine) mode.
    Monitor = 3,
}

impl El {
    /// Converts from the two-bit privilege encoding.
    pub fn from_bits(bits: u64) -> Self {
        match bits & 3 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Hypervisor,
            _ => Self::Monitor,
        }
    }
}

/// Register width mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreMode {
    /// 32-bit registers.
    Mode32,
    /// 64-bit registers.
    Mode64,
}

/// Supported guest architectures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Arch {
    /// RISC-V.
    #[default]
    Riscv,
}

/// Core construction and reconfiguration parameters.
#[derive(Clone, Debug)]
pub struct CoreParams {
    /// Guest architecture.
    pub arch: Arch,
    /// Register width mode.
    pub mode: CoreMode,
    /// Core instance id (hart id).
    pub id: u32,
    /// `CORE_OPT_*` behavior bits.
    pub options: u32,
    /// `ARCH_OPT_*` extension bits.
    pub arch_options: u32,
    /// Core name.
    pub name: String,
}

impl Default for CoreParams {
    fn default() -> Self {
        Self {
            arch: Arch::Riscv,
            mode: CoreMode::Mode32,
            id: 0,
            options: 0,
            arch_options: 0,
            name: "core".to_owned(),
        }
    }
}

/// LR/SC reservation status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MonitorStatus {
    /// No reservation held.
    #[default]
    Unarmed,
    /// 32-bit reservation armed.
    Armed32,
    /// 64-bit reservation armed.
    Armed64,
}

/// The LR/SC reservation recorded on a core.
#[derive(Clone, Copy, Debug, Default)]
pub struct Monitor {
    /// Reserved address.
    pub addr: u64,
    /// Value observed by the load-reserved.
    pub value: u64,
    /// Arming state.
    pub status: MonitorStatus,
}

impl Monitor {
    /// Drops any reservation.
    pub fn disarm(&mut self) {
        self.status = MonitorStatus::Unarmed;
    }
}

/// Architecture-neutral core state embedded by every concrete core.
pub struct Core {
    /// Core name.
    pub name: String,
    /// Core instance id.
    pub id: u32,
    /// Current exception level.
    pub el: El,
    /// Register width mode.
    pub mode: CoreMode,
    /// Length in bytes of the last dispatched instruction (2 or 4).
    pub prev_len: u64,
    /// Set when the last instruction redirected the pc.
    pub branch_taken: bool,
    /// Program counter.
    pub pc: u64,
    /// Integer registers. `r[0]` stays zero; in 32-bit mode values are
    /// kept sign-extended to 64 bits.
    pub r: [u64; 32],
    /// Floating-point registers as raw bits; single-precision values are
    /// NaN-boxed.
    pub f: [u64; 32],
    /// Accrued floating-point exception flags (fflags layout).
    pub fexc: u8,
    /// Floating-point rounding mode (frm encoding).
    pub frm: u8,
    /// LR/SC reservation.
    pub monitor: Monitor,
    /// Retired instruction count.
    pub ticks: u64,
    /// `CORE_OPT_*` behavior bits.
    pub options: u32,
    /// `ARCH_OPT_*` extension bits.
    pub arch_options: u32,
    /// Head of the translation chain this core fetches and loads through.
    pub mapper: Arc<Mapper>,
    /// Shared engine state.
    pub engine: Arc<Engine>,
}

impl Core {
    /// Creates a core from construction parameters, a translation chain
    /// head, and a fresh engine.
    pub fn new(params: &CoreParams, mapper: Arc<Mapper>) -> Self {
        Self {
            name: params.name.clone(),
            id: params.id,
            el: El::Monitor,
            mode: params.mode,
            prev_len: 4,
            branch_taken: false,
            pc: 0,
            r: [0; 32],
            f: [0; 32],
            fexc: 0,
            frm: 0,
            monitor: Monitor::default(),
            ticks: 0,
            options: params.options,
            arch_options: params.arch_options,
            mapper,
            engine: Engine::new(&params.name),
        }
    }

    /// Returns integer register `reg`; x0 reads as zero.
    pub fn get_reg(&self, reg: usize) -> u64 {
        if reg == 0 { 0 } else { self.r[reg & 31] }
    }

    /// Sets integer register `reg`; writes to x0 are discarded.
    pub fn set_reg(&mut self, reg: usize, value: u64) {
        if reg != 0 {
            self.r[reg & 31] = value;
        }
    }

    /// Enables or disables interrupt recognition at the engine.
    pub fn interrupt_set(&self, enable: bool) {
        self.engine.set_interrupts_enabled(enable);
    }

    /// Reads `buf.len()` bytes of guest memory at `addr`, unit size 1.
    pub fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let mut op = IoOp::read(addr, 1, buf);
        op.agent = u64::from(self.id);
        self.mapper.io(&mut op)
    }

    /// Writes `buf` to guest memory at `addr`, unit size 1.
    pub fn mem_write(&self, addr: u64, buf: &[u8]) -> Result<()> {
        let mut op = IoOp::write(addr, 1, buf);
        op.agent = u64::from(self.id);
        self.mapper.io(&mut op)
    }

    /// Reads one naturally aligned `SIZE`-byte value.
    pub fn mem_read_single<const SIZE: usize>(&self, addr: u64) -> Result<[u8; SIZE]> {
        let mut buf = [0u8; SIZE];
        let mut op = IoOp::read(addr, SIZE as u16, &mut buf);
        op.agent = u64::from(self.id);
        self.mapper.io(&mut op)?;
        Ok(buf)
    }

    /// Writes one naturally aligned `SIZE`-byte value.
    pub fn mem_write_single<const SIZE: usize>(&self, addr: u64, val: [u8; SIZE]) -> Result<()> {
        let mut op = IoOp::write(addr, SIZE as u16, &val);
        op.agent = u64::from(self.id);
        self.mapper.io(&mut op)
    }

    /// Executes an atomic RMW of one `size`-byte entry, returning the
    /// operation result.
    pub fn mem_atomic(
        &self,
        addr: u64,
        size: u16,
        kind: AtomicKind,
        arg0: u64,
        arg1: u64,
        order: MemOrder,
        order_fail: MemOrder,
    ) -> Result<u64> {
        let mut op = IoOp::atomic(addr, size, kind, arg0, arg1, order, order_fail);
        op.agent = u64::from(self.id);
        self.mapper.io(&mut op)?;
        Ok(op.arg[0])
    }

    /// Instruction barrier: orders fetch against prior stores.
    pub fn instruction_barrier(&self) {
        fence(Ordering::Acquire);
    }

    /// Memory barrier decomposed from `BARRIER_*` bits.
    ///
    /// System and sync components are currently folded into the load/store
    /// fence.
    pub fn memory_barrier(&self, kind: u32) {
        match kind & (BARRIER_LOAD | BARRIER_STORE) {
            0 => {}
            BARRIER_LOAD => fence(Ordering::Acquire),
            BARRIER_STORE => fence(Ordering::Release),
            _ => fence(Ordering::AcqRel),
        }
    }

    /// Formats the architectural state for fault reports and the console.
    pub fn state_dump(&self) -> String {
        use std::fmt::Write as _;
        let mut s = String::new();
        let _ = writeln!(
            s,
            "pc={:x}, sp={:x}, ra={:x}, ticks={}",
            self.pc, self.r[2], self.r[1], self.ticks
        );
        for i in (0..32).step_by(4) {
            let _ = writeln!(
                s,
                "x{i:2}: {:16x}  {:16x}  {:16x}  {:16x}",
                self.r[i],
                self.r[i + 1],
                self.r[i + 2],
                self.r[i + 3]
            );
        }
        s
    }
}

/// Abstract exception classes raised by dispatchers, mapped to
/// architectural causes at exception entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreEx {
    /// Environment call.
    Syscall,
    /// Undefined instruction.
    Undefined,
    /// Data abort on load.
    AbortLoad,
    /// Data abort on store.
    AbortStore,
    /// Abort on instruction fetch.
    AbortInst,
}
