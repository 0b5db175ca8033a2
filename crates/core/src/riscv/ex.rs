//! Exception entry and return.
//!
//! Implements the trap machinery: mapping abstract exception classes to
//! RISC-V cause codes, vectoring into the handler with CSR/`mstatus`
//! updates, and the `MRET`/`SRET` return paths. When the corresponding
//! `TRAP_*` core option is set, the raw error is surfaced to the host
//! instead of vectoring, the host-debug mode used by test harnesses and
//! the CLI exit convention.

use tracing::{error, trace};

use super::RvCore;
use super::csr::{self, CsrOp};
use crate::common::{Error, Result};
use crate::core::{
    CORE_OPT_TRAP_ABORT, CORE_OPT_TRAP_PREFETCH_ABORT, CORE_OPT_TRAP_SYSCALL, CORE_OPT_TRAP_UNDEF,
    CoreEx, El,
};

/// Interrupt tag bit of a 64-bit cause value.
pub const CAUSE_INTERRUPT: u64 = 1 << 63;

/// Instruction address misaligned.
pub const EX_INST_ALIGN: u64 = 0;
/// Instruction access fault.
pub const EX_INST_FAULT: u64 = 1;
/// Illegal instruction.
pub const EX_INST_ILLEGAL: u64 = 2;
/// Breakpoint.
pub const EX_BREAKPOINT: u64 = 3;
/// Load address misaligned.
pub const EX_LOAD_ALIGN: u64 = 4;
/// Load access fault.
pub const EX_LOAD_FAULT: u64 = 5;
/// Store address misaligned.
pub const EX_STORE_ALIGN: u64 = 6;
/// Store access fault.
pub const EX_STORE_FAULT: u64 = 7;
/// Environment call from U-mode; add the current exception level.
pub const EX_CALL_FROM_U: u64 = 8;

/// Exception return flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetOp {
    /// Return from machine mode.
    Mret,
    /// Return from supervisor mode.
    Sret,
}

impl RvCore {
    /// Enters the exception handler for `(cause, addr)` at Monitor level.
    pub fn exception_enter(&mut self, cause: u64, addr: u64) -> Result<()> {
        trace!(core = %self.core.name, cause, addr, pc = self.core.pc, "exception enter");
        self.core.monitor.disarm();

        let pc = self.core.pc;
        let el = self.core.el;
        let m = self.sr_mut(El::Monitor);
        m.cause = cause;
        m.epc = pc;
        m.tval = addr;

        // Stash the interrupt state and privilege level, then mask.
        let mut status = self.status;
        let mie = status & csr::MSTATUS_MIE != 0;
        status &= !(csr::MSTATUS_MPIE | csr::MSTATUS_MIE | csr::MSTATUS_MPP);
        if mie {
            status |= csr::MSTATUS_MPIE;
        }
        status |= (el as u64) << csr::MSTATUS_MPP_SHIFT;
        self.status = status;

        self.core.el = El::Monitor;

        let tvec = self.sr(El::Monitor).tvec;
        let mut target = tvec & !3;
        if cause & CAUSE_INTERRUPT != 0 && tvec & 1 != 0 {
            target += (cause & !CAUSE_INTERRUPT) << 2;
        }
        self.set_pc_branch(target);
        self.core.interrupt_set(false);
        Ok(())
    }

    /// Returns from an exception handler via `MRET` or `SRET`.
    pub fn exception_return(&mut self, op: RetOp) -> Result<()> {
        let mut status = self.status;
        let (dest, int_enabled) = match op {
            RetOp::Mret => {
                let dest = El::from_bits(status >> csr::MSTATUS_MPP_SHIFT);
                let mpie = status & csr::MSTATUS_MPIE != 0;
                status &= !(csr::MSTATUS_MIE | csr::MSTATUS_MPP);
                if mpie {
                    status |= csr::MSTATUS_MIE;
                }
                status |= csr::MSTATUS_MPIE;
                (dest, mpie)
            }
            RetOp::Sret => {
                if status & csr::MSTATUS_TSR != 0 {
                    return Err(Error::Undef);
                }
                let dest = if status & csr::MSTATUS_SPP != 0 {
                    El::Supervisor
                } else {
                    El::User
                };
                let spie = status & csr::MSTATUS_SPIE != 0;
                status &= !(csr::MSTATUS_SIE | csr::MSTATUS_SPP);
                if spie {
                    status |= csr::MSTATUS_SIE;
                }
                (dest, spie)
            }
        };
        self.status = status;
        self.core.monitor.disarm();

        let epc = self.sr(self.core.el).epc;
        self.core.el = dest;
        self.set_pc_branch(epc);
        self.core.interrupt_set(int_enabled);
        trace!(core = %self.core.name, ?op, ?dest, epc, "exception return");
        Ok(())
    }

    /// Raises a synchronous exception from the dispatcher.
    ///
    /// Maps the abstract class to the architectural cause and vectors,
    /// unless the matching `TRAP_*` option asks for the raw error instead.
    pub fn synchronous_exception(&mut self, ex: CoreEx, value: u64, status: Error) -> Result<()> {
        let options = self.core.options;
        match ex {
            CoreEx::Syscall => {
                if options & CORE_OPT_TRAP_SYSCALL != 0 {
                    return Err(Error::Syscall);
                }
                self.exception_enter(EX_CALL_FROM_U + self.core.el as u64, value)
            }
            CoreEx::Undefined => {
                if options & CORE_OPT_TRAP_UNDEF != 0 {
                    error!(
                        core = %self.core.name,
                        inst = format_args!("{value:#010x}"),
                        pc = format_args!("{:#x}", self.core.pc),
                        "undefined instruction"
                    );
                    error!("{}", self.core.state_dump());
                    return Err(Error::Undef);
                }
                self.exception_enter(EX_INST_ILLEGAL, value)
            }
            CoreEx::AbortLoad => {
                if options & CORE_OPT_TRAP_ABORT != 0 {
                    error!(
                        core = %self.core.name,
                        addr = format_args!("{value:#x}"),
                        pc = format_args!("{:#x}", self.core.pc),
                        %status,
                        "load fault"
                    );
                    return Err(status);
                }
                let cause = if status == Error::IoAlign {
                    EX_LOAD_ALIGN
                } else {
                    EX_LOAD_FAULT
                };
                self.exception_enter(cause, value)
            }
            CoreEx::AbortStore => {
                if options & CORE_OPT_TRAP_ABORT != 0 {
                    error!(
                        core = %self.core.name,
                        addr = format_args!("{value:#x}"),
                        pc = format_args!("{:#x}", self.core.pc),
                        %status,
                        "store fault"
                    );
                    return Err(status);
                }
                let cause = if status == Error::IoAlign {
                    EX_STORE_ALIGN
                } else {
                    EX_STORE_FAULT
                };
                self.exception_enter(cause, value)
            }
            CoreEx::AbortInst => {
                if options & CORE_OPT_TRAP_PREFETCH_ABORT != 0 {
                    error!(
                        core = %self.core.name,
                        addr = format_args!("{value:#x}"),
                        pc = format_args!("{:#x}", self.core.pc),
                        %status,
                        "instruction fetch fault"
                    );
                    return Err(status);
                }
                let cause = if status == Error::IoAlign {
                    EX_INST_ALIGN
                } else {
                    EX_INST_FAULT
                };
                self.exception_enter(cause, value)
            }
        }
    }

    /// Writes a CSR by number with write semantics, outside instruction
    /// dispatch. Used by loaders and consoles.
    pub fn csr_write(&mut self, addr: u32, value: u64) -> Result<()> {
        let _ = csr::csr_op(self, CsrOp::Write, addr, value)?;
        Ok(())
    }

    /// Reads a CSR by number outside instruction dispatch.
    pub fn csr_read(&mut self, addr: u32) -> Result<u64> {
        csr::csr_op(self, CsrOp::Read, addr, 0)
    }
}
