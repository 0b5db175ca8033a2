//! Integer and system instruction dispatch.
//!
//! One dispatcher serves both register widths: operands are fetched through
//! the signed/unsigned width-aware views and results are written back
//! through the canonicalizing register write, so RV32 semantics (truncation,
//! modulo-2^32 pc arithmetic) fall out of the helpers rather than a second
//! code path.

use crate::common::{Error, Result};
use crate::core::{ARCH_OPT_RV_A, ARCH_OPT_RV_M, BARRIER_LOAD, BARRIER_STORE, BARRIER_SYSTEM};
use crate::core::{CoreEx, El};
use crate::io::{AtomicKind, MemOrder};

use super::RvCore;
use super::csr::{self, CsrOp};
use super::ex::RetOp;

const OP_LUI: u32 = 0b0110111;
const OP_AUIPC: u32 = 0b0010111;
const OP_JAL: u32 = 0b1101111;
const OP_JALR: u32 = 0b1100111;
const OP_BRANCH: u32 = 0b1100011;
const OP_LOAD: u32 = 0b0000011;
const OP_STORE: u32 = 0b0100011;
const OP_ALU_IMM: u32 = 0b0010011;
const OP_ALU: u32 = 0b0110011;
const OP_ALU_IMM32: u32 = 0b0011011;
const OP_ALU32: u32 = 0b0111011;
const OP_MISC_MEM: u32 = 0b0001111;
const OP_SYSTEM: u32 = 0b1110011;
const OP_AMO: u32 = 0b0101111;
const OP_LOAD_FP: u32 = 0b0000111;
const OP_STORE_FP: u32 = 0b0100111;
const OP_FP: u32 = 0b1010011;
const OP_FMADD: u32 = 0b1000011;
const OP_FMSUB: u32 = 0b1000111;
const OP_FNMSUB: u32 = 0b1001011;
const OP_FNMADD: u32 = 0b1001111;

const FENCE_W: u32 = 1 << 0;
const FENCE_R: u32 = 1 << 1;
const FENCE_O: u32 = 1 << 2;
const FENCE_I: u32 = 1 << 3;

/// A 32-bit instruction word with field accessors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inst(pub u32);

impl Inst {
    /// Primary opcode, bits [6:0].
    pub fn opcode(self) -> u32 {
        self.0 & 0x7f
    }

    /// Destination register.
    pub fn rd(self) -> usize {
        ((self.0 >> 7) & 31) as usize
    }

    /// First source register.
    pub fn rs1(self) -> usize {
        ((self.0 >> 15) & 31) as usize
    }

    /// Second source register.
    pub fn rs2(self) -> usize {
        ((self.0 >> 20) & 31) as usize
    }

    /// Third source register (FMA forms).
    pub fn rs3(self) -> usize {
        (self.0 >> 27) as usize
    }

    /// Minor opcode, bits [14:12].
    pub fn funct3(self) -> u32 {
        (self.0 >> 12) & 7
    }

    /// Extension opcode, bits [31:25].
    pub fn funct7(self) -> u32 {
        self.0 >> 25
    }

    /// Sign-extended I-type immediate.
    pub fn imm_i(self) -> i64 {
        i64::from((self.0 as i32) >> 20)
    }

    /// Sign-extended S-type immediate.
    pub fn imm_s(self) -> i64 {
        let hi = ((self.0 as i32) >> 20) & !0x1f;
        let lo = ((self.0 >> 7) & 0x1f) as i32;
        i64::from(hi | lo)
    }

    /// Sign-extended B-type immediate.
    pub fn imm_b(self) -> i64 {
        let imm = (((self.0 >> 8) & 0xf) << 1)
            | (((self.0 >> 25) & 0x3f) << 5)
            | (((self.0 >> 7) & 1) << 11);
        let sign = ((self.0 as i32) >> 31) << 12;
        i64::from(imm as i32 | sign)
    }

    /// U-type immediate (upper 20 bits), sign-extended.
    pub fn imm_u(self) -> i64 {
        i64::from((self.0 & 0xffff_f000) as i32)
    }

    /// Sign-extended J-type immediate.
    pub fn imm_j(self) -> i64 {
        let imm = (((self.0 >> 21) & 0x3ff) << 1)
            | (((self.0 >> 20) & 1) << 11)
            | (((self.0 >> 12) & 0xff) << 12);
        let sign = ((self.0 as i32) >> 31) << 20;
        i64::from(imm as i32 | sign)
    }
}

impl RvCore {
    /// Raises the undefined-instruction path for `inst`.
    pub(crate) fn undef(&mut self, inst: Inst) -> Result<()> {
        self.synchronous_exception(CoreEx::Undefined, u64::from(inst.0), Error::Undef)
    }

    /// Sign-extended immediate reinterpreted as an unsigned value at the
    /// register width.
    fn uimm(&self, imm: i64) -> u64 {
        if self.mode32() {
            u64::from(imm as u32)
        } else {
            imm as u64
        }
    }

    /// Dispatches one 32-bit (or expanded compressed) instruction.
    pub fn dispatch(&mut self, inst: Inst) -> Result<()> {
        match inst.opcode() {
            OP_LUI | OP_AUIPC => self.exec_u_type(inst),
            OP_JAL => self.exec_jump(inst),
            OP_JALR => self.exec_jalr(inst),
            OP_BRANCH => self.exec_branch(inst),
            OP_LOAD => self.exec_load(inst),
            OP_STORE => self.exec_store(inst),
            OP_ALU_IMM => self.exec_alu_imm(inst),
            OP_ALU => self.exec_alu(inst),
            OP_ALU_IMM32 if !self.mode32() => self.exec_alu_imm32(inst),
            OP_ALU32 if !self.mode32() => self.exec_alu32(inst),
            OP_MISC_MEM => self.exec_mem(inst),
            OP_SYSTEM => self.exec_system(inst),
            OP_AMO => self.exec_amo(inst),
            OP_LOAD_FP => self.exec_fp_load(inst),
            OP_STORE_FP => self.exec_fp_store(inst),
            OP_FP => self.exec_fp(inst),
            OP_FMADD | OP_FMSUB | OP_FNMSUB | OP_FNMADD => self.exec_fp_mac(inst),
            _ => self.undef(inst),
        }
    }

    fn exec_u_type(&mut self, inst: Inst) -> Result<()> {
        let offset = self.uimm(inst.imm_u());
        let result = if inst.opcode() == OP_AUIPC {
            self.core.pc.wrapping_add(offset)
        } else {
            offset
        };
        self.set_xr(inst.rd(), result);
        Ok(())
    }

    fn exec_jump(&mut self, inst: Inst) -> Result<()> {
        let link = self.core.pc.wrapping_add(self.core.prev_len);
        let target = self.core.pc.wrapping_add(inst.imm_j() as u64);
        if inst.rd() != 0 {
            self.set_xr(inst.rd(), link);
        }
        self.set_pc_branch(target);
        Ok(())
    }

    fn exec_jalr(&mut self, inst: Inst) -> Result<()> {
        if inst.funct3() != 0 {
            return self.undef(inst);
        }
        let link = self.core.pc.wrapping_add(self.core.prev_len);
        let target = self.ux(inst.rs1()).wrapping_add(inst.imm_i() as u64) & !1;
        if inst.rd() != 0 {
            self.set_xr(inst.rd(), link);
        }
        self.set_pc_branch(target);
        Ok(())
    }

    fn exec_branch(&mut self, inst: Inst) -> Result<()> {
        let u1 = self.ux(inst.rs1());
        let u2 = self.ux(inst.rs2());
        let s1 = self.sx(inst.rs1());
        let s2 = self.sx(inst.rs2());
        let cond = match inst.funct3() {
            0b000 => u1 == u2,
            0b001 => u1 != u2,
            0b100 => s1 < s2,
            0b101 => s1 >= s2,
            0b110 => u1 < u2,
            0b111 => u1 >= u2,
            _ => return self.undef(inst),
        };
        if cond {
            let target = self.core.pc.wrapping_add(inst.imm_b() as u64);
            self.set_pc_branch(target);
        }
        Ok(())
    }

    fn exec_load(&mut self, inst: Inst) -> Result<()> {
        let addr = self
            .mask_addr(self.ux(inst.rs1()).wrapping_add(inst.imm_i() as u64));
        let loaded: Result<u64> = match inst.funct3() {
            0b000 => self
                .core
                .mem_read_single::<1>(addr)
                .map(|b| i64::from(b[0] as i8) as u64),
            0b001 => self
                .core
                .mem_read_single::<2>(addr)
                .map(|b| i64::from(i16::from_le_bytes(b)) as u64),
            0b010 => self
                .core
                .mem_read_single::<4>(addr)
                .map(|b| i64::from(i32::from_le_bytes(b)) as u64),
            0b100 => self
                .core
                .mem_read_single::<1>(addr)
                .map(|b| u64::from(b[0])),
            0b101 => self
                .core
                .mem_read_single::<2>(addr)
                .map(|b| u64::from(u16::from_le_bytes(b))),
            0b110 if !self.mode32() => self
                .core
                .mem_read_single::<4>(addr)
                .map(|b| u64::from(u32::from_le_bytes(b))),
            0b011 if !self.mode32() => self.core.mem_read_single::<8>(addr).map(u64::from_le_bytes),
            _ => return self.undef(inst),
        };
        match loaded {
            Ok(x) => {
                self.set_xr(inst.rd(), x);
                Ok(())
            }
            Err(e) => self.synchronous_exception(CoreEx::AbortLoad, addr, e),
        }
    }

    fn exec_store(&mut self, inst: Inst) -> Result<()> {
        let addr = self
            .mask_addr(self.ux(inst.rs1()).wrapping_add(inst.imm_s() as u64));
        let val = self.ux(inst.rs2());
        let stored = match inst.funct3() {
            0b000 => self.core.mem_write_single::<1>(addr, [val as u8]),
            0b001 => self
                .core
                .mem_write_single::<2>(addr, (val as u16).to_le_bytes()),
            0b010 => self
                .core
                .mem_write_single::<4>(addr, (val as u32).to_le_bytes()),
            0b011 if !self.mode32() => self.core.mem_write_single::<8>(addr, val.to_le_bytes()),
            _ => return self.undef(inst),
        };
        match stored {
            Ok(()) => Ok(()),
            Err(e) => self.synchronous_exception(CoreEx::AbortStore, addr, e),
        }
    }

    fn exec_alu_imm(&mut self, inst: Inst) -> Result<()> {
        let u1 = self.ux(inst.rs1());
        let imm = inst.imm_i();
        let imm12 = (inst.0 >> 20) & 0xfff;
        let (shamt, shfunc) = if self.mode32() {
            (imm12 & 31, imm12 >> 5)
        } else {
            (imm12 & 63, (imm12 >> 5) & !1)
        };

        let result = match inst.funct3() {
            0b000 => u1.wrapping_add(imm as u64),
            0b001 => {
                if shfunc != 0 {
                    return self.undef(inst);
                }
                u1 << shamt
            }
            0b101 => match shfunc {
                0 => u1 >> shamt,
                0b0100000 => (self.sx(inst.rs1()) >> shamt) as u64,
                _ => return self.undef(inst),
            },
            0b010 => u64::from(self.sx(inst.rs1()) < imm),
            0b011 => u64::from(u1 < self.uimm(imm)),
            0b100 => u1 ^ self.uimm(imm),
            0b110 => u1 | self.uimm(imm),
            0b111 => u1 & self.uimm(imm),
            _ => return self.undef(inst),
        };
        self.set_xr(inst.rd(), result);
        Ok(())
    }

    fn exec_alu(&mut self, inst: Inst) -> Result<()> {
        let u1 = self.ux(inst.rs1());
        let u2 = self.ux(inst.rs2());
        let s1 = self.sx(inst.rs1());
        let s2 = self.sx(inst.rs2());
        let shamt = (u2 & u64::from(self.xlen() - 1)) as u32;

        let result = match inst.funct7() {
            0 => match inst.funct3() {
                0b000 => u1.wrapping_add(u2),
                0b001 => u1 << shamt,
                0b010 => u64::from(s1 < s2),
                0b011 => u64::from(u1 < u2),
                0b100 => u1 ^ u2,
                0b101 => u1 >> shamt,
                0b110 => u1 | u2,
                0b111 => u1 & u2,
                _ => return self.undef(inst),
            },
            0b0100000 => match inst.funct3() {
                0b000 => u1.wrapping_sub(u2),
                0b101 => (s1 >> shamt) as u64,
                _ => return self.undef(inst),
            },
            0b0000001 => {
                if self.core.arch_options & ARCH_OPT_RV_M == 0 {
                    return self.undef(inst);
                }
                match inst.funct3() {
                    0b000 => u1.wrapping_mul(u2),
                    0b001 => self.mulh_ss(s1, s2),
                    0b010 => self.mulh_su(s1, u2),
                    0b011 => self.mulh_uu(u1, u2),
                    0b100 => {
                        if s2 == 0 {
                            !0u64
                        } else {
                            s1.wrapping_div(s2) as u64
                        }
                    }
                    0b101 => {
                        if u2 == 0 {
                            !0u64
                        } else {
                            u1 / u2
                        }
                    }
                    0b110 => {
                        if s2 == 0 {
                            s1 as u64
                        } else {
                            s1.wrapping_rem(s2) as u64
                        }
                    }
                    0b111 => {
                        if u2 == 0 {
                            u1
                        } else {
                            u1 % u2
                        }
                    }
                    _ => return self.undef(inst),
                }
            }
            _ => return self.undef(inst),
        };
        self.set_xr(inst.rd(), result);
        Ok(())
    }

    /// Upper half of the signed 2·XLEN product.
    fn mulh_ss(&self, a: i64, b: i64) -> u64 {
        if self.mode32() {
            (a.wrapping_mul(b) >> 32) as u64
        } else {
            ((i128::from(a) * i128::from(b)) >> 64) as u64
        }
    }

    /// Upper half of the signed-by-unsigned 2·XLEN product.
    fn mulh_su(&self, a: i64, b: u64) -> u64 {
        if self.mode32() {
            (a.wrapping_mul(b as i64) >> 32) as u64
        } else {
            ((i128::from(a) * i128::from(b)) >> 64) as u64
        }
    }

    /// Upper half of the unsigned 2·XLEN product.
    fn mulh_uu(&self, a: u64, b: u64) -> u64 {
        if self.mode32() {
            (a.wrapping_mul(b) >> 32) as u64
        } else {
            ((u128::from(a) * u128::from(b)) >> 64) as u64
        }
    }

    /// 32-bit W-variant immediate ALU instructions (RV64).
    fn exec_alu_imm32(&mut self, inst: Inst) -> Result<()> {
        let s1 = self.core.get_reg(inst.rs1()) as u32;
        let imm12 = (inst.0 >> 20) & 0xfff;
        let shamt = imm12 & 63;
        let result: i32 = match inst.funct3() {
            0b000 => (s1 as i32).wrapping_add(inst.imm_i() as i32),
            0b001 => {
                if shamt > 31 || imm12 >> 5 != 0 {
                    return self.undef(inst);
                }
                (s1 << shamt) as i32
            }
            0b101 => {
                if shamt > 31 {
                    return self.undef(inst);
                }
                match imm12 >> 5 {
                    0 => (s1 >> shamt) as i32,
                    0b0100000 => (s1 as i32) >> shamt,
                    _ => return self.undef(inst),
                }
            }
            _ => return self.undef(inst),
        };
        self.set_xr(inst.rd(), result as i64 as u64);
        Ok(())
    }

    /// 32-bit W-variant register ALU instructions (RV64).
    fn exec_alu32(&mut self, inst: Inst) -> Result<()> {
        let u1 = self.core.get_reg(inst.rs1()) as u32;
        let u2 = self.core.get_reg(inst.rs2()) as u32;
        let shamt = u2 & 0x1f;
        let result: u64 = match inst.funct7() {
            0b0000000 => match inst.funct3() {
                0b000 => i64::from(u1.wrapping_add(u2) as i32) as u64,
                0b001 => i64::from((u1 << shamt) as i32) as u64,
                0b101 => i64::from((u1 >> shamt) as i32) as u64,
                _ => return self.undef(inst),
            },
            0b0100000 => match inst.funct3() {
                0b000 => i64::from(u1.wrapping_sub(u2) as i32) as u64,
                0b101 => i64::from((u1 as i32) >> shamt) as u64,
                _ => return self.undef(inst),
            },
            0b0000001 => {
                if self.core.arch_options & ARCH_OPT_RV_M == 0 {
                    return self.undef(inst);
                }
                match inst.funct3() {
                    0b000 => i64::from(u1.wrapping_mul(u2) as i32) as u64,
                    0b100 => {
                        if u2 == 0 {
                            !0u64
                        } else {
                            i64::from((u1 as i32).wrapping_div(u2 as i32)) as u64
                        }
                    }
                    0b101 => {
                        if u2 == 0 {
                            !0u64
                        } else {
                            i64::from((u1 / u2) as i32) as u64
                        }
                    }
                    0b110 => {
                        if u2 == 0 {
                            i64::from(u1 as i32) as u64
                        } else {
                            i64::from((u1 as i32).wrapping_rem(u2 as i32)) as u64
                        }
                    }
                    0b111 => {
                        if u2 == 0 {
                            i64::from(u1 as i32) as u64
                        } else {
                            i64::from((u1 % u2) as i32) as u64
                        }
                    }
                    _ => return self.undef(inst),
                }
            }
            _ => return self.undef(inst),
        };
        self.set_xr(inst.rd(), result);
        Ok(())
    }

    /// FENCE / FENCE.I.
    fn exec_mem(&mut self, inst: Inst) -> Result<()> {
        if inst.rd() != 0 || inst.rs1() != 0 {
            return self.undef(inst);
        }
        match inst.funct3() {
            0b000 => {
                let imm = (inst.0 >> 20) & 0xfff;
                let succ = imm & 0xf;
                let pred = (imm >> 4) & 0xf;
                let mut bar = 0;
                if pred & (FENCE_W | FENCE_O) != 0 {
                    bar |= BARRIER_STORE;
                }
                if succ & (FENCE_R | FENCE_I) != 0 {
                    bar |= BARRIER_LOAD;
                }
                if (pred | succ) & (FENCE_I | FENCE_O) != 0 {
                    bar |= BARRIER_SYSTEM;
                }
                self.core.memory_barrier(bar);
                Ok(())
            }
            0b001 => {
                if (inst.0 >> 20) & 0xfff != 0 {
                    return self.undef(inst);
                }
                self.core.instruction_barrier();
                Ok(())
            }
            _ => self.undef(inst),
        }
    }

    fn exec_ebreak(&mut self) -> Result<()> {
        if self.core.options & crate::core::CORE_OPT_TRAP_BREAKPOINT != 0 {
            return Err(Error::Breakpoint);
        }
        let pc = self.core.pc;
        self.exception_enter(super::ex::EX_BREAKPOINT, pc)
    }

    /// ECALL / EBREAK / xRET / WFI / CSR accesses.
    fn exec_system(&mut self, inst: Inst) -> Result<()> {
        if inst.funct3() == 0b000 {
            if inst.rd() != 0 {
                return self.undef(inst);
            }
            return match inst.funct7() {
                0b0000000 => {
                    if inst.rs1() != 0 {
                        return self.undef(inst);
                    }
                    match inst.rs2() {
                        0 => self.synchronous_exception(
                            CoreEx::Syscall,
                            u64::from(inst.0),
                            Error::Syscall,
                        ),
                        1 => self.exec_ebreak(),
                        _ => self.undef(inst),
                    }
                }
                0b0011000 => {
                    if self.core.el != El::Monitor {
                        return self.undef(inst);
                    }
                    self.exception_return(RetOp::Mret)
                }
                0b0001000 => match inst.rs2() {
                    0b00010 => {
                        if self.core.el < El::Supervisor {
                            return self.undef(inst);
                        }
                        match self.exception_return(RetOp::Sret) {
                            Err(Error::Undef) => self.undef(inst),
                            other => other,
                        }
                    }
                    0b00101 => {
                        if self.core.el == El::User {
                            return self.undef(inst);
                        }
                        self.core.engine.wait_for_interrupt();
                        Ok(())
                    }
                    _ => self.undef(inst),
                },
                // SFENCE.VMA and friends need a translating MMU.
                0b0001001 | 0b0001011 | 0b0001100 => Err(Error::Unimplemented),
                _ => self.undef(inst),
            };
        }
        if inst.funct3() == 0b100 {
            // Hypervisor load/store forms.
            return Err(Error::Unimplemented);
        }

        // CSR instruction.
        let csr_funct = inst.funct3();
        let imm_form = csr_funct & 0b100 != 0;
        let value = if imm_form {
            inst.rs1() as u64
        } else {
            self.xr(inst.rs1())
        };
        let mut op = match csr_funct & 3 {
            1 => CsrOp::Swap,
            2 => CsrOp::ReadSet,
            3 => CsrOp::ReadClear,
            _ => return self.undef(inst),
        };
        if op == CsrOp::Swap {
            if inst.rd() == 0 {
                op = CsrOp::Write;
            }
        } else if value == 0 {
            op = CsrOp::Read;
        }

        let addr = (inst.0 >> 20) & 0xfff;
        match csr::csr_op(self, op, addr, value) {
            Ok(result) => {
                if inst.rd() != 0 {
                    self.set_xr(inst.rd(), result);
                }
                Ok(())
            }
            Err(Error::Undef) => self.undef(inst),
            Err(e) => Err(e),
        }
    }

    /// A-extension atomics: LR/SC and AMO read-modify-writes.
    fn exec_amo(&mut self, inst: Inst) -> Result<()> {
        use crate::core::MonitorStatus;

        if self.core.arch_options & ARCH_OPT_RV_A == 0 {
            return self.undef(inst);
        }
        let size: u16 = match inst.funct3() {
            0b010 => 4,
            0b011 if !self.mode32() => 8,
            _ => return self.undef(inst),
        };
        let funct7 = inst.funct7();
        let funct5 = funct7 >> 2;
        let aq = funct7 & 0b10 != 0;
        let rl = funct7 & 0b01 != 0;
        let order = match (aq, rl) {
            (false, false) => MemOrder::Relaxed,
            (true, false) => MemOrder::Acquire,
            (false, true) => MemOrder::Release,
            (true, true) => MemOrder::AcqRel,
        };
        let addr = self.mask_addr(self.ux(inst.rs1()));
        let armed_status = if size == 4 {
            MonitorStatus::Armed32
        } else {
            MonitorStatus::Armed64
        };

        let sext = |v: u64| -> u64 {
            if size == 4 {
                i64::from(v as u32 as i32) as u64
            } else {
                v
            }
        };

        match funct5 {
            // LR
            0b00010 => {
                if inst.rs2() != 0 {
                    return self.undef(inst);
                }
                let loaded = if size == 4 {
                    self.core
                        .mem_read_single::<4>(addr)
                        .map(|b| u64::from(u32::from_le_bytes(b)))
                } else {
                    self.core.mem_read_single::<8>(addr).map(u64::from_le_bytes)
                };
                match loaded {
                    Ok(v) => {
                        self.core.monitor.addr = addr;
                        self.core.monitor.value = v;
                        self.core.monitor.status = armed_status;
                        self.set_xr(inst.rd(), sext(v));
                        Ok(())
                    }
                    Err(e) => self.synchronous_exception(CoreEx::AbortLoad, addr, e),
                }
            }
            // SC
            0b00011 => {
                let armed = self.core.monitor.status == armed_status
                    && self.core.monitor.addr == addr;
                let observed = self.core.monitor.value;
                self.core.monitor.disarm();
                if !armed {
                    self.set_xr(inst.rd(), 1);
                    return Ok(());
                }
                let result = self.core.mem_atomic(
                    addr,
                    size,
                    AtomicKind::Cas,
                    self.ux(inst.rs2()),
                    observed,
                    order,
                    MemOrder::Relaxed,
                );
                match result {
                    Ok(r) => {
                        self.set_xr(inst.rd(), r);
                        Ok(())
                    }
                    Err(e) => self.synchronous_exception(CoreEx::AbortStore, addr, e),
                }
            }
            _ => {
                let kind = match funct5 {
                    0b00001 => AtomicKind::Swap,
                    0b00000 => AtomicKind::Add,
                    0b00100 => AtomicKind::Xor,
                    0b01100 => AtomicKind::And,
                    0b01000 => AtomicKind::Or,
                    0b10000 => AtomicKind::SMin,
                    0b10100 => AtomicKind::SMax,
                    0b11000 => AtomicKind::UMin,
                    0b11100 => AtomicKind::UMax,
                    _ => return self.undef(inst),
                };
                let result = self.core.mem_atomic(
                    addr,
                    size,
                    kind,
                    self.ux(inst.rs2()),
                    0,
                    order,
                    MemOrder::Relaxed,
                );
                match result {
                    Ok(old) => {
                        self.set_xr(inst.rd(), sext(old));
                        Ok(())
                    }
                    Err(e) => self.synchronous_exception(CoreEx::AbortStore, addr, e),
                }
            }
        }
    }
}
