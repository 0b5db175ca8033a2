//! Compressed (C extension) instruction expansion.
//!
//! Converts a 16-bit compressed encoding into its 32-bit equivalent so one
//! dispatcher serves both forms. Link-register and pc-advance differences
//! are handled by the dispatcher via the recorded instruction length, not
//! here. Returns `None` for reserved or wrong-width encodings.

use crate::core::CoreMode;

const OP_LOAD: u32 = 0b0000011;
const OP_LOAD_FP: u32 = 0b0000111;
const OP_STORE: u32 = 0b0100011;
const OP_STORE_FP: u32 = 0b0100111;
const OP_ALU_IMM: u32 = 0b0010011;
const OP_ALU_IMM32: u32 = 0b0011011;
const OP_ALU: u32 = 0b0110011;
const OP_ALU32: u32 = 0b0111011;
const OP_LUI: u32 = 0b0110111;
const OP_JAL: u32 = 0b1101111;
const OP_JALR: u32 = 0b1100111;
const OP_BRANCH: u32 = 0b1100011;
const OP_SYSTEM: u32 = 0b1110011;

fn enc_i(op: u32, funct3: u32, rd: u32, rs1: u32, imm: u32) -> u32 {
    (imm & 0xfff) << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | op
}

fn enc_r(op: u32, funct3: u32, funct7: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
    funct7 << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | op
}

fn enc_s(op: u32, funct3: u32, rs1: u32, rs2: u32, imm: u32) -> u32 {
    (imm >> 5 & 0x7f) << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | (imm & 0x1f) << 7 | op
}

fn enc_b(funct3: u32, rs1: u32, rs2: u32, imm: u32) -> u32 {
    (imm >> 12 & 1) << 31
        | (imm >> 5 & 0x3f) << 25
        | rs2 << 20
        | rs1 << 15
        | funct3 << 12
        | (imm >> 1 & 0xf) << 8
        | (imm >> 11 & 1) << 7
        | OP_BRANCH
}

fn enc_j(rd: u32, imm: u32) -> u32 {
    (imm >> 20 & 1) << 31
        | (imm >> 1 & 0x3ff) << 21
        | (imm >> 11 & 1) << 20
        | (imm >> 12 & 0xff) << 12
        | rd << 7
        | OP_JAL
}

/// `x8 + r'` register mapping for the three-bit fields.
fn creg(r: u16) -> u32 {
    u32::from(r & 7) + 8
}

/// Six-bit sign extension for CI-format immediates.
fn sext6(v: u32) -> u32 {
    ((v as i32) << 26 >> 26) as u32
}

/// Expands a 16-bit compressed instruction to its 32-bit equivalent.
pub fn expand(inst: u16, mode: CoreMode) -> Option<u32> {
    let rv64 = mode == CoreMode::Mode64;
    let funct3 = (inst >> 13) & 7;
    let i = u32::from(inst);

    match inst & 3 {
        0 => expand_q0(i, funct3, rv64),
        1 => expand_q1(i, funct3, rv64),
        2 => expand_q2(i, funct3, rv64),
        _ => None,
    }
}

fn expand_q0(i: u32, funct3: u16, rv64: bool) -> Option<u32> {
    let rd = creg((i >> 2) as u16);
    let rs1 = creg((i >> 7) as u16);
    match funct3 {
        // C.ADDI4SPN
        0b000 => {
            let imm = (i >> 11 & 3) << 4 | (i >> 7 & 0xf) << 6 | (i >> 6 & 1) << 2 | (i >> 5 & 1) << 3;
            if imm == 0 {
                return None;
            }
            Some(enc_i(OP_ALU_IMM, 0b000, rd, 2, imm))
        }
        // C.FLD
        0b001 => {
            let imm = (i >> 10 & 7) << 3 | (i >> 5 & 3) << 6;
            Some(enc_i(OP_LOAD_FP, 0b011, rd, rs1, imm))
        }
        // C.LW
        0b010 => {
            let imm = (i >> 10 & 7) << 3 | (i >> 6 & 1) << 2 | (i >> 5 & 1) << 6;
            Some(enc_i(OP_LOAD, 0b010, rd, rs1, imm))
        }
        // C.FLW (RV32) / C.LD (RV64)
        0b011 => {
            if rv64 {
                let imm = (i >> 10 & 7) << 3 | (i >> 5 & 3) << 6;
                Some(enc_i(OP_LOAD, 0b011, rd, rs1, imm))
            } else {
                let imm = (i >> 10 & 7) << 3 | (i >> 6 & 1) << 2 | (i >> 5 & 1) << 6;
                Some(enc_i(OP_LOAD_FP, 0b010, rd, rs1, imm))
            }
        }
        // C.FSD
        0b101 => {
            let imm = (i >> 10 & 7) << 3 | (i >> 5 & 3) << 6;
            Some(enc_s(OP_STORE_FP, 0b011, rs1, rd, imm))
        }
        // C.SW
        0b110 => {
            let imm = (i >> 10 & 7) << 3 | (i >> 6 & 1) << 2 | (i >> 5 & 1) << 6;
            Some(enc_s(OP_STORE, 0b010, rs1, rd, imm))
        }
        // C.FSW (RV32) / C.SD (RV64)
        0b111 => {
            if rv64 {
                let imm = (i >> 10 & 7) << 3 | (i >> 5 & 3) << 6;
                Some(enc_s(OP_STORE, 0b011, rs1, rd, imm))
            } else {
                let imm = (i >> 10 & 7) << 3 | (i >> 6 & 1) << 2 | (i >> 5 & 1) << 6;
                Some(enc_s(OP_STORE_FP, 0b010, rs1, rd, imm))
            }
        }
        _ => None,
    }
}

/// CJ-format jump target immediate.
fn cj_imm(i: u32) -> u32 {
    let imm = (i >> 12 & 1) << 11
        | (i >> 11 & 1) << 4
        | (i >> 9 & 3) << 8
        | (i >> 8 & 1) << 10
        | (i >> 7 & 1) << 6
        | (i >> 6 & 1) << 7
        | (i >> 3 & 7) << 1
        | (i >> 2 & 1) << 5;
    ((imm as i32) << 20 >> 20) as u32
}

fn expand_q1(i: u32, funct3: u16, rv64: bool) -> Option<u32> {
    let rd_full = i >> 7 & 0x1f;
    match funct3 {
        // C.NOP / C.ADDI
        0b000 => {
            let imm = sext6((i >> 12 & 1) << 5 | (i >> 2 & 0x1f));
            Some(enc_i(OP_ALU_IMM, 0b000, rd_full, rd_full, imm))
        }
        // C.JAL (RV32) / C.ADDIW (RV64)
        0b001 => {
            if rv64 {
                if rd_full == 0 {
                    return None;
                }
                let imm = sext6((i >> 12 & 1) << 5 | (i >> 2 & 0x1f));
                Some(enc_i(OP_ALU_IMM32, 0b000, rd_full, rd_full, imm))
            } else {
                Some(enc_j(1, cj_imm(i)))
            }
        }
        // C.LI
        0b010 => {
            let imm = sext6((i >> 12 & 1) << 5 | (i >> 2 & 0x1f));
            Some(enc_i(OP_ALU_IMM, 0b000, rd_full, 0, imm))
        }
        // C.ADDI16SP / C.LUI
        0b011 => {
            if rd_full == 2 {
                let imm = (i >> 12 & 1) << 9
                    | (i >> 6 & 1) << 4
                    | (i >> 5 & 1) << 6
                    | (i >> 3 & 3) << 7
                    | (i >> 2 & 1) << 5;
                if imm == 0 {
                    return None;
                }
                let imm = ((imm as i32) << 22 >> 22) as u32;
                Some(enc_i(OP_ALU_IMM, 0b000, 2, 2, imm))
            } else {
                let imm17 = (i >> 12 & 1) << 17 | (i >> 2 & 0x1f) << 12;
                if imm17 == 0 {
                    return None;
                }
                let imm17 = ((imm17 as i32) << 14 >> 14) as u32;
                Some((imm17 & 0xffff_f000) | rd_full << 7 | OP_LUI)
            }
        }
        // C.SRLI / C.SRAI / C.ANDI / register ops
        0b100 => {
            let rd = creg((i >> 7) as u16);
            let shamt = (i >> 12 & 1) << 5 | (i >> 2 & 0x1f);
            match i >> 10 & 3 {
                0b00 => {
                    if !rv64 && shamt > 31 || shamt == 0 {
                        return None;
                    }
                    Some(enc_i(OP_ALU_IMM, 0b101, rd, rd, shamt))
                }
                0b01 => {
                    if !rv64 && shamt > 31 || shamt == 0 {
                        return None;
                    }
                    Some(enc_i(OP_ALU_IMM, 0b101, rd, rd, 0x400 | shamt))
                }
                0b10 => Some(enc_i(OP_ALU_IMM, 0b111, rd, rd, sext6(shamt))),
                _ => {
                    let rs2 = creg((i >> 2) as u16);
                    if i >> 12 & 1 == 0 {
                        match i >> 5 & 3 {
                            0b00 => Some(enc_r(OP_ALU, 0b000, 0b0100000, rd, rd, rs2)),
                            0b01 => Some(enc_r(OP_ALU, 0b100, 0, rd, rd, rs2)),
                            0b10 => Some(enc_r(OP_ALU, 0b110, 0, rd, rd, rs2)),
                            _ => Some(enc_r(OP_ALU, 0b111, 0, rd, rd, rs2)),
                        }
                    } else if rv64 {
                        match i >> 5 & 3 {
                            0b00 => Some(enc_r(OP_ALU32, 0b000, 0b0100000, rd, rd, rs2)),
                            0b01 => Some(enc_r(OP_ALU32, 0b000, 0, rd, rd, rs2)),
                            _ => None,
                        }
                    } else {
                        None
                    }
                }
            }
        }
        // C.J
        0b101 => Some(enc_j(0, cj_imm(i))),
        // C.BEQZ / C.BNEZ
        0b110 | 0b111 => {
            let rs1 = creg((i >> 7) as u16);
            let imm = (i >> 12 & 1) << 8
                | (i >> 10 & 3) << 3
                | (i >> 5 & 3) << 6
                | (i >> 3 & 3) << 1
                | (i >> 2 & 1) << 5;
            let imm = ((imm as i32) << 23 >> 23) as u32;
            let f3 = if funct3 == 0b110 { 0b000 } else { 0b001 };
            Some(enc_b(f3, rs1, 0, imm))
        }
        _ => None,
    }
}

fn expand_q2(i: u32, funct3: u16, rv64: bool) -> Option<u32> {
    let rd = i >> 7 & 0x1f;
    let rs2 = i >> 2 & 0x1f;
    match funct3 {
        // C.SLLI
        0b000 => {
            let shamt = (i >> 12 & 1) << 5 | (i >> 2 & 0x1f);
            if !rv64 && shamt > 31 {
                return None;
            }
            Some(enc_i(OP_ALU_IMM, 0b001, rd, rd, shamt))
        }
        // C.FLDSP
        0b001 => {
            let imm = (i >> 12 & 1) << 5 | (i >> 5 & 3) << 3 | (i >> 2 & 7) << 6;
            Some(enc_i(OP_LOAD_FP, 0b011, rd, 2, imm))
        }
        // C.LWSP
        0b010 => {
            if rd == 0 {
                return None;
            }
            let imm = (i >> 12 & 1) << 5 | (i >> 4 & 7) << 2 | (i >> 2 & 3) << 6;
            Some(enc_i(OP_LOAD, 0b010, rd, 2, imm))
        }
        // C.FLWSP (RV32) / C.LDSP (RV64)
        0b011 => {
            if rv64 {
                if rd == 0 {
                    return None;
                }
                let imm = (i >> 12 & 1) << 5 | (i >> 5 & 3) << 3 | (i >> 2 & 7) << 6;
                Some(enc_i(OP_LOAD, 0b011, rd, 2, imm))
            } else {
                let imm = (i >> 12 & 1) << 5 | (i >> 4 & 7) << 2 | (i >> 2 & 3) << 6;
                Some(enc_i(OP_LOAD_FP, 0b010, rd, 2, imm))
            }
        }
        // C.JR / C.MV / C.EBREAK / C.JALR / C.ADD
        0b100 => {
            if i >> 12 & 1 == 0 {
                if rs2 == 0 {
                    if rd == 0 {
                        return None;
                    }
                    Some(enc_i(OP_JALR, 0b000, 0, rd, 0))
                } else {
                    Some(enc_r(OP_ALU, 0b000, 0, rd, 0, rs2))
                }
            } else if rs2 == 0 {
                if rd == 0 {
                    // C.EBREAK
                    Some(enc_i(OP_SYSTEM, 0b000, 0, 0, 1))
                } else {
                    Some(enc_i(OP_JALR, 0b000, 1, rd, 0))
                }
            } else {
                Some(enc_r(OP_ALU, 0b000, 0, rd, rd, rs2))
            }
        }
        // C.FSDSP
        0b101 => {
            let imm = (i >> 10 & 7) << 3 | (i >> 7 & 7) << 6;
            Some(enc_s(OP_STORE_FP, 0b011, 2, rs2, imm))
        }
        // C.SWSP
        0b110 => {
            let imm = (i >> 9 & 0xf) << 2 | (i >> 7 & 3) << 6;
            Some(enc_s(OP_STORE, 0b010, 2, rs2, imm))
        }
        // C.FSWSP (RV32) / C.SDSP (RV64)
        0b111 => {
            if rv64 {
                let imm = (i >> 10 & 7) << 3 | (i >> 7 & 7) << 6;
                Some(enc_s(OP_STORE, 0b011, 2, rs2, imm))
            } else {
                let imm = (i >> 9 & 0xf) << 2 | (i >> 7 & 3) << 6;
                Some(enc_s(OP_STORE_FP, 0b010, 2, rs2, imm))
            }
        }
        _ => None,
    }
}
