//! RISC-V ABI register names.
//!
//! Standard ABI names and indices for the integer register file, used by the
//! debug console, fault dumps, and the loader.

/// Register x0 (zero register, always zero).
pub const REG_ZERO: usize = 0;
/// Register x1 (return address, ra).
pub const REG_RA: usize = 1;
/// Register x2 (stack pointer, sp).
pub const REG_SP: usize = 2;
/// Register x10 (first argument/return value, a0).
pub const REG_A0: usize = 10;
/// Register x11 (second argument, a1).
pub const REG_A1: usize = 11;
/// Register x17 (system call number, a7).
pub const REG_A7: usize = 17;

/// ABI names for x0..x31, indexed by register number.
pub const REG_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// Returns the ABI name for an integer register index.
pub fn name_for_reg(reg: usize) -> &'static str {
    REG_NAMES.get(reg).copied().unwrap_or("?")
}

/// Returns the register index for an ABI or `xN` name, if recognized.
pub fn reg_for_name(name: &str) -> Option<usize> {
    if let Some(pos) = REG_NAMES.iter().position(|n| *n == name) {
        return Some(pos);
    }
    let num = name.strip_prefix('x')?.parse::<usize>().ok()?;
    (num < 32).then_some(num)
}
