//! Integer execution semantics.

use pretty_assertions::assert_eq;

use crate::common::{TestMachine, asm};

const MEM: u64 = 0x10000;

fn run(program: &[u32], setup: impl FnOnce(&mut TestMachine)) -> TestMachine {
    let mut tm = TestMachine::new();
    tm.load_program(MEM, program);
    setup(&mut tm);
    tm.step(program.len() as u64).unwrap();
    tm
}

#[test]
fn x0_stays_zero() {
    let tm = run(&[asm::addi(0, 0, 123), asm::lui(0, 0xfffff000)], |_| {});
    assert_eq!(tm.reg(0), 0);
}

#[test]
fn addi_sign_extends_immediate() {
    let tm = run(&[asm::addi(5, 0, -1)], |_| {});
    assert_eq!(tm.reg(5), 0xffff_ffff);
}

#[test]
fn add_wraps_at_register_width() {
    let tm = run(&[asm::add(7, 5, 6)], |tm| {
        tm.set_reg(5, 0xffff_ffff);
        tm.set_reg(6, 1);
    });
    assert_eq!(tm.reg(7), 0);
}

#[test]
fn sub_wraps() {
    let tm = run(&[asm::sub(7, 5, 6)], |tm| {
        tm.set_reg(5, 0);
        tm.set_reg(6, 1);
    });
    assert_eq!(tm.reg(7), 0xffff_ffff);
}

#[test]
fn shift_amount_masks_to_width() {
    // Shift by 33 is shift by 1 on RV32.
    let tm = run(&[asm::sll(7, 5, 6)], |tm| {
        tm.set_reg(5, 1);
        tm.set_reg(6, 33);
    });
    assert_eq!(tm.reg(7), 2);
}

#[test]
fn sra_is_arithmetic() {
    let tm = run(&[asm::srai(7, 5, 4)], |tm| {
        tm.set_reg(5, 0x8000_0000);
    });
    assert_eq!(tm.reg(7), 0xf800_0000);
}

#[test]
fn srl_is_logical() {
    let tm = run(&[asm::srli(7, 5, 4)], |tm| {
        tm.set_reg(5, 0x8000_0000);
    });
    assert_eq!(tm.reg(7), 0x0800_0000);
}

#[test]
fn slt_compares_signed() {
    let tm = run(&[asm::slt(7, 5, 6)], |tm| {
        tm.set_reg(5, -1i32 as u32 as u64);
        tm.set_reg(6, 1);
    });
    assert_eq!(tm.reg(7), 1);
}

#[test]
fn sltu_compares_unsigned() {
    let tm = run(&[asm::sltu(7, 5, 6)], |tm| {
        tm.set_reg(5, 0xffff_ffff);
        tm.set_reg(6, 1);
    });
    assert_eq!(tm.reg(7), 0);
}

#[test]
fn division_by_zero_yields_all_ones() {
    let tm = run(&[asm::div(7, 5, 6), asm::divu(8, 5, 6)], |tm| {
        tm.set_reg(5, 42);
        tm.set_reg(6, 0);
    });
    assert_eq!(tm.reg(7), 0xffff_ffff);
    assert_eq!(tm.reg(8), 0xffff_ffff);
}

#[test]
fn division_by_zero_remainder_is_dividend() {
    let tm = run(&[asm::rem(7, 5, 6), asm::remu(8, 5, 6)], |tm| {
        tm.set_reg(5, 42);
        tm.set_reg(6, 0);
    });
    assert_eq!(tm.reg(7), 42);
    assert_eq!(tm.reg(8), 42);
}

#[test]
fn signed_division_overflow() {
    let tm = run(&[asm::div(7, 5, 6), asm::rem(8, 5, 6)], |tm| {
        tm.set_reg(5, 0x8000_0000);
        tm.set_reg(6, -1i32 as u32 as u64);
    });
    assert_eq!(tm.reg(7), 0x8000_0000, "INT_MIN / -1 quotient");
    assert_eq!(tm.reg(8), 0, "INT_MIN / -1 remainder");
}

#[test]
fn mulh_produces_upper_half() {
    let tm = run(&[asm::mulh(7, 5, 6), asm::mulhu(8, 5, 6)], |tm| {
        tm.set_reg(5, 0x8000_0000);
        tm.set_reg(6, 2);
    });
    // Signed: -2^31 * 2 = -2^32 -> upper 32 bits are all-ones.
    assert_eq!(tm.reg(7), 0xffff_ffff);
    // Unsigned: 2^31 * 2 = 2^32 -> upper half is 1.
    assert_eq!(tm.reg(8), 1);
}

#[test]
fn loads_extend_per_width() {
    let tm = run(
        &[
            asm::lb(5, 6, 0),
            asm::lbu(7, 6, 0),
            asm::lh(8, 6, 0),
            asm::lhu(9, 6, 0),
        ],
        |tm| {
            tm.set_reg(6, 0x11000);
            tm.mem_write(0x11000, &[0x80, 0xff]);
        },
    );
    assert_eq!(tm.reg(5), 0xffff_ff80);
    assert_eq!(tm.reg(7), 0x80);
    assert_eq!(tm.reg(8), 0xffff_ff80);
    assert_eq!(tm.reg(9), 0xff80);
}

#[test]
fn store_load_round_trip() {
    let tm = run(&[asm::sw(6, 5, 0), asm::lw(7, 6, 0)], |tm| {
        tm.set_reg(5, 0xdead_beef);
        tm.set_reg(6, 0x11000);
    });
    assert_eq!(tm.reg(7), 0xdead_beef);
}

#[test]
fn branch_taken_redirects() {
    let mut tm = TestMachine::new();
    // beq x0, x0 forward over the poison instruction.
    tm.load_program(
        MEM,
        &[asm::beq(0, 0, 8), asm::addi(5, 0, 99), asm::addi(6, 0, 7)],
    );
    tm.step(2).unwrap();
    assert_eq!(tm.reg(5), 0);
    assert_eq!(tm.reg(6), 7);
}

#[test]
fn branch_not_taken_falls_through() {
    let tm = run(&[asm::bne(0, 0, 8), asm::addi(5, 0, 1)], |_| {});
    assert_eq!(tm.reg(5), 1);
}

#[test]
fn jal_links_past_the_instruction() {
    let mut tm = TestMachine::new();
    tm.load_program(MEM, &[asm::jal(1, 8), asm::addi(0, 0, 0), asm::addi(5, 0, 3)]);
    tm.step(2).unwrap();
    assert_eq!(tm.reg(1), MEM + 4);
    assert_eq!(tm.reg(5), 3);
}

#[test]
fn jal_back_edge_targets_earlier_instruction() {
    let mut tm = TestMachine::new();
    tm.load_program(MEM, &[asm::addi(5, 5, 1), asm::jal(0, -4)]);
    tm.step(4).unwrap();
    // addi, jal, addi, jal: the add ran twice and we are back at MEM.
    assert_eq!(tm.reg(5), 2);
    assert_eq!(tm.pc(), MEM);
}

#[test]
fn jalr_clears_low_bit_of_target() {
    let mut tm = TestMachine::new();
    tm.load_program(MEM, &[asm::jalr(1, 5, 1)]);
    tm.set_reg(5, MEM + 8);
    tm.step(1).unwrap();
    assert_eq!(tm.pc(), MEM + 8, "low bit of computed target dropped");
    assert_eq!(tm.reg(1), MEM + 4);
}

#[test]
fn lui_and_auipc() {
    let mut tm = TestMachine::new();
    tm.load_program(MEM, &[asm::lui(5, 0xabcd_e000), asm::auipc(6, 0x1000)]);
    tm.step(2).unwrap();
    assert_eq!(tm.reg(5), 0xabcd_e000);
    assert_eq!(tm.reg(6), MEM + 4 + 0x1000);
}

#[test]
fn fences_execute_as_barriers() {
    let tm = run(&[asm::fence(0xf, 0xf), asm::fence_i(), asm::addi(5, 0, 1)], |_| {});
    assert_eq!(tm.reg(5), 1);
    assert_eq!(tm.ticks(), 3);
}
