//! CSR access semantics: permission checks, special-case registers, and
//! round trips.

use pretty_assertions::assert_eq;
use rstest::rstest;

use rvmach_core::Error;
use rvmach_core::core::El;
use rvmach_core::riscv::csr::{self, CsrOp};

use crate::common::{TestMachine, asm};

const MEM: u64 = 0x10000;

#[test]
fn scratch_write_read_round_trip() {
    let mut tm = TestMachine::new();
    let rv = tm.rv_mut();
    let _ = csr::csr_op(rv, CsrOp::Write, csr::CSR_MSCRATCH, 0x1234_5678).unwrap();
    assert_eq!(
        csr::csr_op(rv, CsrOp::Read, csr::CSR_MSCRATCH, 0).unwrap(),
        0x1234_5678
    );
}

#[rstest]
#[case(csr::CSR_MVENDORID)]
#[case(csr::CSR_MARCHID)]
#[case(csr::CSR_MHARTID)]
#[case(csr::CSR_CYCLE)]
fn read_only_slots_reject_writes(#[case] addr: u32) {
    let mut tm = TestMachine::new();
    let rv = tm.rv_mut();
    assert_eq!(csr::csr_op(rv, CsrOp::Write, addr, 1), Err(Error::Undef));
    assert!(csr::csr_op(rv, CsrOp::Read, addr, 0).is_ok());
}

#[test]
fn machine_csrs_are_invisible_below_machine_level() {
    let mut tm = TestMachine::new();
    let rv = tm.rv_mut();
    rv.core.el = El::User;
    assert_eq!(
        csr::csr_op(rv, CsrOp::Read, csr::CSR_MSCRATCH, 0),
        Err(Error::Undef)
    );
    rv.core.el = El::Supervisor;
    assert_eq!(
        csr::csr_op(rv, CsrOp::Read, csr::CSR_MSTATUS, 0),
        Err(Error::Undef)
    );
    assert!(csr::csr_op(rv, CsrOp::Read, csr::CSR_SSCRATCH, 0).is_ok());
}

#[test]
fn mstatus_masks_wpri_bits() {
    let mut tm = TestMachine::new();
    let rv = tm.rv_mut();
    let _ = csr::csr_op(rv, CsrOp::Write, csr::CSR_MSTATUS, 0xffff_ffff).unwrap();
    let read = csr::csr_op(rv, CsrOp::Read, csr::CSR_MSTATUS, 0).unwrap();
    // Bits 0, 2, and 4 are WPRI and must read back zero.
    assert_eq!(read & 0b10101, 0);
}

#[test]
fn mstatus_mie_mirrors_into_engine() {
    let mut tm = TestMachine::new();
    {
        let rv = tm.rv_mut();
        let _ = csr::csr_op(rv, CsrOp::ReadSet, csr::CSR_MSTATUS, csr::MSTATUS_MIE).unwrap();
    }
    assert!(tm.machine.engine(0).unwrap().interrupts_enabled());
    {
        let rv = tm.rv_mut();
        let _ = csr::csr_op(rv, CsrOp::ReadClear, csr::CSR_MSTATUS, csr::MSTATUS_MIE).unwrap();
    }
    assert!(!tm.machine.engine(0).unwrap().interrupts_enabled());
}

#[test]
fn mcause_interrupt_tag_narrows_to_bit31() {
    let mut tm = TestMachine::new();
    let rv = tm.rv_mut();
    let _ = csr::csr_op(rv, CsrOp::Write, csr::CSR_MCAUSE, 0x8000_000b).unwrap();
    // Stored wide, read back in the 32-bit view.
    assert_eq!(rv.sr[2].cause, (1 << 63) | 11);
    assert_eq!(
        csr::csr_op(rv, CsrOp::Read, csr::CSR_MCAUSE, 0).unwrap(),
        0x8000_000b
    );
}

#[test]
fn mcycle_write_adjusts_offset() {
    let mut tm = TestMachine::new();
    tm.load_program(MEM, &[asm::jal(0, 0)]);
    tm.step(10).unwrap();

    {
        let rv = tm.rv_mut();
        assert_eq!(
            csr::csr_op(rv, CsrOp::Read, csr::CSR_MCYCLE, 0).unwrap(),
            10
        );
        let _ = csr::csr_op(rv, CsrOp::Write, csr::CSR_MCYCLE, 1000).unwrap();
        assert_eq!(
            csr::csr_op(rv, CsrOp::Read, csr::CSR_MCYCLE, 0).unwrap(),
            1000
        );
    }
    tm.step(5).unwrap();
    let rv = tm.rv_mut();
    assert_eq!(
        csr::csr_op(rv, CsrOp::Read, csr::CSR_MCYCLE, 0).unwrap(),
        1005
    );
}

#[test]
fn counter_bitwise_ops_are_rejected() {
    let mut tm = TestMachine::new();
    let rv = tm.rv_mut();
    assert_eq!(
        csr::csr_op(rv, CsrOp::ReadSet, csr::CSR_MINSTRET, 1),
        Err(Error::Unimplemented)
    );
}

#[test]
fn pmp_registers_store_raw() {
    let mut tm = TestMachine::new();
    let rv = tm.rv_mut();
    let _ = csr::csr_op(rv, CsrOp::Write, csr::CSR_PMPCFG_BASE + 2, 0x1f1f).unwrap();
    let _ = csr::csr_op(rv, CsrOp::Write, csr::CSR_PMPADDR_BASE + 10, 0xdead).unwrap();
    assert_eq!(
        csr::csr_op(rv, CsrOp::Read, csr::CSR_PMPCFG_BASE + 2, 0).unwrap(),
        0x1f1f
    );
    assert_eq!(
        csr::csr_op(rv, CsrOp::Read, csr::CSR_PMPADDR_BASE + 10, 0).unwrap(),
        0xdead
    );
}

#[test]
fn fcsr_combines_fflags_and_frm() {
    let mut tm = TestMachine::new();
    let rv = tm.rv_mut();
    let _ = csr::csr_op(rv, CsrOp::Write, csr::CSR_FFLAGS, 0x15).unwrap();
    let _ = csr::csr_op(rv, CsrOp::Write, csr::CSR_FRM, 0x3).unwrap();
    assert_eq!(
        csr::csr_op(rv, CsrOp::Read, csr::CSR_FCSR, 0).unwrap(),
        (0x3 << 5) | 0x15
    );

    let _ = csr::csr_op(rv, CsrOp::Write, csr::CSR_FCSR, 0xff).unwrap();
    assert_eq!(csr::csr_op(rv, CsrOp::Read, csr::CSR_FFLAGS, 0).unwrap(), 0x1f);
    assert_eq!(csr::csr_op(rv, CsrOp::Read, csr::CSR_FRM, 0).unwrap(), 0x7);
}

#[test]
fn misa_reflects_extension_set() {
    let tm = TestMachine::new();
    let isa = tm.rv().sr[2].isa;
    assert_ne!(isa & (1 << 8), 0, "I");
    assert_ne!(isa & (1 << 12), 0, "M");
    assert_ne!(isa & 1, 0, "A");
    assert_ne!(isa & (1 << 2), 0, "C");
    assert_eq!(isa >> 30, 1, "RV32 MXL");
}

#[test]
fn unknown_csr_is_undefined() {
    let mut tm = TestMachine::new();
    let rv = tm.rv_mut();
    assert_eq!(
        csr::csr_op(rv, CsrOp::Read, 0x7c7, 0),
        Err(Error::Undef)
    );
}

#[test]
fn csr_instruction_round_trip() {
    let mut tm = TestMachine::new();
    tm.load_program(
        MEM,
        &[
            asm::csrrw(0, csr::CSR_MSCRATCH, 5),
            asm::csrrs(6, csr::CSR_MSCRATCH, 0),
        ],
    );
    tm.set_reg(5, 0xcafe);
    tm.step(2).unwrap();
    assert_eq!(tm.reg(6), 0xcafe);
}

#[test]
fn csrrwi_uses_rs1_as_immediate() {
    let mut tm = TestMachine::new();
    tm.load_program(
        MEM,
        &[
            asm::csrrwi(0, csr::CSR_MSCRATCH, 21),
            asm::csrrs(6, csr::CSR_MSCRATCH, 0),
        ],
    );
    tm.step(2).unwrap();
    assert_eq!(tm.reg(6), 21);
}
