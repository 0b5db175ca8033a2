//! Exception entry/return and interrupt priority.

use pretty_assertions::assert_eq;

use rvmach_core::Error;
use rvmach_core::core::{CORE_OPT_TRAP_BREAKPOINT, CORE_OPT_TRAP_UNDEF, El};
use rvmach_core::riscv::csr;
use rvmach_core::riscv::ex::{self, CAUSE_INTERRUPT};

use crate::common::{TestMachine, asm};

const MEM: u64 = 0x10000;
const HANDLER: u64 = 0x10100;

/// Points mtvec at the handler area and enables machine interrupts.
fn arm_traps(tm: &mut TestMachine) {
    let rv = tm.rv_mut();
    rv.sr[2].tvec = HANDLER;
    rv.status |= csr::MSTATUS_MIE;
    rv.core.interrupt_set(true);
}

#[test]
fn ebreak_vectors_without_trap_option() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::ebreak()]);
    tm.step(1).unwrap();

    assert_eq!(tm.pc(), HANDLER);
    let rv = tm.rv();
    assert_eq!(rv.sr[2].cause, ex::EX_BREAKPOINT);
    assert_eq!(rv.sr[2].epc, MEM);
    assert_eq!(rv.core.el, El::Monitor);
}

#[test]
fn ebreak_with_trap_option_surfaces_raw() {
    let mut tm = TestMachine::with_options(CORE_OPT_TRAP_BREAKPOINT);
    tm.load_program(MEM, &[asm::ebreak()]);
    assert_eq!(tm.step(1), Err(Error::Breakpoint));
}

#[test]
fn ecall_cause_tracks_exception_level() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::ecall()]);
    tm.step(1).unwrap();
    // CALL_FROM_U + Monitor(3) = 11.
    assert_eq!(tm.rv().sr[2].cause, ex::EX_CALL_FROM_U + 3);
    assert_eq!(tm.pc(), HANDLER);
}

#[test]
fn undefined_instruction_records_encoding_in_tval() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[0xffff_ffff]);
    tm.step(1).unwrap();
    let rv = tm.rv();
    assert_eq!(rv.sr[2].cause, ex::EX_INST_ILLEGAL);
    assert_eq!(rv.sr[2].tval, 0xffff_ffff);
}

#[test]
fn undefined_with_trap_option_surfaces_raw() {
    let mut tm = TestMachine::with_options(CORE_OPT_TRAP_UNDEF);
    tm.load_program(MEM, &[0xffff_ffff]);
    assert_eq!(tm.step(1), Err(Error::Undef));
}

#[test]
fn misaligned_load_vectors_with_align_cause() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::lw(5, 6, 0)]);
    tm.set_reg(6, 0x11002);
    tm.step(1).unwrap();
    let rv = tm.rv();
    assert_eq!(rv.sr[2].cause, ex::EX_LOAD_ALIGN);
    assert_eq!(rv.sr[2].tval, 0x11002);
}

#[test]
fn unmapped_load_vectors_with_fault_cause() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::lw(5, 6, 0)]);
    tm.set_reg(6, 0x9000_0000);
    tm.step(1).unwrap();
    assert_eq!(tm.rv().sr[2].cause, ex::EX_LOAD_FAULT);
}

#[test]
fn unmapped_store_vectors_with_store_fault() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::sw(6, 5, 0)]);
    tm.set_reg(6, 0x9000_0000);
    tm.step(1).unwrap();
    assert_eq!(tm.rv().sr[2].cause, ex::EX_STORE_FAULT);
}

#[test]
fn exception_entry_and_mret_round_trip() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::ebreak()]);
    tm.machine
        .load_core_raw(0, HANDLER, &asm::mret().to_le_bytes())
        .unwrap();

    tm.step(1).unwrap();
    {
        let rv = tm.rv();
        // Entry stashed the interrupt state and privilege.
        assert_eq!(rv.status & csr::MSTATUS_MIE, 0);
        assert_ne!(rv.status & csr::MSTATUS_MPIE, 0);
        assert_eq!((rv.status >> 11) & 3, 3, "MPP holds Monitor");
        assert!(!tm.machine.engine(0).unwrap().interrupts_enabled());
    }

    tm.step(1).unwrap();
    let rv = tm.rv();
    assert_eq!(rv.core.pc, MEM, "pc restored from mepc");
    assert_eq!(rv.core.el, El::Monitor);
    assert_ne!(rv.status & csr::MSTATUS_MIE, 0, "MIE restored from MPIE");
    assert_eq!((rv.status >> 11) & 3, 0, "MPP cleared");
    assert!(tm.machine.engine(0).unwrap().interrupts_enabled());
}

#[test]
fn vectored_mode_offsets_interrupt_entries() {
    let mut tm = TestMachine::new();
    {
        let rv = tm.rv_mut();
        rv.sr[2].tvec = HANDLER | 1;
        rv.status |= csr::MSTATUS_MIE;
        rv.core.interrupt_set(true);
    }
    tm.load_program(MEM, &[asm::jal(0, 0)]);
    tm.machine
        .load_core_raw(0, HANDLER + (7 << 2), &asm::jal(0, 0).to_le_bytes())
        .unwrap();

    let engine = tm.machine.engine(0).unwrap();
    engine.irq_ep().assert_line(7, true).unwrap();
    tm.step(1).unwrap();

    assert_eq!(tm.pc(), HANDLER + (7 << 2));
    assert_eq!(tm.rv().sr[2].cause, CAUSE_INTERRUPT | 7);
}

#[test]
fn interrupt_priority_prefers_machine_external() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::jal(0, 0)]);
    tm.machine
        .load_core_raw(0, HANDLER, &asm::jal(0, 0).to_le_bytes())
        .unwrap();

    let engine = tm.machine.engine(0).unwrap();
    for line in [1, 3, 5, 7, 9, 11] {
        engine.irq_ep().assert_line(line, true).unwrap();
    }
    tm.step(1).unwrap();
    assert_eq!(tm.rv().sr[2].cause, CAUSE_INTERRUPT | 11);
}

#[test]
fn interrupt_priority_order_is_fixed() {
    // With machine-external absent, machine-timer (7) wins over the rest.
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::jal(0, 0)]);
    tm.machine
        .load_core_raw(0, HANDLER, &asm::jal(0, 0).to_le_bytes())
        .unwrap();

    let engine = tm.machine.engine(0).unwrap();
    for line in [1, 3, 5, 7, 9] {
        engine.irq_ep().assert_line(line, true).unwrap();
    }
    tm.step(1).unwrap();
    assert_eq!(tm.rv().sr[2].cause, CAUSE_INTERRUPT | 7);
}

#[test]
fn interrupts_are_masked_after_entry() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::jal(0, 0)]);
    tm.machine
        .load_core_raw(0, HANDLER, &asm::jal(0, 0).to_le_bytes())
        .unwrap();

    let engine = tm.machine.engine(0).unwrap();
    engine.irq_ep().assert_line(11, true).unwrap();
    tm.step(4).unwrap();

    // Still spinning in the handler; the level is still active but no
    // second entry happened.
    assert_eq!(tm.pc(), HANDLER);
    assert_eq!(tm.rv().sr[2].epc, MEM);
    assert!(!tm.machine.engine(0).unwrap().interrupts_enabled());
}

#[test]
fn mret_outside_machine_mode_is_undefined() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    tm.load_program(MEM, &[asm::mret()]);
    tm.rv_mut().core.el = El::User;
    tm.step(1).unwrap();
    assert_eq!(tm.rv().sr[2].cause, ex::EX_INST_ILLEGAL);
}

#[test]
fn sret_trapped_by_tsr_is_undefined() {
    let mut tm = TestMachine::new();
    arm_traps(&mut tm);
    {
        let rv = tm.rv_mut();
        rv.status |= csr::MSTATUS_TSR;
        rv.core.el = El::Supervisor;
    }
    tm.load_program(MEM, &[asm::sret()]);
    tm.step(1).unwrap();
    assert_eq!(tm.rv().sr[2].cause, ex::EX_INST_ILLEGAL);
}
