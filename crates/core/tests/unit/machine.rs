//! End-to-end machine scenarios.

use std::io::Write;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use rvmach_core::Error;
use rvmach_core::core::{CORE_OPT_TRAP_BREAKPOINT, CORE_OPT_TRAP_SYSCALL};
use rvmach_core::devices::uart::UartChannel;
use rvmach_core::riscv::csr;
use rvmach_core::riscv::ex::CAUSE_INTERRUPT;

use crate::common::{MEM_BASE, TestMachine, asm};

const HANDLER: u64 = 0x10100;

/// `addi a0, zero, 10; ebreak` as literal bytes.
#[test]
fn addi_then_ebreak_surfaces_breakpoint() {
    let mut tm = TestMachine::with_options(CORE_OPT_TRAP_BREAKPOINT);
    let bytes = [0x13, 0x05, 0xa0, 0x00, 0x73, 0x00, 0x10, 0x00];
    tm.machine.load_core_raw(0, MEM_BASE, &bytes).unwrap();
    tm.machine.core_mut(0).unwrap().core_state_mut().pc = MEM_BASE;

    assert_eq!(tm.step(2), Err(Error::Breakpoint));
    assert_eq!(tm.reg(10), 10, "a0 holds the immediate");
    assert_eq!(tm.ticks(), 1, "the breakpoint itself does not retire");
}

/// A tight jump loop holds the pc and retires one instruction per step.
#[test]
fn jump_loop_keeps_pc_and_counts_ticks() {
    let mut tm = TestMachine::new();
    tm.load_program(MEM_BASE, &[asm::jal(0, 0)]);
    tm.step(5).unwrap();
    assert_eq!(tm.pc(), MEM_BASE);
    assert_eq!(tm.ticks(), 5);
}

/// Guest syscall exit convention: `a0 == 0x666`, status in `a1`.
#[test]
fn syscall_exit_convention() {
    let mut tm = TestMachine::with_options(CORE_OPT_TRAP_SYSCALL);
    tm.load_program(
        MEM_BASE,
        &[
            asm::addi(10, 0, 0x666),
            asm::addi(11, 0, 0),
            asm::ecall(),
        ],
    );
    assert_eq!(tm.step(3), Err(Error::Syscall));
    assert_eq!(tm.reg(10), 0x666);
    assert_eq!(tm.reg(11), 0);
}

/// Interrupt delivery: a device-thread assertion wakes the core out of
/// WFI and vectors it with the machine-external cause.
#[test]
fn interrupt_delivery_wakes_wfi() {
    let mut tm = TestMachine::full(CORE_OPT_TRAP_SYSCALL);
    // t0 = handler, programmed into mtvec by the guest itself.
    tm.set_reg(5, HANDLER);
    tm.load_program(
        MEM_BASE,
        &[
            asm::csrrw(0, csr::CSR_MTVEC, 5),
            asm::lui(7, 0x0501_0000),  // INTC base
            asm::addi(28, 0, -2),      // unmask line 0
            asm::sw(7, 28, 0xc),
            asm::addi(6, 0, 8),        // mstatus.MIE
            asm::csrrs(0, csr::CSR_MSTATUS, 6),
            asm::wfi(),
            asm::jal(0, 0),
        ],
    );
    // Handler: report back through the syscall exit convention.
    let handler: Vec<u8> = [asm::addi(10, 0, 0x666), asm::ecall()]
        .iter()
        .flat_map(|i| i.to_le_bytes())
        .collect();
    tm.machine.load_core_raw(0, HANDLER, &handler).unwrap();

    tm.machine.core_thread_run(0).unwrap();
    tm.machine.set_interrupt(0, true).unwrap();

    let status = tm.machine.core_join(0);
    assert_eq!(status, Err(Error::Syscall));

    let rv = tm.rv();
    assert_eq!(rv.sr[2].cause, CAUSE_INTERRUPT | 11);
    assert_eq!(rv.core.pc, HANDLER + 4, "stopped at the handler's ecall");
    assert_eq!(tm.reg(10), 0x666);
}

/// MPU reprogramming: the guest installs a translated window and the
/// update takes effect between instructions.
#[test]
fn mpu_update_switches_translation() {
    let mut tm = TestMachine::full(0);
    let marker: u32 = 0xfeed_c0de;
    tm.mem_write(0x11000, &marker.to_le_bytes());

    tm.load_program(
        MEM_BASE,
        &[
            asm::lui(5, 0x0504_0000),  // t0 = MPU base
            // Entry 0: identity map the code region.
            asm::lui(6, 0x10000),
            asm::sw(5, 6, 0x100),
            asm::sw(5, 6, 0x300),
            asm::lui(7, 0x10000),
            asm::sw(5, 7, 0x500),
            // Entry 1: VA 0x40000 -> PA 0x11000.
            asm::lui(28, 0x40000),
            asm::sw(5, 28, 0x108),
            asm::lui(29, 0x11000),
            asm::sw(5, 29, 0x308),
            asm::lui(30, 0x1000),
            asm::sw(5, 30, 0x504),
            // APPLY | ENABLE.
            asm::addi(31, 0, 3),
            asm::sw(5, 31, 0x8),
            // Read through the fresh window.
            asm::lw(10, 28, 0),
            asm::jal(0, 0),
        ],
    );

    tm.step(15).unwrap();
    assert_eq!(tm.reg(10), u64::from(marker));
}

/// Guest stores to the UART FIFO produce host output on newline.
#[test]
fn uart_fifo_emits_lines() {
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);
    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let mut tm = TestMachine::full(0);
    let capture = Capture::default();
    tm.uart
        .as_ref()
        .unwrap()
        .set_channel(UartChannel::Writer(Box::new(capture.clone())));

    tm.load_program(
        MEM_BASE,
        &[
            asm::lui(5, 0x0500_0000),
            asm::addi(6, 0, i32::from(b'o')),
            asm::sw(5, 6, 0x14),
            asm::addi(6, 0, i32::from(b'k')),
            asm::sw(5, 6, 0x14),
            asm::addi(6, 0, i32::from(b'\n')),
            asm::sw(5, 6, 0x14),
        ],
    );
    tm.step(7).unwrap();
    assert_eq!(&*capture.0.lock().unwrap(), b"ok\n");
}

/// The RTC is readable from guest loads.
#[test]
fn rtc_read_through_the_bus() {
    let mut tm = TestMachine::full(0);
    tm.load_program(
        MEM_BASE,
        &[
            asm::lui(5, 0x0502_0000),
            asm::lw(10, 5, 0x10), // MONOTONIC_LO
        ],
    );
    tm.step(2).unwrap();
    // Some time has passed since the process epoch was captured.
    assert!(tm.reg(10) > 0);
}

/// Host-side memory write/read round trip through the bus.
#[test]
fn machine_memory_round_trip() {
    let tm = TestMachine::new();
    let data = b"walkthrough";
    tm.mem_write(0x12345, data);
    assert_eq!(tm.mem_read(0x12345, data.len()), data);
}

/// Two cores get distinct hart ids and workers.
#[test]
fn multiple_cores_have_distinct_identities() {
    use rvmach_core::core::CoreParams;
    let mut tm = TestMachine::new();
    let second = tm
        .machine
        .add_core(&CoreParams {
            arch_options: crate::common::ALL_EXTS,
            ..CoreParams::default()
        })
        .unwrap();
    assert_eq!(second, 1);

    let hart0 = tm.machine.core(0).unwrap().as_riscv().unwrap().mhartid;
    let hart1 = tm.machine.core(1).unwrap().as_riscv().unwrap().mhartid;
    assert_eq!((hart0, hart1), (0, 1));
}
