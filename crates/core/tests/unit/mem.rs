//! Memory region transfers, resolution, and atomics.

use rvmach_core::Error;
use rvmach_core::io::{AtomicKind, IoOp, MemOrder, OpKind};
use rvmach_core::mapper::MapEndpoint;
use rvmach_core::mem::MemRegion;

fn atomic_op(addr: u64, size: u16, kind: AtomicKind, arg0: u64, arg1: u64) -> IoOp<'static> {
    IoOp::atomic(addr, size, kind, arg0, arg1, MemOrder::SeqCst, MemOrder::Relaxed)
}

#[test]
fn write_read_round_trip() {
    let r = MemRegion::new(0x10000, 0x1000).unwrap();
    let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
    r.io(&mut IoOp::write(0x100, 1, &data)).unwrap();

    let mut buf = [0u8; 8];
    r.io(&mut IoOp::read(0x100, 1, &mut buf)).unwrap();
    assert_eq!(buf, data);
}

#[test]
fn fresh_region_reads_zero() {
    let r = MemRegion::new(0, 0x100).unwrap();
    let mut buf = [0xffu8; 16];
    r.io(&mut IoOp::read(0x10, 1, &mut buf)).unwrap();
    assert!(buf.iter().all(|b| *b == 0));
}

#[test]
fn out_of_range_access_fails() {
    let r = MemRegion::new(0, 0x100).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(r.io(&mut IoOp::read(0xfc, 1, &mut buf)), Err(Error::Range));
}

#[test]
fn resolve_returns_pointer_and_remaining_length() {
    let r = MemRegion::new(0, 0x1000).unwrap();
    r.io(&mut IoOp::write(0x40, 1, &[0xab])).unwrap();

    let mut op = IoOp::resolve(0x40);
    r.io(&mut op).unwrap();
    assert_eq!(op.arg[1], 0x1000 - 0x40);
    let ptr = op.arg[0] as *const u8;
    assert!(!ptr.is_null());
    // SAFETY: the region outlives this read and 0x40 is in range.
    assert_eq!(unsafe { *ptr }, 0xab);
}

#[test]
fn atomic_swap_returns_previous() {
    let r = MemRegion::new(0, 0x100).unwrap();
    r.io(&mut IoOp::write(0x20, 1, &0x1111_2222u32.to_le_bytes()))
        .unwrap();

    let mut op = atomic_op(0x20, 4, AtomicKind::Swap, 0xdead_beef, 0);
    r.io(&mut op).unwrap();
    assert_eq!(op.arg[0], 0x1111_2222);

    let mut buf = [0u8; 4];
    r.io(&mut IoOp::read(0x20, 1, &mut buf)).unwrap();
    assert_eq!(u32::from_le_bytes(buf), 0xdead_beef);
}

#[test]
fn atomic_cas_success_and_failure() {
    let r = MemRegion::new(0, 0x100).unwrap();
    r.io(&mut IoOp::write(0, 1, &10u32.to_le_bytes())).unwrap();

    // Expected matches: success reports 0 and the swap happens.
    let mut op = atomic_op(0, 4, AtomicKind::Cas, 20, 10);
    r.io(&mut op).unwrap();
    assert_eq!(op.arg[0], 0);

    // Expected stale: failure reports 1 and memory is untouched.
    let mut op = atomic_op(0, 4, AtomicKind::Cas, 30, 10);
    r.io(&mut op).unwrap();
    assert_eq!(op.arg[0], 1);

    let mut buf = [0u8; 4];
    r.io(&mut IoOp::read(0, 1, &mut buf)).unwrap();
    assert_eq!(u32::from_le_bytes(buf), 20);
}

#[test]
fn atomic_signed_max_orders_signed() {
    let r = MemRegion::new(0, 0x100).unwrap();
    r.io(&mut IoOp::write(0, 1, &(-5i32 as u32).to_le_bytes()))
        .unwrap();

    let mut op = atomic_op(0, 4, AtomicKind::SMax, 3, 0);
    r.io(&mut op).unwrap();

    let mut buf = [0u8; 4];
    r.io(&mut IoOp::read(0, 1, &mut buf)).unwrap();
    assert_eq!(i32::from_le_bytes(buf), 3);
}

#[test]
fn atomic_unsigned_max_orders_unsigned() {
    let r = MemRegion::new(0, 0x100).unwrap();
    r.io(&mut IoOp::write(0, 1, &(-5i32 as u32).to_le_bytes()))
        .unwrap();

    // 0xFFFF_FFFB unsigned is larger than 3.
    let mut op = atomic_op(0, 4, AtomicKind::UMax, 3, 0);
    r.io(&mut op).unwrap();

    let mut buf = [0u8; 4];
    r.io(&mut IoOp::read(0, 1, &mut buf)).unwrap();
    assert_eq!(u32::from_le_bytes(buf), 0xffff_fffb);
}

#[test]
fn atomic_and_or_xor() {
    let r = MemRegion::new(0, 0x100).unwrap();
    r.io(&mut IoOp::write(0, 1, &0xff00u64.to_le_bytes())).unwrap();

    let mut op = atomic_op(0, 8, AtomicKind::And, 0x0f0f, 0);
    r.io(&mut op).unwrap();
    assert_eq!(op.arg[0], 0xff00);

    let mut op = atomic_op(0, 8, AtomicKind::Or, 0x3, 0);
    r.io(&mut op).unwrap();
    assert_eq!(op.arg[0], 0x0f00);

    let mut op = atomic_op(0, 8, AtomicKind::Xor, 0xffff, 0);
    r.io(&mut op).unwrap();
    assert_eq!(op.arg[0], 0x0f03);
}

#[test]
fn region_reports_identity() {
    let r = MemRegion::new(0x8000_0000, 0x4000).unwrap();
    assert_eq!(r.base(), 0x8000_0000);
    assert_eq!(r.length(), 0x4000);
}

#[test]
fn resolve_kind_is_not_atomic() {
    assert!(!OpKind::Resolve.is_atomic());
    assert!(OpKind::Atomic(AtomicKind::Add).is_atomic());
}
