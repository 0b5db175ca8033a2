//! Bus transaction value type.
//!
//! This module defines `IoOp`, the description of one bus transaction, and
//! the byte-level executor used by memory-backed endpoints. It provides:
//! 1. **Transfers:** `In`/`Out` of `count` entries of `size` bytes each.
//! 2. **Resolution:** `Resolve` returns a host pointer and remaining length
//!    for zero-copy access.
//! 3. **Atomics:** Ten read-modify-write variants executed on host atomics
//!    with the requested memory orderings.
//!
//! `IoOp` flows unchanged through mapper chains; only `addr`, `count`, and
//! the buffer are rewritten as an operation is translated and split.

use std::sync::atomic::{AtomicI8, AtomicI16, AtomicI32, AtomicI64, Ordering};
use std::sync::atomic::{AtomicU8, AtomicU16, AtomicU32, AtomicU64};

use crate::common::{Error, Result};

/// Largest supported single-entry transfer size in bytes.
pub const IO_SIZE_MAX: u16 = 16;

/// Memory ordering requested for an atomic bus operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MemOrder {
    /// No ordering constraint.
    #[default]
    Relaxed,
    /// Acquire ordering.
    Acquire,
    /// Release ordering.
    Release,
    /// Acquire + release ordering.
    AcqRel,
    /// Sequentially consistent ordering.
    SeqCst,
}

impl MemOrder {
    /// Maps to the host ordering for the success path of an operation.
    pub fn ordering(self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::Acquire => Ordering::Acquire,
            Self::Release => Ordering::Release,
            Self::AcqRel => Ordering::AcqRel,
            Self::SeqCst => Ordering::SeqCst,
        }
    }

    /// Maps to a host ordering legal for a compare-exchange failure path
    /// (no release component).
    pub fn failure_ordering(self) -> Ordering {
        match self {
            Self::Relaxed | Self::Release => Ordering::Relaxed,
            Self::Acquire | Self::AcqRel => Ordering::Acquire,
            Self::SeqCst => Ordering::SeqCst,
        }
    }
}

/// Atomic read-modify-write variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtomicKind {
    /// Exchange; returns the previous value.
    Swap,
    /// Compare-and-swap; `arg[1]` is the expected value. Returns 0 on
    /// success, 1 on failure.
    Cas,
    /// Fetch-add.
    Add,
    /// Fetch-sub.
    Sub,
    /// Fetch-and.
    And,
    /// Fetch-or.
    Or,
    /// Fetch-xor.
    Xor,
    /// Signed maximum.
    SMax,
    /// Signed minimum.
    SMin,
    /// Unsigned maximum.
    UMax,
    /// Unsigned minimum.
    UMin,
}

/// Operation carried by an `IoOp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// Read `count * size` bytes into the op buffer.
    In,
    /// Write `count * size` bytes from the op buffer.
    Out,
    /// Resolve the address to a host pointer and available length,
    /// returned in `arg[0]` / `arg[1]`.
    Resolve,
    /// Atomic read-modify-write of one `size`-byte entry.
    Atomic(AtomicKind),
}

impl OpKind {
    /// Returns `true` for the atomic variants.
    pub fn is_atomic(self) -> bool {
        matches!(self, Self::Atomic(_))
    }
}

/// Transfer buffer attached to an `IoOp`.
///
/// `In` carries the destination for reads, `Out` the source for writes.
/// Resolve and atomic operations carry no buffer.
#[derive(Debug, Default)]
pub enum IoBuf<'a> {
    /// No buffer attached.
    #[default]
    None,
    /// Destination buffer for `In`.
    In(&'a mut [u8]),
    /// Source buffer for `Out`.
    Out(&'a [u8]),
}

impl<'a> IoBuf<'a> {
    /// Returns the buffer length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::In(s) => s.len(),
            Self::Out(s) => s.len(),
        }
    }

    /// Returns `true` if no bytes are attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the buffer into its first `n` bytes and the remainder.
    ///
    /// Used by translate-mode mappers to carve an operation at mapping
    /// boundaries.
    pub fn split_front(self, n: usize) -> (Self, Self) {
        match self {
            Self::None => (Self::None, Self::None),
            Self::In(s) => {
                let (head, tail) = s.split_at_mut(n);
                (Self::In(head), Self::In(tail))
            }
            Self::Out(s) => {
                let (head, tail) = s.split_at(n);
                (Self::Out(head), Self::Out(tail))
            }
        }
    }
}

/// One bus transaction.
///
/// Invariants: `size` is a power of two no larger than [`IO_SIZE_MAX`];
/// atomic operations imply `align` and `count == 1`; `count * size` must
/// equal the buffer length for `In`/`Out`.
#[derive(Debug, Default)]
pub struct IoOp<'a> {
    /// Bus address of the target data.
    pub addr: u64,
    /// Size in bytes of a single entry.
    pub size: u16,
    /// Number of `size`-byte entries (`In`/`Out` only).
    pub count: u32,
    /// Operation to perform.
    pub kind: OpKind,
    /// Enforce natural alignment of `addr` to `size`.
    pub align: bool,
    /// Transfer buffer for `In`/`Out`.
    pub buf: IoBuf<'a>,
    /// Atomic operand / expected value on entry; result / resolved pointer
    /// and length on return.
    pub arg: [u64; 2],
    /// Memory order for atomics.
    pub order: MemOrder,
    /// Failure memory order, compare-and-swap only.
    pub order_fail: MemOrder,
    /// Originating agent id, for permission checks and attribution.
    pub agent: u64,
}

impl Default for OpKind {
    fn default() -> Self {
        Self::In
    }
}

impl<'a> IoOp<'a> {
    /// Builds an aligned read of `buf.len()` bytes as `count` entries of
    /// `size` bytes.
    pub fn read(addr: u64, size: u16, buf: &'a mut [u8]) -> Self {
        let count = (buf.len() / size.max(1) as usize) as u32;
        Self {
            addr,
            size,
            count,
            kind: OpKind::In,
            align: true,
            buf: IoBuf::In(buf),
            ..Self::default()
        }
    }

    /// Builds an aligned write of `buf.len()` bytes as `count` entries of
    /// `size` bytes.
    pub fn write(addr: u64, size: u16, buf: &'a [u8]) -> Self {
        let count = (buf.len() / size.max(1) as usize) as u32;
        Self {
            addr,
            size,
            count,
            kind: OpKind::Out,
            align: true,
            buf: IoBuf::Out(buf),
            ..Self::default()
        }
    }

    /// Builds an atomic read-modify-write of one `size`-byte entry.
    pub fn atomic(
        addr: u64,
        size: u16,
        kind: AtomicKind,
        arg0: u64,
        arg1: u64,
        order: MemOrder,
        order_fail: MemOrder,
    ) -> Self {
        Self {
            addr,
            size,
            count: 1,
            kind: OpKind::Atomic(kind),
            align: true,
            arg: [arg0, arg1],
            order,
            order_fail,
            ..Self::default()
        }
    }

    /// Builds a resolve request for the given address.
    pub fn resolve(addr: u64) -> Self {
        Self {
            addr,
            size: 1,
            count: 1,
            kind: OpKind::Resolve,
            ..Self::default()
        }
    }

    /// Validates the static invariants of this operation.
    pub fn check(&self) -> Result<()> {
        if self.size == 0 || !self.size.is_power_of_two() || self.size > IO_SIZE_MAX {
            return Err(Error::IoSize);
        }
        if self.kind.is_atomic() {
            if self.size > 8 {
                return Err(Error::IoSize);
            }
            if self.count != 1 {
                return Err(Error::IoCount);
            }
        }
        if matches!(self.kind, OpKind::In | OpKind::Out)
            && self.buf.len() != self.count as usize * self.size as usize
        {
            return Err(Error::IoCount);
        }
        if self.align && !self.addr.is_multiple_of(u64::from(self.size)) {
            return Err(Error::IoAlign);
        }
        Ok(())
    }
}

macro_rules! atomic_rmw {
    ($op:expr, $ptr:expr, $atomic_u:ty, $atomic_s:ty, $u:ty, $s:ty, $kind:expr) => {{
        // SAFETY: the caller guarantees `$ptr` points at a live, writable
        // entry of at least `size` bytes, naturally aligned, valid for the
        // duration of the call.
        let ua = unsafe { &*($ptr as *const $atomic_u) };
        // SAFETY: same object reinterpreted with signed element type; the
        // atomic types are layout-compatible with their integer element.
        let sa = unsafe { &*($ptr as *const $atomic_s) };
        let v = $op.arg[0] as $u;
        let order = $op.order.ordering();
        let result: $u = match $kind {
            AtomicKind::Swap => ua.swap(v, order),
            AtomicKind::Cas => {
                let expected = $op.arg[1] as $u;
                match ua.compare_exchange(expected, v, order, $op.order_fail.failure_ordering()) {
                    Ok(_) => 0,
                    Err(_) => 1,
                }
            }
            AtomicKind::Add => ua.fetch_add(v, order),
            AtomicKind::Sub => ua.fetch_sub(v, order),
            AtomicKind::And => ua.fetch_and(v, order),
            AtomicKind::Or => ua.fetch_or(v, order),
            AtomicKind::Xor => ua.fetch_xor(v, order),
            AtomicKind::SMax => sa.fetch_max(v as $s, order) as $u,
            AtomicKind::SMin => sa.fetch_min(v as $s, order) as $u,
            AtomicKind::UMax => ua.fetch_max(v, order),
            AtomicKind::UMin => ua.fetch_min(v, order),
        };
        $op.arg[0] = u64::from(result);
    }};
}

/// Executes an `In`, `Out`, or atomic operation directly against host bytes.
///
/// This is the shared terminal executor for memory-backed endpoints. Resolve
/// is not handled here: only the owning region knows its remaining length.
///
/// # Safety
///
/// `data` must point to at least `count * size` readable and writable bytes
/// that remain valid for the duration of the call, and no other thread may
/// access the range non-atomically while an atomic variant executes.
pub unsafe fn data_io(data: *mut u8, op: &mut IoOp<'_>) -> Result<()> {
    let total = op.count as usize * op.size as usize;
    match op.kind {
        OpKind::In => {
            let IoBuf::In(ref mut buf) = op.buf else {
                return Err(Error::Arg);
            };
            // SAFETY: caller guarantees `data` covers `total` bytes; `buf`
            // is exactly the destination for those bytes.
            unsafe { std::ptr::copy_nonoverlapping(data, buf.as_mut_ptr(), total) };
            Ok(())
        }
        OpKind::Out => {
            let IoBuf::Out(buf) = &op.buf else {
                return Err(Error::Arg);
            };
            // SAFETY: caller guarantees `data` covers `total` writable bytes.
            unsafe { std::ptr::copy_nonoverlapping(buf.as_ptr(), data, total) };
            Ok(())
        }
        OpKind::Resolve => Err(Error::IoInvalid),
        OpKind::Atomic(kind) => {
            if (data as usize) % op.size as usize != 0 {
                return Err(Error::IoAlign);
            }
            match op.size {
                1 => atomic_rmw!(op, data, AtomicU8, AtomicI8, u8, i8, kind),
                2 => atomic_rmw!(op, data, AtomicU16, AtomicI16, u16, i16, kind),
                4 => atomic_rmw!(op, data, AtomicU32, AtomicI32, u32, i32, kind),
                8 => atomic_rmw!(op, data, AtomicU64, AtomicI64, u64, i64, kind),
                _ => return Err(Error::IoSize),
            }
            Ok(())
        }
    }
}
