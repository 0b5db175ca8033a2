//! Guest memory regions.
//!
//! A `MemRegion` is a contiguous, owned byte buffer exposed to the bus as an
//! IO endpoint. It provides:
//! 1. **Transfers:** memcpy-backed `In`/`Out` of `count * size` bytes.
//! 2. **Resolution:** `Resolve` returns the host pointer and remaining
//!    length for zero-copy access.
//! 3. **Atomics:** RMW operations executed on correctly sized, aligned host
//!    atomics with the requested ordering.
//!
//! On Unix the backing store is an anonymous `mmap`, so large guest RAM is
//! lazily allocated by the host kernel. The region owns its bytes for its
//! full lifetime; dropping the region unmaps them.

use crate::common::{Error, Result};
use crate::io::{self, IoOp, OpKind};
use crate::mapper::MapEndpoint;

/// A raw host buffer backing one guest memory region.
///
/// # Safety Invariants
///
/// - `ptr` points to a valid allocation of exactly `size` bytes, readable
///   and writable, for the lifetime of the buffer.
/// - No code frees or reallocates the memory while the buffer exists.
/// - Concurrent access is only performed through the atomic IO path or by
///   agents that have serialized among themselves.
struct HostBuffer {
    ptr: *mut u8,
    size: usize,
    is_mmap: bool,
}

// SAFETY: the buffer is a plain byte allocation; cross-thread access is
// governed by the invariants above.
unsafe impl Send for HostBuffer {}
// SAFETY: as above.
unsafe impl Sync for HostBuffer {}

impl HostBuffer {
    fn new(size: usize) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::ptr;
            // SAFETY: anonymous private mapping with no file descriptor;
            // arguments are valid for any size.
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(Error::Mem);
            }
            Ok(Self {
                ptr: ptr.cast::<u8>(),
                size,
                is_mmap: true,
            })
        }

        #[cfg(not(unix))]
        {
            let mut vec = vec![0u8; size];
            let ptr = vec.as_mut_ptr();
            std::mem::forget(vec);
            Ok(Self {
                ptr,
                size,
                is_mmap: false,
            })
        }
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        if self.is_mmap {
            #[cfg(unix)]
            // SAFETY: `ptr`/`size` describe the mapping created in `new`.
            unsafe {
                let _ = libc::munmap(self.ptr.cast(), self.size);
            }
        } else {
            #[cfg(not(unix))]
            // SAFETY: reconstructs the Vec forgotten in `new` to run its
            // destructor exactly once.
            unsafe {
                let _ = Vec::from_raw_parts(self.ptr, self.size, self.size);
            }
        }
    }
}

/// A contiguous owned guest memory region exposing an IO endpoint.
pub struct MemRegion {
    base: u64,
    length: u64,
    buf: HostBuffer,
}

impl MemRegion {
    /// Allocates a zero-filled region covering `[base, base + length)` on
    /// the bus.
    pub fn new(base: u64, length: u64) -> Result<Self> {
        Ok(Self {
            base,
            length,
            buf: HostBuffer::new(length as usize)?,
        })
    }

    /// Returns the bus base address.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Returns the region length in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }
}

impl MapEndpoint for MemRegion {
    /// Executes an operation at a region-relative offset.
    ///
    /// The mapper has already subtracted the mapping base: `op.addr` is an
    /// offset into this region.
    fn io(&self, op: &mut IoOp<'_>) -> Result<()> {
        let total = u64::from(op.count) * u64::from(op.size);
        let end = op.addr.checked_add(total).ok_or(Error::Range)?;
        if end > self.length {
            return Err(Error::Range);
        }
        // SAFETY: `op.addr + total <= length`, so the offset pointer and
        // every byte the executor touches stay inside the allocation.
        let data = unsafe { self.buf.ptr.add(op.addr as usize) };
        match op.kind {
            OpKind::Resolve => {
                op.arg[0] = data as u64;
                op.arg[1] = self.length - op.addr;
                Ok(())
            }
            // SAFETY: `data` covers `count * size` valid bytes, per above.
            _ => unsafe { io::data_io(data, op) },
        }
    }
}
