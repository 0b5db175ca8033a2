//! Simulator error taxonomy.
//!
//! This module defines the single flat error type shared by every subsystem.
//! It provides:
//! 1. **Generic errors:** Argument, memory, state, and lifecycle failures.
//! 2. **Execution errors:** Results of guest instruction dispatch (undefined
//!    instruction, aborts, syscalls, breakpoints).
//! 3. **IO errors:** Bus transaction failures reported by mappers, memory
//!    regions, and device models.

use thiserror::Error;

/// Result alias used by all fallible simulator APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Flat error type covering generic, execution, and IO failures.
///
/// `Exited` is not an error in user terms: it is how a clean shutdown
/// propagates out of a worker loop. Execution errors surface from the
/// dispatcher only when the corresponding `TRAP_*` core option is set;
/// otherwise they vector into the guest as exceptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Generic failure with no more specific classification.
    #[error("generic error")]
    Err,
    /// Invalid argument.
    #[error("invalid argument")]
    Arg,
    /// Host memory allocation failed.
    #[error("no memory")]
    Mem,
    /// Operation not supported by this object.
    #[error("operation not supported")]
    Unsupported,
    /// Operation recognized but not implemented.
    #[error("operation not implemented")]
    Unimplemented,
    /// A fixed-capacity table or queue is full.
    #[error("full")]
    Full,
    /// Request out of range.
    #[error("request out of range")]
    Range,
    /// Object is in the wrong state for the request.
    #[error("bad state")]
    State,
    /// Timed out.
    #[error("timeout")]
    Timeout,
    /// Resource busy.
    #[error("busy")]
    Busy,
    /// Entity not found.
    #[error("not found")]
    NotFound,
    /// Clean exit.
    #[error("exited")]
    Exited,

    /// Undefined (illegal) instruction.
    #[error("undefined instruction")]
    Undef,
    /// Instruction or data load/store failure.
    #[error("abort")]
    Abort,
    /// System call raised by the guest.
    #[error("system call")]
    Syscall,
    /// Breakpoint encountered.
    #[error("breakpoint")]
    Breakpoint,

    /// No device claims the address.
    #[error("io: device not found")]
    IoNoDev,
    /// Invalid address alignment.
    #[error("io: invalid address alignment")]
    IoAlign,
    /// Invalid io size.
    #[error("io: invalid size")]
    IoSize,
    /// Invalid io count.
    #[error("io: invalid count")]
    IoCount,
    /// Permission denied.
    #[error("io: no permission")]
    IoPerm,
    /// Write not allowed.
    #[error("io: no write allowed")]
    IoNoWr,
    /// Read not allowed.
    #[error("io: no read allowed")]
    IoNoRd,
    /// Invalid io operation for this endpoint.
    #[error("io: invalid operation")]
    IoInvalid,
    /// No valid mapping covers the address.
    #[error("io: no valid mapping")]
    IoNoMap,
}

impl Error {
    /// Returns `true` if this value represents a clean shutdown rather than
    /// a failure.
    pub fn is_clean_exit(self) -> bool {
        self == Self::Exited
    }

    /// Returns `true` for the IO error group.
    pub fn is_io(self) -> bool {
        matches!(
            self,
            Self::IoNoDev
                | Self::IoAlign
                | Self::IoSize
                | Self::IoCount
                | Self::IoPerm
                | Self::IoNoWr
                | Self::IoNoRd
                | Self::IoInvalid
                | Self::IoNoMap
        )
    }
}
