#![forbid(unsafe_code)]
//! Error types for XFSR.
//!
//! # Error Taxonomy
//!
//! XFSR uses a two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `xfsr-types` | Byte-level violations found while decoding on-disk structures |
//! | Runtime | `XfsError` | `xfsr-error` (this crate) | Errors returned by the mount entry point and the VFS surface |
//!
//! `xfsr-error` does not depend on `xfsr-types`; the `ParseError` → `XfsError`
//! conversion lives in `xfsr-core`:
//!
//! | ParseError | XfsError |
//! |------------|----------|
//! | `InvalidMagic` on the superblock | `UnknownFormat` |
//! | anything else | `BogusFormat` |
//!
//! `UnknownFormat` is the expected answer for a format-probing caller handed a
//! non-XFS image. `BogusFormat` means the magic matched but something past it
//! is structurally wrong.
//!
//! ## errno Mapping
//!
//! | Variant | errno |
//! |---------|-------|
//! | `Io` | raw OS error, else `EIO` |
//! | `UnknownFormat` | `EINVAL` |
//! | `BogusFormat` | `EIO` |
//! | `OutOfMemory` | `ENOMEM` |
//! | `EndOfFile` | `ENODATA` |
//! | `NotSupported` | `EOPNOTSUPP` |
//! | `NotImplemented` | `ENOSYS` |
//! | `WriteProtected` | `EROFS` |
//! | `FilenameTooLong` | `ENAMETOOLONG` |
//! | `NotFound` | `ENOENT` |
//! | `NoMoreFiles` | `ENOENT` |
//! | `WrongType` | `EINVAL` |
//! | `NegativeSeek` | `EINVAL` |
//! | `InvalidFlags` | `EINVAL` |
//! | `InvalidArgument` | `EINVAL` |

use thiserror::Error;

/// Unified error type for all XFSR operations.
#[derive(Debug, Error)]
pub enum XfsError {
    /// Backing store I/O failure, passed through unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The superblock magic does not match; this is not an XFS volume.
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    /// Structurally invalid metadata past the magic check.
    #[error("bogus on-disk format: {0}")]
    BogusFormat(String),

    /// A cache buffer could not be allocated.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The read cannot be satisfied (or, for strict callers, not in full).
    #[error("end of file")]
    EndOfFile,

    /// Recognized object or fork format that this reader does not handle.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Surface operation without an implementation.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Any mutation of the read-only volume.
    #[error("write protected")]
    WriteProtected,

    /// Name component longer than 255 bytes.
    #[error("filename too long")]
    FilenameTooLong,

    #[error("not found: {0}")]
    NotFound(String),

    /// Directory enumeration is exhausted.
    #[error("no more files")]
    NoMoreFiles,

    /// The operation does not apply to this kind of object.
    #[error("wrong object type")]
    WrongType,

    #[error("seek to negative offset")]
    NegativeSeek,

    /// Mount or format flags outside the accepted set.
    #[error("invalid flags: {0:#x}")]
    InvalidFlags(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl XfsError {
    /// Convert this error into a POSIX errno.
    ///
    /// Exhaustive on purpose: a new variant does not compile until it has an
    /// errno.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::UnknownFormat(_)
            | Self::WrongType
            | Self::NegativeSeek
            | Self::InvalidFlags(_)
            | Self::InvalidArgument(_) => libc::EINVAL,
            Self::BogusFormat(_) => libc::EIO,
            Self::OutOfMemory(_) => libc::ENOMEM,
            Self::EndOfFile => libc::ENODATA,
            Self::NotSupported(_) => libc::EOPNOTSUPP,
            Self::NotImplemented(_) => libc::ENOSYS,
            Self::WriteProtected => libc::EROFS,
            Self::FilenameTooLong => libc::ENAMETOOLONG,
            Self::NotFound(_) | Self::NoMoreFiles => libc::ENOENT,
        }
    }

    /// True for the "not this filesystem" answer a probing caller expects.
    #[must_use]
    pub fn is_unknown_format(&self) -> bool {
        matches!(self, Self::UnknownFormat(_))
    }
}

/// Result alias using `XfsError`.
pub type Result<T> = std::result::Result<T, XfsError>;
