//! Status taxonomy and error types shared by every stream layer.
//!
//! Operations return `Result` like any other Rust API. Embedders that need a
//! flat status surface instead (FFI shims, logging) can map every outcome —
//! success or failure — onto [`Status`] via the `status()` methods.

use thiserror::Error;

// ── Status ───────────────────────────────────────────────────────────────────

/// Every way a stream operation can end.
///
/// Discriminant values other than [`Status::Ok`] (which is guaranteed to be
/// 0) are not stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation did everything that was asked.
    Ok = 0,
    /// A successful short read; the inner stream is temporarily out of bytes.
    Incomplete,
    /// A successful read that reached the end of the stream.
    Eof,
    /// The inner stream ended while the framing promised more bytes.
    UnexpectedEof,
    /// The caller broke the contract: negative length or offset, or a seek
    /// outside the format's addressable range.
    InvalidArgs,
    /// A lower-level I/O failure.
    IoError,
    /// A resource failure from the runtime itself, not an error at runtime.
    RuntimeError,
    /// The operation is not meaningful for this stream.
    NotImplemented,
    /// `peel` or `peek` on a leaf source.
    LeafProtocol,
    /// Supported in principle, but not on this particular handle, e.g. seek
    /// on a pipe-backed file source.
    NotSupported,
    /// The framing is structurally invalid beyond repair.
    ProtocolFatal,
    /// The framing looked suspect, but the decoder patched around it and
    /// carried on.
    ProtocolTryRecovery,
    /// A second framing anomaly turned up while already recovering.
    ProtocolFailedRecovery,
    /// Reserved for embedders that map panics at an FFI boundary; never
    /// produced by this crate.
    UnhandledException,
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// A failed stream operation.
///
/// Messages are complete sentences written where the failure happened; outer
/// layers propagate them unchanged.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    LeafProtocol(String),
    #[error("{0}")]
    NotSupported(String),
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Runtime(String),
    #[error("{0}")]
    InvalidArgs(String),
    #[error("{0}")]
    ProtocolFatal(String),
    #[error("{0}")]
    FailedRecovery(String),
    #[error("{0}")]
    UnexpectedEof(String),
}

impl StreamError {
    /// The [`Status`] kind of this error.
    pub fn status(&self) -> Status {
        match self {
            StreamError::NotImplemented(_) => Status::NotImplemented,
            StreamError::LeafProtocol(_)   => Status::LeafProtocol,
            StreamError::NotSupported(_)   => Status::NotSupported,
            StreamError::Io(_)             => Status::IoError,
            StreamError::Runtime(_)        => Status::RuntimeError,
            StreamError::InvalidArgs(_)    => Status::InvalidArgs,
            StreamError::ProtocolFatal(_)  => Status::ProtocolFatal,
            StreamError::FailedRecovery(_) => Status::ProtocolFailedRecovery,
            StreamError::UnexpectedEof(_)  => Status::UnexpectedEof,
        }
    }
}

// ── Read outcomes ────────────────────────────────────────────────────────────

/// How a successful read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The full requested length was delivered.
    Ok,
    /// Fewer bytes: the inner stream is temporarily blocked, not ended.
    Incomplete,
    /// Fewer bytes: the stream ended.
    Eof,
    /// The data is correct as far as the decoder can tell, but a framing
    /// anomaly was patched over earlier on this handle.
    TryRecovery,
}

impl ReadStatus {
    pub fn status(self) -> Status {
        match self {
            ReadStatus::Ok          => Status::Ok,
            ReadStatus::Incomplete  => Status::Incomplete,
            ReadStatus::Eof         => Status::Eof,
            ReadStatus::TryRecovery => Status::ProtocolTryRecovery,
        }
    }
}

/// A successful read: bytes delivered and how the read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    /// Bytes written to the destination; never more than was asked for.
    pub nread: usize,
    pub status: ReadStatus,
}

/// A failed read.
///
/// Bytes delivered before the failure are still in the destination buffer;
/// `nread` says how many.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ReadError {
    pub nread: usize,
    pub source: StreamError,
}

impl ReadError {
    pub fn new(nread: usize, source: StreamError) -> Self {
        Self { nread, source }
    }

    /// The [`Status`] kind of the underlying error.
    pub fn status(&self) -> Status {
        self.source.status()
    }
}

impl From<StreamError> for ReadError {
    fn from(source: StreamError) -> Self {
        Self { nread: 0, source }
    }
}
