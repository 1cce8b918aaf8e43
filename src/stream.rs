//! The operation set every stream layer implements.

use std::fmt;

use crate::error::{ReadError, ReadResult, StreamError};

/// A byte stream in a stack of framing layers.
///
/// Leaves ([`MemSource`](crate::MemSource), [`FileSource`](crate::FileSource))
/// produce bytes from a backing store; framing decoders
/// ([`TapeImage`](crate::TapeImage), [`Rp66`](crate::Rp66)) own an inner
/// stream and present its payload with the headers stripped. The operations
/// are uniform across layers, so layers stack without knowing what is below
/// them.
///
/// Handles are single-owner and single-threaded. The `&mut` receivers
/// enforce one-operation-at-a-time; nothing blocks, retries or suspends
/// beyond the synchronous host reads inside the leaf.
pub trait Stream {
    /// Read up to `dst.len()` bytes at the current logical position.
    ///
    /// An empty `dst` is a no-op. On success the outcome reports whether
    /// the buffer was filled (`Ok`), the inner stream was temporarily
    /// blocked (`Incomplete`), or the stream ended (`Eof`). On failure,
    /// bytes delivered before the error are counted in
    /// [`ReadError::nread`] and are valid in `dst`.
    fn read(&mut self, dst: &mut [u8]) -> Result<ReadResult, ReadError>;

    /// Move the logical position to byte offset `n >= 0`.
    ///
    /// Seeking past end-of-file is allowed where the backing store permits
    /// it; a subsequent read reports eof.
    fn seek(&mut self, n: i64) -> Result<(), StreamError> {
        let _ = n;
        Err(StreamError::NotImplemented(
            "seek: not implemented for this layer".into(),
        ))
    }

    /// Current logical position, 0-based, in bytes.
    fn tell(&self) -> Result<i64, StreamError> {
        Err(StreamError::NotImplemented(
            "tell: not implemented for this layer".into(),
        ))
    }

    /// Current physical position of the leaf source.
    ///
    /// Framing layers pass this through unchanged, so every layer of a
    /// stack reports the same value.
    fn ptell(&self) -> Result<i64, StreamError>;

    /// True when the stream cannot produce more bytes.
    fn eof(&self) -> bool;

    /// Release the stream and, recursively, any owned inner stream.
    /// Closing an already-closed handle is a no-op.
    fn close(&mut self) -> Result<(), StreamError>;

    /// Transfer the owned inner stream to the caller.
    ///
    /// The peeled outer handle stays alive, but only `close` remains
    /// meaningful on it. Leaves fail with [`StreamError::LeafProtocol`].
    fn peel(&mut self) -> Result<Box<dyn Stream>, StreamError>;

    /// Borrow the inner stream.
    ///
    /// Mutating the borrow moves the inner position underneath the outer
    /// layer, leaving it in an unspecified state; treat the borrow as
    /// read-mostly. The borrow must end before the outer handle is used
    /// again, which the borrow checker enforces. Leaves fail with
    /// [`StreamError::LeafProtocol`].
    fn peek(&mut self) -> Result<&mut dyn Stream, StreamError>;
}

impl fmt::Debug for dyn Stream + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Stream")
    }
}
