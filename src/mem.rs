//! In-memory stream leaf.

use crate::error::{ReadError, ReadResult, ReadStatus, StreamError};
use crate::stream::Stream;

/// A fixed-size file held in memory.
///
/// Largely intended for tests and for embedding small payloads, but it is a
/// full stream leaf and works anywhere one is accepted.
///
/// Note the seek contract: positioning at or past the end of the buffer is
/// rejected with `InvalidArgs`, so the last valid position is the final
/// byte, not one-past-it.
#[derive(Debug, Default)]
pub struct MemSource {
    mem: Vec<u8>,
    pos: i64,
}

impl MemSource {
    /// An empty in-memory file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `bytes` into a new in-memory file positioned at 0.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { mem: bytes.to_vec(), pos: 0 }
    }

    fn len(&self) -> i64 {
        self.mem.len() as i64
    }
}

impl From<Vec<u8>> for MemSource {
    fn from(mem: Vec<u8>) -> Self {
        Self { mem, pos: 0 }
    }
}

impl Stream for MemSource {
    fn read(&mut self, dst: &mut [u8]) -> Result<ReadResult, ReadError> {
        let remaining = (self.len() - self.pos) as usize;
        let n = dst.len().min(remaining);
        let pos = self.pos as usize;
        dst[..n].copy_from_slice(&self.mem[pos..pos + n]);
        self.pos += n as i64;

        let status = if n == dst.len() { ReadStatus::Ok } else { ReadStatus::Eof };
        Ok(ReadResult { nread: n, status })
    }

    fn seek(&mut self, n: i64) -> Result<(), StreamError> {
        if n < 0 {
            return Err(StreamError::InvalidArgs(format!(
                "seek: expected offset >= 0, got {n}"
            )));
        }
        if n >= self.len() {
            return Err(StreamError::InvalidArgs(format!(
                "seek: offset (= {n}) >= file size (= {})",
                self.len()
            )));
        }
        self.pos = n;
        Ok(())
    }

    fn tell(&self) -> Result<i64, StreamError> {
        Ok(self.pos)
    }

    fn ptell(&self) -> Result<i64, StreamError> {
        Ok(self.pos)
    }

    fn eof(&self) -> bool {
        self.pos == self.len()
    }

    fn close(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    fn peel(&mut self) -> Result<Box<dyn Stream>, StreamError> {
        Err(StreamError::LeafProtocol(
            "peel: not supported for leaf source".into(),
        ))
    }

    fn peek(&mut self) -> Result<&mut dyn Stream, StreamError> {
        Err(StreamError::LeafProtocol(
            "peek: not supported for leaf source".into(),
        ))
    }
}
