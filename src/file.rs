//! Host-file stream leaf.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{ReadError, ReadResult, ReadStatus, StreamError};
use crate::stream::Stream;

/// A stream leaf over a host file handle.
///
/// The source takes ownership of the [`File`] and treats a fixed absolute
/// offset — its *zero* — as the logical origin, so garbage or metadata in
/// front of the framed stream can be skipped before the framing layers take
/// over. [`FileSource::open`] uses the handle's position at open as zero;
/// [`FileSource::open_at`] seeks to an explicit one.
///
/// Offsets are 64-bit throughout; [`std::io::Seek`] picks the right host
/// primitive per platform.
///
/// When the handle cannot report a position at all (a pipe), reading still
/// works but `seek`, `tell` and `ptell` fail with `NotSupported`, carrying
/// the host error message captured at open.
#[derive(Debug)]
pub struct FileSource {
    file: Option<File>,
    /// Absolute physical position, tracked so position queries need no
    /// host call.
    pos: i64,
    /// Absolute offset treated as logical zero; -1 when the handle is not
    /// tellable.
    zero: i64,
    tell_errmsg: String,
    at_eof: bool,
}

impl FileSource {
    /// Wrap `file`, taking its current position as the logical origin.
    pub fn open(mut file: File) -> FileSource {
        match file.stream_position() {
            Ok(p) => FileSource {
                file: Some(file),
                pos: p as i64,
                zero: p as i64,
                tell_errmsg: String::new(),
                at_eof: false,
            },
            Err(e) => FileSource {
                file: Some(file),
                pos: 0,
                zero: -1,
                tell_errmsg: e.to_string(),
                at_eof: false,
            },
        }
    }

    /// Wrap `file` and seek it to `zero`, the absolute offset to treat as
    /// the logical origin.
    pub fn open_at(mut file: File, zero: i64) -> Result<FileSource, StreamError> {
        if zero < 0 {
            return Err(StreamError::InvalidArgs(format!(
                "open: expected zero offset >= 0, got {zero}"
            )));
        }
        file.seek(SeekFrom::Start(zero as u64))
            .map_err(|e| StreamError::Io(e.to_string()))?;
        Ok(FileSource {
            file: Some(file),
            pos: zero,
            zero,
            tell_errmsg: String::new(),
            at_eof: false,
        })
    }

    fn file(&mut self) -> Result<&mut File, StreamError> {
        match self.file.as_mut() {
            Some(f) => Ok(f),
            None => Err(StreamError::Io("file source is closed".into())),
        }
    }
}

impl Stream for FileSource {
    fn read(&mut self, dst: &mut [u8]) -> Result<ReadResult, ReadError> {
        let file = match self.file.as_mut() {
            Some(f) => f,
            None => {
                return Err(ReadError::from(StreamError::Io(
                    "file source is closed".into(),
                )))
            }
        };

        let mut nread = 0;
        while nread < dst.len() {
            match file.read(&mut dst[nread..]) {
                Ok(0) => {
                    self.at_eof = true;
                    break;
                }
                Ok(n) => nread += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.pos += nread as i64;
                    return Ok(ReadResult { nread, status: ReadStatus::Incomplete });
                }
                Err(e) => {
                    self.pos += nread as i64;
                    return Err(ReadError::new(nread, StreamError::Io(e.to_string())));
                }
            }
        }
        self.pos += nread as i64;

        let status = if nread == dst.len() { ReadStatus::Ok } else { ReadStatus::Eof };
        Ok(ReadResult { nread, status })
    }

    fn seek(&mut self, n: i64) -> Result<(), StreamError> {
        if n < 0 {
            return Err(StreamError::InvalidArgs(format!(
                "seek: expected offset >= 0, got {n}"
            )));
        }
        if self.zero < 0 {
            return Err(StreamError::NotSupported(self.tell_errmsg.clone()));
        }
        let target = self.zero + n;
        self.file()?
            .seek(SeekFrom::Start(target as u64))
            .map_err(|e| StreamError::Io(e.to_string()))?;
        self.pos = target;
        // like fseek(3), a successful seek clears the eof condition
        self.at_eof = false;
        Ok(())
    }

    fn tell(&self) -> Result<i64, StreamError> {
        if self.zero < 0 {
            return Err(StreamError::NotSupported(self.tell_errmsg.clone()));
        }
        Ok(self.pos - self.zero)
    }

    fn ptell(&self) -> Result<i64, StreamError> {
        if self.zero < 0 {
            return Err(StreamError::NotSupported(self.tell_errmsg.clone()));
        }
        Ok(self.pos)
    }

    fn eof(&self) -> bool {
        self.at_eof
    }

    fn close(&mut self) -> Result<(), StreamError> {
        // Dropping the handle closes it. std does not surface close(2)
        // failures, and the source is read-only, so there is no buffered
        // state to lose.
        self.file.take();
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
