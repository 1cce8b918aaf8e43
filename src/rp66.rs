//! Rp66 visible envelope framing layer.
//!
//! An rp66 file is a sequence of visible records. Each starts with a 4-byte
//! header: a 16-bit big-endian length that includes the header itself,
//! followed by the fixed format/version bytes `0xFF 0x01`. There is no
//! backwards pointer and no end marker — the file simply ends on a record
//! boundary. [`Rp66`] presents the concatenated record bodies as one
//! contiguous stream, indexing headers on demand like the tape image layer.
//!
//! Anything but `0xFF 0x01` in the format/version bytes is fatal. The
//! format has no recovery mode: with no redundancy in the headers there is
//! nothing to cross-check a suspect header against.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{ReadError, ReadResult, ReadStatus, StreamError};
use crate::index::{AddressMap, ReadHead, Record, RecordIndex};
use crate::stream::Stream;

#[derive(Debug, Clone, Copy)]
struct VisibleHeader {
    /// Record extent in bytes, header included.
    length: i64,
    /// Absolute offset of the header's first byte. Visible records do not
    /// know their own position, so it is derived from the predecessor when
    /// the header is parsed; without it every address translation would
    /// have to sum all earlier record lengths.
    offset: i64,
}

impl Record for VisibleHeader {
    const HEADER_SIZE: i64 = 4;

    fn begin(&self) -> i64 {
        self.offset
    }

    fn length(&self) -> i64 {
        self.length
    }
}

/// Visible envelope decoder over an owned inner stream.
pub struct Rp66 {
    fp: Option<Box<dyn Stream>>,
    addr: AddressMap,
    index: RecordIndex<VisibleHeader>,
    current: ReadHead,
}

impl Rp66 {
    /// Layer a visible envelope decoder over `inner`.
    ///
    /// The inner stream's current position becomes the layer zero (0 when
    /// the inner stream cannot tell). No header is parsed until the first
    /// read or seek.
    pub fn open(inner: Box<dyn Stream>) -> Rp66 {
        let zero = inner.tell().unwrap_or(0);
        let addr = AddressMap::new(zero, VisibleHeader::HEADER_SIZE);
        let ghost = VisibleHeader {
            length: VisibleHeader::HEADER_SIZE,
            offset: zero - VisibleHeader::HEADER_SIZE,
        };
        Rp66 {
            fp: Some(inner),
            addr,
            index: RecordIndex::new(addr, ghost),
            current: ReadHead::ghost(),
        }
    }

    fn fp(&mut self) -> Result<&mut dyn Stream, StreamError> {
        match self.fp.as_deref_mut() {
            Some(fp) => Ok(fp),
            None => Err(StreamError::Io(
                "no underlying stream: handle was peeled or closed".into(),
            )),
        }
    }

    /// Produce one contiguous run of body bytes, hopping into the next
    /// record when the current one is exhausted. Returns 0 at end of
    /// stream or when the inner stream has nothing to give right now.
    fn fill(&mut self, dst: &mut [u8]) -> Result<usize, StreamError> {
        while self.current.exhausted() {
            if self.eof() {
                return Ok(0);
            }
            if self.current.pos() == self.index.last() {
                let before = self.index.len();
                self.read_header_from_disk()?;
                if self.index.len() == before {
                    // the last visible record ends flush with the file
                    return Ok(0);
                }
                self.current.move_to(&self.index, self.index.last());
            } else {
                let next = self.current.next_record(&self.index);
                let target = next.tell(&self.index);
                self.fp()?.seek(target)?;
                self.current = next;
            }
            // the new record may be empty; re-check
        }

        let want = self.current.bytes_left().min(dst.len() as i64) as usize;
        let r = match self.fp()?.read(&mut dst[..want]) {
            Ok(r) => r,
            Err(e) => {
                self.current.advance(e.nread as i64)?;
                return Err(e.source);
            }
        };
        self.current.advance(r.nread as i64)?;
        Ok(r.nread)
    }

    /// Parse the 4-byte visible record header at the inner stream's
    /// position and append it to the index. A 0-byte read at eof means the
    /// previous record was the last one; nothing is appended.
    fn read_header_from_disk(&mut self) -> Result<(), StreamError> {
        debug_assert!(self.current.pos() == self.index.last());
        debug_assert!(self.current.exhausted());

        let mut b = [0u8; VisibleHeader::HEADER_SIZE as usize];
        let r = self.fp()?.read(&mut b).map_err(|e| e.source)?;

        if r.nread < b.len() {
            return match r.status {
                ReadStatus::Eof if r.nread == 0 => Ok(()),
                ReadStatus::Eof => Err(StreamError::UnexpectedEof(format!(
                    "rp66: unexpected end of file when reading header, got {} bytes",
                    r.nread
                ))),
                _ => Err(StreamError::Io(
                    "rp66: incomplete read of visible record header, \
                     recovery not implemented"
                        .into(),
                )),
            };
        }

        let length = BigEndian::read_u16(&b[0..2]) as i64;
        let format = b[2];
        let major = b[3];

        // The format version is always [0xFF 0x01]; no other visible
        // envelope variant is known. Requiring it catches both broken
        // files and files that were never visible envelopes at all.
        if format != 0xFF || major != 1 {
            return Err(StreamError::ProtocolFatal(format!(
                "rp66: incorrect format version in visible record {}",
                self.index.len() + 1
            )));
        }

        if length < VisibleHeader::HEADER_SIZE {
            return Err(StreamError::ProtocolFatal(format!(
                "rp66: visible record {} declares length {length}, \
                 shorter than its own header",
                self.index.len() + 1
            )));
        }

        let offset = self.index.get(self.index.last()).end();
        self.index.append(VisibleHeader { length, offset });
        Ok(())
    }

    /// Position within the already-indexed records.
    fn seek_indexed(&mut self, n: i64) -> Result<(), StreamError> {
        let pos = self.index.find(n, self.current.pos());
        let record = self.index.index_of(pos);
        let target = self.addr.physical(n, record);

        // Seeking exactly to a record boundary parks the head at the end of
        // the preceding record, so a following read parses the next header
        // just like a plain read up to the boundary would, and both leave
        // the leaf at the same physical position. Never for the first
        // record: its body start is the open position.
        if record > 0 && target == self.index.get(pos).begin() + VisibleHeader::HEADER_SIZE {
            let end = self.index.get(pos - 1).end();
            self.fp()?.seek(end)?;
            self.current.move_to(&self.index, pos - 1);
            self.current.skip();
            return Ok(());
        }

        self.fp()?.seek(target)?;
        self.current.move_to(&self.index, pos);
        let skip = target - self.current.tell(&self.index);
        self.current.advance(skip)?;
        Ok(())
    }
}

impl Stream for Rp66 {
    fn read(&mut self, dst: &mut [u8]) -> Result<ReadResult, ReadError> {
        if dst.is_empty() {
            return Ok(ReadResult { nread: 0, status: ReadStatus::Ok });
        }

        let mut nread = 0;
        loop {
            let n = match self.fill(&mut dst[nread..]) {
                Ok(n) => n,
                Err(e) => return Err(ReadError::new(nread, e)),
            };
            nread += n;

            if nread == dst.len() {
                return Ok(ReadResult { nread, status: ReadStatus::Ok });
            }
            if self.eof() {
                if self.current.exhausted() {
                    return Ok(ReadResult { nread, status: ReadStatus::Eof });
                }
                return Err(ReadError::new(
                    nread,
                    StreamError::UnexpectedEof(format!(
                        "rp66: unexpected end of file when reading record, \
                         got {} bytes, expected {} more",
                        nread,
                        self.current.bytes_left()
                    )),
                ));
            }
            if n == 0 {
                return Ok(ReadResult { nread, status: ReadStatus::Incomplete });
            }
        }
    }

    fn seek(&mut self, n: i64) -> Result<(), StreamError> {
        if n < 0 {
            return Err(StreamError::InvalidArgs(format!(
                "seek: expected offset >= 0, got {n}"
            )));
        }
        if n > u32::MAX as i64 {
            return Err(StreamError::InvalidArgs(
                "seek: offset beyond 4 GiB, not addressable by rp66 record offsets".into(),
            ));
        }

        if self.index.contains(n) {
            return self.seek_indexed(n);
        }

        // Past the indexed records: walk record by record, indexing headers
        // as they go by, until the target lands in a known record.
        self.current.move_to(&self.index, self.index.last());
        loop {
            let last = self.index.last();
            let record = self.index.index_of(last);
            let target = self.addr.physical(n, record);
            let end = self.index.get(last).end();

            if target < end {
                // n is within the records indexed so far; contains() is
                // deliberately one header short near the frontier.
                return self.seek_indexed(n);
            }
            if target == end && record >= 0 {
                self.fp()?.seek(end)?;
                self.current.skip();
                return Ok(());
            }

            self.fp()?.seek(end)?;
            self.current.skip();
            let before = self.index.len();
            self.read_header_from_disk()?;
            if self.index.len() != before {
                self.current.move_to(&self.index, self.index.last());
            }
            if self.eof() {
                if self.index.len() == before {
                    // Data ran out inside the last record. The seek is
                    // accepted; the next read reports what it finds.
                    return Ok(());
                }
                let record = self.index.index_of(self.index.last());
                let target = self.addr.physical(n, record);
                let skip = (target - self.current.tell(&self.index))
                    .min(self.current.bytes_left());
                self.current.advance(skip)?;
                return Ok(());
            }
        }
    }

    fn tell(&self) -> Result<i64, StreamError> {
        let record = self.index.index_of(self.current.pos());
        Ok(self.addr.logical(self.current.tell(&self.index), record))
    }

    fn ptell(&self) -> Result<i64, StreamError> {
        match self.fp.as_deref() {
            Some(fp) => fp.ptell(),
            None => Err(StreamError::Io(
                "no underlying stream: handle was peeled or closed".into(),
            )),
        }
    }

    fn eof(&self) -> bool {
        // The last visible record ends flush with the underlying file, so
        // the inner stream's eof is this layer's eof.
        self.fp.as_deref().map_or(true, |fp| fp.eof())
    }

    fn close(&mut self) -> Result<(), StreamError> {
        if let Some(mut fp) = self.fp.take() {
            fp.close()?;
        }
        Ok(())
    }

    fn peel(&mut self) -> Result<Box<dyn Stream>, StreamError> {
        self.fp.take().ok_or_else(|| {
            StreamError::Io("no underlying stream to peel: handle was peeled or closed".into())
        })
    }

    fn peek(&mut self) -> Result<&mut dyn Stream, StreamError> {
        match self.fp.as_deref_mut() {
            Some(fp) => Ok(fp),
            None => Err(StreamError::Io(
                "no underlying stream to peek: handle was peeled or closed".into(),
            )),
        }
    }
}
