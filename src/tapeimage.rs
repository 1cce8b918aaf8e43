//! Tape image framing layer.
//!
//! A tape image file is a sequence of records, each preceded by a 12-byte
//! header of three little-endian `u32` fields: the record type (0 = data
//! record, 1 = tape mark, ending a logical file), the absolute offset of the
//! previous header, and the absolute offset of the next one. [`TapeImage`]
//! presents the concatenated record payloads as one contiguous stream;
//! headers are parsed and indexed on demand as reads and seeks move forward,
//! never upfront.
//!
//! The 32-bit offsets cap addressable files at 4 GiB.
//!
//! # Recovery
//!
//! Two header anomalies are survivable: an unknown record type, and a
//! backwards pointer that disagrees with an already-indexed header. The
//! first anomaly puts the handle in a sticky recovery state — data keeps
//! flowing, but every successful read reports
//! [`ReadStatus::TryRecovery`](crate::ReadStatus::TryRecovery) so the caller
//! can decide how much to trust it. A second anomaly while recovering is a
//! failed recovery and stops the decoder.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ReadError, ReadResult, ReadStatus, StreamError};
use crate::index::{AddressMap, ReadHead, Record, RecordIndex};
use crate::stream::Stream;

/// Header type of an ordinary data record.
const RECORD: u32 = 0;
/// Header type of a tape mark, terminating a logical file.
const MARK: u32 = 1;

#[derive(Debug, Clone, Copy)]
struct TapeHeader {
    kind: u32,
    /// Absolute offset of the following header; doubles as the exclusive
    /// end of this record.
    next: i64,
    /// Absolute offset of this header's first byte, derived from the
    /// preceding record's extent when the header is parsed.
    begin: i64,
}

impl Record for TapeHeader {
    const HEADER_SIZE: i64 = 12;

    fn begin(&self) -> i64 {
        self.begin
    }

    fn length(&self) -> i64 {
        self.next - self.begin
    }
}

/// Tape image decoder over an owned inner stream.
pub struct TapeImage {
    fp: Option<Box<dyn Stream>>,
    addr: AddressMap,
    index: RecordIndex<TapeHeader>,
    current: ReadHead,
    recovery: bool,
}

impl TapeImage {
    /// Layer a tape image decoder over `inner`.
    ///
    /// The inner stream's current position becomes the layer zero (0 when
    /// the inner stream cannot tell). No header is parsed until the first
    /// read or seek.
    pub fn open(inner: Box<dyn Stream>) -> TapeImage {
        let zero = inner.tell().unwrap_or(0);
        let addr = AddressMap::new(zero, TapeHeader::HEADER_SIZE);
        let ghost = TapeHeader {
            kind: RECORD,
            next: zero,
            begin: zero - TapeHeader::HEADER_SIZE,
        };
        TapeImage {
            fp: Some(inner),
            addr,
            index: RecordIndex::new(addr, ghost),
            current: ReadHead::ghost(),
            recovery: false,
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

    fn mask(&self, status: ReadStatus) -> ReadStatus {
        if self.recovery {
            ReadStatus::TryRecovery
        } else {
            status
        }
    }

    /// Produce one contiguous run of payload bytes, hopping into the next
    /// record when the current one is exhausted. Returns 0 at end of stream
    /// or when the inner stream has nothing to give right now.
    fn fill(&mut self, dst: &mut [u8]) -> Result<usize, StreamError> {
        while self.current.exhausted() {
            if self.eof() {
                return Ok(0);
            }
            if self.current.pos() == self.index.last() {
                let before = self.index.len();
                self.read_header_from_disk()?;
                if self.index.len() == before {
                    // clean end of stream at a header boundary
                    return Ok(0);
                }
                self.current.move_to(&self.index, self.index.last());
            } else {
                let next = self.current.next_record(&self.index);
                let target = next.tell(&self.index);
                self.fp()?.seek(target)?;
                self.current = next;
            }
            // the new record may be empty, or a tape mark; re-check
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

    /// Parse the 12-byte header at the inner stream's position and append
    /// it to the index. A 0-byte read at eof is a clean end of stream and
    /// appends nothing.
    fn read_header_from_disk(&mut self) -> Result<(), StreamError> {
        debug_assert!(self.current.pos() == self.index.last());
        debug_assert!(self.current.exhausted());

        let mut b = [0u8; TapeHeader::HEADER_SIZE as usize];
        let r = self.fp()?.read(&mut b).map_err(|e| e.source)?;

        if r.nread < b.len() {
            return match r.status {
                ReadStatus::Eof if r.nread == 0 => Ok(()),
                ReadStatus::Eof => Err(StreamError::UnexpectedEof(format!(
                    "tape image: unexpected end of file when reading header, got {} bytes",
                    r.nread
                ))),
                _ => Err(StreamError::FailedRecovery(
                    "tape image: incomplete read of record header, \
                     recovery not implemented"
                        .into(),
                )),
            };
        }

        let mut kind = LittleEndian::read_u32(&b[0..4]);
        let prev = LittleEndian::read_u32(&b[4..8]) as i64;
        let next = LittleEndian::read_u32(&b[8..12]) as i64;

        let kind_consistent = kind == RECORD || kind == MARK;
        if !kind_consistent {
            // Maybe a one-off corruption, maybe an extension with extra
            // record types. Unless already recovering, assume the rest of
            // the header is fine and treat it as a plain record.
            if self.recovery {
                return Err(StreamError::FailedRecovery(
                    "tape image: unknown record type while in recovery, \
                     file probably corrupt"
                        .into(),
                ));
            }
            self.recovery = true;
            kind = RECORD;
        }

        if next <= prev {
            // No sane recovery here: either this header is broken, or the
            // file is larger than the 32-bit offsets can address.
            let msg = if !kind_consistent {
                format!(
                    "file corrupt: record type is not 0 or 1 and next (= {next}) <= \
                     prev (= {prev}), file might be missing data"
                )
            } else {
                format!(
                    "file corrupt: next (= {next}) <= prev (= {prev}), \
                     file size might be larger than 4 GiB"
                )
            };
            return Err(StreamError::ProtocolFatal(msg));
        }

        if self.index.len() >= 2 {
            // The backwards pointer must name the previous header, whose
            // offset the record two back knows as its next. When they
            // disagree, assume the backwards pointer is the broken part.
            let expected = self.index.get(self.index.last() - 1).next;
            if prev != expected {
                if self.recovery {
                    return Err(StreamError::FailedRecovery(format!(
                        "file corrupt: prev (= {prev}) does not match the indexed \
                         headers (= {expected}), error happened in recovery mode, \
                         file might be missing data"
                    )));
                }
                self.recovery = true;
            }
        } else if self.recovery && !self.index.is_empty() {
            // Only one header indexed, and it sits at the layer zero; that
            // is the only address prev can legitimately hold.
            if prev != self.addr.base() {
                return Err(StreamError::FailedRecovery(format!(
                    "file corrupt: second header prev (= {prev}) must point back to \
                     the stream start (= {}), error happened in recovery mode, \
                     file might be missing data",
                    self.addr.base()
                )));
            }
        }

        let begin = self.index.get(self.index.last()).end();
        self.index.append(TapeHeader { kind, next, begin });
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
        // record: its payload start is the open position.
        if record > 0 && target == self.index.get(pos).begin() + TapeHeader::HEADER_SIZE {
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

impl Stream for TapeImage {
    fn read(&mut self, dst: &mut [u8]) -> Result<ReadResult, ReadError> {
        if dst.is_empty() {
            return Ok(ReadResult { nread: 0, status: self.mask(ReadStatus::Ok) });
        }

        let mut nread = 0;
        loop {
            let n = match self.fill(&mut dst[nread..]) {
                Ok(n) => n,
                Err(e) => return Err(ReadError::new(nread, e)),
            };
            nread += n;

            if nread == dst.len() {
                return Ok(ReadResult { nread, status: self.mask(ReadStatus::Ok) });
            }
            if self.eof() {
                if self.current.exhausted() {
                    return Ok(ReadResult { nread, status: self.mask(ReadStatus::Eof) });
                }
                return Err(ReadError::new(
                    nread,
                    StreamError::UnexpectedEof(format!(
                        "tape image: unexpected end of file when reading record, \
                         got {} bytes, expected {} more",
                        nread,
                        self.current.bytes_left()
                    )),
                ));
            }
            if n == 0 {
                return Ok(ReadResult { nread, status: self.mask(ReadStatus::Incomplete) });
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
                "seek: offset beyond 4 GiB, not addressable by 32-bit tape image offsets"
                    .into(),
            ));
        }

        if self.index.contains(n) {
            return self.seek_indexed(n);
        }

        // Past the indexed records: follow the next pointers, indexing
        // headers as they go by, until the target lands in a known record.
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
            if self.index.get(last).kind == MARK {
                // Seeking past a tape mark is allowed, but the head stays
                // exhausted and the next read reports eof.
                self.current.skip();
                return Ok(());
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
                if self.index.get(self.index.last()).kind == MARK {
                    self.current.skip();
                    return Ok(());
                }
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
        // A tape mark ends the logical file no matter what the inner stream
        // says; without one, end of stream is whatever the inner reports.
        self.index.get(self.current.pos()).kind == MARK
            || self.fp.as_deref().map_or(true, |fp| fp.eof())
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
