//! Layered readers for framed well-log files.
//!
//! Well logs are often stored with the payload wrapped in one or more layers
//! of framing: a tape image record framing, an rp66 visible envelope, or
//! both stacked. Each layer interleaves small headers with the payload, so
//! byte offsets in the file stop matching byte offsets in the data.
//!
//! This crate reads such files through a stack of [`Stream`] values. Leaf
//! sources ([`MemSource`], [`FileSource`]) do the host I/O; framing decoders
//! ([`TapeImage`], [`Rp66`]) strip their headers and re-express reads,
//! seeks and tells in logical (header-free) coordinates. Layers nest
//! arbitrarily, and each owns the stream below it and closes it recursively.
//!
//! ```no_run
//! use unframe::{FileSource, Rp66, Stream, TapeImage};
//!
//! let file = std::fs::File::open("logs.dlis")?;
//! let mut stream = Rp66::open(Box::new(TapeImage::open(Box::new(
//!     FileSource::open(file),
//! ))));
//!
//! let mut buf = vec![0; 4096];
//! let n = stream.read(&mut buf)?.nread;
//! let payload = &buf[..n];
//! # let _ = payload;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Headers are indexed on demand: opening a decoder reads nothing, and the
//! index grows as reads and seeks move forward — it is never built upfront.
//! Handles are read-only and strictly single-threaded.

pub mod error;
pub mod file;
mod index;
pub mod mem;
pub mod rp66;
pub mod stream;
pub mod tapeimage;

pub use error::{ReadError, ReadResult, ReadStatus, Status, StreamError};
pub use file::FileSource;
pub use mem::MemSource;
pub use rp66::Rp66;
pub use stream::Stream;
pub use tapeimage::TapeImage;
