//! Rp66 visible envelope decoder behavior.

mod util;

use std::io::{Seek, SeekFrom, Write};

use unframe::{FileSource, MemSource, ReadStatus, Rp66, Status, Stream, TapeImage};
use util::{rp66_file, tape_file, BlockedSource};

fn open(bytes: &[u8]) -> Rp66 {
    Rp66::open(Box::new(MemSource::from_bytes(bytes)))
}

fn tempfile_with(bytes: &[u8]) -> std::fs::File {
    let mut f = tempfile::tempfile().unwrap();
    f.write_all(bytes).unwrap();
    f.seek(SeekFrom::Start(0)).unwrap();
    f
}

// ── Reading ──────────────────────────────────────────────────────────────────

#[test]
fn empty_records_read_zero_bytes() {
    let mut rp66 = open(&rp66_file(&[&[], &[], &[]]));

    let mut out = [0xFFu8; 5];
    let r = rp66.read(&mut out).unwrap();
    assert_eq!(r.nread, 0);
    assert_eq!(r.status, ReadStatus::Eof);
}

#[test]
fn single_record_round_trip() {
    let file = [
        0x00, 0x0C, 0xFF, 0x01,
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
    ];
    let mut rp66 = open(&file);

    let mut out = [0xFFu8; 8];
    let r = rp66.read(&mut out).unwrap();
    assert_eq!(r.nread, 8);
    assert_eq!(r.status, ReadStatus::Ok);
    assert_eq!(out, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
}

#[test]
fn read_past_the_end_of_file() {
    let file = [
        0x00, 0x0C, 0xFF, 0x01,
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        0x00, 0x06, 0xFF, 0x01,
        0x09, 0x0A,
    ];
    let mut rp66 = open(&file);

    let mut out = [0xFFu8; 12];
    let r = rp66.read(&mut out).unwrap();
    assert_eq!(r.nread, 10);
    assert_eq!(r.status, ReadStatus::Eof);
    assert_eq!(&out[..10], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A]);
}

#[test]
fn wrong_format_version_is_fatal() {
    let file = [
        0x00, 0x06, 0xFF, 0x01,
        0x01, 0x02,
        0x00, 0x06, 0xFE, 0x01,
        0x09, 0x0A,
    ];
    let mut rp66 = open(&file);

    let mut out = [0xFFu8; 4];
    let err = rp66.read(&mut out).unwrap_err();
    assert_eq!(err.nread, 2);
    assert_eq!(err.status(), Status::ProtocolFatal);
    assert!(err.to_string().contains("visible record 2"));
    assert_eq!(&out[..2], &[0x01, 0x02]);
}

#[test]
fn record_shorter_than_its_header_is_fatal() {
    let file = [
        0x00, 0x03, 0xFF, 0x01,
        0x00, 0x00,
    ];
    let mut rp66 = open(&file);

    let err = rp66.read(&mut [0u8; 2]).unwrap_err();
    assert_eq!(err.status(), Status::ProtocolFatal);
    assert!(err.to_string().contains("length 3"));
}

#[test]
fn empty_record_in_the_middle() {
    let expected = util::payload(8);
    let mut rp66 = open(&rp66_file(&[&expected[..4], &[], &expected[4..]]));

    let mut out = [0xFFu8; 10];
    let r = rp66.read(&mut out).unwrap();
    assert_eq!(r.nread, 8);
    assert_eq!(r.status, ReadStatus::Eof);
    assert_eq!(&out[..8], &expected[..]);
}

#[test]
fn seek_through_an_empty_record() {
    let expected = util::payload(8);
    let mut rp66 = open(&rp66_file(&[&expected[..4], &[], &expected[4..]]));

    rp66.seek(6).unwrap();
    assert_eq!(rp66.tell().unwrap(), 6);
    let mut out = [0u8; 2];
    rp66.read(&mut out).unwrap();
    assert_eq!(out, &expected[6..]);
}

#[test]
fn ending_on_an_empty_record() {
    let expected = util::payload(4);
    let mut rp66 = open(&rp66_file(&[&expected, &[]]));

    let mut out = [0xFFu8; 10];
    let r = rp66.read(&mut out).unwrap();
    assert_eq!(r.nread, 4);
    assert_eq!(r.status, ReadStatus::Eof);
}

// ── Truncation ───────────────────────────────────────────────────────────────

#[test]
fn truncated_in_a_header_is_unexpected_eof() {
    let mut bytes = rp66_file(&[&util::payload(8)]);
    bytes.push(0x00); // one stray header byte
    let mut rp66 = open(&bytes);

    let mut out = [0xFFu8; 10];
    let err = rp66.read(&mut out).unwrap_err();
    assert_eq!(err.nread, 8);
    assert_eq!(err.status(), Status::UnexpectedEof);
    assert!(err.to_string().contains("got 1 bytes"));
    assert!(rp66.eof());
}

#[test]
fn truncated_after_a_header_is_unexpected_eof() {
    // the second header declares 8 payload bytes and delivers none
    let mut bytes = rp66_file(&[&util::payload(4)]);
    bytes.extend_from_slice(&[0x00, 0x0C, 0xFF, 0x01]);
    let mut rp66 = open(&bytes);

    let mut out = [0xFFu8; 10];
    let err = rp66.read(&mut out).unwrap_err();
    assert_eq!(err.nread, 4);
    assert_eq!(err.status(), Status::UnexpectedEof);
    assert_eq!(rp66.tell().unwrap(), 4);
}

#[test]
fn seek_past_declared_data_reads_eof() {
    let mut bytes = rp66_file(&[&util::payload(4)]);
    bytes.extend_from_slice(&[0x00, 0x0C, 0xFF, 0x01]);
    let mut rp66 = open(&bytes);

    rp66.seek(100).unwrap();
    let r = rp66.read(&mut [0u8; 1]).unwrap();
    assert_eq!(r.nread, 0);
    assert_eq!(r.status, ReadStatus::Eof);
}

#[test]
fn truncated_in_data() {
    // header declares 8 payload bytes, the file stops after 4
    let mut bytes = vec![0x00, 0x0C, 0xFF, 0x01];
    bytes.extend_from_slice(&util::payload(4));

    // reading runs into the missing bytes
    let mut rp66 = open(&bytes);
    let mut out = [0xFFu8; 8];
    let err = rp66.read(&mut out).unwrap_err();
    assert_eq!(err.nread, 4);
    assert_eq!(err.status(), Status::UnexpectedEof);
    assert!(err.to_string().contains("expected 4 more"));
    assert!(rp66.eof());

    // seeking within the delivered bytes still works
    let mut rp66 = open(&bytes);
    rp66.seek(3).unwrap();
    let mut one = [0u8; 1];
    rp66.read(&mut one).unwrap();
    assert_eq!(one[0], util::payload(4)[3]);

    // seeking to the truncation point reads nothing
    let mut rp66 = Rp66::open(Box::new(FileSource::open(tempfile_with(&bytes))));
    rp66.seek(4).unwrap();
    let err = rp66.read(&mut [0u8; 1]).unwrap_err();
    assert_eq!(err.nread, 0);
    assert_eq!(err.status(), Status::UnexpectedEof);
}

// ── Blocked inner streams ────────────────────────────────────────────────────

#[test]
fn blocked_inner_stream_in_a_header_fails() {
    let mut data = vec![0x00, 0x40, 0xFF, 0x01];
    data.extend_from_slice(&util::payload(16));
    let mut rp66 = Rp66::open(Box::new(BlockedSource::new(data, 3)));

    let err = rp66.read(&mut [0u8; 16]).unwrap_err();
    assert_eq!(err.nread, 0);
    assert_eq!(err.status(), Status::IoError);
    assert!(err.to_string().contains("incomplete read"));
}

#[test]
fn blocked_inner_stream_in_data_is_incomplete() {
    let mut data = vec![0x00, 0x40, 0xFF, 0x01];
    data.extend_from_slice(&util::payload(16));

    let mut rp66 = Rp66::open(Box::new(BlockedSource::new(data.clone(), 10)));
    let mut out = [0xFFu8; 12];
    let r = rp66.read(&mut out).unwrap();
    assert_eq!(r.nread, 6);
    assert_eq!(r.status, ReadStatus::Incomplete);
    assert_eq!(&out[..6], &util::payload(16)[..6]);

    // seeking beyond the blocked region is accepted; reads report nothing
    let mut rp66 = Rp66::open(Box::new(BlockedSource::new(data, 10)));
    rp66.seek(12).unwrap();
    let r = rp66.read(&mut [0u8; 1]).unwrap();
    assert_eq!(r.nread, 0);
    assert_eq!(r.status, ReadStatus::Incomplete);
}

// ── Seeking ──────────────────────────────────────────────────────────────────

#[test]
fn seek_matches_the_logical_payload() {
    let expected = util::payload(20);
    let file = rp66_file(&[&expected[..8], &expected[8..10], &expected[10..]]);

    for n in [0usize, 1, 7, 8, 9, 10, 15, 19] {
        let mut rp66 = open(&file);
        rp66.seek(n as i64).unwrap();
        assert_eq!(rp66.tell().unwrap(), n as i64, "tell after seek({n})");

        let mut out = vec![0u8; 20 - n];
        let r = rp66.read(&mut out).unwrap();
        assert_eq!(r.nread, 20 - n, "read length after seek({n})");
        assert_eq!(out, &expected[n..], "payload after seek({n})");
    }
}

#[test]
fn boundary_seek_matches_a_plain_read_on_the_leaf() {
    let expected = util::payload(10);
    let file = rp66_file(&[&expected[..8], &expected[8..]]);

    let mut read_path = open(&file);
    read_path.read(&mut vec![0u8; 8]).unwrap();

    let mut cold = open(&file);
    cold.seek(8).unwrap();
    assert_eq!(cold.ptell().unwrap(), read_path.ptell().unwrap());

    let mut warm = open(&file);
    warm.seek(9).unwrap();
    warm.seek(8).unwrap();
    assert_eq!(warm.ptell().unwrap(), read_path.ptell().unwrap());

    let mut out = [0u8; 2];
    warm.read(&mut out).unwrap();
    assert_eq!(out, &expected[8..]);
}

#[test]
fn seek_beyond_4gib_is_invalid() {
    let mut rp66 = open(&rp66_file(&[&util::payload(8)]));
    let err = rp66.seek(u32::MAX as i64 + 1).unwrap_err();
    assert_eq!(err.status(), Status::InvalidArgs);
    assert!(err.to_string().contains("4 GiB"));
}

#[test]
fn negative_seek_is_invalid() {
    let mut rp66 = open(&rp66_file(&[&util::payload(8)]));
    assert_eq!(rp66.seek(-1).unwrap_err().status(), Status::InvalidArgs);
}

// ── Host files ───────────────────────────────────────────────────────────────

#[test]
fn operation_past_eof_on_a_host_file() {
    let mut bytes = vec![0x00, 0x0C, 0xFF, 0x01];
    bytes.extend_from_slice(&util::payload(8));

    let mut rp66 = Rp66::open(Box::new(FileSource::open(tempfile_with(&bytes))));
    let mut out = [0xFFu8; 10];
    let r = rp66.read(&mut out).unwrap();
    assert_eq!(r.nread, 8);
    assert_eq!(r.status, ReadStatus::Eof);
    assert_eq!(&out[..8], &util::payload(8)[..]);
    assert_eq!(rp66.tell().unwrap(), 8);

    rp66.seek(10).unwrap();
    let r = rp66.read(&mut [0u8; 1]).unwrap();
    assert_eq!(r.nread, 0);
    assert_eq!(r.status, ReadStatus::Eof);
}

#[test]
fn opening_at_end_of_file_reads_eof() {
    let mut src = FileSource::open(tempfile_with(b"Very simple file"));
    src.seek(20).unwrap();

    let mut rp66 = Rp66::open(Box::new(src));
    let r = rp66.read(&mut [0u8; 1]).unwrap();
    assert_eq!(r.nread, 0);
    assert_eq!(r.status, ReadStatus::Eof);
}

// ── Layering ─────────────────────────────────────────────────────────────────

#[test]
fn nested_envelopes_read_and_close() {
    let inner = rp66_file(&[&[0x01, 0x02]]);
    let outer = rp66_file(&[&inner]);

    let mut stream = Rp66::open(Box::new(open(&outer)));
    let mut out = [0u8; 2];
    let r = stream.read(&mut out).unwrap();
    assert_eq!(r.nread, 2);
    assert_eq!(out, [0x01, 0x02]);

    assert!(stream.close().is_ok());
}

#[test]
fn envelope_inside_a_tape_image() {
    // a tape image record holding a 4-byte label followed by an rp66 stream
    let label = [0x10, 0x11, 0x12, 0x13];
    let expected = util::payload(10);
    let envelopes = rp66_file(&[&expected[..8], &expected[8..]]);
    let mut record = label.to_vec();
    record.extend_from_slice(&envelopes);
    let file = tape_file(&[&record]);

    let mut tif = TapeImage::open(Box::new(MemSource::from_bytes(&file)));
    let mut sul = [0u8; 4];
    tif.read(&mut sul).unwrap();
    assert_eq!(sul, label);

    let mut rp66 = Rp66::open(Box::new(tif));

    // logical positions restart at the envelope layer
    assert_eq!(rp66.tell().unwrap(), 0);

    let mut one = [0u8; 1];
    rp66.read(&mut one).unwrap();
    assert_eq!(one[0], expected[0]);

    rp66.seek(9).unwrap();
    assert_eq!(rp66.tell().unwrap(), 9);
    rp66.read(&mut one).unwrap();
    assert_eq!(one[0], expected[9]);

    rp66.seek(2).unwrap();
    rp66.read(&mut one).unwrap();
    assert_eq!(one[0], expected[2]);

    // the whole payload, against the already-built index
    rp66.seek(0).unwrap();
    let mut out = vec![0u8; 10];
    let r = rp66.read(&mut out).unwrap();
    assert_eq!(r.nread, 10);
    assert_eq!(out, expected);

    rp66.close().unwrap();
}

#[test]
fn peel_and_peek_expose_the_inner_stream() {
    let file = rp66_file(&[&util::payload(8)]);
    let mut rp66 = open(&file);
    rp66.read(&mut [0u8; 4]).unwrap();

    let peeked = rp66.peek().unwrap();
    assert_eq!(peeked.tell().unwrap(), 8);

    let inner = rp66.peel().unwrap();
    assert_eq!(inner.tell().unwrap(), 8);
    assert_eq!(rp66.peel().unwrap_err().status(), Status::IoError);
    assert_eq!(rp66.peek().unwrap_err().status(), Status::IoError);
    assert!(rp66.close().is_ok());
}
