//! # Direct Access Storage Module
//!
//! This module holds the storage engine behind an emulated CKD drive.
//!
//! ## Tracks and Records
//!
//! A CKD track starts with a 5 byte Home Address (flag, CC, HH) followed by Record Zero,
//! which is kept here as 16 opaque bytes (the 8 byte count area and 8 data bytes).
//! The user records follow, each described by a `track::CountArea`.  The key and data bytes
//! of all user records are concatenated in a payload buffer, and the count area remembers
//! where its record starts.
//!
//! ## Packing
//!
//! While nobody is using a track it is held only in compressed form.  Before a record can be
//! searched, read or written the track has to be accessed, which means the drive's buffer pool
//! (see `pool`) hands the track a buffer to unpack into.  When the buffer is reclaimed the track
//! is packed again, but only if something changed.
//!
//! ## Persistence
//!
//! The `persist` submodule reads and writes the base and delta files, `aws` imports tape dumps.

pub mod names;
pub mod track;
pub mod pool;
pub mod drive;
pub mod persist;
pub mod aws;

pub use drive::Drive;
pub use names::DriveType;
pub use track::{Track,CountArea,Cursor};

/// Length of the Home Address
pub const HA_LEN: usize = 5;
/// Length of Record Zero as kept in a track (count area + 8 data bytes)
pub const R0_LEN: usize = 16;
/// Length of a count area as seen by the channel (CCHHRKDD)
pub const COUNT_LEN: usize = 8;

/// Enumerates storage errors.  The `Display` trait will print equivalent long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("track data could not be decompressed")]
    CorruptTrackData,
    #[error("operation not valid on record zero")]
    InvalidRecordZeroAccess,
    #[error("record not found")]
    RecordNotFound,
    #[error("track is not being formatted")]
    NotFormatting,
    #[error("track was not accessed")]
    TrackNotAccessed,
    #[error("track would exceed the maximum track length")]
    TrackOverflow,
    #[error("geometry of base and delta files do not match")]
    GeometryMismatch,
    #[error("geometry cannot be represented in a drive file")]
    GeometryOutOfRange,
    #[error("base file given as delta or delta file given as base")]
    WrongFileRole,
    #[error("track missing or out of place")]
    MissingOrMisplacedTrack,
    #[error("drive header could not be interpreted")]
    BadHeader,
    #[error("unexpected end of drive data")]
    TruncatedStream,
    #[error("unknown drive type")]
    UnknownDriveType,
    #[error("tape dump could not be interpreted")]
    BadTapeDump,
    #[error("cylinder or head out of range")]
    AddressOutOfRange,
    #[error("buffer pool is inconsistent with the tracks")]
    BufferPoolInconsistent
}

/// Read a big endian 24 bit value
pub fn get_u24(bytes: &[u8]) -> usize {
    ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | bytes[2] as usize
}

/// Big endian 24 bit value, the upper byte of `val` is dropped
pub fn u24_bytes(val: usize) -> [u8;3] {
    [(val >> 16) as u8,(val >> 8) as u8,val as u8]
}

/// Map an EBCDIC byte to ASCII, for the subset found in volume labels and dumps.
/// Anything else maps to 0.
pub fn ebcdic_to_ascii(b: u8) -> u8 {
    match b {
        0x40 => b' ',
        0x4b => b'.',
        0x4c => b'<',
        0x4d => b'(',
        0x4e => b'+',
        0x50 => b'&',
        0x5b => b'$',
        0x5c => b'*',
        0x5d => b')',
        0x5e => b';',
        0x60 => b'-',
        0x61 => b'/',
        0x6b => b',',
        0x6c => b'%',
        0x6d => b'_',
        0x6e => b'>',
        0x6f => b'?',
        0x7a => b':',
        0x7b => b'#',
        0x7c => b'@',
        0x7d => b'\'',
        0x7e => b'=',
        0x7f => b'"',
        0x81..=0x89 => b'a' + (b - 0x81),
        0x91..=0x99 => b'j' + (b - 0x91),
        0xa2..=0xa9 => b's' + (b - 0xa2),
        0xc1..=0xc9 => b'A' + (b - 0xc1),
        0xd1..=0xd9 => b'J' + (b - 0xd1),
        0xe2..=0xe9 => b'S' + (b - 0xe2),
        0xf0..=0xf9 => b'0' + (b - 0xf0),
        _ => 0
    }
}

/// Inverse of `ebcdic_to_ascii`, unmapped characters become EBCDIC blanks
pub fn ascii_to_ebcdic(c: u8) -> u8 {
    if c==0 {
        return 0x40;
    }
    for b in 0x40..=0xff {
        if ebcdic_to_ascii(b)==c {
            return b;
        }
    }
    0x40
}

/// Put a volume label into the 6 byte form used in drive headers: upper case,
/// blank padded, truncated.
pub fn pad_label(label: &str) -> [u8;6] {
    let mut ans = [b' ';6];
    for (i,c) in label.to_uppercase().bytes().filter(|c| c.is_ascii()).take(6).enumerate() {
        ans[i] = c;
    }
    ans
}

#[test]
fn test_ebcdic_label() {
    let label: Vec<u8> = "VM370A".bytes().map(|c| ascii_to_ebcdic(c)).collect();
    assert_eq!(label,vec![0xe5,0xd4,0xf3,0xf7,0xf0,0xc1]);
    let back: Vec<u8> = label.iter().map(|b| ebcdic_to_ascii(*b)).collect();
    assert_eq!(back,b"VM370A".to_vec());
    assert_eq!(pad_label("tst"),*b"TST   ");
    assert_eq!(pad_label("LONGLABEL"),*b"LONGLA");
}

#[test]
fn test_u24() {
    assert_eq!(u24_bytes(0x04a7b3),[0x04,0xa7,0xb3]);
    assert_eq!(get_u24(&[0x01,0x02,0x03]),0x010203);
}
