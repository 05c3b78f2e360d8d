//! # `ckdkit` main library
//!
//! This library emulates Count-Key-Data (CKD) direct access storage drives of the
//! S/370 era, such as the 3330, 3350 and 3380.  A drive is addressed by cylinder and head,
//! each track holding a Home Address, a Record Zero, and any number of variable length
//! records, each with its own count area, optional key, and data.
//!
//! ## Architecture
//!
//! Drive operations are built around three objects:
//! * `dasd::Drive` owns the geometry and the array of tracks, and persists them
//! * `dasd::Track` holds one track, either packed (compressed) or unpacked in a buffer
//! * `device::CkdDevice` interprets channel commands against a drive
//!
//! Tracks are kept compressed until a channel command needs one.  At that point the
//! drive's buffer pool lends the track a decompression buffer.  The pool is small, so the
//! least recently used track is packed again when the pool runs dry.
//!
//! ## Drive Files
//!
//! A drive is stored as a base file plus an optional delta file.  The base file is a full
//! snapshot, the delta holds only the tracks that changed since the base was written.
//! When both are loaded, a delta track replaces the base track at the same address.
//! A drive can also be imported from an AWS tape dump.
//!
//! ## Drive Types
//!
//! Known drive models are in `dasd::names`.  As of this writing `ckdkit` knows
//! * 2314
//! * 3330, 3330-11
//! * 3340-35, 3340-70
//! * 3350
//! * 3375
//! * 3380

pub mod dasd;
pub mod device;
pub mod commands;

use std::path::Path;
use log::info;
use dasd::Drive;

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Open a drive from a base file and an optional delta file.
pub fn open_drive(base_path: &str,maybe_delta_path: Option<&str>) -> Result<Drive,DYNERR> {
    info!("opening drive base {}",base_path);
    Drive::open(Path::new(base_path),maybe_delta_path.map(|p| Path::new(p)))
}

/// Import a drive from an AWS tape dump file.
pub fn import_drive(dump_path: &str) -> Result<Drive,DYNERR> {
    let dump = std::fs::read(dump_path)?;
    dasd::aws::import(&dump)
}

/// Display binary to stdout in columns of hex and ascii, with the EBCDIC rendition
/// in the last column since that is what a mainframe wrote.
pub fn display_block(start_addr: usize,block: &[u8]) {
    let mut slice_start = 0;
    loop {
        let row_label = start_addr + slice_start;
        let mut slice_end = slice_start + 16;
        if slice_end > block.len() {
            slice_end = block.len();
        }
        let slice = &block[slice_start..slice_end];
        let txt: Vec<u8> = slice.iter().map(|c| match *c {
            x if x<32 => '.' as u8,
            x if x<127 => x,
            _ => '.' as u8
        }).collect();
        let ebc_txt: Vec<u8> = slice.iter().map(|c| match dasd::ebcdic_to_ascii(*c) {
            x if x<32 || x>126 => '.' as u8,
            x => x
        }).collect();
        print!("{:06X} : ",row_label);
        for byte in slice {
            print!("{:02X} ",byte);
        }
        for _blank in slice_end..slice_start+16 {
            print!("   ");
        }
        print!("|a| {} ",String::from_utf8_lossy(&txt));
        for _blank in slice_end..slice_start+16 {
            print!(" ");
        }
        println!("|e| {}",String::from_utf8_lossy(&ebc_txt));
        slice_start += 16;
        if slice_end>=block.len() {
            break;
        }
    }
}
