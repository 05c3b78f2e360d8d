//! ## AWS Tape Dump Import
//!
//! A drive dumped to tape arrives as an AWS tape image.  Every tape block is preceded by
//! a 6 byte little endian header (this block's length, the previous block's length, two flag
//! bytes).  A tape mark ends the dump.
//!
//! The first tape record is the 80 byte volume header (VHR), which gives the label and the
//! last cylinder and head.  Each track is a 4096 byte track header (THR) with the Home Address,
//! Record Zero, and the count areas, followed by as many 4096 byte data records as it takes to
//! hold the keys and data of the track.  Tags may be in ASCII or EBCDIC.
//!
//! Tracks that are not in the dump come out blank.

use std::io::Cursor;
use binrw::{binrw,BinRead};
use log::{trace,debug,info,warn,error};
use super::persist::{MAX_CYLINDERS,MAX_HEADS};
use super::{Error,Drive,DriveType,Track,CountArea,HA_LEN,R0_LEN,COUNT_LEN,pad_label,ebcdic_to_ascii};
use crate::DYNERR;

pub const VHR_LEN: usize = 80;
pub const THR_LEN: usize = 4096;
pub const DATA_BLOCK_LEN: usize = 4096;
/// offset of the first count area in a THR
const THR_COUNTS: usize = 8 + HA_LEN + R0_LEN;

const FLAG_START: u8 = 0x80;
const FLAG_TAPE_MARK: u8 = 0x40;
const FLAG_END: u8 = 0x20;

const VHR_ASCII: [u8;4] = *b"VHR ";
const VHR_EBCDIC: [u8;4] = [0xe5,0xc8,0xd9,0x40];
const THR_ASCII: [u8;4] = *b"THR ";
const THR_EBCDIC: [u8;4] = [0xe3,0xc8,0xd9,0x40];

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct BlockHeader {
    cur_len: u16,
    prev_len: u16,
    flags0: u8,
    flags1: u8
}

/// Split the tape image into records, stopping at the first tape mark.
fn tape_records(dump: &[u8]) -> Result<Vec<Vec<u8>>,DYNERR> {
    let mut ans = Vec::new();
    let mut rec: Vec<u8> = Vec::new();
    let mut cursor = Cursor::new(dump);
    while (cursor.position() as usize) < dump.len() {
        let hdr = match BlockHeader::read(&mut cursor) {
            Ok(h) => h,
            Err(e) => {
                error!("bad tape block header: {}",e);
                return Err(Box::new(Error::BadTapeDump));
            }
        };
        if hdr.flags0 & FLAG_TAPE_MARK > 0 {
            trace!("tape mark after {} records",ans.len());
            break;
        }
        let beg = cursor.position() as usize;
        let end = beg + hdr.cur_len as usize;
        if end > dump.len() {
            error!("tape block runs past end of dump");
            return Err(Box::new(Error::BadTapeDump));
        }
        rec.extend_from_slice(&dump[beg..end]);
        cursor.set_position(end as u64);
        // writers that leave the flags clear put one record in each block
        if hdr.flags0 & FLAG_END > 0 || hdr.flags0 & (FLAG_START | FLAG_END)==0 {
            ans.push(std::mem::take(&mut rec));
        }
    }
    if rec.len() > 0 {
        warn!("tape dump ends inside a record");
        ans.push(rec);
    }
    Ok(ans)
}

fn tag_is(dat: &[u8],ascii: &[u8;4],ebcdic: &[u8;4]) -> Option<bool> {
    match dat.get(0..4) {
        Some(t) if t==ascii => Some(false),
        Some(t) if t==ebcdic => Some(true),
        _ => None
    }
}

fn get_u16(dat: &[u8],offset: usize) -> usize {
    u16::from_be_bytes([dat[offset],dat[offset+1]]) as usize
}

/// Build the track described by a THR and its data records.
fn decode_track(thr: &[u8],data: &[Vec<u8>]) -> Result<Track,DYNERR> {
    let n = get_u16(thr,4);
    if THR_COUNTS + n*COUNT_LEN > thr.len() {
        error!("track header claims {} records",n);
        return Err(Box::new(Error::BadTapeDump));
    }
    let mut ha = [0;HA_LEN];
    let mut r0 = [0;R0_LEN];
    ha.copy_from_slice(&thr[8..8+HA_LEN]);
    r0.copy_from_slice(&thr[8+HA_LEN..THR_COUNTS]);
    let mut counts = Vec::new();
    let mut start = 0;
    for i in 0..n {
        let c = &thr[THR_COUNTS+i*COUNT_LEN..THR_COUNTS+(i+1)*COUNT_LEN];
        let count = CountArea {
            record: c[4] as u16,
            key_len: c[5] as usize,
            data_len: get_u16(c,6),
            start
        };
        start = count.end();
        counts.push(count);
    }
    let payload = data.concat();
    if payload.len() < start {
        error!("track needs {} bytes, dump has {}",start,payload.len());
        return Err(Box::new(Error::BadTapeDump));
    }
    Track::from_parts(ha,r0,counts,&payload[0..start])
}

/// Import a drive from an AWS tape image held in memory.
pub fn import(dump: &[u8]) -> Result<Drive,DYNERR> {
    let records = tape_records(dump)?;
    let vhr = match records.first() {
        Some(r) if r.len() >= VHR_LEN => r,
        _ => {
            error!("dump does not start with a volume header");
            return Err(Box::new(Error::BadTapeDump));
        }
    };
    let is_ebcdic = match tag_is(vhr,&VHR_ASCII,&VHR_EBCDIC) {
        Some(e) => e,
        None => {
            error!("volume header tag not found");
            return Err(Box::new(Error::BadTapeDump));
        }
    };
    let label_bytes: Vec<u8> = match is_ebcdic {
        true => vhr[4..10].iter().map(|b| ebcdic_to_ascii(*b)).collect(),
        false => vhr[4..10].to_vec()
    };
    let label = pad_label(&String::from_utf8_lossy(&label_bytes));
    let cylinders = get_u16(vhr,10) + 1;
    let heads = get_u16(vhr,12) + 1;
    let max_records = get_u16(vhr,14);
    if cylinders > MAX_CYLINDERS || heads > MAX_HEADS || max_records > u8::MAX as usize {
        error!("volume header geometry {}x{} with {} records per track is out of range",cylinders,heads,max_records);
        return Err(Box::new(Error::BadTapeDump));
    }
    info!("importing {} with {} cylinders, {} heads",String::from_utf8_lossy(&label),cylinders,heads);

    let mut found: Vec<Option<Track>> = (0..cylinders*heads).map(|_| None).collect();
    let mut ptr = 1;
    while ptr < records.len() {
        let thr = &records[ptr];
        if thr.len() < THR_COUNTS || tag_is(thr,&THR_ASCII,&THR_EBCDIC).is_none() {
            error!("expected track header at tape record {}",ptr);
            return Err(Box::new(Error::BadTapeDump));
        }
        let m = get_u16(thr,6);
        if ptr + 1 + m > records.len() {
            error!("track header at record {} is missing data records",ptr);
            return Err(Box::new(Error::BadTapeDump));
        }
        let trk = decode_track(thr,&records[ptr+1..ptr+1+m])?;
        let (c,h) = (trk.cylinder(),trk.head());
        if c >= cylinders || h >= heads {
            error!("track {}/{} outside volume",c,h);
            return Err(Box::new(Error::BadTapeDump));
        }
        trace!("track {}/{} with {} records",c,h,trk.count_areas().len());
        found[c*heads+h] = Some(trk);
        ptr += 1 + m;
    }
    let max_used = found.iter().map(|t| match t {
        Some(trk) => trk.used(),
        None => 0
    }).max().unwrap_or(0);
    let mut missing = 0;
    let mut tracks = Vec::with_capacity(found.len());
    for (i,maybe) in found.into_iter().enumerate() {
        match maybe {
            Some(trk) => tracks.push(trk),
            None => {
                missing += 1;
                tracks.push(Track::blank(i/heads,i%heads));
            }
        }
    }
    if missing > 0 {
        debug!("{} tracks not in dump were left blank",missing);
    }
    let typ = DriveType::by_geometry(heads,cylinders);
    let (max_track_len,max_records) = match typ.is_unknown() {
        true => {
            let guess = usize::max(512,(max_used + 511) / 512 * 512);
            warn!("no drive type with {} heads and {} cylinders, guessing {} bytes per track",heads,cylinders,guess);
            (guess,max_records)
        },
        false => (usize::max(typ.max_track_len,max_used),max_records)
    };
    let mut ans = Drive::assemble(label,cylinders,heads,max_track_len,max_records,typ,tracks)?;
    ans.modified = true;
    Ok(ans)
}

#[cfg(test)]
fn aws_block(dat: &[u8],prev: usize) -> Vec<u8> {
    let mut ans = Vec::new();
    ans.extend_from_slice(&u16::to_le_bytes(dat.len() as u16));
    ans.extend_from_slice(&u16::to_le_bytes(prev as u16));
    ans.push(FLAG_START | FLAG_END);
    ans.push(0);
    ans.extend_from_slice(dat);
    ans
}

#[cfg(test)]
fn test_dump(heads: usize,last_cyl: usize,ebcdic: bool) -> Vec<u8> {
    let mut records: Vec<Vec<u8>> = Vec::new();
    let mut vhr = vec![0;VHR_LEN];
    match ebcdic {
        true => {
            vhr[0..4].copy_from_slice(&VHR_EBCDIC);
            vhr[4..10].copy_from_slice(&[0xe5,0xd4,0xf3,0xf7,0xf0,0xc1]);
        },
        false => {
            vhr[0..4].copy_from_slice(&VHR_ASCII);
            vhr[4..10].copy_from_slice(b"VM370A");
        }
    }
    vhr[10..12].copy_from_slice(&u16::to_be_bytes(last_cyl as u16));
    vhr[12..14].copy_from_slice(&u16::to_be_bytes(heads as u16 - 1));
    vhr[14..16].copy_from_slice(&u16::to_be_bytes(75));
    records.push(vhr);
    // one track at 0/1 with two records, the second spanning two data blocks
    let mut thr = vec![0;THR_LEN];
    thr[0..4].copy_from_slice(&THR_ASCII);
    thr[4..6].copy_from_slice(&u16::to_be_bytes(2));
    thr[6..8].copy_from_slice(&u16::to_be_bytes(2));
    thr[8..13].copy_from_slice(&[0,0,0,0,1]);
    thr[13..21].copy_from_slice(&[0,0,0,1,0,0,0,8]);
    thr[29..37].copy_from_slice(&[0,0,0,1,1,4,0,10]);
    thr[37..45].copy_from_slice(&[0,0,0,1,2,0,0x10,0]);
    records.push(thr);
    let mut payload = b"KEY1RECORD-ONE".to_vec();
    payload.extend((0..4096).map(|i| (i % 251) as u8));
    payload.resize(2*DATA_BLOCK_LEN,0);
    records.push(payload[0..DATA_BLOCK_LEN].to_vec());
    records.push(payload[DATA_BLOCK_LEN..].to_vec());
    let mut ans = Vec::new();
    let mut prev = 0;
    for r in records {
        ans.append(&mut aws_block(&r,prev));
        prev = r.len();
    }
    ans.extend_from_slice(&[0,0,prev as u8,(prev >> 8) as u8,FLAG_TAPE_MARK,0]);
    ans
}

#[test]
fn test_import() {
    let mut drive = import(&test_dump(30,9,false)).expect("import failed");
    assert_eq!(drive.label(),"VM370A");
    assert_eq!(drive.cylinders(),10);
    assert_eq!(drive.heads(),30);
    assert_eq!(drive.drive_type(),super::names::D3350);
    assert_eq!(drive.max_records(),75);
    assert_eq!(drive.track(0,0).unwrap().count_areas().len(),0);
    let trk = drive.access_track(0,1).unwrap();
    assert!(trk.search_id_equal(1));
    assert_eq!(trk.read_key_and_data().unwrap(),b"KEY1RECORD-ONE".to_vec());
    assert_eq!(trk.read_count().unwrap(),vec![0,0,0,1,2,0,0x10,0]);
    let dat = trk.read_data().unwrap();
    assert_eq!(dat.len(),4096);
    assert_eq!(dat[300],(300 % 251) as u8);
}

#[test]
fn test_import_ebcdic_unknown() {
    let drive = import(&test_dump(7,2,true)).expect("import failed");
    assert_eq!(drive.label(),"VM370A");
    assert!(drive.drive_type().is_unknown());
    assert_eq!(drive.max_track_len(),4608);
    assert!(import(&[1,2,3]).is_err());
    assert!(import(&test_dump(30,9,false)[0..200]).is_err());
}

#[test]
fn test_import_geometry_limits() {
    for dump in [test_dump(1,0xffff,false),test_dump(257,9,false)] {
        let err = import(&dump).err().expect("oversized volume was accepted");
        assert!(matches!(err.downcast_ref::<Error>(),Some(Error::BadTapeDump)));
    }
    let mut dump = test_dump(30,9,false);
    // max records lives at offset 14 of the VHR, which starts after the 6 byte block header
    dump[6+14..6+16].copy_from_slice(&u16::to_be_bytes(300));
    assert!(import(&dump).is_err());
}
