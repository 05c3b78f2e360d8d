//! ## Base and Delta Files
//!
//! A drive file starts with a 32 byte header, big endian throughout.  The high bit of
//! the version word is set in a delta file and clear in a base file.  Then come the tracks,
//! each behind a 6 byte frame giving cylinder, head, and the length of the track's dump bytes.
//! A frame with cylinder 0xFFFF and head 0xFF ends the file.
//!
//! A base file has every track in row-major order.  A delta file has only the tracks that
//! changed since the base was written, in the same order.  Loading walks both streams at once,
//! taking the delta track wherever both have one and seeking past the base bytes.

use std::io::{Read,Seek,SeekFrom,Write,Cursor};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use binrw::{binrw,BinRead,BinWrite};
use log::{trace,debug,info,error};
use super::{Error,Drive,DriveType,Track,get_u24,u24_bytes};
use crate::{STDRESULT,DYNERR};

pub const FORMAT_VERSION: u16 = 1;
pub const DELTA_FLAG: u16 = 0x8000;
pub const HEADER_LEN: usize = 32;
const END_CYL: u16 = 0xffff;
const END_HEAD: u8 = 0xff;
/// cylinder 0xFFFF would collide with the end frame
pub const MAX_CYLINDERS: usize = 0xffff;
pub const MAX_HEADS: usize = 0x100;
pub const MAX_TRACK_LEN: usize = 0xffffff;

#[derive(Debug,Clone)]
#[binrw]
#[brw(big)]
pub struct DriveHeader {
    pub version: u16,
    pub label: [u8;6],
    pub cylinders: u16,
    pub heads: u16,
    pub max_track_len: [u8;3],
    pub max_records: u8,
    pub type_code: u32,
    pub reserved: [u8;12]
}

#[derive(Debug,Clone,Copy)]
#[binrw]
#[brw(big)]
struct TrackFrame {
    cylinder: u16,
    head: u8,
    len: [u8;3]
}

impl DriveHeader {
    fn is_delta(&self) -> bool {
        self.version & DELTA_FLAG > 0
    }
    fn same_geometry(&self,other: &DriveHeader) -> bool {
        self.cylinders==other.cylinders && self.heads==other.heads && self.max_track_len==other.max_track_len &&
            self.max_records==other.max_records && self.type_code==other.type_code
    }
}

impl TrackFrame {
    fn end() -> Self {
        Self { cylinder: END_CYL, head: END_HEAD, len: [0;3] }
    }
    fn is_end(&self) -> bool {
        self.cylinder==END_CYL && self.head==END_HEAD
    }
    /// row-major position, the end frame sorts after everything
    fn key(&self) -> (u16,u8) {
        (self.cylinder,self.head)
    }
}

fn read_header<R: Read + Seek>(r: &mut R) -> Result<DriveHeader,DYNERR> {
    match DriveHeader::read(r) {
        Ok(hdr) => {
            if hdr.version & !DELTA_FLAG != FORMAT_VERSION {
                error!("unsupported drive file version {}",hdr.version & !DELTA_FLAG);
                return Err(Box::new(Error::BadHeader));
            }
            if hdr.cylinders==0 || hdr.heads==0 {
                error!("drive header has no tracks");
                return Err(Box::new(Error::BadHeader));
            }
            Ok(hdr)
        },
        Err(e) => {
            error!("could not read drive header: {}",e);
            Err(Box::new(Error::BadHeader))
        }
    }
}

fn read_frame<R: Read + Seek>(r: &mut R) -> Result<TrackFrame,DYNERR> {
    match TrackFrame::read(r) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            error!("could not read track frame: {}",e);
            Err(Box::new(Error::TruncatedStream))
        }
    }
}

fn read_track<R: Read + Seek>(r: &mut R,frame: &TrackFrame,from_delta: bool) -> Result<Track,DYNERR> {
    let mut dat = vec![0;get_u24(&frame.len)];
    if let Err(e) = r.read_exact(&mut dat) {
        error!("track {}/{} is cut short: {}",frame.cylinder,frame.head,e);
        return Err(Box::new(Error::TruncatedStream));
    }
    Track::from_dump_bytes(frame.cylinder as usize,frame.head as usize,&dat,from_delta)
}

impl Drive {
    /// Load a drive from a base stream and optionally a delta stream.
    pub fn load<R: Read + Seek>(base: &mut R,delta: Option<&mut R>) -> Result<Self,DYNERR> {
        let hdr = read_header(base)?;
        if hdr.is_delta() {
            error!("base file is a delta file");
            return Err(Box::new(Error::WrongFileRole));
        }
        let mut delta = match delta {
            Some(d) => {
                let dhdr = read_header(d)?;
                if !dhdr.is_delta() {
                    error!("delta file is a base file");
                    return Err(Box::new(Error::WrongFileRole));
                }
                if !hdr.same_geometry(&dhdr) {
                    error!("base and delta geometry differ");
                    return Err(Box::new(Error::GeometryMismatch));
                }
                Some(d)
            },
            None => None
        };
        let cylinders = hdr.cylinders as usize;
        let heads = hdr.heads as usize;
        let max_track_len = get_u24(&hdr.max_track_len);
        let mut tracks: Vec<Track> = Vec::with_capacity(cylinders*heads);
        let mut from_delta = 0;
        let mut next_base = read_frame(base)?;
        let mut next_delta = match delta.as_deref_mut() {
            Some(d) => read_frame(d)?,
            None => TrackFrame::end()
        };
        while !next_base.is_end() || !next_delta.is_end() {
            let expected = (tracks.len()/heads,tracks.len()%heads);
            let trk = match (delta.as_deref_mut(),next_delta.key() <= next_base.key()) {
                (Some(d),true) => {
                    let trk = read_track(d,&next_delta,true)?;
                    if next_delta.key()==next_base.key() {
                        trace!("delta replaces base track {}/{}",next_base.cylinder,next_base.head);
                        base.seek(SeekFrom::Current(get_u24(&next_base.len) as i64))?;
                        next_base = read_frame(base)?;
                    }
                    next_delta = read_frame(d)?;
                    from_delta += 1;
                    trk
                },
                _ => {
                    let trk = read_track(base,&next_base,false)?;
                    next_base = read_frame(base)?;
                    trk
                }
            };
            if (trk.cylinder(),trk.head()) != expected || tracks.len() >= cylinders*heads {
                error!("found track {}/{} where {}/{} was expected",trk.cylinder(),trk.head(),expected.0,expected.1);
                return Err(Box::new(Error::MissingOrMisplacedTrack));
            }
            if trk.used() > max_track_len {
                error!("track {}/{} holds {} bytes, limit is {}",trk.cylinder(),trk.head(),trk.used(),max_track_len);
                return Err(Box::new(Error::CorruptTrackData));
            }
            tracks.push(trk);
        }
        let typ = DriveType::by_code(hdr.type_code);
        let mut ans = Drive::assemble(hdr.label,cylinders,heads,max_track_len,hdr.max_records as usize,typ,tracks)?;
        ans.from_file = true;
        info!("loaded {} tracks, {} from delta",ans.tracks.len(),from_delta);
        Ok(ans)
    }
    /// Open a drive from files
    pub fn open(base_path: &Path,delta_path: Option<&Path>) -> Result<Self,DYNERR> {
        let mut base = BufReader::new(File::open(base_path)?);
        match delta_path {
            Some(p) => {
                let mut delta = BufReader::new(File::open(p)?);
                Self::load(&mut base,Some(&mut delta))
            },
            None => Self::load(&mut base,None)
        }
    }
    fn header(&self,delta: bool) -> Result<DriveHeader,DYNERR> {
        if self.cylinders > MAX_CYLINDERS || self.heads > MAX_HEADS || self.max_track_len > MAX_TRACK_LEN {
            error!("geometry {}x{} with {} bytes per track cannot be saved",self.cylinders,self.heads,self.max_track_len);
            return Err(Box::new(Error::GeometryOutOfRange));
        }
        let max_records = match u8::try_from(self.max_records) {
            Ok(n) => n,
            Err(_) => {
                error!("{} records per track cannot be saved",self.max_records);
                return Err(Box::new(Error::GeometryOutOfRange));
            }
        };
        Ok(DriveHeader {
            version: match delta {
                true => FORMAT_VERSION | DELTA_FLAG,
                false => FORMAT_VERSION
            },
            label: self.label,
            cylinders: u16::try_from(self.cylinders)?,
            heads: u16::try_from(self.heads)?,
            max_track_len: u24_bytes(self.max_track_len),
            max_records,
            type_code: self.typ.code,
            reserved: [0;12]
        })
    }
    /// Serialize the drive, all tracks for a base file or only changed tracks for a delta.
    /// Every accessed track is packed first.  Nothing about the drive is marked as saved.
    pub fn to_bytes(&mut self,delta: bool) -> Result<Vec<u8>,DYNERR> {
        self.flush()?;
        let mut out = Cursor::new(Vec::new());
        self.header(delta)?.write(&mut out)?;
        let mut count = 0;
        for trk in &self.tracks {
            if delta && !trk.needs_saving() {
                continue;
            }
            let dump = trk.to_dump_bytes()?;
            let (cylinder,head) = match (u16::try_from(trk.cylinder()),u8::try_from(trk.head())) {
                (Ok(c),Ok(h)) if dump.len() <= MAX_TRACK_LEN => (c,h),
                _ => {
                    error!("track {}/{} cannot be framed",trk.cylinder(),trk.head());
                    return Err(Box::new(Error::GeometryOutOfRange));
                }
            };
            let frame = TrackFrame {
                cylinder,
                head,
                len: u24_bytes(dump.len())
            };
            frame.write(&mut out)?;
            out.write_all(&dump)?;
            count += 1;
        }
        TrackFrame::end().write(&mut out)?;
        debug!("serialized {} tracks",count);
        Ok(out.into_inner())
    }
    /// Write a full snapshot.  Once the file is written every track counts as original.
    pub fn save_base(&mut self,path: &Path) -> STDRESULT {
        let dat = self.to_bytes(false)?;
        std::fs::write(path,&dat)?;
        for trk in self.tracks.iter_mut() {
            trk.mark_saved_as_base();
        }
        self.modified = false;
        info!("saved base with {} bytes",dat.len());
        Ok(())
    }
    /// Write the tracks that differ from the base
    pub fn save_delta(&mut self,path: &Path) -> STDRESULT {
        let dat = self.to_bytes(true)?;
        std::fs::write(path,&dat)?;
        self.modified = false;
        info!("saved delta with {} bytes",dat.len());
        Ok(())
    }
}

#[cfg(test)]
fn write_record(drive: &mut Drive,cyl: usize,head: usize,rec: u16,dat: &[u8]) {
    let trk = drive.access_track(cyl,head).unwrap();
    trk.reset_position();
    trk.begin_format().unwrap();
    trk.append_count_key_and_data(rec,0,dat.len(),dat).unwrap();
    drive.mark_modified();
}

#[test]
fn test_header_layout() {
    let mut drive = Drive::create(super::names::D3350,2,"TESTER").unwrap();
    let dat = drive.to_bytes(false).unwrap();
    assert_eq!(&dat[0..2],&[0,1]);
    assert_eq!(&dat[2..8],b"TESTER");
    assert_eq!(&dat[8..10],&[0,2]);
    assert_eq!(&dat[10..12],&[0,30]);
    assert_eq!(&dat[12..15],&u24_bytes(19069));
    assert_eq!(dat[15],75);
    assert_eq!(&dat[16..20],&[0,0,0x33,0x50]);
    assert_eq!(&dat[20..32],&[0;12]);
    // first frame is cyl 0 head 0
    assert_eq!(&dat[32..35],&[0,0,0]);
    assert_eq!(&dat[dat.len()-6..],&[0xff,0xff,0xff,0,0,0]);
    let delta = drive.to_bytes(true).unwrap();
    assert_eq!(delta.len(),HEADER_LEN + 6);
    assert_eq!(delta[0],0x80);
}

#[test]
fn test_base_delta_merge() {
    let mut drive = Drive::create(super::names::D3330,3,"MERGE").unwrap();
    write_record(&mut drive,0,0,1,b"base record");
    write_record(&mut drive,2,18,1,b"last track");
    let base = drive.to_bytes(false).unwrap();
    for trk in drive.tracks.iter_mut() {
        trk.mark_saved_as_base();
    }
    write_record(&mut drive,0,0,1,b"changed record");
    write_record(&mut drive,1,7,4,b"new record");
    let delta = drive.to_bytes(true).unwrap();
    assert_eq!(drive.changed_tracks(),vec![(0,0),(1,7)]);
    let mut loaded = Drive::load(&mut Cursor::new(base.clone()),Some(&mut Cursor::new(delta.clone()))).unwrap();
    assert!(loaded.is_from_file());
    assert!(!loaded.is_modified());
    assert_eq!(loaded.label(),"MERGE");
    let trk = loaded.access_track(0,0).unwrap();
    assert!(trk.search_id_equal(1));
    assert_eq!(trk.read_data().unwrap(),b"changed record".to_vec());
    let trk = loaded.access_track(2,18).unwrap();
    assert!(trk.search_id_equal(1));
    assert_eq!(trk.read_data().unwrap(),b"last track".to_vec());
    let trk = loaded.access_track(1,7).unwrap();
    assert!(trk.search_id_equal(4));
    // saving again without changes reproduces the delta
    assert_eq!(loaded.to_bytes(true).unwrap(),delta);
    let mut base_only = Drive::load(&mut Cursor::new(base),None).unwrap();
    let trk = base_only.access_track(0,0).unwrap();
    assert!(trk.search_id_equal(1));
    assert_eq!(trk.read_data().unwrap(),b"base record".to_vec());
}

#[test]
fn test_wrong_role_and_geometry() {
    let mut a = Drive::create(super::names::D3330,3,"A").unwrap();
    let mut b = Drive::create(super::names::D3330,4,"A").unwrap();
    let a_base = a.to_bytes(false).unwrap();
    let a_delta = a.to_bytes(true).unwrap();
    let b_delta = b.to_bytes(true).unwrap();
    let err = Drive::load(&mut Cursor::new(a_delta.clone()),None).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::WrongFileRole)));
    let err = Drive::load(&mut Cursor::new(a_base.clone()),Some(&mut Cursor::new(a_base.clone()))).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::WrongFileRole)));
    let err = Drive::load(&mut Cursor::new(a_base.clone()),Some(&mut Cursor::new(b_delta))).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::GeometryMismatch)));
    assert!(Drive::load(&mut Cursor::new(a_base),Some(&mut Cursor::new(a_delta))).is_ok());
}

#[test]
fn test_missing_track() {
    let mut drive = Drive::create(super::names::D3330,1,"A").unwrap();
    let mut dat = drive.to_bytes(false).unwrap();
    // drop the first track frame, which is followed by a blank track dump
    let first_len = get_u24(&dat[HEADER_LEN+3..HEADER_LEN+6]);
    dat.drain(HEADER_LEN..HEADER_LEN+6+first_len);
    let err = Drive::load(&mut Cursor::new(dat),None).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::MissingOrMisplacedTrack)));
    let dat = drive.to_bytes(false).unwrap();
    let err = Drive::load(&mut Cursor::new(dat[0..100].to_vec()),None).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::TruncatedStream)));
    let err = Drive::load(&mut Cursor::new(vec![0;10]),None).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::BadHeader)));
}

#[cfg(test)]
fn keyed_track_bytes() -> Vec<u8> {
    let mut drive = Drive::create(super::names::D3330,1,"KEYS").unwrap();
    let trk = drive.access_track(0,0).unwrap();
    trk.begin_format().unwrap();
    trk.append_count_key_and_data(1,3,5,b"AAAfirst").unwrap();
    trk.append_count_key_and_data(2,3,6,b"BBBsecond").unwrap();
    drive.to_bytes(false).unwrap()
}

#[test]
fn test_corrupt_count_area() {
    // first track dump starts after the header and its frame, count areas start 26 bytes in
    let counts = HEADER_LEN + 6 + 26;
    let dat = keyed_track_bytes();
    assert!(Drive::load(&mut Cursor::new(dat.clone()),None).is_ok());
    // first record moved past the payload, the last one still fits
    let mut bad = dat.clone();
    bad[counts+5..counts+8].copy_from_slice(&u24_bytes(0x100000));
    let err = Drive::load(&mut Cursor::new(bad),None).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::CorruptTrackData)));
    // second record overlapping the first
    let mut bad = dat.clone();
    bad[counts+13..counts+16].copy_from_slice(&u24_bytes(2));
    let err = Drive::load(&mut Cursor::new(bad),None).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::CorruptTrackData)));
    // unpacked size beyond the drive's track length
    let mut bad = dat;
    bad[counts-5..counts-2].copy_from_slice(&u24_bytes(0x0f0000));
    let err = Drive::load(&mut Cursor::new(bad),None).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::CorruptTrackData)));
}

#[test]
fn test_unframeable_geometry() {
    let tracks: Vec<Track> = (0..257).map(|h| Track::blank(0,h)).collect();
    let mut drive = Drive::assemble(super::pad_label("WIDE"),1,257,4096,10,super::names::UNKNOWN,tracks).unwrap();
    let err = drive.to_bytes(false).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::GeometryOutOfRange)));
    drive.max_records = 300;
    drive.heads = 1;
    let err = drive.to_bytes(true).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::GeometryOutOfRange)));
}
