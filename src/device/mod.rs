//! # CKD Device Module
//!
//! `CkdDevice` interprets channel commands against a drive.  The channel layer hands over
//! one command at a time: an opcode, the requested byte count, and a `Transfer` that moves
//! bytes between the device and channel memory.  Each command returns a `Status`.
//!
//! Protocol errors never come back as `Err`.  A failing command sets the sense bytes and
//! returns unit check, and the device carries on.  Storage faults that should not happen
//! (a track that will not unpack, say) are reported as equipment checks.
//!
//! The device is either not on a track, or positioned on a track after a successful seek.
//! Searches, reads and writes need the latter.  The file mask, set by a control command,
//! limits which seeks and writes are allowed until the end of the channel program.

pub mod status;
pub mod mask;
pub mod registry;

use num_traits::FromPrimitive;
use num_derive::FromPrimitive;
use log::{trace,debug,error};
use crate::dasd::{self,Track,COUNT_LEN,HA_LEN,R0_LEN};
use crate::{STDRESULT,DYNERR};
use status::*;
use mask::{FileMask,Access};
use registry::SharedDrive;

pub use status::{Status,Sense,SENSE_LEN};

const SEEK_LEN: usize = 6;
const SEARCH_ID_LEN: usize = 5;
const SEARCH_HA_LEN: usize = 4;
const CU_MODEL: u8 = 0x01;

/// Channel command codes.  Multi-track variants (0x80 bit on reads and searches) are not here.
#[derive(FromPrimitive,Clone,Copy,PartialEq,Eq,Debug)]
pub enum Opcode {
    ReadIpl = 0x02,
    Nop = 0x03,
    Sense = 0x04,
    WriteData = 0x05,
    ReadData = 0x06,
    Seek = 0x07,
    SeekCylinder = 0x0b,
    WriteKeyAndData = 0x0d,
    ReadKeyAndData = 0x0e,
    Erase = 0x11,
    ReadCount = 0x12,
    Recalibrate = 0x13,
    WriteRecordZero = 0x15,
    ReadRecordZero = 0x16,
    WriteHomeAddress = 0x19,
    ReadHomeAddress = 0x1a,
    SeekHead = 0x1b,
    WriteCountKeyAndData = 0x1d,
    ReadCountKeyAndData = 0x1e,
    SetFileMask = 0x1f,
    ReadSector = 0x22,
    SetSector = 0x23,
    SearchKeyEqual = 0x29,
    SearchIdEqual = 0x31,
    SearchHomeAddressEqual = 0x39,
    SearchKeyHigh = 0x49,
    SearchIdHigh = 0x51,
    ReadMultipleCountKeyAndData = 0x5e,
    SearchKeyEqualHigh = 0x69,
    SearchIdEqualHigh = 0x71,
    SenseId = 0xe4
}

/// Reasons a command ends in unit check, each maps to a sense pattern
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("command reject")]
    CommandReject,
    #[error("no track selected or seek address invalid")]
    SeekCheck,
    #[error("seek not permitted by file mask")]
    SeekNotPermitted,
    #[error("write not permitted by file mask")]
    FileProtected,
    #[error("drive is write protected")]
    WriteInhibited,
    #[error("no record found")]
    NoRecordFound,
    #[error("equipment check")]
    EquipmentCheck
}

/// Moves bytes between the device and channel memory for one command.
/// The requested count belongs to the implementor.
pub trait Transfer {
    /// Device to memory.  At most the requested count is stored.
    /// Returns the residual, requested count minus `src.len()`.
    fn put(&mut self,src: &[u8]) -> i32;
    /// Memory to device, for a device that can take `max` bytes.  At most the
    /// requested count is returned, along with the residual, requested count minus `max`.
    fn fetch(&mut self,max: usize) -> (Vec<u8>,i32);
}

/// Transfer backed by a plain buffer
pub struct MemoryTransfer {
    requested: usize,
    data: Vec<u8>
}

impl MemoryTransfer {
    /// For commands that move data into memory
    pub fn to_memory(requested: usize) -> Self {
        Self { requested, data: Vec::new() }
    }
    /// For commands that take data from memory, the requested count is the length of `data`
    pub fn from_memory(data: &[u8]) -> Self {
        Self { requested: data.len(), data: data.to_vec() }
    }
    pub fn requested(&self) -> usize {
        self.requested
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Transfer for MemoryTransfer {
    fn put(&mut self,src: &[u8]) -> i32 {
        let n = usize::min(src.len(),self.requested);
        self.data = src[0..n].to_vec();
        self.requested as i32 - src.len() as i32
    }
    fn fetch(&mut self,max: usize) -> (Vec<u8>,i32) {
        let n = usize::min(usize::min(max,self.requested),self.data.len());
        (self.data[0..n].to_vec(),self.requested as i32 - max as i32)
    }
}

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum State {
    NoCurrentTrack,
    PositionedOnTrack { cylinder: usize, head: usize }
}

pub struct CkdDevice {
    drive: SharedDrive,
    state: State,
    mask: FileMask,
    sense: Sense,
    sector: u8,
    residual: i32,
    unit: u8
}

impl CkdDevice {
    pub fn new(drive: SharedDrive) -> Self {
        Self {
            drive,
            state: State::NoCurrentTrack,
            mask: FileMask::default(),
            sense: Sense::new(),
            sector: 0,
            residual: 0,
            unit: 0
        }
    }
    /// Physical drive number reported in sense byte 4
    pub fn set_unit(&mut self,unit: u8) {
        self.unit = unit;
    }
    pub fn unit(&self) -> u8 {
        self.unit
    }
    pub fn drive(&self) -> SharedDrive {
        std::rc::Rc::clone(&self.drive)
    }
    pub fn state(&self) -> State {
        self.state
    }
    pub fn file_mask(&self) -> FileMask {
        self.mask
    }
    /// Residual count of the last command's transfer
    pub fn residual(&self) -> i32 {
        self.residual
    }
    pub fn sense_byte(&self,idx: usize) -> u8 {
        self.sense.get(idx)
    }
    /// The file mask only lasts for one channel program
    pub fn end_of_chain(&mut self) {
        self.mask = FileMask::default();
    }
    /// Back to the power-on state
    pub fn reset(&mut self) {
        self.state = State::NoCurrentTrack;
        self.mask = FileMask::default();
        self.sense.clear();
        self.sector = 0;
    }
    fn position(&self) -> Option<(usize,usize)> {
        match self.state {
            State::NoCurrentTrack => None,
            State::PositionedOnTrack { cylinder, head } => Some((cylinder,head))
        }
    }
    /// Run one channel command
    pub fn execute(&mut self,opcode: u8,requested: usize,xfer: &mut dyn Transfer) -> Status {
        trace!("command {:02X} count {}",opcode,requested);
        self.residual = 0;
        let result = match Opcode::from_u8(opcode) {
            Some(op) => self.dispatch(op,requested,xfer),
            None => {
                debug!("unhandled opcode {:02X}",opcode);
                Err(Box::new(Error::CommandReject) as DYNERR)
            }
        };
        match result {
            Ok(status) => {
                trace!("status {}",status);
                status
            },
            Err(e) => self.unit_check(e)
        }
    }
    fn unit_check(&mut self,err: DYNERR) -> Status {
        let (byte0,byte1) = match (err.downcast_ref::<Error>(),err.downcast_ref::<dasd::Error>()) {
            (Some(e),_) => match e {
                Error::CommandReject => (COMMAND_REJECT,0),
                Error::SeekCheck => (COMMAND_REJECT | SEEK_CHECK,0),
                Error::SeekNotPermitted => (COMMAND_REJECT | SEEK_CHECK,FILE_PROTECTED),
                Error::FileProtected => (COMMAND_REJECT,FILE_PROTECTED),
                Error::WriteInhibited => (COMMAND_REJECT,WRITE_INHIBITED),
                Error::NoRecordFound => (0,NO_RECORD_FOUND),
                Error::EquipmentCheck => (EQUIPMENT_CHECK,0)
            },
            (None,Some(e)) => match e {
                dasd::Error::RecordNotFound => (0,NO_RECORD_FOUND),
                dasd::Error::TrackOverflow => (0,INVALID_TRACK_FORMAT),
                dasd::Error::InvalidRecordZeroAccess | dasd::Error::NotFormatting => (COMMAND_REJECT,0),
                _ => {
                    error!("storage fault: {}",e);
                    (EQUIPMENT_CHECK,0)
                }
            },
            _ => {
                error!("unexpected fault: {}",err);
                (EQUIPMENT_CHECK,0)
            }
        };
        debug!("unit check: {}",err);
        self.sense.set(byte0,byte1,self.unit,self.position());
        Status::done() | Status::UNIT_CHECK
    }
    fn dispatch(&mut self,op: Opcode,requested: usize,xfer: &mut dyn Transfer) -> Result<Status,DYNERR> {
        let ok = Status::done();
        let ok_any_len = Status::done() | Status::INCORRECT_LENGTH_IS_OK;
        match op {
            Opcode::Nop => Ok(ok),
            Opcode::Sense => {
                self.residual = xfer.put(&self.sense.bytes());
                self.sense.clear();
                Ok(ok_any_len)
            },
            Opcode::SenseId => {
                let typ = self.drive.borrow().drive_type();
                let [cu1,cu0] = u16::to_be_bytes(typ.control_unit);
                let [d1,d0] = u16::to_be_bytes(typ.device_type());
                self.residual = xfer.put(&[0xff,cu1,cu0,CU_MODEL,d1,d0,typ.model]);
                Ok(ok_any_len)
            },
            Opcode::Seek | Opcode::SeekCylinder | Opcode::SeekHead | Opcode::Recalibrate => {
                let access = match op {
                    Opcode::SeekCylinder => Access::SeekCylinder,
                    Opcode::SeekHead => Access::SeekHead,
                    _ => Access::Seek
                };
                let ans = match op {
                    Opcode::Recalibrate => self.recalibrate(),
                    _ => self.seek(access,xfer)
                };
                if ans.is_err() {
                    self.state = State::NoCurrentTrack;
                }
                ans
            },
            Opcode::SetFileMask => {
                let (dat,res) = xfer.fetch(1);
                self.residual = res;
                if dat.len() < 1 {
                    return Err(Box::new(Error::CommandReject));
                }
                match FileMask::try_from(dat[0]) {
                    Ok(mask) => {
                        debug!("file mask {}",mask);
                        self.mask = mask;
                        Ok(ok)
                    },
                    Err(e) => {
                        debug!("file mask {:02X}: {}",dat[0],e);
                        Err(Box::new(Error::CommandReject))
                    }
                }
            },
            Opcode::SetSector => {
                let (dat,res) = xfer.fetch(1);
                self.residual = res;
                if dat.len() < 1 {
                    return Err(Box::new(Error::CommandReject));
                }
                self.sector = dat[0];
                Ok(ok)
            },
            Opcode::ReadSector => {
                self.residual = xfer.put(&[self.sector]);
                Ok(ok)
            },
            Opcode::ReadIpl => {
                self.move_to(0,0)?;
                self.read(xfer,|trk| match trk.search_id_equal(1) {
                    true => trk.read_data(),
                    false => Err(Box::new(dasd::Error::RecordNotFound))
                })
            },
            Opcode::ReadData => self.read(xfer,|trk| trk.read_data()),
            Opcode::ReadKeyAndData => self.read(xfer,|trk| trk.read_key_and_data()),
            Opcode::ReadCountKeyAndData => self.read(xfer,|trk| trk.read_count_key_and_data()),
            Opcode::ReadCount => self.read(xfer,|trk| trk.read_count()),
            Opcode::ReadRecordZero => self.read(xfer,|trk| Ok(trk.read_record_zero())),
            Opcode::ReadHomeAddress => self.read(xfer,|trk| Ok(trk.read_home_address())),
            Opcode::ReadMultipleCountKeyAndData => self.read(xfer,|trk| trk.read_multiple_count_key_and_data()),
            Opcode::SearchIdEqual => self.search_id(xfer,true,false),
            Opcode::SearchIdHigh => self.search_id(xfer,false,true),
            Opcode::SearchIdEqualHigh => self.search_id(xfer,true,true),
            Opcode::SearchKeyEqual => self.search_key(requested,xfer,true,false),
            Opcode::SearchKeyHigh => self.search_key(requested,xfer,false,true),
            Opcode::SearchKeyEqualHigh => self.search_key(requested,xfer,true,true),
            Opcode::SearchHomeAddressEqual => {
                self.require_track()?;
                let (dat,res) = xfer.fetch(SEARCH_HA_LEN);
                self.residual = res;
                let found = self.on_track(false,|trk| Ok(trk.search_home_address(&dat)))?;
                self.search_result(found)
            },
            Opcode::WriteData => self.write(Access::Update,xfer,|trk| trk.update_len(false),|trk,dat| trk.write_data(dat)),
            Opcode::WriteKeyAndData => self.write(Access::Update,xfer,|trk| trk.update_len(true),|trk,dat| trk.write_key_and_data(dat)),
            Opcode::WriteRecordZero => self.write(Access::HomeAddress,xfer,|_| Ok(R0_LEN),|trk,dat| trk.write_record_zero(dat)),
            Opcode::WriteHomeAddress => self.write(Access::HomeAddress,xfer,|_| Ok(HA_LEN),|trk,dat| trk.write_home_address(dat)),
            Opcode::WriteCountKeyAndData => {
                self.check_write(Access::Format)?;
                // the count comes with the data, so the length the device takes is only known after the fetch
                let (dat,_) = xfer.fetch(requested);
                if dat.len() < COUNT_LEN {
                    debug!("format write with only {} bytes",dat.len());
                    self.residual = requested as i32 - COUNT_LEN as i32;
                    return Err(Box::new(Error::CommandReject));
                }
                let record = dat[4] as u16;
                let key_len = dat[5] as usize;
                let data_len = u16::from_be_bytes([dat[6],dat[7]]) as usize;
                self.residual = requested as i32 - (COUNT_LEN + key_len + data_len) as i32;
                trace!("format record {} key {} data {}",record,key_len,data_len);
                self.on_track(true,|trk| {
                    trk.begin_format()?;
                    trk.append_count_key_and_data(record,key_len,data_len,&dat[COUNT_LEN..])
                })?;
                Ok(ok_any_len)
            },
            Opcode::Erase => {
                self.check_write(Access::Format)?;
                self.on_track(true,|trk| trk.begin_format())?;
                Ok(ok)
            }
        }
    }
    fn require_track(&self) -> Result<(usize,usize),DYNERR> {
        match self.position() {
            Some(p) => Ok(p),
            None => Err(Box::new(Error::SeekCheck))
        }
    }
    /// Run `f` on the current track, unpacking it first.
    fn on_track<T,F>(&mut self,modify: bool,f: F) -> Result<T,DYNERR> where F: FnOnce(&mut Track) -> Result<T,DYNERR> {
        let (cyl,head) = self.require_track()?;
        let mut drive = self.drive.borrow_mut();
        let (ans,changed) = match drive.access_track(cyl,head) {
            Ok(trk) => {
                let was_dirty = trk.is_dirty();
                let ans = f(trk);
                let changed = ans.is_ok() || (!was_dirty && trk.is_dirty());
                (ans,changed)
            },
            Err(e) => {
                error!("cannot access track {}/{}: {}",cyl,head,e);
                return Err(Box::new(Error::EquipmentCheck));
            }
        };
        if modify && changed {
            drive.mark_modified();
        }
        ans
    }
    fn move_to(&mut self,cylinder: usize,head: usize) -> STDRESULT {
        if let Err(e) = self.drive.borrow().track_index(cylinder,head) {
            debug!("seek {}/{}: {}",cylinder,head,e);
            self.state = State::NoCurrentTrack;
            return Err(Box::new(Error::SeekCheck));
        }
        self.state = State::PositionedOnTrack { cylinder, head };
        self.on_track(false,|trk| {
            trk.reset_position();
            Ok(())
        })
    }
    fn recalibrate(&mut self) -> Result<Status,DYNERR> {
        if !self.mask.allows(Access::Seek) {
            return Err(Box::new(Error::SeekNotPermitted));
        }
        self.move_to(0,0)?;
        Ok(Status::done())
    }
    /// Seek data is BBCCHH, BB must be zero
    fn seek(&mut self,access: Access,xfer: &mut dyn Transfer) -> Result<Status,DYNERR> {
        let (dat,res) = xfer.fetch(SEEK_LEN);
        self.residual = res;
        if dat.len() < SEEK_LEN || dat[0]!=0 || dat[1]!=0 {
            return Err(Box::new(Error::CommandReject));
        }
        if !self.mask.allows(access) {
            return Err(Box::new(Error::SeekNotPermitted));
        }
        let head = u16::from_be_bytes([dat[4],dat[5]]) as usize;
        let cylinder = match access {
            Access::SeekHead => self.require_track()?.0,
            _ => u16::from_be_bytes([dat[2],dat[3]]) as usize
        };
        self.move_to(cylinder,head)?;
        Ok(Status::done())
    }
    fn read<F>(&mut self,xfer: &mut dyn Transfer,f: F) -> Result<Status,DYNERR> where F: FnOnce(&mut Track) -> Result<Vec<u8>,DYNERR> {
        let dat = self.on_track(false,f)?;
        self.residual = xfer.put(&dat);
        Ok(Status::done())
    }
    fn search_result(&self,found: bool) -> Result<Status,DYNERR> {
        match found {
            true => Ok(Status::done() | Status::STATUS_MODIFIER | Status::INCORRECT_LENGTH_IS_OK),
            false => Err(Box::new(Error::NoRecordFound))
        }
    }
    /// Compares the record number (the R of CCHHR).  Less than 5 bytes of search argument
    /// modifies status without comparing, which skips the next command.
    fn search_id(&mut self,xfer: &mut dyn Transfer,equal: bool,high: bool) -> Result<Status,DYNERR> {
        self.require_track()?;
        let (dat,res) = xfer.fetch(SEARCH_ID_LEN);
        self.residual = res;
        if dat.len() < SEARCH_ID_LEN {
            debug!("search id argument has {} bytes, skipping compare",dat.len());
            return Ok(Status::done() | Status::STATUS_MODIFIER | Status::INCORRECT_LENGTH_IS_OK);
        }
        let id = dat[4] as u16;
        let found = self.on_track(false,|trk| Ok((equal && trk.search_id_equal(id)) || (high && trk.search_id_high(id))))?;
        self.search_result(found)
    }
    fn search_key(&mut self,requested: usize,xfer: &mut dyn Transfer,equal: bool,high: bool) -> Result<Status,DYNERR> {
        self.require_track()?;
        let (key,res) = xfer.fetch(requested);
        self.residual = res;
        let found = self.on_track(false,|trk| Ok(match trk.search_key(&key,equal,high)? {
            true => trk.found_key_len(),
            false => None
        }))?;
        if let Some(key_len) = found {
            self.residual = requested as i32 - key_len as i32;
        }
        self.search_result(found.is_some())
    }
    fn check_write(&self,access: Access) -> STDRESULT {
        self.require_track()?;
        if self.drive.borrow().is_read_only() {
            return Err(Box::new(Error::WriteInhibited));
        }
        if !self.mask.allows(access) {
            debug!("{:?} write refused by file mask {}",access,self.mask);
            return Err(Box::new(Error::FileProtected));
        }
        Ok(())
    }
    /// Update or home address write, `len` tells how many bytes the target can take
    fn write<L,F>(&mut self,access: Access,xfer: &mut dyn Transfer,len: L,f: F) -> Result<Status,DYNERR>
    where L: FnOnce(&mut Track) -> Result<usize,DYNERR>, F: FnOnce(&mut Track,&[u8]) -> STDRESULT {
        self.check_write(access)?;
        let max = self.on_track(false,len)?;
        let (dat,res) = xfer.fetch(max);
        self.residual = res;
        self.on_track(true,|trk| f(trk,&dat))?;
        Ok(Status::done() | Status::INCORRECT_LENGTH_IS_OK)
    }
}

#[cfg(test)]
fn test_device() -> CkdDevice {
    let drive = crate::dasd::Drive::create(crate::dasd::names::D3330,5,"UNIT").unwrap();
    CkdDevice::new(std::rc::Rc::new(std::cell::RefCell::new(drive)))
}

#[cfg(test)]
fn run(dev: &mut CkdDevice,opcode: u8,dat: &[u8]) -> Status {
    dev.execute(opcode,dat.len(),&mut MemoryTransfer::from_memory(dat))
}

#[test]
fn test_seek_states() {
    let mut dev = test_device();
    assert_eq!(dev.state(),State::NoCurrentTrack);
    let status = dev.execute(0x06,10,&mut MemoryTransfer::to_memory(10));
    assert!(status.contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT | SEEK_CHECK);
    assert_eq!(run(&mut dev,0x07,&[0,0,0,4,0,18]),Status::done());
    assert_eq!(dev.state(),State::PositionedOnTrack { cylinder: 4, head: 18 });
    assert_eq!(run(&mut dev,0x1b,&[0,0,0,0,0,3]),Status::done());
    assert_eq!(dev.state(),State::PositionedOnTrack { cylinder: 4, head: 3 });
    let status = run(&mut dev,0x07,&[0,0,0,5,0,0]);
    assert!(status.contains(Status::UNIT_CHECK));
    assert_eq!(dev.state(),State::NoCurrentTrack);
    assert!(run(&mut dev,0x07,&[0,1,0,0,0,0]).contains(Status::UNIT_CHECK));
    assert!(run(&mut dev,0x07,&[0,0,0]).contains(Status::UNIT_CHECK));
    assert_eq!(dev.execute(0x13,0,&mut MemoryTransfer::to_memory(0)),Status::done());
    assert_eq!(dev.state(),State::PositionedOnTrack { cylinder: 0, head: 0 });
}

#[test]
fn test_sense_resets() {
    let mut dev = test_device();
    assert!(dev.execute(0x86,0,&mut MemoryTransfer::to_memory(0)).contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT);
    let mut xfer = MemoryTransfer::to_memory(SENSE_LEN);
    assert_eq!(dev.execute(0x04,SENSE_LEN,&mut xfer),Status::done() | Status::INCORRECT_LENGTH_IS_OK);
    assert_eq!(xfer.data()[0],COMMAND_REJECT);
    assert_eq!(dev.sense_byte(0),0);
    assert_eq!(dev.sense_byte(100),0);
    let mut xfer = MemoryTransfer::to_memory(7);
    dev.execute(0xe4,7,&mut xfer);
    assert_eq!(xfer.data(),&[0xff,0x38,0x30,CU_MODEL,0x33,0x30,0x01]);
    assert_eq!(dev.residual(),0);
}

#[test]
fn test_file_mask_seek() {
    let mut dev = test_device();
    assert_eq!(run(&mut dev,0x1f,&[0x10]),Status::done());
    let status = run(&mut dev,0x07,&[0,0,0,1,0,1]);
    assert!(status.contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT | SEEK_CHECK);
    assert_eq!(dev.sense_byte(1),FILE_PROTECTED);
    // bad mask leaves the old one in place
    assert!(run(&mut dev,0x1f,&[0x01]).contains(Status::UNIT_CHECK));
    assert_eq!(dev.file_mask().raw(),0x10);
    dev.end_of_chain();
    assert_eq!(run(&mut dev,0x07,&[0,0,0,1,0,1]),Status::done());
}
