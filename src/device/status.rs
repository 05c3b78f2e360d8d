//! ## Unit Status and Sense
//!
//! The status word goes back to the channel after every command.  The low byte is the
//! unit status byte of the channel architecture, the `INCORRECT_LENGTH_IS_OK` bit tells the
//! channel that a length mismatch on this command is not an error.
//!
//! Sense bytes explain the last unit check.  They are cleared once a Sense command has
//! transferred them.

use std::fmt;
use std::ops::{BitOr,BitOrAssign};

#[derive(Clone,Copy,PartialEq,Eq,Debug,Default)]
pub struct Status(u16);

impl Status {
    pub const OK: Status = Status(0);
    pub const ATTENTION: Status = Status(0x80);
    pub const STATUS_MODIFIER: Status = Status(0x40);
    pub const CONTROL_UNIT_END: Status = Status(0x20);
    pub const BUSY: Status = Status(0x10);
    pub const CHANNEL_END: Status = Status(0x08);
    pub const DEVICE_END: Status = Status(0x04);
    pub const UNIT_CHECK: Status = Status(0x02);
    pub const UNIT_EXCEPTION: Status = Status(0x01);
    pub const INCORRECT_LENGTH_IS_OK: Status = Status(0x100);

    pub fn bits(&self) -> u16 {
        self.0
    }
    /// The unit status byte without the flags meant for the channel
    pub fn unit_status(&self) -> u8 {
        self.0 as u8
    }
    pub fn contains(&self,other: Status) -> bool {
        self.0 & other.0 == other.0
    }
    /// Channel end and device end, the normal ending of a command
    pub fn done() -> Self {
        Self::CHANNEL_END | Self::DEVICE_END
    }
}

impl BitOr for Status {
    type Output = Status;
    fn bitor(self,rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

impl BitOrAssign for Status {
    fn bitor_assign(&mut self,rhs: Status) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Status {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::ATTENTION,"ATTN"),
            (Self::STATUS_MODIFIER,"SM"),
            (Self::CONTROL_UNIT_END,"CUE"),
            (Self::BUSY,"BUSY"),
            (Self::CHANNEL_END,"CE"),
            (Self::DEVICE_END,"DE"),
            (Self::UNIT_CHECK,"UC"),
            (Self::UNIT_EXCEPTION,"UX"),
            (Self::INCORRECT_LENGTH_IS_OK,"ILI_OK")
        ];
        let set: Vec<&str> = names.iter().filter(|(s,_)| self.contains(*s)).map(|(_,n)| *n).collect();
        match set.len() {
            0 => write!(f,"OK"),
            _ => write!(f,"{}",set.join("+"))
        }
    }
}

pub const SENSE_LEN: usize = 24;

// sense byte 0
pub const COMMAND_REJECT: u8 = 0x80;
pub const INTERVENTION_REQ: u8 = 0x40;
pub const BUS_OUT_CHECK: u8 = 0x20;
pub const EQUIPMENT_CHECK: u8 = 0x10;
pub const DATA_CHECK: u8 = 0x08;
pub const OVERRUN: u8 = 0x04;
pub const TRACK_CONDITION: u8 = 0x02;
pub const SEEK_CHECK: u8 = 0x01;

// sense byte 1
pub const PERMANENT_ERROR: u8 = 0x80;
pub const INVALID_TRACK_FORMAT: u8 = 0x40;
pub const END_OF_CYLINDER: u8 = 0x20;
pub const NO_RECORD_FOUND: u8 = 0x08;
pub const FILE_PROTECTED: u8 = 0x04;
pub const WRITE_INHIBITED: u8 = 0x02;
pub const OPERATION_INCOMPLETE: u8 = 0x01;

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub struct Sense {
    bytes: [u8;SENSE_LEN]
}

impl Sense {
    pub fn new() -> Self {
        Self { bytes: [0;SENSE_LEN] }
    }
    /// Record a failure.  Byte 4 is the physical drive, bytes 5 and 6 the position,
    /// the cylinder's high bits go in the upper 3 bits of byte 6.
    pub fn set(&mut self,byte0: u8,byte1: u8,unit: u8,position: Option<(usize,usize)>) {
        self.bytes = [0;SENSE_LEN];
        self.bytes[0] = byte0;
        self.bytes[1] = byte1;
        self.bytes[4] = unit;
        if let Some((cyl,head)) = position {
            self.bytes[5] = cyl as u8;
            self.bytes[6] = (((cyl >> 8) as u8) << 5) | (head as u8 & 0x1f);
        }
    }
    pub fn clear(&mut self) {
        self.bytes = [0;SENSE_LEN];
    }
    /// Out of range gives 0
    pub fn get(&self,idx: usize) -> u8 {
        match self.bytes.get(idx) {
            Some(b) => *b,
            None => 0
        }
    }
    pub fn bytes(&self) -> [u8;SENSE_LEN] {
        self.bytes
    }
    pub fn is_clear(&self) -> bool {
        self.bytes.iter().all(|b| *b==0)
    }
}

#[test]
fn test_status() {
    let s = Status::done() | Status::STATUS_MODIFIER;
    assert_eq!(s.bits(),0x4c);
    assert!(s.contains(Status::DEVICE_END));
    assert!(!s.contains(Status::UNIT_CHECK));
    assert_eq!(s.to_string(),"SM+CE+DE");
    let mut s = Status::done();
    s |= Status::INCORRECT_LENGTH_IS_OK;
    assert_eq!(s.unit_status(),0x0c);
    assert_eq!(Status::OK.to_string(),"OK");
}

#[test]
fn test_sense_position() {
    let mut sense = Sense::new();
    sense.set(COMMAND_REJECT,FILE_PROTECTED,0x91,Some((0x234,13)));
    assert_eq!(sense.get(0),0x80);
    assert_eq!(sense.get(1),0x04);
    assert_eq!(sense.get(4),0x91);
    assert_eq!(sense.get(5),0x34);
    assert_eq!(sense.get(6),0x40 | 13);
    assert_eq!(sense.get(24),0);
    sense.clear();
    assert!(sense.is_clear());
}

#[test]
fn test_sense_without_track() {
    let mut sense = Sense::new();
    sense.set(COMMAND_REJECT | SEEK_CHECK,0,0x0e,None);
    assert_eq!(sense.get(4),0x0e);
    assert_eq!(sense.get(5),0);
    assert_eq!(sense.get(6),0);
}
