//! ## File Mask
//!
//! The file mask is set by a control command and limits which writes and seeks the rest
//! of the channel program may issue.  Bits 0-1 control writes, bits 3-4 control seeks,
//! the remaining bits must be zero.

use std::fmt;

const WRITE_BITS: u8 = 0xc0;
const SEEK_BITS: u8 = 0x18;
const RESERVED_BITS: u8 = 0x27;

#[derive(thiserror::Error,Debug)]
pub enum MaskError {
    #[error("reserved file mask bits are set")]
    ReservedBits
}

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum WritePermit {
    /// everything except Write Home Address and Write Record Zero
    InhibitHomeAddress,
    InhibitAll,
    /// update writes only, no formatting
    UpdateOnly,
    All
}

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum SeekPermit {
    All,
    CylinderAndHead,
    HeadOnly,
    None
}

/// What a command is trying to do, for checking against the mask
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum Access {
    /// Seek or Recalibrate
    Seek,
    SeekCylinder,
    SeekHead,
    /// Write Data, Write Key and Data
    Update,
    /// Write Count Key and Data, Erase
    Format,
    /// Write Home Address, Write Record Zero
    HomeAddress
}

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub struct FileMask {
    raw: u8
}

impl Default for FileMask {
    fn default() -> Self {
        Self { raw: 0 }
    }
}

impl TryFrom<u8> for FileMask {
    type Error = MaskError;
    fn try_from(raw: u8) -> Result<Self,Self::Error> {
        match raw & RESERVED_BITS {
            0 => Ok(Self { raw }),
            _ => Err(MaskError::ReservedBits)
        }
    }
}

impl FileMask {
    pub fn raw(&self) -> u8 {
        self.raw
    }
    pub fn write_permit(&self) -> WritePermit {
        match self.raw & WRITE_BITS {
            0x00 => WritePermit::InhibitHomeAddress,
            0x40 => WritePermit::InhibitAll,
            0x80 => WritePermit::UpdateOnly,
            _ => WritePermit::All
        }
    }
    pub fn seek_permit(&self) -> SeekPermit {
        match self.raw & SEEK_BITS {
            0x00 => SeekPermit::All,
            0x08 => SeekPermit::CylinderAndHead,
            0x10 => SeekPermit::HeadOnly,
            _ => SeekPermit::None
        }
    }
    pub fn allows(&self,access: Access) -> bool {
        let w = self.write_permit();
        let s = self.seek_permit();
        match access {
            Access::Seek => s==SeekPermit::All,
            Access::SeekCylinder => s==SeekPermit::All || s==SeekPermit::CylinderAndHead,
            Access::SeekHead => s!=SeekPermit::None,
            Access::Update => w!=WritePermit::InhibitAll,
            Access::Format => w==WritePermit::All || w==WritePermit::InhibitHomeAddress,
            Access::HomeAddress => w==WritePermit::All
        }
    }
}

impl fmt::Display for FileMask {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,"{:02X} ({:?} writes, {:?} seeks)",self.raw,self.write_permit(),self.seek_permit())
    }
}

#[test]
fn test_mask_bits() {
    let m = FileMask::default();
    assert!(m.allows(Access::Seek));
    assert!(m.allows(Access::Format));
    assert!(!m.allows(Access::HomeAddress));
    let m = FileMask::try_from(0x80).unwrap();
    assert!(m.allows(Access::Update));
    assert!(!m.allows(Access::Format));
    let m = FileMask::try_from(0x40 | 0x10).unwrap();
    assert!(!m.allows(Access::Update));
    assert!(!m.allows(Access::SeekCylinder));
    assert!(m.allows(Access::SeekHead));
    let m = FileMask::try_from(0xc0 | 0x18).unwrap();
    assert!(m.allows(Access::HomeAddress));
    assert!(!m.allows(Access::SeekHead));
    assert!(FileMask::try_from(0x01).is_err());
    assert!(FileMask::try_from(0x20).is_err());
}
