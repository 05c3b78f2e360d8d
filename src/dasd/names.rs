//! ## Drive Names
//!
//! Catalog of the CKD drive models that can be emulated.
//! The geometry is what the host sees: cylinders including alternates,
//! tracks per cylinder, and the longest track in bytes.
//!
//! The CP class and type bytes are what the control program reports for the device,
//! the control unit and model are what Sense ID reports.

use std::fmt;
use std::str::FromStr;

/// CP device class for direct access storage
pub const CLASDASD: u8 = 0x04;

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub struct DriveType {
    pub name: &'static str,
    pub code: u32,
    pub max_cylinders: usize,
    pub heads: usize,
    pub max_track_len: usize,
    pub max_records: usize,
    pub cp_class: u8,
    pub cp_type: u8,
    pub control_unit: u16,
    pub model: u8
}

pub const UNKNOWN: DriveType = DriveType {
    name: "unknown",
    code: 0,
    max_cylinders: 0,
    heads: 0,
    max_track_len: 0,
    max_records: 0,
    cp_class: 0,
    cp_type: 0,
    control_unit: 0,
    model: 0
};

pub const D2314: DriveType = DriveType {
    name: "2314",
    code: 0x2314,
    max_cylinders: 203,
    heads: 20,
    max_track_len: 7294,
    max_records: 26,
    cp_class: CLASDASD,
    cp_type: 0x08,
    control_unit: 0x2314,
    model: 0x01
};

pub const D3330: DriveType = DriveType {
    name: "3330",
    code: 0x3330,
    max_cylinders: 411,
    heads: 19,
    max_track_len: 13030,
    max_records: 55,
    cp_class: CLASDASD,
    cp_type: 0x01,
    control_unit: 0x3830,
    model: 0x01
};

pub const D3330_11: DriveType = DriveType {
    name: "3330-11",
    code: 0x333011,
    max_cylinders: 815,
    heads: 19,
    max_track_len: 13030,
    max_records: 55,
    cp_class: CLASDASD,
    cp_type: 0x01,
    control_unit: 0x3830,
    model: 0x11
};

pub const D3340_35: DriveType = DriveType {
    name: "3340-35",
    code: 0x334035,
    max_cylinders: 349,
    heads: 12,
    max_track_len: 8368,
    max_records: 35,
    cp_class: CLASDASD,
    cp_type: 0x02,
    control_unit: 0x3830,
    model: 0x01
};

pub const D3340_70: DriveType = DriveType {
    name: "3340-70",
    code: 0x334070,
    max_cylinders: 698,
    heads: 12,
    max_track_len: 8368,
    max_records: 35,
    cp_class: CLASDASD,
    cp_type: 0x02,
    control_unit: 0x3830,
    model: 0x02
};

pub const D3350: DriveType = DriveType {
    name: "3350",
    code: 0x3350,
    max_cylinders: 560,
    heads: 30,
    max_track_len: 19069,
    max_records: 75,
    cp_class: CLASDASD,
    cp_type: 0x04,
    control_unit: 0x3830,
    model: 0x00
};

pub const D3375: DriveType = DriveType {
    name: "3375",
    code: 0x3375,
    max_cylinders: 962,
    heads: 12,
    max_track_len: 35616,
    max_records: 104,
    cp_class: CLASDASD,
    cp_type: 0x10,
    control_unit: 0x3880,
    model: 0x02
};

pub const D3380: DriveType = DriveType {
    name: "3380",
    code: 0x3380,
    max_cylinders: 886,
    heads: 15,
    max_track_len: 47476,
    max_records: 102,
    cp_class: CLASDASD,
    cp_type: 0x20,
    control_unit: 0x3880,
    model: 0x02
};

/// All known drive types, in the order they are tried when guessing a type from geometry
pub const CATALOG: [DriveType;8] = [D2314,D3330,D3330_11,D3340_35,D3340_70,D3350,D3375,D3380];

impl DriveType {
    /// Look up by name, case insensitive, unknown names give `UNKNOWN`
    pub fn by_name(name: &str) -> DriveType {
        let lower = name.trim().to_lowercase();
        for typ in CATALOG {
            if typ.name==lower {
                return typ;
            }
        }
        UNKNOWN
    }
    /// Look up by numeric code, unknown codes give `UNKNOWN`
    pub fn by_code(code: u32) -> DriveType {
        for typ in CATALOG {
            if typ.code==code {
                return typ;
            }
        }
        UNKNOWN
    }
    /// Find the first type with the given number of heads that can hold `cylinders` cylinders.
    pub fn by_geometry(heads: usize,cylinders: usize) -> DriveType {
        for typ in CATALOG {
            if typ.heads==heads && cylinders<=typ.max_cylinders {
                return typ;
            }
        }
        UNKNOWN
    }
    pub fn is_unknown(&self) -> bool {
        self.code==0
    }
    /// Device type as reported by Sense ID, e.g. 0x3330 for a 3330-11
    pub fn device_type(&self) -> u16 {
        match self.code > 0xffff {
            true => (self.code >> 8) as u16,
            false => self.code as u16
        }
    }
}

impl fmt::Display for DriveType {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.is_unknown() {
            true => write!(f,"unknown"),
            false => write!(f,"{} ({} cyl x {} trk, {} bytes/trk)",self.name,self.max_cylinders,self.heads,self.max_track_len)
        }
    }
}

/// match command line argument to drive type
impl FromStr for DriveType {
    type Err = super::Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match DriveType::by_name(s) {
            typ if typ.is_unknown() => Err(super::Error::UnknownDriveType),
            typ => Ok(typ)
        }
    }
}

#[test]
fn test_lookup() {
    assert_eq!(DriveType::by_name("3350"),D3350);
    assert_eq!(DriveType::by_name("3330-11"),D3330_11);
    assert_eq!(DriveType::by_code(0x3380),D3380);
    assert_eq!(DriveType::by_name("9999"),UNKNOWN);
    assert_eq!(DriveType::by_code(0x1234),UNKNOWN);
    assert_eq!(UNKNOWN.heads,0);
    assert!(DriveType::from_str("bogus").is_err());
    assert_eq!(D3340_70.device_type(),0x3340);
    assert_eq!(D3380.device_type(),0x3380);
}

#[test]
fn test_geometry_guess() {
    assert_eq!(DriveType::by_geometry(30,100),D3350);
    assert_eq!(DriveType::by_geometry(19,500),D3330_11);
    assert_eq!(DriveType::by_geometry(12,300),D3340_35);
    assert_eq!(DriveType::by_geometry(12,900),D3375);
    assert!(DriveType::by_geometry(7,10).is_unknown());
}
