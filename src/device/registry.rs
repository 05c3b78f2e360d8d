//! ## Drive Registry
//!
//! Virtual machines refer to drives by user and virtual device address (`cuu`).  The same
//! drive may be linked into several machines, so the registry hands out shared handles.
//! Keys take the form `USER.CUU`, user in upper case and cuu as 3 hex digits.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use log::{debug,error};
use crate::dasd::Drive;
use crate::DYNERR;

pub type SharedDrive = Rc<RefCell<Drive>>;

#[derive(thiserror::Error,Debug)]
pub enum RegistryError {
    #[error("a drive is already attached at this address")]
    AlreadyAttached,
    #[error("no drive is attached at this address")]
    NotAttached,
    #[error("user name is empty or too long")]
    BadUser
}

pub struct DriveRegistry {
    drives: BTreeMap<String,SharedDrive>
}

pub fn key(user: &str,cuu: u16) -> Result<String,DYNERR> {
    let user = user.trim();
    if user.len()==0 || user.len()>8 {
        error!("bad user name `{}`",user);
        return Err(Box::new(RegistryError::BadUser));
    }
    Ok(format!("{}.{:03X}",user.to_uppercase(),cuu))
}

impl DriveRegistry {
    pub fn new() -> Self {
        Self { drives: BTreeMap::new() }
    }
    /// Put a drive in the registry, returning the shared handle
    pub fn attach(&mut self,user: &str,cuu: u16,drive: Drive) -> Result<SharedDrive,DYNERR> {
        let k = key(user,cuu)?;
        if self.drives.contains_key(&k) {
            return Err(Box::new(RegistryError::AlreadyAttached));
        }
        debug!("attach {}",k);
        let shared = Rc::new(RefCell::new(drive));
        self.drives.insert(k,Rc::clone(&shared));
        Ok(shared)
    }
    /// Make the drive at `owner.owner_cuu` available as `user.cuu` as well
    pub fn link(&mut self,owner: &str,owner_cuu: u16,user: &str,cuu: u16) -> Result<SharedDrive,DYNERR> {
        let shared = match self.get(owner,owner_cuu)? {
            Some(d) => d,
            None => return Err(Box::new(RegistryError::NotAttached))
        };
        let k = key(user,cuu)?;
        if self.drives.contains_key(&k) {
            return Err(Box::new(RegistryError::AlreadyAttached));
        }
        debug!("link {} to {}.{:03X}",k,owner,owner_cuu);
        self.drives.insert(k,Rc::clone(&shared));
        Ok(shared)
    }
    /// Remove one name for a drive.  The drive itself lives on while any handle exists.
    pub fn detach(&mut self,user: &str,cuu: u16) -> Result<SharedDrive,DYNERR> {
        let k = key(user,cuu)?;
        match self.drives.remove(&k) {
            Some(d) => {
                debug!("detach {}",k);
                Ok(d)
            },
            None => Err(Box::new(RegistryError::NotAttached))
        }
    }
    pub fn get(&self,user: &str,cuu: u16) -> Result<Option<SharedDrive>,DYNERR> {
        let k = key(user,cuu)?;
        Ok(self.drives.get(&k).map(|d| Rc::clone(d)))
    }
    /// Keys in sorted order
    pub fn list(&self) -> Vec<String> {
        self.drives.keys().cloned().collect()
    }
    /// Number of registry entries that share the drive at this address
    pub fn link_count(&self,user: &str,cuu: u16) -> Result<usize,DYNERR> {
        let shared = match self.get(user,cuu)? {
            Some(d) => d,
            None => return Err(Box::new(RegistryError::NotAttached))
        };
        Ok(self.drives.values().filter(|d| Rc::ptr_eq(d,&shared)).count())
    }
}

#[test]
fn test_attach_link_detach() {
    let mut reg = DriveRegistry::new();
    let drive = Drive::create(crate::dasd::names::D3330,1,"SYSRES").unwrap();
    reg.attach("maint",0x190,drive).unwrap();
    assert!(reg.attach("MAINT",0x190,Drive::create(crate::dasd::names::D3330,1,"X").unwrap()).is_err());
    reg.link("maint",0x190,"user1",0x190).unwrap();
    assert_eq!(reg.list(),vec!["MAINT.190".to_string(),"USER1.190".to_string()]);
    assert_eq!(reg.link_count("user1",0x190).unwrap(),2);
    reg.get("user1",0x190).unwrap().unwrap().borrow_mut().set_read_only(true);
    assert!(reg.get("maint",0x190).unwrap().unwrap().borrow().is_read_only());
    reg.detach("maint",0x190).unwrap();
    assert!(reg.get("maint",0x190).unwrap().is_none());
    assert_eq!(reg.get("user1",0x190).unwrap().unwrap().borrow().label(),"SYSRES");
    assert!(reg.link("maint",0x190,"user2",0x191).is_err());
    assert!(reg.detach("nobody",0x100).is_err());
    assert!(key("",0x100).is_err());
}
