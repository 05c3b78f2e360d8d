// test of channel commands against an emulated drive
use std::cell::RefCell;
use std::rc::Rc;
use ckdkit::dasd::{Drive,names};
use ckdkit::device::{CkdDevice,MemoryTransfer,Opcode,State};
use ckdkit::device::status::*;
use ckdkit::device::registry::DriveRegistry;

fn new_device(cylinders: usize) -> CkdDevice {
    let drive = Drive::create(names::D3350,cylinders,"TESTER").expect("could not create drive");
    CkdDevice::new(Rc::new(RefCell::new(drive)))
}

/// run a command that takes data from memory
fn write_cmd(dev: &mut CkdDevice,op: Opcode,dat: &[u8]) -> Status {
    dev.execute(op as u8,dat.len(),&mut MemoryTransfer::from_memory(dat))
}

/// run a command that puts data into memory
fn read_cmd(dev: &mut CkdDevice,op: Opcode,count: usize) -> (Status,Vec<u8>) {
    let mut xfer = MemoryTransfer::to_memory(count);
    let status = dev.execute(op as u8,count,&mut xfer);
    (status,xfer.data().to_vec())
}

fn seek(dev: &mut CkdDevice,cyl: u16,head: u16) {
    let [c1,c0] = cyl.to_be_bytes();
    let [h1,h0] = head.to_be_bytes();
    assert_eq!(write_cmd(dev,Opcode::Seek,&[0,0,c1,c0,h1,h0]),Status::done());
}

fn ckd(cyl: u16,head: u16,rec: u8,key: &[u8],dat: &[u8]) -> Vec<u8> {
    let [c1,c0] = cyl.to_be_bytes();
    let [h1,h0] = head.to_be_bytes();
    let [d1,d0] = (dat.len() as u16).to_be_bytes();
    let mut ans = vec![c1,c0,h1,h0,rec,key.len() as u8,d1,d0];
    ans.extend_from_slice(key);
    ans.extend_from_slice(dat);
    ans
}

fn search_id(dev: &mut CkdDevice,cyl: u16,head: u16,rec: u8) -> Status {
    let [c1,c0] = cyl.to_be_bytes();
    let [h1,h0] = head.to_be_bytes();
    write_cmd(dev,Opcode::SearchIdEqual,&[c1,c0,h1,h0,rec])
}

fn found() -> Status {
    Status::done() | Status::STATUS_MODIFIER | Status::INCORRECT_LENGTH_IS_OK
}

#[test]
fn write_then_read() {
    let mut dev = new_device(10);
    seek(&mut dev,7,12);
    let pattern: Vec<u8> = (0..64).collect();
    let status = write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(7,12,1,&[],&pattern));
    assert_eq!(status,Status::done() | Status::INCORRECT_LENGTH_IS_OK);
    let status = write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(7,12,2,b"KEY",b"SECOND"));
    assert_eq!(status,Status::done() | Status::INCORRECT_LENGTH_IS_OK);
    dev.end_of_chain();

    seek(&mut dev,7,12);
    assert_eq!(search_id(&mut dev,7,12,1),found());
    let (status,dat) = read_cmd(&mut dev,Opcode::ReadData,100);
    assert_eq!(status,Status::done());
    assert_eq!(dat,pattern);
    assert_eq!(dev.residual(),36);
    // the next record follows without searching
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadCountKeyAndData,100);
    assert_eq!(dat,ckd(7,12,2,b"KEY",b"SECOND"));

    // update the first record in place
    assert_eq!(search_id(&mut dev,7,12,1),found());
    assert_eq!(write_cmd(&mut dev,Opcode::WriteData,&[1,2,3]),Status::done() | Status::INCORRECT_LENGTH_IS_OK);
    assert_eq!(search_id(&mut dev,7,12,1),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadData,8);
    assert_eq!(dat,vec![1,2,3,0,0,0,0,0]);
    assert_eq!(dev.residual(),8-64);

    let drive = dev.drive();
    assert_eq!(drive.borrow().track(7,12).unwrap().count_areas().len(),2);
    assert!(drive.borrow().is_modified());
}

#[test]
fn missing_record() {
    let mut dev = new_device(2);
    seek(&mut dev,1,3);
    let status = search_id(&mut dev,1,3,1);
    assert_eq!(status,Status::done() | Status::UNIT_CHECK);
    assert_eq!(dev.sense_byte(0),0);
    assert_eq!(dev.sense_byte(1),NO_RECORD_FOUND);
    assert_eq!(dev.sense_byte(5),1);
    assert_eq!(dev.sense_byte(6),3);
    // short argument skips the compare
    assert_eq!(write_cmd(&mut dev,Opcode::SearchIdEqual,&[0,1,0]),found());
}

#[test]
fn format_forbidden() {
    let mut dev = new_device(2);
    seek(&mut dev,0,5);
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,5,1,&[],b"KEEP ME"));
    dev.end_of_chain();

    // update writes only
    assert_eq!(write_cmd(&mut dev,Opcode::SetFileMask,&[0x80]),Status::done());
    seek(&mut dev,0,5);
    assert_eq!(search_id(&mut dev,0,5,1),found());
    let status = write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,5,2,&[],b"NOT ALLOWED"));
    assert!(status.contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT);
    assert_eq!(dev.sense_byte(1),FILE_PROTECTED);
    assert!(write_cmd(&mut dev,Opcode::Erase,&[]).contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(1),FILE_PROTECTED);

    // track is untouched and update writes still go through
    assert_eq!(dev.drive().borrow().track(0,5).unwrap().count_areas().len(),1);
    assert_eq!(search_id(&mut dev,0,5,1),found());
    assert_eq!(write_cmd(&mut dev,Opcode::WriteData,b"UPDATED"),Status::done() | Status::INCORRECT_LENGTH_IS_OK);
    assert_eq!(search_id(&mut dev,0,5,1),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadData,7);
    assert_eq!(dat,b"UPDATED");
}

#[test]
fn search_key_high() {
    let mut dev = new_device(1);
    seek(&mut dev,0,0);
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,0,1,b"ABC",b"DAT1"));
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,0,2,b"ABD",b"DAT2"));
    seek(&mut dev,0,0);
    assert_eq!(write_cmd(&mut dev,Opcode::SearchKeyHigh,b"ABC"),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadData,4);
    assert_eq!(dat,b"DAT2");
    assert_eq!(write_cmd(&mut dev,Opcode::SearchKeyEqual,b"ABC"),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadData,4);
    assert_eq!(dat,b"DAT1");
    assert_eq!(write_cmd(&mut dev,Opcode::SearchKeyEqualHigh,b"ABD"),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadKeyAndData,7);
    assert_eq!(dat,b"ABDDAT2");
    assert!(write_cmd(&mut dev,Opcode::SearchKeyHigh,b"ABD").contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(1),NO_RECORD_FOUND);
    assert!(write_cmd(&mut dev,Opcode::SearchKeyEqual,b"AB").contains(Status::UNIT_CHECK));
}

#[test]
fn write_protect() {
    let mut dev = new_device(1);
    dev.drive().borrow_mut().set_read_only(true);
    seek(&mut dev,0,1);
    let status = write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,1,1,&[],b"X"));
    assert_eq!(status,Status::done() | Status::UNIT_CHECK);
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT);
    assert_eq!(dev.sense_byte(1),WRITE_INHIBITED);
    // reads are fine
    let (status,dat) = read_cmd(&mut dev,Opcode::ReadHomeAddress,5);
    assert_eq!(status,Status::done());
    assert_eq!(dat,vec![0,0,0,0,1]);
}

#[test]
fn home_address_needs_permission() {
    let mut dev = new_device(1);
    seek(&mut dev,0,2);
    // default mask inhibits HA and R0 writes
    assert!(write_cmd(&mut dev,Opcode::WriteRecordZero,&[0,0,0,2,0,0,0,8]).contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(1),FILE_PROTECTED);
    assert_eq!(write_cmd(&mut dev,Opcode::SetFileMask,&[0xc0]),Status::done());
    assert_eq!(write_cmd(&mut dev,Opcode::WriteRecordZero,&[0,0,0,2,0,0,0,8,9,9]),Status::done() | Status::INCORRECT_LENGTH_IS_OK);
    let (_,r0) = read_cmd(&mut dev,Opcode::ReadRecordZero,16);
    assert_eq!(r0,vec![0,0,0,2,0,0,0,8,9,9,0,0,0,0,0,0]);
}

#[test]
fn read_ipl() {
    let mut dev = new_device(3);
    seek(&mut dev,0,0);
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,0,1,&[],&[0x02,0,0,0x18,0x60,0,0,0x18]));
    seek(&mut dev,2,29);
    let (status,dat) = read_cmd(&mut dev,Opcode::ReadIpl,24);
    assert_eq!(status,Status::done());
    assert_eq!(dat,vec![0x02,0,0,0x18,0x60,0,0,0x18]);
    assert_eq!(dev.state(),State::PositionedOnTrack { cylinder: 0, head: 0 });
}

#[test]
fn sense_id() {
    let mut dev = new_device(1);
    let (status,dat) = read_cmd(&mut dev,Opcode::SenseId,7);
    assert_eq!(status,Status::done() | Status::INCORRECT_LENGTH_IS_OK);
    assert_eq!(dat,vec![0xff,0x38,0x30,0x01,0x33,0x50,0x00]);
}

#[test]
fn linked_drive_is_shared() {
    let mut reg = DriveRegistry::new();
    let drive = Drive::create(names::D3330,2,"SHARED").expect("could not create drive");
    let owner = reg.attach("maint",0x191,drive).expect("attach failed");
    let linked = reg.link("MAINT",0x191,"cmsuser",0x291).expect("link failed");
    assert_eq!(reg.link_count("maint",0x191).unwrap(),2);
    assert_eq!(reg.list(),vec!["CMSUSER.291".to_string(),"MAINT.191".to_string()]);

    let mut writer = CkdDevice::new(owner);
    let mut reader = CkdDevice::new(linked);
    seek(&mut writer,1,1);
    write_cmd(&mut writer,Opcode::WriteCountKeyAndData,&ckd(1,1,1,&[],b"HELLO"));
    seek(&mut reader,1,1);
    assert_eq!(search_id(&mut reader,1,1,1),found());
    let (_,dat) = read_cmd(&mut reader,Opcode::ReadData,5);
    assert_eq!(dat,b"HELLO");

    reg.detach("MAINT",0x191).expect("detach failed");
    assert!(reg.get("MAINT",0x191).unwrap().is_none());
    assert_eq!(reg.link_count("CMSUSER",0x291).unwrap(),1);
}

#[test]
fn write_residuals() {
    let mut dev = new_device(1);
    seek(&mut dev,0,1);
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,1,1,b"K",b"DATA"));
    assert_eq!(dev.residual(),0);
    // bytes past the count's key and data are left over
    let mut long = ckd(0,1,2,&[],b"MORE");
    long.extend_from_slice(&[7,7]);
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&long);
    assert_eq!(dev.residual(),2);

    assert_eq!(search_id(&mut dev,0,1,1),found());
    write_cmd(&mut dev,Opcode::WriteData,b"AB");
    assert_eq!(dev.residual(),-2);
    assert_eq!(search_id(&mut dev,0,1,1),found());
    write_cmd(&mut dev,Opcode::WriteData,b"ABCDEF");
    assert_eq!(dev.residual(),2);
    assert_eq!(search_id(&mut dev,0,1,1),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadData,4);
    assert_eq!(dat,b"ABCD");

    assert_eq!(search_id(&mut dev,0,1,1),found());
    write_cmd(&mut dev,Opcode::WriteKeyAndData,b"ZWXYZ");
    assert_eq!(dev.residual(),0);
    assert_eq!(write_cmd(&mut dev,Opcode::SearchKeyEqual,b"Z"),found());
    assert_eq!(dev.residual(),0);

    assert_eq!(write_cmd(&mut dev,Opcode::SetFileMask,&[0xc0]),Status::done());
    write_cmd(&mut dev,Opcode::WriteRecordZero,&[0,0,0,1,0,0,0,8]);
    assert_eq!(dev.residual(),-8);
}

#[test]
fn search_id_high_variants() {
    let mut dev = new_device(1);
    seek(&mut dev,0,0);
    for rec in [1,3,5] {
        write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,0,rec,&[],&[b'R',b'0'+rec]));
    }
    seek(&mut dev,0,0);
    assert_eq!(write_cmd(&mut dev,Opcode::SearchIdHigh,&[0,0,0,0,3]),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadData,2);
    assert_eq!(dat,b"R5");
    // equal is tried before high
    assert_eq!(write_cmd(&mut dev,Opcode::SearchIdEqualHigh,&[0,0,0,0,3]),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadData,2);
    assert_eq!(dat,b"R3");
    assert_eq!(write_cmd(&mut dev,Opcode::SearchIdEqualHigh,&[0,0,0,0,4]),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadData,2);
    assert_eq!(dat,b"R5");
    let status = write_cmd(&mut dev,Opcode::SearchIdHigh,&[0,0,0,0,5]);
    assert_eq!(status,Status::done() | Status::UNIT_CHECK);
    assert_eq!(dev.sense_byte(1),NO_RECORD_FOUND);
    assert_eq!(write_cmd(&mut dev,Opcode::SearchIdEqualHigh,&[0,0,0,0,5]),found());
}

#[test]
fn write_key_and_data() {
    let mut dev = new_device(1);
    seek(&mut dev,0,2);
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,2,1,b"OLD",b"DATA"));
    assert_eq!(search_id(&mut dev,0,2,1),found());
    let status = write_cmd(&mut dev,Opcode::WriteKeyAndData,b"NEWDAT");
    assert_eq!(status,Status::done() | Status::INCORRECT_LENGTH_IS_OK);
    assert_eq!(dev.residual(),-1);
    assert_eq!(write_cmd(&mut dev,Opcode::SearchKeyEqual,b"NEW"),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadKeyAndData,7);
    assert_eq!(dat,b"NEWDAT\0");
    assert!(write_cmd(&mut dev,Opcode::SearchKeyEqual,b"OLD").contains(Status::UNIT_CHECK));
}

#[test]
fn short_count_is_rejected() {
    let mut dev = new_device(1);
    seek(&mut dev,0,3);
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,3,1,&[],b"KEEP"));
    assert_eq!(search_id(&mut dev,0,3,1),found());
    let status = write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&[0,0,0,3,2]);
    assert_eq!(status,Status::done() | Status::UNIT_CHECK);
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT);
    assert_eq!(dev.residual(),-3);
    let drive = dev.drive();
    assert_eq!(drive.borrow().track(0,3).unwrap().count_areas().len(),1);
    assert_eq!(search_id(&mut dev,0,3,1),found());
    let (_,dat) = read_cmd(&mut dev,Opcode::ReadData,4);
    assert_eq!(dat,b"KEEP");
}

#[test]
fn seek_masks() {
    let mut dev = new_device(5);
    // cylinder and head seeks only
    assert_eq!(write_cmd(&mut dev,Opcode::SetFileMask,&[0x08]),Status::done());
    assert_eq!(write_cmd(&mut dev,Opcode::SeekCylinder,&[0,0,0,3,0,4]),Status::done());
    assert_eq!(dev.state(),State::PositionedOnTrack { cylinder: 3, head: 4 });
    assert_eq!(write_cmd(&mut dev,Opcode::SeekHead,&[0,0,0,0,0,7]),Status::done());
    assert_eq!(dev.state(),State::PositionedOnTrack { cylinder: 3, head: 7 });
    let status = write_cmd(&mut dev,Opcode::Seek,&[0,0,0,1,0,1]);
    assert_eq!(status,Status::done() | Status::UNIT_CHECK);
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT | SEEK_CHECK);
    assert_eq!(dev.sense_byte(1),FILE_PROTECTED);
    assert_eq!(dev.state(),State::NoCurrentTrack);
    dev.end_of_chain();

    // head seeks only
    seek(&mut dev,1,1);
    assert_eq!(write_cmd(&mut dev,Opcode::SetFileMask,&[0x10]),Status::done());
    assert_eq!(write_cmd(&mut dev,Opcode::SeekHead,&[0,0,0,0,0,2]),Status::done());
    assert_eq!(dev.state(),State::PositionedOnTrack { cylinder: 1, head: 2 });
    let status = write_cmd(&mut dev,Opcode::SeekCylinder,&[0,0,0,2,0,2]);
    assert_eq!(status,Status::done() | Status::UNIT_CHECK);
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT | SEEK_CHECK);
    assert_eq!(dev.sense_byte(1),FILE_PROTECTED);
}

#[test]
fn write_home_address() {
    let mut dev = new_device(1);
    seek(&mut dev,0,4);
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,4,1,&[],b"GONE"));
    let status = write_cmd(&mut dev,Opcode::WriteHomeAddress,&[1,0,0,0,4]);
    assert!(status.contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(1),FILE_PROTECTED);
    assert_eq!(write_cmd(&mut dev,Opcode::SetFileMask,&[0xc0]),Status::done());
    let status = write_cmd(&mut dev,Opcode::WriteHomeAddress,&[1,0,0,0,4]);
    assert_eq!(status,Status::done() | Status::INCORRECT_LENGTH_IS_OK);
    assert_eq!(dev.residual(),0);
    let (_,ha) = read_cmd(&mut dev,Opcode::ReadHomeAddress,5);
    assert_eq!(ha,vec![1,0,0,0,4]);
    let (_,r0) = read_cmd(&mut dev,Opcode::ReadRecordZero,8);
    assert_eq!(r0,vec![0,0,0,4,0,0,0,8]);
    assert_eq!(dev.drive().borrow().track(0,4).unwrap().count_areas().len(),0);
}

#[test]
fn search_home_address() {
    let mut dev = new_device(2);
    dev.set_unit(0x0e);
    seek(&mut dev,1,6);
    assert_eq!(write_cmd(&mut dev,Opcode::SearchHomeAddressEqual,&[0,1,0,6]),found());
    let status = write_cmd(&mut dev,Opcode::SearchHomeAddressEqual,&[0,1,0,7]);
    assert_eq!(status,Status::done() | Status::UNIT_CHECK);
    assert_eq!(dev.sense_byte(1),NO_RECORD_FOUND);
    assert_eq!(dev.sense_byte(4),0x0e);
    assert_eq!(dev.sense_byte(5),1);
    assert_eq!(dev.sense_byte(6),6);
}

#[test]
fn sense_position_high_cylinder() {
    let mut dev = new_device(0x124);
    dev.set_unit(3);
    seek(&mut dev,0x123,5);
    assert!(search_id(&mut dev,0x123,5,1).contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(4),3);
    assert_eq!(dev.sense_byte(5),0x23);
    assert_eq!(dev.sense_byte(6),(1 << 5) | 5);
}

#[test]
fn set_and_read_sector() {
    let mut dev = new_device(1);
    assert_eq!(write_cmd(&mut dev,Opcode::SetSector,&[0x2a]),Status::done());
    let (status,dat) = read_cmd(&mut dev,Opcode::ReadSector,1);
    assert_eq!(status,Status::done());
    assert_eq!(dat,vec![0x2a]);
    assert!(write_cmd(&mut dev,Opcode::SetSector,&[]).contains(Status::UNIT_CHECK));
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT);
}

#[test]
fn erase_under_default_mask() {
    let mut dev = new_device(1);
    seek(&mut dev,0,5);
    for rec in 1..4 {
        write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,5,rec,&[],b"ERASE ME"));
    }
    dev.end_of_chain();
    seek(&mut dev,0,5);
    assert_eq!(search_id(&mut dev,0,5,1),found());
    assert_eq!(write_cmd(&mut dev,Opcode::Erase,&[]),Status::done());
    let drive = dev.drive();
    assert_eq!(drive.borrow().track(0,5).unwrap().count_areas().len(),1);
    assert!(search_id(&mut dev,0,5,2).contains(Status::UNIT_CHECK));
}

#[test]
fn failed_writes_leave_drive_unmodified() {
    let mut dev = new_device(2);
    seek(&mut dev,0,0);
    write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&ckd(0,0,1,&[],b"DATA"));
    let bytes = dev.drive().borrow_mut().to_bytes(false).expect("could not save");
    let loaded = Drive::load(&mut std::io::Cursor::new(bytes),None).expect("could not load");
    assert!(!loaded.is_modified());
    let mut dev = CkdDevice::new(Rc::new(RefCell::new(loaded)));

    // data write while still on Record Zero
    seek(&mut dev,0,0);
    let status = write_cmd(&mut dev,Opcode::WriteData,b"NOPE");
    assert_eq!(status,Status::done() | Status::UNIT_CHECK);
    assert_eq!(dev.sense_byte(0),COMMAND_REJECT);
    assert!(!dev.drive().borrow().is_modified());

    // record too long for the track
    seek(&mut dev,1,0);
    let status = write_cmd(&mut dev,Opcode::WriteCountKeyAndData,&[0,1,0,0,1,0,0xff,0xff,b'X']);
    assert_eq!(status,Status::done() | Status::UNIT_CHECK);
    assert_eq!(dev.sense_byte(1),INVALID_TRACK_FORMAT);
    assert!(!dev.drive().borrow().is_modified());
    assert!(!dev.drive().borrow().track(1,0).unwrap().needs_saving());

    seek(&mut dev,0,0);
    assert_eq!(search_id(&mut dev,0,0,1),found());
    write_cmd(&mut dev,Opcode::WriteData,b"NEW!");
    assert!(dev.drive().borrow().is_modified());
}
