//! Read a track or a record by driving the emulated device with channel commands,
//! the same way a channel program would.

use clap;
use std::cell::RefCell;
use std::rc::Rc;
use log::{debug,error};
use crate::device::{CkdDevice,MemoryTransfer,Opcode,Status,SENSE_LEN};
use crate::dasd::COUNT_LEN;
use crate::{STDRESULT,DYNERR};
use super::CommandError;

fn run(dev: &mut CkdDevice,op: Opcode,xfer: &mut MemoryTransfer) -> STDRESULT {
    let status = dev.execute(op as u8,xfer.requested(),xfer);
    debug!("{:?}: {}",op,status);
    if status.contains(Status::UNIT_CHECK) {
        let mut sense = MemoryTransfer::to_memory(SENSE_LEN);
        dev.execute(Opcode::Sense as u8,SENSE_LEN,&mut sense);
        error!("{:?} failed, sense {}",op,hex::encode_upper(&sense.data()[0..4]));
        return Err(Box::new(CommandError::UnitCheck));
    }
    Ok(())
}

fn seek(dev: &mut CkdDevice,cyl: usize,head: usize) -> STDRESULT {
    let [c1,c0] = u16::to_be_bytes(cyl as u16);
    let [h1,h0] = u16::to_be_bytes(head as u16);
    run(dev,Opcode::Seek,&mut MemoryTransfer::from_memory(&[0,0,c1,c0,h1,h0]))
}

/// Data of one record
pub fn get_record(dev: &mut CkdDevice,cyl: usize,head: usize,record: u8) -> Result<Vec<u8>,DYNERR> {
    let max_len = dev.drive().borrow().max_track_len();
    seek(dev,cyl,head)?;
    let [c1,c0] = u16::to_be_bytes(cyl as u16);
    let [h1,h0] = u16::to_be_bytes(head as u16);
    run(dev,Opcode::SearchIdEqual,&mut MemoryTransfer::from_memory(&[c1,c0,h1,h0,record]))?;
    let mut xfer = MemoryTransfer::to_memory(max_len);
    run(dev,Opcode::ReadData,&mut xfer)?;
    Ok(xfer.data().to_vec())
}

/// Home Address, Record Zero, and every record as count, key, and data
pub fn get_track(dev: &mut CkdDevice,cyl: usize,head: usize) -> Result<(Vec<u8>,Vec<u8>,Vec<u8>),DYNERR> {
    let max_len = dev.drive().borrow().max_track_len();
    seek(dev,cyl,head)?;
    let mut ha = MemoryTransfer::to_memory(5);
    run(dev,Opcode::ReadHomeAddress,&mut ha)?;
    let mut r0 = MemoryTransfer::to_memory(16);
    run(dev,Opcode::ReadRecordZero,&mut r0)?;
    let mut ckd = MemoryTransfer::to_memory(max_len + 8*dev.drive().borrow().max_records());
    run(dev,Opcode::ReadMultipleCountKeyAndData,&mut ckd)?;
    Ok((ha.data().to_vec(),r0.data().to_vec(),ckd.data().to_vec()))
}

pub fn get(cmd: &clap::ArgMatches) -> STDRESULT {
    let base = cmd.get_one::<String>("dimg").unwrap();
    let maybe_delta = cmd.get_one::<String>("delta");
    let cyl = *cmd.get_one::<usize>("cylinder").unwrap();
    let head = *cmd.get_one::<usize>("head").unwrap();
    super::check_input(base)?;
    let drive = crate::open_drive(base,maybe_delta.map(|s| s.as_str()))?;
    if cyl >= drive.cylinders() || head >= drive.heads() {
        eprintln!("address {}/{} is outside the drive ({} x {})",cyl,head,drive.cylinders(),drive.heads());
        return Err(Box::new(CommandError::OutOfRange));
    }
    let mut dev = CkdDevice::new(Rc::new(RefCell::new(drive)));
    if let Some(rec) = cmd.get_one::<u8>("record") {
        let dat = get_record(&mut dev,cyl,head,*rec)?;
        crate::display_block(0,&dat);
        return Ok(());
    }
    let (ha,r0,ckd) = get_track(&mut dev,cyl,head)?;
    println!("HA {}",hex::encode_upper(&ha));
    println!("R0 {}",hex::encode_upper(&r0));
    let mut ptr = 0;
    while ptr + COUNT_LEN <= ckd.len() {
        let count = &ckd[ptr..ptr+COUNT_LEN];
        let key_len = count[5] as usize;
        let data_len = u16::from_be_bytes([count[6],count[7]]) as usize;
        println!();
        println!("count {} (record {}, key {}, data {})",hex::encode_upper(count),count[4],key_len,data_len);
        ptr += COUNT_LEN;
        let end = usize::min(ptr + key_len + data_len,ckd.len());
        crate::display_block(0,&ckd[ptr..end]);
        ptr = end;
    }
    Ok(())
}
