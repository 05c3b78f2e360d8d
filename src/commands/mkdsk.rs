use clap;
use std::path::Path;
use std::str::FromStr;
use log::info;
use crate::dasd::{Drive,DriveType};
use crate::STDRESULT;
use super::CommandError;

pub fn mkdsk(cmd: &clap::ArgMatches) -> STDRESULT {
    let typ_str = cmd.get_one::<String>("type").unwrap();
    let typ = match DriveType::from_str(typ_str) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}: {}",typ_str,e);
            return Err(Box::new(e));
        }
    };
    let cylinders = *cmd.get_one::<usize>("cylinders").unwrap_or(&typ.max_cylinders);
    if cylinders > typ.max_cylinders {
        eprintln!("{} has at most {} cylinders",typ.name,typ.max_cylinders);
        return Err(Box::new(CommandError::OutOfRange));
    }
    let label = cmd.get_one::<String>("volume").unwrap();
    if label.len() > 6 {
        eprintln!("volume label is limited to 6 characters");
        return Err(Box::new(CommandError::OutOfRange));
    }
    let path = cmd.get_one::<String>("dimg").unwrap();
    super::check_output(path)?;
    let mut drive = Drive::create(typ,cylinders,label)?;
    drive.save_base(Path::new(path))?;
    info!("created {} with {} tracks",path,drive.tracks().len());
    Ok(())
}
