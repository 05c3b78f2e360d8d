use clap;
use std::path::Path;
use log::warn;
use crate::STDRESULT;

pub fn import(cmd: &clap::ArgMatches) -> STDRESULT {
    let dump_path = cmd.get_one::<String>("input").unwrap();
    let path = cmd.get_one::<String>("dimg").unwrap();
    super::check_input(dump_path)?;
    super::check_output(path)?;
    let mut drive = crate::import_drive(dump_path)?;
    if drive.drive_type().is_unknown() {
        warn!("drive type is unknown, the file will still be written");
    }
    drive.save_base(Path::new(path))?;
    eprintln!("imported {} ({} cylinders)",drive.label(),drive.cylinders());
    Ok(())
}
