use clap;
use std::path::Path;
use crate::STDRESULT;

/// Merge a base and delta into a new base file
pub fn commit(cmd: &clap::ArgMatches) -> STDRESULT {
    let base = cmd.get_one::<String>("dimg").unwrap();
    let delta = cmd.get_one::<String>("delta").unwrap();
    let out = cmd.get_one::<String>("output").unwrap();
    super::check_input(base)?;
    super::check_input(delta)?;
    super::check_output(out)?;
    let mut drive = crate::open_drive(base,Some(delta.as_str()))?;
    let changed = drive.changed_tracks().len();
    drive.save_base(Path::new(out))?;
    eprintln!("committed {} changed tracks",changed);
    Ok(())
}
