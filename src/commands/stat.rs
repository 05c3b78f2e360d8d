use clap;
use json::JsonValue;
use crate::dasd::Drive;
use crate::STDRESULT;

/// Drive summary as a JSON object
pub fn drive_stats(drive: &Drive) -> JsonValue {
    let mut obj = json::JsonValue::new_object();
    obj["label"] = json::JsonValue::String(drive.label());
    obj["type"] = match drive.drive_type().is_unknown() {
        true => json::JsonValue::Null,
        false => json::JsonValue::String(drive.drive_type().name.to_string())
    };
    obj["cylinders"] = drive.cylinders().into();
    obj["heads"] = drive.heads().into();
    obj["max_track_len"] = drive.max_track_len().into();
    obj["max_records"] = drive.max_records().into();
    let mut records = 0;
    let mut used = 0;
    for trk in drive.tracks() {
        records += trk.count_areas().len();
        used += trk.used();
    }
    obj["records"] = records.into();
    obj["bytes_used"] = used.into();
    let mut changed = json::JsonValue::new_array();
    for (c,h) in drive.changed_tracks() {
        let _ = changed.push(json::array![c,h]);
    }
    obj["changed_tracks"] = changed;
    obj
}

pub fn stat(cmd: &clap::ArgMatches) -> STDRESULT {
    let base = cmd.get_one::<String>("dimg").unwrap();
    let maybe_delta = cmd.get_one::<String>("delta");
    super::check_input(base)?;
    let drive = crate::open_drive(base,maybe_delta.map(|s| s.as_str()))?;
    let obj = drive_stats(&drive);
    let s = match cmd.get_one::<u16>("indent") {
        Some(spaces) => json::stringify_pretty(obj,*spaces),
        None => json::stringify(obj)
    };
    println!("{}",s);
    Ok(())
}
