// test of drive storage and persistence
use ckdkit::dasd::{Drive,names};
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

fn format_record(drive: &mut Drive,cyl: usize,head: usize,rec: u16,key: &[u8],dat: &[u8]) -> STDRESULT {
    let trk = drive.access_track(cyl,head)?;
    trk.reset_position();
    if rec > 1 {
        assert!(trk.search_id_equal(rec-1));
    }
    trk.begin_format()?;
    let mut src = key.to_vec();
    src.extend_from_slice(dat);
    trk.append_count_key_and_data(rec,key.len(),dat.len(),&src)?;
    drive.mark_modified();
    Ok(())
}

#[test]
fn tester_round_trip() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let base_path = dir.path().join("tester.ckd");
    let mut drive = Drive::create(names::D3350,10,"TESTER")?;
    let pattern: Vec<u8> = (0..64).collect();
    format_record(&mut drive,0,0,1,&[],&pattern)?;
    // update the data in place
    let trk = drive.access_track(0,0)?;
    assert!(trk.search_id_equal(1));
    trk.write_data(&[0xc1,0xc2,0xc3])?;
    drive.mark_modified();
    drive.save_base(&base_path)?;
    assert!(!drive.is_modified());
    assert_eq!(drive.changed_tracks().len(),0);

    let mut loaded = Drive::open(&base_path,None)?;
    assert_eq!(loaded.label(),"TESTER");
    assert_eq!(loaded.cylinders(),10);
    assert_eq!(loaded.heads(),30);
    assert_eq!(loaded.drive_type(),names::D3350);
    assert!(loaded.is_from_file());
    let trk = loaded.access_track(0,0)?;
    assert!(trk.search_id_equal(1));
    let dat = trk.read_data()?;
    let mut expected = vec![0xc1,0xc2,0xc3];
    expected.resize(64,0);
    assert_eq!(dat,expected);
    assert!(!trk.search_id_equal(2));
    Ok(())
}

#[test]
fn format_truncates_track() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let base_path = dir.path().join("trunc.ckd");
    let mut drive = Drive::create(names::D3330,3,"TRUNC")?;
    for rec in 1..=4 {
        format_record(&mut drive,2,18,rec,b"KEY",&[rec as u8;100])?;
    }
    assert_eq!(drive.track(2,18)?.count_areas().len(),4);
    // rewriting record 2 drops 3 and 4
    format_record(&mut drive,2,18,2,b"NEW",&[0xff;10])?;
    drive.save_base(&base_path)?;

    let mut loaded = Drive::open(&base_path,None)?;
    let trk = loaded.access_track(2,18)?;
    assert_eq!(trk.count_areas().len(),2);
    assert_eq!(trk.used(),3+100+3+10);
    assert!(trk.search_id_equal(2));
    assert_eq!(trk.read_key_and_data()?,[b"NEW".to_vec(),vec![0xff;10]].concat());
    assert!(!trk.search_id_equal(3));
    Ok(())
}

#[test]
fn delta_files() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let base_path = dir.path().join("base.ckd");
    let delta_path = dir.path().join("base.delta");
    let delta2_path = dir.path().join("again.delta");
    let mut drive = Drive::create(names::D3350,4,"DELTA")?;
    format_record(&mut drive,0,0,1,&[],b"ORIGINAL")?;
    drive.save_base(&base_path)?;

    let mut drive = Drive::open(&base_path,None)?;
    format_record(&mut drive,3,29,1,&[],b"CHANGED")?;
    format_record(&mut drive,1,5,1,&[],b"ALSO")?;
    assert_eq!(drive.changed_tracks(),vec![(1,5),(3,29)]);
    drive.save_delta(&delta_path)?;

    // base alone does not see the change
    let mut plain = Drive::open(&base_path,None)?;
    assert_eq!(plain.track(3,29)?.count_areas().len(),0);
    let trk = plain.access_track(0,0)?;
    assert!(trk.search_id_equal(1));
    assert_eq!(trk.read_data()?,b"ORIGINAL");

    // saving the delta of a merged drive writes the same tracks
    let mut merged = Drive::open(&base_path,Some(&delta_path))?;
    assert_eq!(merged.changed_tracks(),vec![(1,5),(3,29)]);
    let trk = merged.access_track(3,29)?;
    assert!(trk.search_id_equal(1));
    assert_eq!(trk.read_data()?,b"CHANGED");
    merged.save_delta(&delta2_path)?;
    assert_eq!(std::fs::read(&delta_path)?,std::fs::read(&delta2_path)?);

    // a delta cannot stand in for a base
    assert!(Drive::open(&delta_path,None).is_err());
    assert!(Drive::open(&base_path,Some(&base_path)).is_err());
    Ok(())
}

#[test]
fn small_buffer_pool() -> STDRESULT {
    let mut drive = Drive::create(names::D3380,2,"POOL")?;
    drive.set_buffer_count(2)?;
    assert_eq!(drive.buffer_count(),2);
    for head in 0..15 {
        format_record(&mut drive,1,head,1,&[],&[head as u8;32])?;
    }
    for head in 0..15 {
        let trk = drive.access_track(1,head)?;
        assert!(trk.search_id_equal(1));
        assert_eq!(trk.read_data()?,vec![head as u8;32]);
    }
    assert_eq!(drive.changed_tracks().len(),15);
    Ok(())
}
