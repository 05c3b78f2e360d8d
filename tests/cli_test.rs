use assert_cmd::cargo; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use tempfile;
use ckdkit::dasd::Drive;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// AWS tape dump of a 10 cylinder 3350 with one track at 0/1 holding one keyed record
fn tape_dump() -> Vec<u8> {
    let mut records: Vec<Vec<u8>> = Vec::new();
    let mut vhr = vec![0;80];
    vhr[0..4].copy_from_slice(b"VHR ");
    vhr[4..10].copy_from_slice(b"VM370A");
    vhr[10..12].copy_from_slice(&u16::to_be_bytes(9));
    vhr[12..14].copy_from_slice(&u16::to_be_bytes(29));
    vhr[14..16].copy_from_slice(&u16::to_be_bytes(75));
    records.push(vhr);
    let mut thr = vec![0;4096];
    thr[0..4].copy_from_slice(b"THR ");
    thr[4..6].copy_from_slice(&u16::to_be_bytes(1));
    thr[6..8].copy_from_slice(&u16::to_be_bytes(1));
    thr[8..13].copy_from_slice(&[0,0,0,0,1]);
    thr[13..21].copy_from_slice(&[0,0,0,1,0,0,0,8]);
    thr[29..37].copy_from_slice(&[0,0,0,1,1,4,0,10]);
    records.push(thr);
    let mut payload = b"KEY1RECORD-ONE".to_vec();
    payload.resize(4096,0);
    records.push(payload);
    let mut ans = Vec::new();
    let mut prev = 0;
    for r in records {
        ans.extend_from_slice(&u16::to_le_bytes(r.len() as u16));
        ans.extend_from_slice(&u16::to_le_bytes(prev as u16));
        ans.extend_from_slice(&[0xa0,0]);
        ans.extend_from_slice(&r);
        prev = r.len();
    }
    ans.extend_from_slice(&[0,0,prev as u8,(prev >> 8) as u8,0x40,0]);
    ans
}

#[test]
fn mkdsk_then_stat() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let dimg_path = dir.path().join("tester.ckd");
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("mkdsk")
        .arg("-t").arg("3350").arg("-c").arg("10").arg("-v").arg("tester")
        .arg("-d").arg(&dimg_path)
        .assert()
        .success();
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("stat").arg("-d").arg(&dimg_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"label\":\"TESTER\""))
        .stdout(predicate::str::contains("\"type\":\"3350\""))
        .stdout(predicate::str::contains("\"cylinders\":10"))
        .stdout(predicate::str::contains("\"heads\":30"))
        .stdout(predicate::str::contains("\"changed_tracks\":[]"));
    Ok(())
}

#[test]
fn mkdsk_refuses() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let dimg_path = dir.path().join("big.ckd");
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("mkdsk")
        .arg("-t").arg("3330").arg("-c").arg("1000").arg("-v").arg("BIG")
        .arg("-d").arg(&dimg_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("at most 411 cylinders"));
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("mkdsk")
        .arg("-t").arg("3330").arg("-v").arg("TOOLONG")
        .arg("-d").arg(&dimg_path)
        .assert()
        .failure();
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("mkdsk")
        .arg("-t").arg("3390").arg("-v").arg("BAD")
        .arg("-d").arg(&dimg_path)
        .assert()
        .failure();
    assert!(!dimg_path.exists());
    // existing files are not overwritten
    std::fs::write(&dimg_path,b"precious")?;
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("mkdsk")
        .arg("-t").arg("3330").arg("-c").arg("1").arg("-v").arg("X")
        .arg("-d").arg(&dimg_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(std::fs::read(&dimg_path)?,b"precious");
    Ok(())
}

#[test]
fn import_and_get() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let dump_path = dir.path().join("vm370.aws");
    let dimg_path = dir.path().join("vm370.ckd");
    std::fs::write(&dump_path,tape_dump())?;
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("import")
        .arg("-i").arg(&dump_path).arg("-d").arg(&dimg_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("imported VM370A"));
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("get")
        .arg("-d").arg(&dimg_path).arg("-c").arg("0").arg("--head").arg("1").arg("-r").arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("RECORD-ONE"));
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("get")
        .arg("-d").arg(&dimg_path).arg("-c").arg("0").arg("--head").arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("HA 0000000001"))
        .stdout(predicate::str::contains("count 000000010104000A"))
        .stdout(predicate::str::contains("KEY1RECORD-ONE"));
    // nothing on this track
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("get")
        .arg("-d").arg(&dimg_path).arg("-c").arg("5").arg("--head").arg("2").arg("-r").arg("1")
        .assert()
        .failure();
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("get")
        .arg("-d").arg(&dimg_path).arg("-c").arg("10").arg("--head").arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside the drive"));
    Ok(())
}

#[test]
fn stat_and_commit_delta() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let base_path = dir.path().join("base.ckd");
    let delta_path = dir.path().join("base.delta");
    let new_path = dir.path().join("new.ckd");
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("mkdsk")
        .arg("-t").arg("3330").arg("-c").arg("2").arg("-v").arg("MERGE")
        .arg("-d").arg(&base_path)
        .assert()
        .success();

    let mut drive = Drive::open(&base_path,None)?;
    let trk = drive.access_track(1,7)?;
    trk.begin_format()?;
    trk.append_count_key_and_data(1,0,5,b"DELTA")?;
    drive.mark_modified();
    drive.save_delta(&delta_path)?;

    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("stat").arg("-d").arg(&base_path).arg("--delta").arg(&delta_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"changed_tracks\":[[1,7]]"));
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("commit")
        .arg("-d").arg(&base_path).arg("--delta").arg(&delta_path).arg("-o").arg(&new_path)
        .assert()
        .success();
    // merged base has the record and nothing pending
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("stat").arg("-d").arg(&new_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"records\":1"))
        .stdout(predicate::str::contains("\"changed_tracks\":[]"));
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("get")
        .arg("-d").arg(&new_path).arg("-c").arg("1").arg("--head").arg("7").arg("-r").arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("DELTA"));
    // the delta is not a base
    let mut cmd = cargo::cargo_bin_cmd!("ckdkit");
    cmd.arg("stat").arg("-d").arg(&delta_path)
        .assert()
        .failure();
    Ok(())
}
