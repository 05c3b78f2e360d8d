//! ## Drive
//!
//! The drive owns the geometry, the flat array of tracks, and the buffer pool that
//! lends tracks their decompression buffers.  Track `(c,h)` lives at index `c*heads+h`.
//! Persistence is in `persist`, which adds more methods to `Drive`.

use log::{debug,info,error};
use super::{Error,Track,DriveType,pad_label};
use super::pool::{BufferPool,DEFAULT_BUFFERS};
use crate::{STDRESULT,DYNERR};

pub struct Drive {
    pub(crate) label: [u8;6],
    pub(crate) cylinders: usize,
    pub(crate) heads: usize,
    pub(crate) max_track_len: usize,
    pub(crate) max_records: usize,
    pub(crate) typ: DriveType,
    pub(crate) tracks: Vec<Track>,
    pub(crate) pool: BufferPool,
    pub(crate) from_file: bool,
    pub(crate) modified: bool,
    read_only: bool
}

impl Drive {
    /// Create a drive full of blank tracks.  The cylinder count is clamped to what the
    /// drive type supports.
    pub fn create(typ: DriveType,cylinders: usize,label: &str) -> Result<Self,DYNERR> {
        if typ.is_unknown() {
            error!("cannot create a drive of unknown type");
            return Err(Box::new(Error::UnknownDriveType));
        }
        if cylinders==0 {
            error!("drive must have at least one cylinder");
            return Err(Box::new(Error::AddressOutOfRange));
        }
        let cylinders = usize::min(cylinders,typ.max_cylinders);
        info!("creating {} with {} cylinders",typ.name,cylinders);
        let mut tracks = Vec::with_capacity(cylinders*typ.heads);
        for c in 0..cylinders {
            for h in 0..typ.heads {
                tracks.push(Track::blank(c,h));
            }
        }
        let mut ans = Self::assemble(pad_label(label),cylinders,typ.heads,typ.max_track_len,typ.max_records,typ,tracks)?;
        ans.modified = true;
        Ok(ans)
    }
    /// Put a drive together from loaded or imported tracks, checking that every track
    /// sits where its address says.
    pub(crate) fn assemble(label: [u8;6],cylinders: usize,heads: usize,max_track_len: usize,max_records: usize,
        typ: DriveType,tracks: Vec<Track>) -> Result<Self,DYNERR> {
        if tracks.len() != cylinders*heads {
            error!("expected {} tracks, got {}",cylinders*heads,tracks.len());
            return Err(Box::new(Error::MissingOrMisplacedTrack));
        }
        for (i,trk) in tracks.iter().enumerate() {
            if trk.cylinder() != i/heads || trk.head() != i%heads {
                error!("track {} has address {}/{}",i,trk.cylinder(),trk.head());
                return Err(Box::new(Error::MissingOrMisplacedTrack));
            }
        }
        Ok(Self {
            label,
            cylinders,
            heads,
            max_track_len,
            max_records,
            typ,
            tracks,
            pool: BufferPool::new(DEFAULT_BUFFERS,max_track_len),
            from_file: false,
            modified: false,
            read_only: false
        })
    }
    /// Volume label with trailing blanks removed
    pub fn label(&self) -> String {
        String::from_utf8_lossy(&self.label).trim_end().to_string()
    }
    pub fn cylinders(&self) -> usize {
        self.cylinders
    }
    pub fn heads(&self) -> usize {
        self.heads
    }
    pub fn max_track_len(&self) -> usize {
        self.max_track_len
    }
    pub fn max_records(&self) -> usize {
        self.max_records
    }
    pub fn drive_type(&self) -> DriveType {
        self.typ
    }
    pub fn is_from_file(&self) -> bool {
        self.from_file
    }
    /// True if something changed since the drive was created, loaded, or saved
    pub fn is_modified(&self) -> bool {
        self.modified
    }
    pub fn mark_modified(&mut self) {
        self.modified = true;
    }
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
    pub fn set_read_only(&mut self,read_only: bool) {
        self.read_only = read_only;
    }
    pub fn buffer_count(&self) -> usize {
        self.pool.capacity()
    }
    /// Resize the buffer pool, at least one buffer is always kept.
    /// All tracks are packed as a side effect.
    pub fn set_buffer_count(&mut self,count: usize) -> STDRESULT {
        debug!("buffer pool size {}",count);
        self.pool.resize(&mut self.tracks,count)
    }
    pub fn track_index(&self,cylinder: usize,head: usize) -> Result<usize,DYNERR> {
        if cylinder >= self.cylinders || head >= self.heads {
            debug!("address {}/{} outside {}x{}",cylinder,head,self.cylinders,self.heads);
            return Err(Box::new(Error::AddressOutOfRange));
        }
        Ok(cylinder*self.heads + head)
    }
    /// Track without accessing it, for inspecting metadata
    pub fn track(&self,cylinder: usize,head: usize) -> Result<&Track,DYNERR> {
        let idx = self.track_index(cylinder,head)?;
        Ok(&self.tracks[idx])
    }
    /// Unpack the track if needed and return it.  This may pack some other track.
    pub fn access_track(&mut self,cylinder: usize,head: usize) -> Result<&mut Track,DYNERR> {
        let idx = self.track_index(cylinder,head)?;
        self.pool.access(&mut self.tracks,idx)?;
        Ok(&mut self.tracks[idx])
    }
    /// Pack every accessed track and return the buffers to the pool
    pub fn flush(&mut self) -> STDRESULT {
        self.pool.release_all(&mut self.tracks)
    }
    /// Addresses of tracks that would go into a delta file
    pub fn changed_tracks(&self) -> Vec<(usize,usize)> {
        self.tracks.iter().filter(|t| t.needs_saving()).map(|t| (t.cylinder(),t.head())).collect()
    }
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

#[test]
fn test_create() {
    let drive = Drive::create(super::names::D3350,10,"tester").expect("could not create");
    assert_eq!(drive.label(),"TESTER");
    assert_eq!(drive.tracks().len(),300);
    assert_eq!(drive.track(9,29).unwrap().home_address(),[0,0,9,0,29]);
    assert!(drive.track(10,0).is_err());
    assert!(drive.track(0,30).is_err());
    assert_eq!(drive.track_index(2,3).unwrap(),63);
    assert!(drive.is_modified());
    assert_eq!(drive.changed_tracks().len(),0);
}

#[test]
fn test_create_clamped() {
    let drive = Drive::create(super::names::D2314,1000,"X").expect("could not create");
    assert_eq!(drive.cylinders(),203);
    assert!(Drive::create(super::names::UNKNOWN,10,"X").is_err());
    assert!(Drive::create(super::names::D3330,0,"X").is_err());
}

#[test]
fn test_access_track() {
    let mut drive = Drive::create(super::names::D3330,2,"VOL001").unwrap();
    drive.set_buffer_count(0).unwrap();
    assert_eq!(drive.buffer_count(),1);
    {
        let trk = drive.access_track(1,5).unwrap();
        trk.begin_format().unwrap();
        trk.append_count_key_and_data(1,0,3,b"abc").unwrap();
    }
    drive.access_track(0,0).unwrap();
    assert!(!drive.track(1,5).unwrap().is_accessed());
    assert_eq!(drive.changed_tracks(),vec![(1,5)]);
    drive.flush().unwrap();
    assert!(drive.tracks().iter().all(|t| !t.is_accessed()));
}
