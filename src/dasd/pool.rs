//! ## Track Buffer Pool
//!
//! Each drive owns a small pool of decompression buffers, all of the drive's maximum
//! track length.  Buffers are allocated on first demand up to the pool size.  When every
//! buffer is in use, the track that was accessed least recently is de-accessed (and so
//! packed if it changed) and its buffer is handed to the new track.
//!
//! Recency is a counter bumped on every access, not a clock.  The victim is found by a
//! linear scan, ties going to the first resident found, which is cheap for pools of this size.
//! A working set wider than the pool makes tracks go through pack/unpack over and over;
//! that is expected.

use log::{trace,debug,error};
use super::{Error,Track};
use crate::{STDRESULT,DYNERR};

pub const DEFAULT_BUFFERS: usize = 16;

struct Resident {
    track: usize,
    stamp: u64
}

pub struct BufferPool {
    capacity: usize,
    buf_len: usize,
    allocated: usize,
    free: Vec<Vec<u8>>,
    resident: Vec<Resident>,
    clock: u64,
    evictions: usize
}

impl BufferPool {
    pub fn new(capacity: usize,buf_len: usize) -> Self {
        Self {
            capacity: usize::max(capacity,1),
            buf_len,
            allocated: 0,
            free: Vec::new(),
            resident: Vec::new(),
            clock: 0,
            evictions: 0
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    /// Number of times a track had to give up its buffer to another
    pub fn evictions(&self) -> usize {
        self.evictions
    }
    /// Indices of tracks holding a buffer, in the order they got it
    pub fn resident_tracks(&self) -> Vec<usize> {
        self.resident.iter().map(|r| r.track).collect()
    }
    /// Make sure `tracks[idx]` is unpacked, evicting another track if necessary.
    pub fn access(&mut self,tracks: &mut [Track],idx: usize) -> STDRESULT {
        self.clock += 1;
        if let Some(r) = self.resident.iter_mut().find(|r| r.track==idx) {
            r.stamp = self.clock;
            return Ok(());
        }
        if tracks[idx].is_accessed() {
            error!("track {} is unpacked but holds no pool buffer",idx);
            return Err(Box::new(Error::BufferPoolInconsistent));
        }
        let mut buf = self.take_buffer(tracks)?;
        match tracks[idx].access(&mut buf) {
            Ok(()) => {
                trace!("track {} accessed at {}",idx,self.clock);
                self.resident.push(Resident { track: idx, stamp: self.clock });
                Ok(())
            },
            Err(e) => {
                self.free.push(buf);
                Err(e)
            }
        }
    }
    fn take_buffer(&mut self,tracks: &mut [Track]) -> Result<Vec<u8>,DYNERR> {
        if let Some(buf) = self.free.pop() {
            return Ok(buf);
        }
        if self.allocated < self.capacity {
            self.allocated += 1;
            debug!("allocating buffer {} of {} bytes",self.allocated,self.buf_len);
            return Ok(vec![0;self.buf_len]);
        }
        if self.resident.len()==0 {
            error!("buffer pool has no free or resident buffers");
            return Err(Box::new(Error::BufferPoolInconsistent));
        }
        let mut victim = 0;
        for i in 1..self.resident.len() {
            if self.resident[i].stamp < self.resident[victim].stamp {
                victim = i;
            }
        }
        let trk_idx = self.resident[victim].track;
        debug!("evicting track {} (last access {})",trk_idx,self.resident[victim].stamp);
        match tracks[trk_idx].de_access()? {
            Some(buf) => {
                self.resident.remove(victim);
                self.evictions += 1;
                Ok(buf)
            },
            None => {
                error!("resident track {} had no buffer",trk_idx);
                Err(Box::new(Error::BufferPoolInconsistent))
            }
        }
    }
    /// De-access one track and keep its buffer for later.
    pub fn release(&mut self,tracks: &mut [Track],idx: usize) -> STDRESULT {
        if let Some(pos) = self.resident.iter().position(|r| r.track==idx) {
            if let Some(buf) = tracks[idx].de_access()? {
                self.free.push(buf);
            }
            self.resident.remove(pos);
        }
        Ok(())
    }
    /// De-access every resident track, e.g. before saving.
    pub fn release_all(&mut self,tracks: &mut [Track]) -> STDRESULT {
        while let Some(idx) = self.resident.last().map(|r| r.track) {
            self.release(tracks,idx)?;
        }
        Ok(())
    }
    /// Change the number of buffers.  Every track is released first.
    pub fn resize(&mut self,tracks: &mut [Track],capacity: usize) -> STDRESULT {
        self.release_all(tracks)?;
        self.capacity = usize::max(capacity,1);
        self.free.truncate(self.capacity);
        self.allocated = self.free.len();
        Ok(())
    }
}

#[cfg(test)]
fn test_tracks(n: usize) -> Vec<Track> {
    (0..n).map(|i| Track::blank(0,i)).collect()
}

#[test]
fn test_lru_eviction() {
    let mut tracks = test_tracks(5);
    let mut pool = BufferPool::new(3,1024);
    for i in 0..3 {
        pool.access(&mut tracks,i).expect("access failed");
    }
    // touch track 0 so track 1 becomes the oldest
    pool.access(&mut tracks,0).expect("access failed");
    assert_eq!(pool.evictions(),0);
    pool.access(&mut tracks,3).expect("access failed");
    assert_eq!(pool.evictions(),1);
    assert!(tracks[0].is_accessed());
    assert!(!tracks[1].is_accessed());
    assert!(tracks[2].is_accessed());
    assert!(tracks[3].is_accessed());
    pool.access(&mut tracks,4).expect("access failed");
    assert!(!tracks[2].is_accessed());
    assert_eq!(pool.resident_tracks(),vec![0,3,4]);
}

#[test]
fn test_k_plus_one() {
    let mut tracks = test_tracks(17);
    let mut pool = BufferPool::new(DEFAULT_BUFFERS,512);
    for i in 0..16 {
        pool.access(&mut tracks,i).expect("access failed");
    }
    pool.access(&mut tracks,16).expect("access failed");
    assert_eq!(pool.evictions(),1);
    assert!(!tracks[0].is_accessed());
    for i in 1..17 {
        assert!(tracks[i].is_accessed());
    }
}

#[test]
fn test_eviction_packs_changes() {
    let mut tracks = test_tracks(2);
    let mut pool = BufferPool::new(1,512);
    pool.access(&mut tracks,0).unwrap();
    tracks[0].begin_format().unwrap();
    tracks[0].append_count_key_and_data(1,0,4,b"DATA").unwrap();
    assert!(!tracks[1].needs_saving());
    pool.access(&mut tracks,1).unwrap();
    assert!(!tracks[0].is_accessed());
    assert!(tracks[0].needs_saving());
    pool.access(&mut tracks,0).unwrap();
    assert!(tracks[0].search_id_equal(1));
    assert_eq!(tracks[0].read_data().unwrap(),b"DATA".to_vec());
}

#[test]
fn test_release_all() {
    let mut tracks = test_tracks(4);
    let mut pool = BufferPool::new(2,256);
    pool.access(&mut tracks,1).unwrap();
    pool.access(&mut tracks,2).unwrap();
    pool.release_all(&mut tracks).unwrap();
    assert!(tracks.iter().all(|t| !t.is_accessed()));
    assert_eq!(pool.resident_tracks().len(),0);
    // buffers are reused rather than evicting
    pool.access(&mut tracks,3).unwrap();
    pool.access(&mut tracks,0).unwrap();
    assert_eq!(pool.evictions(),0);
}
