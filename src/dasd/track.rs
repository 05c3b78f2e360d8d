//! ## CKD Track
//!
//! A track is either packed, meaning only the compressed payload is held, or unpacked,
//! meaning a buffer from the drive's pool holds the key and data bytes of every record.
//! The count areas, the Home Address and Record Zero are always available.
//!
//! The packed payload is one of
//! * blank: the track was created empty and never written
//! * original: the bytes as they were loaded
//! * changed: the bytes as they were re-packed after a modification
//!
//! A changed payload always wins over the original; the original is dropped once changed.
//!
//! Positioning within the track follows the sequential nature of a real drive.  A search
//! orients the track on a count area, a read or write of data passes the record, and the
//! next command works on whatever comes after.  See `Cursor`.

use log::{trace,debug,warn,error};
use retrocompressor::lzss_huff;
use super::{Error,HA_LEN,R0_LEN,COUNT_LEN,get_u24,u24_bytes};
use crate::{STDRESULT,DYNERR};

/// Length of one count area entry in the dump format
const DUMP_COUNT_LEN: usize = 8;
/// HA + R0 + u24 size + u16 record count
const DUMP_HEADER_LEN: usize = HA_LEN + R0_LEN + 5;

/// Metadata of one user record (Record Zero is not included).
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub struct CountArea {
    pub record: u16,
    pub key_len: usize,
    pub data_len: usize,
    /// offset of the key (or data if no key) within the unpacked payload
    pub start: usize
}

/// Position of the read/write head relative to the records of the track.
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum Cursor {
    /// just past the Home Address or Record Zero, no user record passed yet
    RecordZero,
    /// the count area of record `i` has been passed, its key and data are next
    OnCount(usize),
    /// record `i` is the next record to be met
    Next(usize)
}

enum Packed {
    Blank,
    Original(Vec<u8>),
    Changed(Vec<u8>)
}

enum Payload {
    Packed(Packed),
    Unpacked {
        packed: Packed,
        buf: Vec<u8>,
        dirty: bool
    }
}

pub struct Track {
    cylinder: usize,
    head: usize,
    ha: [u8;HA_LEN],
    r0: [u8;R0_LEN],
    counts: Vec<CountArea>,
    /// length of the unpacked payload, i.e., end of the last record
    used: usize,
    payload: Payload,
    from_delta: bool,
    cursor: Cursor,
    formatting: bool
}

impl CountArea {
    pub fn end(&self) -> usize {
        self.start + self.key_len + self.data_len
    }
}

fn compress(dat: &[u8]) -> Result<Vec<u8>,DYNERR> {
    if dat.len()==0 {
        return Ok(Vec::new());
    }
    match lzss_huff::compress_slice(dat,&lzss_huff::STD_OPTIONS) {
        Ok(ans) => Ok(ans),
        Err(e) => {
            error!("track compression failed: {}",e);
            Err(Box::new(Error::CorruptTrackData))
        }
    }
}

fn expand(dat: &[u8]) -> Result<Vec<u8>,DYNERR> {
    if dat.len()==0 {
        return Ok(Vec::new());
    }
    match lzss_huff::expand_slice(dat,&lzss_huff::STD_OPTIONS) {
        Ok(ans) => Ok(ans),
        Err(e) => {
            error!("track expansion failed: {}",e);
            Err(Box::new(Error::CorruptTrackData))
        }
    }
}

impl Track {
    /// Create an empty track: Home Address and Record Zero are set up for the address,
    /// there are no user records.
    pub fn blank(cylinder: usize,head: usize) -> Self {
        let [c1,c0] = u16::to_be_bytes(cylinder as u16);
        let [h1,h0] = u16::to_be_bytes(head as u16);
        Self {
            cylinder,
            head,
            ha: [0,c1,c0,h1,h0],
            r0: [c1,c0,h1,h0,0,0,0,8,0,0,0,0,0,0,0,0],
            counts: Vec::new(),
            used: 0,
            payload: Payload::Packed(Packed::Blank),
            from_delta: false,
            cursor: Cursor::RecordZero,
            formatting: false
        }
    }
    /// Create a track from its parts, the payload is given unpacked and is packed immediately.
    /// This is how tape dumps are brought in.
    pub fn from_parts(ha: [u8;HA_LEN],r0: [u8;R0_LEN],counts: Vec<CountArea>,payload: &[u8]) -> Result<Self,DYNERR> {
        let used = match counts.last() {
            Some(c) => c.end(),
            None => 0
        };
        if payload.len() < used {
            debug!("payload has {} bytes, records need {}",payload.len(),used);
            return Err(Box::new(Error::CorruptTrackData));
        }
        let packed = match used {
            0 => Packed::Blank,
            _ => Packed::Original(compress(&payload[0..used])?)
        };
        Ok(Self {
            cylinder: u16::from_be_bytes([ha[1],ha[2]]) as usize,
            head: u16::from_be_bytes([ha[3],ha[4]]) as usize,
            ha,
            r0,
            counts,
            used,
            payload: Payload::Packed(packed),
            from_delta: false,
            cursor: Cursor::RecordZero,
            formatting: false
        })
    }
    /// Unflatten a track from the dump format used in base and delta files.
    /// The address comes from the file's track frame, not from the Home Address.
    pub fn from_dump_bytes(cylinder: usize,head: usize,dat: &[u8],from_delta: bool) -> Result<Self,DYNERR> {
        if dat.len() < DUMP_HEADER_LEN {
            debug!("track dump too short ({})",dat.len());
            return Err(Box::new(Error::TruncatedStream));
        }
        let mut ha = [0;HA_LEN];
        let mut r0 = [0;R0_LEN];
        ha.copy_from_slice(&dat[0..HA_LEN]);
        r0.copy_from_slice(&dat[HA_LEN..HA_LEN+R0_LEN]);
        let mut ptr = HA_LEN + R0_LEN;
        let used = get_u24(&dat[ptr..ptr+3]);
        let count = u16::from_be_bytes([dat[ptr+3],dat[ptr+4]]) as usize;
        ptr += 5;
        if dat.len() < ptr + count*DUMP_COUNT_LEN {
            debug!("track dump too short for {} count areas",count);
            return Err(Box::new(Error::TruncatedStream));
        }
        let mut counts = Vec::new();
        for _i in 0..count {
            let c = &dat[ptr..ptr+DUMP_COUNT_LEN];
            counts.push(CountArea {
                record: u16::from_be_bytes([c[0],c[1]]),
                key_len: c[2] as usize,
                data_len: u16::from_be_bytes([c[3],c[4]]) as usize,
                start: get_u24(&c[5..8])
            });
            ptr += DUMP_COUNT_LEN;
        }
        // records are laid out in order, none may overlap the previous or pass the end
        let mut prev_end = 0;
        for c in &counts {
            if c.start < prev_end || c.end() > used {
                debug!("record {} at {} with length {} does not fit after {} within {}",
                    c.record,c.start,c.key_len+c.data_len,prev_end,used);
                return Err(Box::new(Error::CorruptTrackData));
            }
            prev_end = c.end();
        }
        let packed = match (used,dat.len()-ptr) {
            (0,0) => Packed::Blank,
            _ => Packed::Original(dat[ptr..].to_vec())
        };
        Ok(Self {
            cylinder,
            head,
            ha,
            r0,
            counts,
            used,
            payload: Payload::Packed(packed),
            from_delta,
            cursor: Cursor::RecordZero,
            formatting: false
        })
    }
    /// Flatten the track to the dump format.  The track must be packed, or at least
    /// not have unsaved modifications in its buffer.
    pub fn to_dump_bytes(&self) -> Result<Vec<u8>,DYNERR> {
        let packed = match &self.payload {
            Payload::Packed(p) => p,
            Payload::Unpacked { packed, dirty: false, .. } => packed,
            Payload::Unpacked { dirty: true, .. } => {
                error!("cyl {} head {} must be de-accessed before saving",self.cylinder,self.head);
                return Err(Box::new(Error::TrackNotAccessed));
            }
        };
        let mut ans: Vec<u8> = Vec::new();
        ans.extend_from_slice(&self.ha);
        ans.extend_from_slice(&self.r0);
        ans.extend_from_slice(&u24_bytes(self.used));
        ans.extend_from_slice(&u16::to_be_bytes(self.counts.len() as u16));
        for c in &self.counts {
            ans.extend_from_slice(&u16::to_be_bytes(c.record));
            ans.push(c.key_len as u8);
            ans.extend_from_slice(&u16::to_be_bytes(c.data_len as u16));
            ans.extend_from_slice(&u24_bytes(c.start));
        }
        match packed {
            Packed::Blank => {},
            Packed::Original(v) | Packed::Changed(v) => ans.extend_from_slice(v)
        }
        Ok(ans)
    }
    pub fn cylinder(&self) -> usize {
        self.cylinder
    }
    pub fn head(&self) -> usize {
        self.head
    }
    pub fn home_address(&self) -> [u8;HA_LEN] {
        self.ha
    }
    pub fn record_zero(&self) -> [u8;R0_LEN] {
        self.r0
    }
    pub fn count_areas(&self) -> &Vec<CountArea> {
        &self.counts
    }
    /// Length of the unpacked payload
    pub fn used(&self) -> usize {
        self.used
    }
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }
    pub fn is_formatting(&self) -> bool {
        self.formatting
    }
    /// Unpacked with modifications not yet packed
    pub fn is_dirty(&self) -> bool {
        match self.payload {
            Payload::Unpacked { dirty, .. } => dirty,
            _ => false
        }
    }
    pub fn is_accessed(&self) -> bool {
        match self.payload {
            Payload::Unpacked { .. } => true,
            _ => false
        }
    }
    /// True if this track has to go into a delta file.  Tracks that came from a delta
    /// are always included since we cannot know whether the base agrees with them.
    pub fn needs_saving(&self) -> bool {
        match &self.payload {
            Payload::Packed(Packed::Changed(_)) => true,
            Payload::Unpacked { packed: Packed::Changed(_), .. } => true,
            Payload::Unpacked { dirty: true, .. } => true,
            _ => self.from_delta
        }
    }
    /// After the track went into a base file it is no longer considered changed.
    pub fn mark_saved_as_base(&mut self) {
        self.from_delta = false;
        let promote = |p: &mut Packed| {
            if let Packed::Changed(v) = p {
                let v = std::mem::take(v);
                *p = Packed::Original(v);
            }
        };
        match &mut self.payload {
            Payload::Packed(p) => promote(p),
            Payload::Unpacked { packed, dirty: false, .. } => promote(packed),
            _ => {}
        }
    }
    /// Unpack into `buf`, taking ownership of the buffer on success.
    /// If the track is already accessed nothing happens and `buf` is left alone.
    /// If decompression comes up short the rest is zero filled with a warning.
    pub fn access(&mut self,buf: &mut Vec<u8>) -> STDRESULT {
        let packed = match &mut self.payload {
            Payload::Unpacked { .. } => return Ok(()),
            Payload::Packed(p) => p
        };
        if self.used > buf.len() {
            error!("cyl {} head {} needs {} bytes, buffer has {}",self.cylinder,self.head,self.used,buf.len());
            return Err(Box::new(Error::TrackOverflow));
        }
        let expanded = match packed {
            Packed::Blank => Vec::new(),
            Packed::Original(v) | Packed::Changed(v) => expand(v)?
        };
        let n = usize::min(expanded.len(),self.used);
        if n < self.used {
            warn!("cyl {} head {} expanded to {} bytes, expected {}",self.cylinder,self.head,n,self.used);
        }
        buf[0..n].copy_from_slice(&expanded[0..n]);
        buf[n..].fill(0);
        trace!("unpacked cyl {} head {}",self.cylinder,self.head);
        let packed = std::mem::replace(packed,Packed::Blank);
        self.payload = Payload::Unpacked {
            packed,
            buf: std::mem::take(buf),
            dirty: false
        };
        Ok(())
    }
    /// Release the buffer, packing the payload first if it was modified.
    /// Returns the buffer, or None if the track was not accessed.
    pub fn de_access(&mut self) -> Result<Option<Vec<u8>>,DYNERR> {
        let new_packed = match &self.payload {
            Payload::Packed(_) => return Ok(None),
            Payload::Unpacked { buf, dirty: true, .. } => {
                debug!("packing modified cyl {} head {}",self.cylinder,self.head);
                Some(Packed::Changed(compress(&buf[0..self.used])?))
            },
            Payload::Unpacked { dirty: false, .. } => None
        };
        let old = std::mem::replace(&mut self.payload,Payload::Packed(Packed::Blank));
        if let Payload::Unpacked { packed, buf, .. } = old {
            self.payload = Payload::Packed(new_packed.unwrap_or(packed));
            self.formatting = false;
            return Ok(Some(buf));
        }
        Ok(None)
    }
    fn buf(&self) -> Result<&Vec<u8>,DYNERR> {
        match &self.payload {
            Payload::Unpacked { buf, .. } => Ok(buf),
            _ => {
                error!("cyl {} head {} was not accessed",self.cylinder,self.head);
                Err(Box::new(Error::TrackNotAccessed))
            }
        }
    }
    /// Mutable access to the payload, marks it dirty.
    fn buf_mut(&mut self) -> Result<&mut Vec<u8>,DYNERR> {
        match &mut self.payload {
            Payload::Unpacked { buf, dirty, .. } => {
                *dirty = true;
                Ok(buf)
            },
            _ => {
                error!("cyl {} head {} was not accessed",self.cylinder,self.head);
                Err(Box::new(Error::TrackNotAccessed))
            }
        }
    }
    /// Go back to the index point, as after a seek.
    pub fn reset_position(&mut self) {
        self.cursor = Cursor::RecordZero;
        self.formatting = false;
    }
    /// Record index that a data read or write would work on
    fn data_target(&self) -> Result<usize,DYNERR> {
        let idx = match self.cursor {
            Cursor::RecordZero => return Err(Box::new(Error::InvalidRecordZeroAccess)),
            Cursor::OnCount(i) | Cursor::Next(i) => i
        };
        match idx < self.counts.len() {
            true => Ok(idx),
            false => Err(Box::new(Error::RecordNotFound))
        }
    }
    /// Record index whose count area would be met next
    fn count_target(&self) -> Result<usize,DYNERR> {
        let idx = match self.cursor {
            Cursor::RecordZero => 0,
            Cursor::OnCount(i) => i + 1,
            Cursor::Next(i) => i
        };
        match idx < self.counts.len() {
            true => Ok(idx),
            false => Err(Box::new(Error::RecordNotFound))
        }
    }
    /// The 8 byte count area as the channel sees it (CCHHRKDD)
    pub fn count_bytes(&self,idx: usize) -> [u8;COUNT_LEN] {
        let c = &self.counts[idx];
        let [d1,d0] = u16::to_be_bytes(c.data_len as u16);
        [self.ha[1],self.ha[2],self.ha[3],self.ha[4],c.record as u8,c.key_len as u8,d1,d0]
    }
    pub fn search_id_equal(&mut self,id: u16) -> bool {
        if id==0 {
            self.reset_position();
            return true;
        }
        for i in 0..self.counts.len() {
            if self.counts[i].record==id {
                trace!("found record {} at index {}",id,i);
                self.cursor = Cursor::OnCount(i);
                self.formatting = false;
                return true;
            }
        }
        false
    }
    pub fn search_id_high(&mut self,id: u16) -> bool {
        if id==0 {
            self.reset_position();
            return true;
        }
        for i in 0..self.counts.len() {
            if self.counts[i].record > id {
                trace!("found record {} > {} at index {}",self.counts[i].record,id,i);
                self.cursor = Cursor::OnCount(i);
                self.formatting = false;
                return true;
            }
        }
        false
    }
    /// Search by key.  Only records with a key are candidates.  Bytes are compared up to the
    /// shorter of the two keys; if they are all equal the keys count as equal when the lengths
    /// agree, otherwise only a high search accepts the record.
    pub fn search_key(&mut self,key: &[u8],match_equal: bool,match_high: bool) -> Result<bool,DYNERR> {
        if !match_equal && !match_high {
            return Ok(false);
        }
        let buf = self.buf()?;
        let mut found = None;
        for i in 0..self.counts.len() {
            let c = &self.counts[i];
            if c.key_len==0 {
                continue;
            }
            let disk_key = &buf[c.start..c.start+c.key_len];
            let n = usize::min(key.len(),c.key_len);
            let mut high = false;
            let mut low = false;
            for j in 0..n {
                if disk_key[j] > key[j] {
                    high = true;
                    break;
                }
                if disk_key[j] < key[j] {
                    low = true;
                    break;
                }
            }
            let matched = match (high,low) {
                (true,_) => match_high,
                (_,true) => false,
                _ => match c.key_len==key.len() {
                    true => match_equal,
                    false => match_high
                }
            };
            if matched {
                found = Some(i);
                break;
            }
        }
        match found {
            Some(i) => {
                trace!("key match at index {}",i);
                self.cursor = Cursor::OnCount(i);
                self.formatting = false;
                Ok(true)
            },
            None => Ok(false)
        }
    }
    /// Compare the CCHH of the Home Address
    pub fn search_home_address(&mut self,cchh: &[u8]) -> bool {
        self.reset_position();
        cchh.len()>=4 && cchh[0..4]==self.ha[1..5]
    }
    pub fn read_home_address(&mut self) -> Vec<u8> {
        self.reset_position();
        self.ha.to_vec()
    }
    pub fn read_record_zero(&mut self) -> Vec<u8> {
        self.cursor = Cursor::Next(0);
        self.r0.to_vec()
    }
    /// Read the data of the current record and pass it
    pub fn read_data(&mut self) -> Result<Vec<u8>,DYNERR> {
        if self.cursor==Cursor::RecordZero {
            self.cursor = Cursor::Next(0);
            return Ok(self.r0[COUNT_LEN..].to_vec());
        }
        let idx = self.data_target()?;
        let c = self.counts[idx];
        let ans = self.buf()?[c.start+c.key_len..c.end()].to_vec();
        self.cursor = Cursor::Next(idx+1);
        Ok(ans)
    }
    pub fn read_key_and_data(&mut self) -> Result<Vec<u8>,DYNERR> {
        if self.cursor==Cursor::RecordZero {
            self.cursor = Cursor::Next(0);
            return Ok(self.r0[COUNT_LEN..].to_vec());
        }
        let idx = self.data_target()?;
        let c = self.counts[idx];
        let ans = self.buf()?[c.start..c.end()].to_vec();
        self.cursor = Cursor::Next(idx+1);
        Ok(ans)
    }
    pub fn read_count(&mut self) -> Result<Vec<u8>,DYNERR> {
        if self.cursor==Cursor::RecordZero {
            return Err(Box::new(Error::InvalidRecordZeroAccess));
        }
        let idx = self.count_target()?;
        self.cursor = Cursor::OnCount(idx);
        Ok(self.count_bytes(idx).to_vec())
    }
    pub fn read_count_key_and_data(&mut self) -> Result<Vec<u8>,DYNERR> {
        let idx = self.count_target()?;
        let c = self.counts[idx];
        let mut ans = self.count_bytes(idx).to_vec();
        ans.extend_from_slice(&self.buf()?[c.start..c.end()]);
        self.cursor = Cursor::Next(idx+1);
        Ok(ans)
    }
    /// Every user record as count, key, and data, from the start of the track
    pub fn read_multiple_count_key_and_data(&mut self) -> Result<Vec<u8>,DYNERR> {
        let mut ans = Vec::new();
        let buf = self.buf()?;
        for i in 0..self.counts.len() {
            let c = &self.counts[i];
            ans.extend_from_slice(&self.count_bytes(i));
            ans.extend_from_slice(&buf[c.start..c.end()]);
        }
        self.cursor = Cursor::Next(self.counts.len());
        Ok(ans)
    }
    fn overwrite(&mut self,start: usize,len: usize,src: &[u8]) -> STDRESULT {
        let n = usize::min(len,src.len());
        let buf = self.buf_mut()?;
        buf[start..start+n].copy_from_slice(&src[0..n]);
        buf[start+n..start+len].fill(0);
        Ok(())
    }
    /// Bytes an update write of the current record takes, data only or key and data
    pub fn update_len(&self,with_key: bool) -> Result<usize,DYNERR> {
        let c = &self.counts[self.data_target()?];
        Ok(match with_key {
            true => c.key_len + c.data_len,
            false => c.data_len
        })
    }
    /// Key length of the record a search just found
    pub fn found_key_len(&self) -> Option<usize> {
        match self.cursor {
            Cursor::OnCount(i) => self.counts.get(i).map(|c| c.key_len),
            _ => None
        }
    }
    /// Overwrite the data of the current record, a short source is zero padded
    pub fn write_data(&mut self,src: &[u8]) -> STDRESULT {
        let idx = self.data_target()?;
        let c = self.counts[idx];
        trace!("write data record {}",c.record);
        self.overwrite(c.start+c.key_len,c.data_len,src)?;
        self.cursor = Cursor::Next(idx+1);
        Ok(())
    }
    /// Overwrite the key and data of the current record, a short source is zero padded
    pub fn write_key_and_data(&mut self,src: &[u8]) -> STDRESULT {
        let idx = self.data_target()?;
        let c = self.counts[idx];
        trace!("write key and data record {}",c.record);
        self.overwrite(c.start,c.key_len+c.data_len,src)?;
        self.cursor = Cursor::Next(idx+1);
        Ok(())
    }
    /// Drop every record from the current position on and start appending.
    /// Calling this again while formatting changes nothing.
    pub fn begin_format(&mut self) -> STDRESULT {
        if self.formatting {
            return Ok(());
        }
        let idx = match self.cursor {
            Cursor::RecordZero => 0,
            Cursor::OnCount(i) => i + 1,
            Cursor::Next(i) => i
        };
        let idx = usize::min(idx,self.counts.len());
        let new_used = match self.counts.get(idx) {
            Some(c) => c.start,
            None => self.used
        };
        // past the last record the track is already zero
        match idx < self.counts.len() {
            true => self.buf_mut()?[new_used..].fill(0),
            false => { self.buf()?; }
        }
        debug!("format cyl {} head {} from index {}, dropping {} records",self.cylinder,self.head,idx,self.counts.len()-idx);
        self.counts.truncate(idx);
        self.used = new_used;
        self.cursor = Cursor::Next(idx);
        self.formatting = true;
        Ok(())
    }
    /// Append a record at the end of the track, only valid while formatting.
    /// The key and data come from `src`, which is zero padded or truncated as needed.
    pub fn append_count_key_and_data(&mut self,record: u16,key_len: usize,data_len: usize,src: &[u8]) -> STDRESULT {
        if !self.formatting {
            return Err(Box::new(Error::NotFormatting));
        }
        let start = self.used;
        let len = key_len + data_len;
        if start + len > self.buf()?.len() || self.counts.len() >= u16::MAX as usize {
            debug!("record {} of length {} does not fit on the track",record,len);
            return Err(Box::new(Error::TrackOverflow));
        }
        self.overwrite(start,len,src)?;
        self.counts.push(CountArea { record, key_len, data_len, start });
        self.used = start + len;
        self.cursor = Cursor::Next(self.counts.len());
        trace!("appended record {} at {}",record,start);
        Ok(())
    }
    /// Write Record Zero (count and up to 8 data bytes) and erase the rest of the track
    pub fn write_record_zero(&mut self,src: &[u8]) -> STDRESULT {
        self.reset_position();
        self.begin_format()?;
        // R0 is kept outside the buffer
        self.buf_mut()?;
        let n = usize::min(src.len(),R0_LEN);
        self.r0 = [0;R0_LEN];
        self.r0[0..n].copy_from_slice(&src[0..n]);
        self.cursor = Cursor::Next(0);
        Ok(())
    }
    /// Write the Home Address, this erases everything else on the track.
    /// The identity of the track is not changed even if the CCHH is.
    pub fn write_home_address(&mut self,src: &[u8]) -> STDRESULT {
        self.reset_position();
        self.begin_format()?;
        self.buf_mut()?;
        let n = usize::min(src.len(),HA_LEN);
        self.ha[0..n].copy_from_slice(&src[0..n]);
        self.r0 = [self.ha[1],self.ha[2],self.ha[3],self.ha[4],0,0,0,8,0,0,0,0,0,0,0,0];
        self.cursor = Cursor::RecordZero;
        Ok(())
    }
}

#[cfg(test)]
fn accessed_track(records: &[(u16,&[u8],&[u8])]) -> Track {
    let mut trk = Track::blank(3,4);
    let mut buf = vec![0;4096];
    trk.access(&mut buf).expect("access failed");
    trk.begin_format().expect("format failed");
    for (r,key,data) in records {
        let src = [key.to_vec(),data.to_vec()].concat();
        trk.append_count_key_and_data(*r,key.len(),data.len(),&src).expect("append failed");
    }
    trk
}

#[test]
fn test_pack_round_trip() {
    let data: Vec<u8> = (0..200).map(|x| (x*7 % 256) as u8).collect();
    let mut trk = accessed_track(&[(1,b"",&data),(2,b"KEY",b"HELLO")]);
    let buf = trk.de_access().expect("de-access failed").expect("no buffer");
    assert!(trk.needs_saving());
    assert!(!trk.is_accessed());
    let mut buf = buf;
    buf.fill(0xee);
    trk.access(&mut buf).expect("access failed");
    assert!(trk.search_id_equal(1));
    assert_eq!(trk.read_data().unwrap(),data);
    assert_eq!(trk.read_key_and_data().unwrap(),b"KEYHELLO".to_vec());
    // stale bytes from the reused buffer must not survive past the used area
    assert_eq!(trk.buf().unwrap()[trk.used()..].iter().all(|b| *b==0),true);
}

#[test]
fn test_dump_round_trip() {
    let mut trk = accessed_track(&[(1,b"AB",b"0123456789")]);
    trk.de_access().unwrap();
    let dump = trk.to_dump_bytes().unwrap();
    let mut copy = Track::from_dump_bytes(3,4,&dump,true).unwrap();
    assert_eq!(copy.cylinder(),3);
    assert_eq!(copy.head(),4);
    assert_eq!(copy.count_areas(),trk.count_areas());
    assert!(copy.needs_saving());
    let mut buf = vec![0;4096];
    copy.access(&mut buf).unwrap();
    assert!(copy.search_id_equal(1));
    assert_eq!(copy.read_key_and_data().unwrap(),b"AB0123456789".to_vec());
}

#[test]
fn test_search_high_then_equal() {
    let mut trk = accessed_track(&[(1,b"",b"a"),(3,b"",b"b"),(3,b"",b"c"),(7,b"",b"d")]);
    assert!(trk.search_id_high(3));
    assert_eq!(trk.cursor(),Cursor::OnCount(3));
    let rec = trk.count_areas()[3].record;
    assert_eq!(rec,7);
    assert!(trk.search_id_equal(rec));
    assert_eq!(trk.read_data().unwrap(),b"d".to_vec());
    assert!(!trk.search_id_high(7));
    assert!(!trk.search_id_equal(5));
    assert!(trk.search_id_equal(0));
    assert_eq!(trk.cursor(),Cursor::RecordZero);
}

#[test]
fn test_sequential_reads() {
    let mut trk = accessed_track(&[(1,b"",b"one"),(2,b"",b"two"),(3,b"",b"three")]);
    trk.reset_position();
    assert!(trk.read_count().is_err());
    assert_eq!(trk.read_count_key_and_data().unwrap(),[vec![0,3,0,4,1,0,0,3],b"one".to_vec()].concat());
    assert_eq!(trk.read_data().unwrap(),b"two".to_vec());
    assert_eq!(trk.read_count().unwrap(),vec![0,3,0,4,3,0,0,5]);
    assert_eq!(trk.read_data().unwrap(),b"three".to_vec());
    assert!(trk.read_data().is_err());
}

#[test]
fn test_write_zero_fill() {
    let mut trk = accessed_track(&[(1,b"",&[0x55;64])]);
    assert!(trk.search_id_equal(1));
    trk.write_data(b"SHORT").unwrap();
    assert!(trk.search_id_equal(1));
    let ans = trk.read_data().unwrap();
    assert_eq!(ans.len(),64);
    assert_eq!(&ans[0..5],b"SHORT");
    assert!(ans[5..].iter().all(|b| *b==0));
}

#[test]
fn test_format_truncation() {
    let mut trk = accessed_track(&[(1,b"",b"a"),(2,b"",b"bb"),(3,b"",b"ccc")]);
    assert!(trk.search_id_equal(1));
    trk.begin_format().unwrap();
    assert_eq!(trk.count_areas().len(),1);
    assert_eq!(trk.used(),1);
    trk.append_count_key_and_data(9,0,2,b"z").unwrap();
    assert!(trk.search_id_equal(9));
    assert_eq!(trk.read_data().unwrap(),b"z\0".to_vec());
    trk.reset_position();
    assert!(trk.append_count_key_and_data(10,0,1,b"y").is_err());
}

#[test]
fn test_search_key_high() {
    let mut trk = accessed_track(&[(1,b"ABC",b"first"),(2,b"ABD",b"second")]);
    assert!(trk.search_key(b"ABC",false,true).unwrap());
    assert_eq!(trk.read_data().unwrap(),b"second".to_vec());
    assert!(trk.search_key(b"ABC",true,false).unwrap());
    assert_eq!(trk.read_data().unwrap(),b"first".to_vec());
    assert!(!trk.search_key(b"AB",true,false).unwrap());
    assert!(!trk.search_key(b"ABC",false,false).unwrap());
    assert!(!trk.search_key(b"ZZZ",true,true).unwrap());
}

#[test]
fn test_record_zero_rules() {
    let mut trk = accessed_track(&[(1,b"",b"a")]);
    trk.reset_position();
    assert!(trk.write_data(b"x").is_err());
    assert_eq!(trk.read_data().unwrap(),vec![0;8]);
    assert_eq!(trk.read_home_address(),vec![0,0,3,0,4]);
    assert_eq!(trk.read_record_zero()[0..8],[0,3,0,4,0,0,0,8]);
}

#[test]
fn test_format_past_end_is_clean() {
    let mut trk = Track::blank(0,1);
    let mut buf = vec![0;512];
    trk.access(&mut buf).unwrap();
    trk.begin_format().unwrap();
    assert!(!trk.is_dirty());
    assert!(trk.append_count_key_and_data(1,0,600,b"big").is_err());
    assert!(!trk.is_dirty());
    assert!(!trk.needs_saving());
    // R0 changes even an empty track
    trk.write_record_zero(&[0,0,0,1,0,0,0,8,1]).unwrap();
    assert!(trk.is_dirty());
    assert_eq!(trk.record_zero()[8],1);
}

#[test]
fn test_update_and_key_lengths() {
    let mut trk = accessed_track(&[(1,b"KEYS",b"twelve bytes"),(2,b"",b"x")]);
    trk.reset_position();
    assert!(trk.update_len(false).is_err());
    assert_eq!(trk.found_key_len(),None);
    assert!(trk.search_key(b"KEYS",true,false).unwrap());
    assert_eq!(trk.found_key_len(),Some(4));
    assert_eq!(trk.update_len(false).unwrap(),12);
    assert_eq!(trk.update_len(true).unwrap(),16);
}
