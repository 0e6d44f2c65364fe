//! AppleSingle / AppleDouble: a small type directory of numbered entries, each
//! an (offset,length) pair into the same file. AppleDouble is the same entry
//! format with the data fork entry omitted (or zero-length) and the bytes
//! living in a sibling `._name` file instead of being embedded; this module
//! only handles the in-stream entry directory, since pairing the sibling file
//! up with its logical name is a work-tree concern, not a codec concern.

use crate::archive::{Archive,Fork,Error};
use crate::entry::FileEntry;
use crate::context::ProbeResult;
use crate::{DYNERR,STDRESULT};

const MAGIC_SINGLE: [u8;4] = [0x00,0x05,0x16,0x00];
const MAGIC_DOUBLE: [u8;4] = [0x00,0x05,0x16,0x07];
const VERSION: [u8;4] = [0x00,0x02,0x00,0x00];

const ID_DATA_FORK: u32 = 1;
const ID_RESOURCE_FORK: u32 = 2;
const ID_REAL_NAME: u32 = 3;
const ID_COMMENT: u32 = 4;
const ID_FILE_DATES: u32 = 8;
const ID_FINDER_INFO: u32 = 9;
const ID_PRODOS_INFO: u32 = 11;

/// Seconds between the Mac epoch (1904-01-01) and the AppleSingle `FileDatesInfo`
/// reference point, which is also 1904-01-01, so no correction is needed when
/// interoperating with `chrono`'s own epoch-relative conversions.
const MAC_EPOCH_OFFSET: i64 = 2082844800;

pub struct AppleSingle {
    is_double: bool,
    name: String,
    comment: Option<String>,
    data: Vec<u8>,
    rsrc: Vec<u8>,
    prodos_type: Option<u8>,
    prodos_aux: Option<u16>,
    access: Option<u16>,
    hfs_type: Option<[u8;4]>,
    hfs_creator: Option<[u8;4]>,
    created: Option<i64>,
    modified: Option<i64>
}

impl AppleSingle {
    /// Build a minimal AppleDouble payload carrying only a resource fork and
    /// Finder info, the shape ZIP's `__MACOSX/._name` sibling entries use.
    pub fn double_for_rsrc(name: &str, rsrc: Vec<u8>, hfs_type: Option<[u8;4]>, hfs_creator: Option<[u8;4]>) -> Self {
        Self {
            is_double: true, name: name.to_string(), comment: None,
            data: Vec::new(), rsrc,
            prodos_type: None, prodos_aux: None, access: None,
            hfs_type, hfs_creator, created: None, modified: None
        }
    }
    fn parse(data: &[u8], is_double: bool) -> Result<Self,DYNERR> {
        if data.len() < 26 {
            return Err(Box::new(Error::Corrupted));
        }
        let num_entries = u16::from_be_bytes([data[24],data[25]]) as usize;
        let mut ans = Self {
            is_double, name: String::new(), comment: None,
            data: Vec::new(), rsrc: Vec::new(),
            prodos_type: None, prodos_aux: None, access: None,
            hfs_type: None, hfs_creator: None, created: None, modified: None
        };
        let mut pos = 26;
        for _ in 0..num_entries {
            if pos + 12 > data.len() {
                return Err(Box::new(Error::Corrupted));
            }
            let id = u32::from_be_bytes([data[pos],data[pos+1],data[pos+2],data[pos+3]]);
            let off = u32::from_be_bytes([data[pos+4],data[pos+5],data[pos+6],data[pos+7]]) as usize;
            let len = u32::from_be_bytes([data[pos+8],data[pos+9],data[pos+10],data[pos+11]]) as usize;
            pos += 12;
            if off+len > data.len() {
                continue;
            }
            let body = &data[off..off+len];
            match id {
                ID_DATA_FORK => ans.data = body.to_vec(),
                ID_RESOURCE_FORK => ans.rsrc = body.to_vec(),
                ID_REAL_NAME => ans.name = String::from_utf8_lossy(body).to_string(),
                ID_COMMENT => ans.comment = Some(String::from_utf8_lossy(body).to_string()),
                ID_FILE_DATES if len >= 8 => {
                    ans.created = Some(i32::from_be_bytes([body[0],body[1],body[2],body[3]]) as i64);
                    ans.modified = Some(i32::from_be_bytes([body[4],body[5],body[6],body[7]]) as i64);
                },
                ID_FINDER_INFO if len >= 8 => {
                    ans.hfs_type = Some([body[0],body[1],body[2],body[3]]);
                    ans.hfs_creator = Some([body[4],body[5],body[6],body[7]]);
                },
                ID_PRODOS_INFO if len >= 8 => {
                    ans.access = Some(u16::from_be_bytes([body[0],body[1]]));
                    ans.prodos_type = Some(body[3]);
                    ans.prodos_aux = Some(u16::from_be_bytes([body[6],body[7]]));
                },
                _ => {}
            }
        }
        Ok(ans)
    }
}

impl Archive for AppleSingle {
    fn from_bytes(data: &[u8]) -> Result<Self,DYNERR> {
        if data.len() >= 4 && data[0..4] == MAGIC_SINGLE {
            return Self::parse(data,false);
        }
        if data.len() >= 4 && data[0..4] == MAGIC_DOUBLE {
            return Self::parse(data,true);
        }
        Err(Box::new(Error::UnknownFormat))
    }
    fn to_bytes(&mut self) -> Result<Vec<u8>,DYNERR> {
        let mut entries: Vec<(u32,Vec<u8>)> = Vec::new();
        if !self.is_double && !self.data.is_empty() {
            entries.push((ID_DATA_FORK, self.data.clone()));
        }
        if !self.rsrc.is_empty() {
            entries.push((ID_RESOURCE_FORK, self.rsrc.clone()));
        }
        if !self.name.is_empty() {
            entries.push((ID_REAL_NAME, self.name.as_bytes().to_vec()));
        }
        if let Some(c) = &self.comment {
            entries.push((ID_COMMENT, c.as_bytes().to_vec()));
        }
        if let (Some(t),Some(c)) = (self.hfs_type,self.hfs_creator) {
            let mut body = vec![0u8;32];
            body[0..4].copy_from_slice(&t);
            body[4..8].copy_from_slice(&c);
            entries.push((ID_FINDER_INFO, body));
        }
        if let (Some(access),Some(typ),Some(aux)) = (self.access,self.prodos_type,self.prodos_aux) {
            let mut body = vec![0u8;8];
            body[0..2].copy_from_slice(&access.to_be_bytes());
            body[2] = 0;
            body[3] = typ;
            body[4..6].copy_from_slice(&[0,0]);
            body[6..8].copy_from_slice(&aux.to_be_bytes());
            entries.push((ID_PRODOS_INFO, body));
        }
        let mut out = Vec::new();
        out.extend(if self.is_double { MAGIC_DOUBLE } else { MAGIC_SINGLE });
        out.extend(VERSION);
        out.extend(std::iter::repeat(0u8).take(16));
        out.extend((entries.len() as u16).to_be_bytes());
        let mut body = Vec::new();
        let header_len = 26 + entries.len()*12;
        let mut offset = header_len;
        let mut dir = Vec::new();
        for (id,bytes) in &entries {
            dir.extend(id.to_be_bytes());
            dir.extend((offset as u32).to_be_bytes());
            dir.extend((bytes.len() as u32).to_be_bytes());
            body.extend(bytes);
            offset += bytes.len();
        }
        out.extend(dir);
        out.extend(body);
        Ok(out)
    }
    fn file_extensions() -> Vec<String> {
        vec!["as".to_string(),"adf".to_string()]
    }
    fn entries(&self) -> Vec<FileEntry> {
        let mut e = FileEntry::new(&self.name);
        e.supports_hfs_type = true;
        e.supports_rsrc_fork = true;
        e.attribs.data_len = Some(self.data.len());
        e.attribs.rsrc_len = Some(self.rsrc.len());
        e.attribs.prodos_type = self.prodos_type;
        e.attribs.aux = self.prodos_aux;
        e.attribs.hfs_type = self.hfs_type;
        e.attribs.hfs_creator = self.hfs_creator;
        e.attribs.comment = self.comment.clone();
        let unix_epoch = chrono::NaiveDate::from_ymd_opt(1970,1,1).unwrap().and_hms_opt(0,0,0).unwrap();
        if let Some(secs) = self.created {
            e.attribs.created = Some(unix_epoch + chrono::Duration::seconds(secs - MAC_EPOCH_OFFSET));
        }
        if let Some(secs) = self.modified {
            e.attribs.modified = Some(unix_epoch + chrono::Duration::seconds(secs - MAC_EPOCH_OFFSET));
        }
        vec![e]
    }
    fn read_part(&mut self, _path: &str, fork: Fork) -> Result<Vec<u8>,DYNERR> {
        match fork {
            Fork::Data => Ok(self.data.clone()),
            Fork::Rsrc => Ok(self.rsrc.clone())
        }
    }
    fn add_part(&mut self, entry: &FileEntry, fork: Fork, data: Vec<u8>) -> STDRESULT {
        self.name = entry.name();
        self.prodos_type = entry.attribs.prodos_type;
        self.prodos_aux = entry.attribs.aux;
        self.access = entry.attribs.access.map(|a| a as u16);
        self.hfs_type = entry.attribs.hfs_type;
        self.hfs_creator = entry.attribs.hfs_creator;
        self.comment = entry.attribs.comment.clone();
        match fork {
            Fork::Data => self.data = data,
            Fork::Rsrc => self.rsrc = data
        }
        Ok(())
    }
    fn delete_part(&mut self, _path: &str) -> STDRESULT {
        self.data.clear();
        self.rsrc.clear();
        Ok(())
    }
    fn probe(data: &[u8]) -> ProbeResult {
        if data.len() >= 4 && (data[0..4]==MAGIC_SINGLE || data[0..4]==MAGIC_DOUBLE) {
            ProbeResult::Yes
        } else {
            ProbeResult::No
        }
    }
}
