//! gzip: a single-entry archive. The header carries an optional original
//! filename and an mtime; the body is one deflate stream. Read and write go
//! through `flate2`, the same way `zip.rs` leans on the `zip` crate.

use std::io::{Read,Write};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use crate::archive::{Archive,Fork,Error};
use crate::entry::FileEntry;
use crate::context::ProbeResult;
use crate::{DYNERR,STDRESULT};

const SIGNATURE: [u8;2] = [0x1F,0x8B];

pub struct Gzip {
    name: String,
    mtime: u32,
    data: Vec<u8>
}

impl Archive for Gzip {
    fn from_bytes(data: &[u8]) -> Result<Self,DYNERR> {
        if data.len() < 2 || data[0..2] != SIGNATURE {
            return Err(Box::new(Error::UnknownFormat));
        }
        let mut dec = GzDecoder::new(data);
        let name = dec.header().and_then(|h| h.filename())
            .map(|b| String::from_utf8_lossy(b).to_string())
            .unwrap_or_default();
        let mtime = dec.header().map(|h| h.mtime()).unwrap_or(0);
        let mut out = Vec::new();
        dec.read_to_end(&mut out).map_err(|_| Error::Corrupted)?;
        Ok(Self { name, mtime, data: out })
    }
    fn to_bytes(&mut self) -> Result<Vec<u8>,DYNERR> {
        let mut builder = flate2::GzBuilder::new().mtime(self.mtime);
        if !self.name.is_empty() {
            builder = builder.filename(self.name.clone());
        }
        let mut enc = builder.write(Vec::new(),Compression::default());
        enc.write_all(&self.data)?;
        Ok(enc.finish()?)
    }
    fn file_extensions() -> Vec<String> {
        vec!["gz".to_string()]
    }
    fn entries(&self) -> Vec<FileEntry> {
        let name = if self.name.is_empty() { "data".to_string() } else { self.name.clone() };
        let mut e = FileEntry::new(&name);
        e.attribs.data_len = Some(self.data.len());
        vec![e]
    }
    fn read_part(&mut self, _path: &str, fork: Fork) -> Result<Vec<u8>,DYNERR> {
        match fork {
            Fork::Data => Ok(self.data.clone()),
            Fork::Rsrc => Err(Box::new(Error::PathNotFound))
        }
    }
    fn add_part(&mut self, entry: &FileEntry, fork: Fork, data: Vec<u8>) -> STDRESULT {
        if fork != Fork::Data {
            return Err(Box::new(Error::UnsupportedCompression));
        }
        self.name = entry.name();
        self.data = data;
        Ok(())
    }
    fn delete_part(&mut self, _path: &str) -> STDRESULT {
        self.data.clear();
        Ok(())
    }
    fn probe(data: &[u8]) -> ProbeResult {
        if data.len() >= 2 && data[0..2] == SIGNATURE {
            ProbeResult::Yes
        } else {
            ProbeResult::No
        }
    }
}

impl Gzip {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), mtime: 0, data: Vec::new() }
    }
}
