//! ZIP: local file headers plus a trailing central directory, read and
//! written through the `zip` crate rather than hand-rolled, the same way the
//! disk-image codecs lean on `a2kit_macro`'s `DiskStruct` rather than manual
//! byte slicing wherever a crate already owns the format. The only behavior
//! specific to this engine is the MacZip convention: a `__MACOSX/._name`
//! sibling entry carries `name`'s resource fork and HFS type/creator as an
//! embedded AppleDouble payload.

use std::io::{Cursor,Read,Write};
use ::zip::{ZipArchive,ZipWriter,write::SimpleFileOptions};
use crate::archive::{Archive,Fork,Error,applesingle::AppleSingle};
use crate::entry::FileEntry;
use crate::context::ProbeResult;
use crate::{DYNERR,STDRESULT};

const SIGNATURE: [u8;4] = [0x50,0x4B,0x03,0x04];

struct Member {
    name: String,
    data: Vec<u8>,
    rsrc: Vec<u8>,
    is_dir: bool
}

pub struct Zip {
    members: Vec<Member>
}

fn mac_sibling(name: &str) -> String {
    match name.rsplit_once('/') {
        Some((dir,leaf)) => format!("{}/__MACOSX/._{}",dir,leaf),
        None => format!("__MACOSX/._{}",name)
    }
}

impl Archive for Zip {
    fn from_bytes(data: &[u8]) -> Result<Self,DYNERR> {
        if data.len() < 4 || data[0..4] != SIGNATURE {
            return Err(Box::new(Error::UnknownFormat));
        }
        let mut zip = ZipArchive::new(Cursor::new(data.to_vec()))
            .map_err(|_| Error::Corrupted)?;
        let mut members: Vec<Member> = Vec::new();
        let mut rsrc_by_name: std::collections::HashMap<String,Vec<u8>> = std::collections::HashMap::new();
        for i in 0..zip.len() {
            let mut f = zip.by_index(i).map_err(|_| Error::Corrupted)?;
            if f.name().contains("__MACOSX/") {
                let mut buf = Vec::new();
                f.read_to_end(&mut buf).ok();
                if let Ok(mut ads) = AppleSingle::from_bytes(&buf) {
                    if let Some((dir,leaf)) = f.name().trim_start_matches("__MACOSX/").rsplit_once("._") {
                        let _ = dir;
                        if let Ok(rsrc) = ads.read_part(leaf,Fork::Rsrc) {
                            rsrc_by_name.insert(leaf.trim_start_matches('.').to_string(),rsrc);
                        }
                    }
                }
                continue;
            }
            let name = f.name().to_string();
            let is_dir = f.is_dir();
            let mut data = Vec::new();
            if !is_dir {
                f.read_to_end(&mut data).ok();
            }
            members.push(Member { name, data, rsrc: Vec::new(), is_dir });
        }
        for m in &mut members {
            if let Some(r) = rsrc_by_name.remove(&m.name) {
                m.rsrc = r;
            }
        }
        Ok(Self { members })
    }
    fn to_bytes(&mut self) -> Result<Vec<u8>,DYNERR> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zw = ZipWriter::new(&mut buf);
            let opts = SimpleFileOptions::default().compression_method(::zip::CompressionMethod::Deflated);
            for m in &self.members {
                if m.is_dir {
                    zw.add_directory(&m.name,opts).map_err(|e| Box::new(e) as DYNERR)?;
                    continue;
                }
                zw.start_file(&m.name,opts).map_err(|e| Box::new(e) as DYNERR)?;
                zw.write_all(&m.data)?;
                if !m.rsrc.is_empty() {
                    let mut ads = AppleSingle::double_for_rsrc(&m.name,m.rsrc.clone(),None,None);
                    let payload = ads.to_bytes()?;
                    zw.start_file(&mac_sibling(&m.name),opts).map_err(|e| Box::new(e) as DYNERR)?;
                    zw.write_all(&payload)?;
                }
            }
            zw.finish().map_err(|e| Box::new(e) as DYNERR)?;
        }
        Ok(buf.into_inner())
    }
    fn file_extensions() -> Vec<String> {
        vec!["zip".to_string()]
    }
    fn entries(&self) -> Vec<FileEntry> {
        self.members.iter().map(|m| {
            let mut e = FileEntry::new(&m.name);
            e.is_dir = m.is_dir;
            e.supports_rsrc_fork = true;
            e.attribs.data_len = Some(m.data.len());
            if !m.rsrc.is_empty() {
                e.attribs.rsrc_len = Some(m.rsrc.len());
            }
            e
        }).collect()
    }
    fn read_part(&mut self, path: &str, fork: Fork) -> Result<Vec<u8>,DYNERR> {
        let m = self.members.iter().find(|m| m.name==path).ok_or(Error::PathNotFound)?;
        match fork {
            Fork::Data => Ok(m.data.clone()),
            Fork::Rsrc => Ok(m.rsrc.clone())
        }
    }
    fn add_part(&mut self, entry: &FileEntry, fork: Fork, data: Vec<u8>) -> STDRESULT {
        let path = entry.path.clone();
        let pos = self.members.iter().position(|m| m.name==path);
        let idx = match pos {
            Some(i) => i,
            None => {
                self.members.push(Member { name: path, data: Vec::new(), rsrc: Vec::new(), is_dir: entry.is_dir });
                self.members.len()-1
            }
        };
        match fork {
            Fork::Data => self.members[idx].data = data,
            Fork::Rsrc => self.members[idx].rsrc = data
        }
        Ok(())
    }
    fn delete_part(&mut self, path: &str) -> STDRESULT {
        let before = self.members.len();
        self.members.retain(|m| m.name != path);
        if self.members.len() == before {
            return Err(Box::new(Error::PathNotFound));
        }
        Ok(())
    }
    fn probe(data: &[u8]) -> ProbeResult {
        if data.len() >= 4 && data[0..4] == SIGNATURE {
            ProbeResult::Yes
        } else {
            ProbeResult::No
        }
    }
}
