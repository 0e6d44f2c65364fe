//! # ProDOS file system
//!
//! Hierarchical, 512-byte-block file system. Directories are themselves files
//! stored as a linked chain of blocks; the first block of a directory (the
//! volume directory key block, or a subdirectory's key block) carries a
//! header plus 12 entries, subsequent blocks carry 13 entries each. Each
//! entry names either a subdirectory or a data file stored as seedling (one
//! data block), sapling (index block plus up to 256 data blocks), or tree
//! (master index block plus up to 128 index blocks). Free space is tracked
//! by a bitmap starting at the block named in the volume header.

pub mod types;
mod directory;

use std::collections::HashMap;
use std::str::FromStr;
use std::fmt::Write;
use log::{debug,error,warn};
use a2kit_macro::DiskStruct;

use types::*;
use directory::*;
use super::{Block,TextEncoder,FileImage,Records};
use crate::img;
use crate::commands::ItemType;
use crate::entry::FileEntry;
use crate::{DYNERR,STDRESULT};

pub const FS_NAME: &str = "prodos";

/// A directory block is either the volume's own key block, a subdirectory's
/// key block, or a plain continuation entry block; each has its own on-disk
/// header layout, so we have to know which kind we are looking at before
/// parsing it.
enum DirBlock {
    VolKey(KeyBlock<VolDirHeader>),
    SubKey(KeyBlock<SubDirHeader>),
    Entries(EntryBlock)
}

impl DirBlock {
    fn parse(dat: &[u8],is_key_block: bool,is_vol_root: bool) -> Result<Self,DYNERR> {
        if is_key_block && is_vol_root {
            return Ok(Self::VolKey(KeyBlock::<VolDirHeader>::from_bytes(dat)?));
        }
        if is_key_block {
            return Ok(Self::SubKey(KeyBlock::<SubDirHeader>::from_bytes(dat)?));
        }
        Ok(Self::Entries(EntryBlock::from_bytes(dat)?))
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut raw = match self {
            Self::VolKey(b) => b.to_bytes(),
            Self::SubKey(b) => b.to_bytes(),
            Self::Entries(b) => b.to_bytes()
        };
        raw.push(0);
        raw
    }
    fn next(&self) -> u16 {
        match self {
            Self::VolKey(b) => b.next(),
            Self::SubKey(b) => b.next(),
            Self::Entries(b) => b.next()
        }
    }
    fn entry_locations(&self,iblock: u16) -> Vec<EntryLocation> {
        match self {
            Self::VolKey(b) => b.entry_locations(iblock),
            Self::SubKey(b) => b.entry_locations(iblock),
            Self::Entries(b) => b.entry_locations(iblock)
        }
    }
    fn get_entry(&self,loc: &EntryLocation) -> Entry {
        match self {
            Self::VolKey(b) => b.get_entry(loc),
            Self::SubKey(b) => b.get_entry(loc),
            Self::Entries(b) => b.get_entry(loc)
        }
    }
    fn set_entry(&mut self,loc: &EntryLocation,entry: Entry) {
        match self {
            Self::VolKey(b) => b.set_entry(loc,entry),
            Self::SubKey(b) => b.set_entry(loc,entry),
            Self::Entries(b) => b.set_entry(loc,entry)
        }
    }
    fn inc_file_count(&mut self) {
        match self {
            Self::VolKey(b) => b.inc_file_count(),
            Self::SubKey(b) => b.inc_file_count(),
            Self::Entries(_) => panic!("entry blocks have no file count")
        }
    }
    fn dec_file_count(&mut self) {
        match self {
            Self::VolKey(b) => b.dec_file_count(),
            Self::SubKey(b) => b.dec_file_count(),
            Self::Entries(_) => panic!("entry blocks have no file count")
        }
    }
}

/// The primary interface for ProDOS disk operations.
pub struct Disk {
    img: Box<dyn img::DiskImage>
}

impl Disk {
    /// Create a disk file system using the given image as storage.
    pub fn from_img(img: Box<dyn img::DiskImage>) -> Self {
        Self { img }
    }
    /// Test an image to see if it already contains a valid ProDOS volume.
    pub fn test_img(img: &mut Box<dyn img::DiskImage>) -> bool {
        if let Ok(dat) = img.read_block(Block::PO(VOL_KEY_BLOCK as usize)) {
            if dat.len()<512 {
                return false;
            }
            if let Ok(kb) = KeyBlock::<VolDirHeader>::from_bytes(&dat) {
                if kb.header.storage_type() != StorageType::VolDirHeader {
                    debug!("block 2 storage type is not a volume directory header");
                    return false;
                }
                if kb.header.name().is_empty() {
                    return false;
                }
                return true;
            }
        }
        false
    }

    fn get_block(&mut self,iblock: u16) -> Vec<u8> {
        self.img.read_block(Block::PO(iblock as usize)).expect("ProDOS block read failed")
    }
    fn put_block(&mut self,iblock: u16,dat: &[u8]) {
        self.img.write_block(Block::PO(iblock as usize),dat).expect("ProDOS block write failed");
    }
    fn get_dir_block(&mut self,iblock: u16,is_key_block: bool,is_vol_root: bool) -> DirBlock {
        let dat = self.get_block(iblock);
        DirBlock::parse(&dat,is_key_block,is_vol_root).expect("corrupt ProDOS directory block")
    }
    fn vol_dir(&mut self) -> KeyBlock<VolDirHeader> {
        KeyBlock::<VolDirHeader>::from_bytes(&self.get_block(VOL_KEY_BLOCK)).expect("bad volume directory")
    }
    fn total_blocks(&mut self) -> usize {
        self.vol_dir().header.total_blocks() as usize
    }
    fn bitmap_start(&mut self) -> u16 {
        u16::from_le_bytes(self.vol_dir().header.bitmap_ptr)
    }

    fn is_block_free(&mut self,iblock: u16) -> bool {
        let map_start = self.bitmap_start();
        let byte = iblock as usize / 8;
        let bit = 0x80 >> (iblock % 8);
        let block = map_start + (byte/512) as u16;
        let dat = self.get_block(block);
        dat[byte%512] & bit > 0
    }
    fn set_block_used(&mut self,iblock: u16,used: bool) {
        let map_start = self.bitmap_start();
        let byte = iblock as usize / 8;
        let bit = 0x80 >> (iblock % 8);
        let block = map_start + (byte/512) as u16;
        let mut dat = self.get_block(block);
        if used {
            dat[byte%512] &= !bit;
        } else {
            dat[byte%512] |= bit;
        }
        self.put_block(block,&dat);
    }
    fn get_next_free_block(&mut self) -> Result<u16,DYNERR> {
        let total = self.total_blocks();
        for iblock in 1..total as u16 {
            if self.is_block_free(iblock) {
                return Ok(iblock);
            }
        }
        error!("ProDOS volume is full");
        Err(Box::new(Error::DiskFull))
    }
    fn allocate_block(&mut self) -> Result<u16,DYNERR> {
        let iblock = self.get_next_free_block()?;
        self.set_block_used(iblock,true);
        Ok(iblock)
    }
    fn free_block(&mut self,iblock: u16) {
        if iblock>0 {
            self.set_block_used(iblock,false);
        }
    }

    /// The chain of directory blocks starting at `key_block`, in order.
    fn dir_block_chain(&mut self,key_block: u16,is_vol_root: bool) -> Vec<u16> {
        let mut ans = vec![key_block];
        let mut cur = key_block;
        let mut first = true;
        loop {
            let blk = self.get_dir_block(cur,first,is_vol_root && first);
            let next = blk.next();
            first = false;
            if next==0 {
                break;
            }
            ans.push(next);
            cur = next;
        }
        ans
    }

    /// Recursive collector behind `catalog_entries`: walks every active entry
    /// in the directory rooted at `dir_key`, recording each as a `FileEntry`
    /// named `prefix/name`, and recurses into subdirectories with the joined
    /// name as the new prefix.
    fn walk_dir_entries(&mut self,dir_key: u16,is_vol_root: bool,prefix: &str,out: &mut Vec<FileEntry>) {
        let chain = self.dir_block_chain(dir_key,is_vol_root);
        let mut subdirs = Vec::new();
        for (i,blk) in chain.iter().enumerate() {
            let dir = self.get_dir_block(*blk,i==0,is_vol_root && i==0);
            for loc in dir.entry_locations(*blk) {
                let e = dir.get_entry(&loc);
                if !e.is_active() {
                    continue;
                }
                let name = e.name();
                let full_path = if prefix.is_empty() { name.clone() } else { format!("{}/{}",prefix,name) };
                let is_subdir = e.storage_type() == StorageType::SubDirEntry;
                let mut fe = FileEntry::new(&full_path);
                fe.is_dir = is_subdir;
                fe.attribs.prodos_type = Some(e.ftype());
                fe.attribs.aux = Some(e.aux());
                if !is_subdir {
                    fe.attribs.data_len = Some(e.eof());
                }
                out.push(fe);
                if is_subdir {
                    subdirs.push((e.get_ptr(),full_path));
                }
            }
        }
        for (key_ptr,sub_path) in subdirs {
            self.walk_dir_entries(key_ptr,false,&sub_path,out);
        }
    }

    fn find_in_dir(&mut self,key_block: u16,is_vol_root: bool,name: &str) -> Option<EntryLocation> {
        let chain = self.dir_block_chain(key_block,is_vol_root);
        for (i,blk) in chain.iter().enumerate() {
            let dir = self.get_dir_block(*blk,i==0,is_vol_root && i==0);
            for loc in dir.entry_locations(*blk) {
                let e = dir.get_entry(&loc);
                if e.is_active() && e.name().to_uppercase()==name.to_uppercase() {
                    return Some(loc);
                }
            }
        }
        None
    }

    /// Resolve a path to (containing directory's key block, is that directory the volume root,
    /// entry location if present, final path component).
    fn resolve(&mut self,path: &str) -> Result<(u16,bool,Option<EntryLocation>,String),DYNERR> {
        let trimmed = path.trim_start_matches('/');
        let parts: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        if parts.is_empty() {
            return Err(Box::new(Error::Syntax));
        }
        let mut dir_key: u16 = VOL_KEY_BLOCK;
        let mut dir_is_root = true;
        for (i,name) in parts.iter().enumerate() {
            let loc = self.find_in_dir(dir_key,dir_is_root,name);
            if i+1 == parts.len() {
                return Ok((dir_key,dir_is_root,loc,name.to_string()));
            }
            match loc {
                Some(l) => {
                    let is_key = l.idx>=2 && l.block==dir_key;
                    let dir = self.get_dir_block(l.block,is_key,dir_is_root && is_key);
                    let entry = dir.get_entry(&l);
                    if entry.storage_type() != StorageType::SubDirEntry {
                        return Err(Box::new(Error::PathNotFound));
                    }
                    dir_key = entry.get_ptr();
                    dir_is_root = false;
                },
                None => return Err(Box::new(Error::PathNotFound))
            }
        }
        Err(Box::new(Error::PathNotFound))
    }

    fn get_entry_at(&mut self,loc: &EntryLocation,is_vol_root: bool) -> Entry {
        let dir = self.get_dir_block(loc.block,loc.idx>=2,is_vol_root);
        dir.get_entry(loc)
    }
    fn set_entry_at(&mut self,loc: &EntryLocation,is_vol_root: bool,entry: Entry) {
        let mut dir = self.get_dir_block(loc.block,loc.idx>=2,is_vol_root);
        dir.set_entry(loc,entry);
        self.put_block(loc.block,&dir.to_bytes());
    }

    /// Find (or make room for) a free directory entry slot.  Also returns the entry's
    /// 1-based sequence number within the directory (what ProDOS calls `parent_entry_num`),
    /// counted across the whole block chain regardless of block boundaries.
    fn find_free_slot(&mut self,dir_key: u16,is_vol_root: bool) -> Result<(EntryLocation,u8),DYNERR> {
        let chain = self.dir_block_chain(dir_key,is_vol_root);
        let mut entry_num: u8 = 0;
        for (i,blk) in chain.iter().enumerate() {
            let dir = self.get_dir_block(*blk,i==0,is_vol_root && i==0);
            for loc in dir.entry_locations(*blk) {
                entry_num += 1;
                if !dir.get_entry(&loc).is_active() {
                    return Ok((loc,entry_num));
                }
            }
        }
        let last = *chain.last().unwrap();
        let new_block = self.allocate_block()?;
        let eb = EntryBlock::new();
        self.put_block(new_block,&eb.to_bytes());
        let mut last_dat = self.get_block(last);
        last_dat[2] = (new_block & 0xff) as u8;
        last_dat[3] = (new_block >> 8) as u8;
        self.put_block(last,&last_dat);
        let locs = eb.entry_locations(new_block);
        Ok((locs[0],entry_num+1))
    }

    fn inc_file_count(&mut self,dir_key: u16,is_vol_root: bool) {
        let mut dir = self.get_dir_block(dir_key,true,is_vol_root);
        dir.inc_file_count();
        self.put_block(dir_key,&dir.to_bytes());
    }
    fn dec_file_count(&mut self,dir_key: u16,is_vol_root: bool) {
        let mut dir = self.get_dir_block(dir_key,true,is_vol_root);
        dir.dec_file_count();
        self.put_block(dir_key,&dir.to_bytes());
    }

    /// Every data block referenced by an entry's storage tree (excludes index/master-index blocks).
    fn file_data_blocks(&mut self,entry: &Entry) -> Vec<u16> {
        let mut ans = Vec::new();
        match entry.storage_type() {
            StorageType::Seedling => {
                ans.push(entry.get_ptr());
            },
            StorageType::Sapling => {
                let idx = self.get_block(entry.get_ptr());
                for i in 0..256 {
                    let ptr = u16::from_le_bytes([idx[i],idx[256+i]]);
                    if ptr>0 {
                        ans.push(ptr);
                    }
                }
            },
            StorageType::Tree => {
                let master = self.get_block(entry.get_ptr());
                for i in 0..128 {
                    let iptr = u16::from_le_bytes([master[i],master[256+i]]);
                    if iptr>0 {
                        let idx = self.get_block(iptr);
                        for j in 0..256 {
                            let ptr = u16::from_le_bytes([idx[j],idx[256+j]]);
                            if ptr>0 {
                                ans.push(ptr);
                            }
                        }
                    }
                }
            },
            _ => {}
        }
        ans
    }

    fn free_file_storage(&mut self,entry: &Entry) {
        match entry.storage_type() {
            StorageType::Seedling => {
                self.free_block(entry.get_ptr());
            },
            StorageType::Sapling => {
                for b in self.file_data_blocks(entry) {
                    self.free_block(b);
                }
                self.free_block(entry.get_ptr());
            },
            StorageType::Tree => {
                let master = self.get_block(entry.get_ptr());
                for i in 0..128 {
                    let iptr = u16::from_le_bytes([master[i],master[256+i]]);
                    if iptr>0 {
                        let idx = self.get_block(iptr);
                        for j in 0..256 {
                            let ptr = u16::from_le_bytes([idx[j],idx[256+j]]);
                            if ptr>0 {
                                self.free_block(ptr);
                            }
                        }
                        self.free_block(iptr);
                    }
                }
                self.free_block(entry.get_ptr());
            },
            _ => {}
        }
    }

    /// Write a flat byte buffer as seedling/sapling/tree storage, return (storage_type,key_ptr,blocks_used).
    fn store_data(&mut self,dat: &[u8]) -> Result<(StorageType,u16,u16),DYNERR> {
        let nblocks = (dat.len()+511)/512;
        if nblocks<=1 {
            let b = self.allocate_block()?;
            let mut buf = vec![0u8;512];
            buf[0..dat.len()].copy_from_slice(dat);
            self.put_block(b,&buf);
            return Ok((StorageType::Seedling,b,1));
        }
        if nblocks<=256 {
            let mut data_ptrs = Vec::new();
            for chunk in dat.chunks(512) {
                let b = self.allocate_block()?;
                let mut buf = vec![0u8;512];
                buf[0..chunk.len()].copy_from_slice(chunk);
                self.put_block(b,&buf);
                data_ptrs.push(b);
            }
            let idx_ptr = self.allocate_block()?;
            let mut idx = vec![0u8;512];
            for (i,p) in data_ptrs.iter().enumerate() {
                idx[i] = (*p & 0xff) as u8;
                idx[256+i] = (*p >> 8) as u8;
            }
            self.put_block(idx_ptr,&idx);
            return Ok((StorageType::Sapling,idx_ptr,(data_ptrs.len()+1) as u16));
        }
        // tree storage: a master index block of up to 128 index blocks, each spanning 256 data blocks
        let mut used: u16 = 0;
        let mut index_ptrs: Vec<u16> = Vec::new();
        for group in dat.chunks(512*256) {
            let mut data_ptrs = Vec::new();
            for chunk in group.chunks(512) {
                let b = self.allocate_block()?;
                let mut buf = vec![0u8;512];
                buf[0..chunk.len()].copy_from_slice(chunk);
                self.put_block(b,&buf);
                data_ptrs.push(b);
                used += 1;
            }
            let idx_ptr = self.allocate_block()?;
            let mut idx = vec![0u8;512];
            for (i,p) in data_ptrs.iter().enumerate() {
                idx[i] = (*p & 0xff) as u8;
                idx[256+i] = (*p >> 8) as u8;
            }
            self.put_block(idx_ptr,&idx);
            index_ptrs.push(idx_ptr);
            used += 1;
        }
        let master_ptr = self.allocate_block()?;
        let mut master = vec![0u8;512];
        for (i,p) in index_ptrs.iter().enumerate() {
            master[i] = (*p & 0xff) as u8;
            master[256+i] = (*p >> 8) as u8;
        }
        self.put_block(master_ptr,&master);
        used += 1;
        Ok((StorageType::Tree,master_ptr,used))
    }

    fn read_data(&mut self,entry: &Entry) -> Vec<u8> {
        let mut ans = Vec::new();
        for b in self.file_data_blocks(entry) {
            ans.extend_from_slice(&self.get_block(b));
        }
        let eof = entry.eof();
        if eof < ans.len() {
            ans.truncate(eof);
        }
        ans
    }

    fn split_path(path: &str) -> (String,String) {
        let trimmed = path.trim_start_matches('/');
        let parts: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        match parts.len() {
            0 => (String::new(),String::new()),
            1 => (String::new(),parts[0].to_string()),
            _ => (parts[..parts.len()-1].join("/"),parts[parts.len()-1].to_string())
        }
    }

    fn dir_key_for(&mut self,parent: &str) -> Result<(u16,bool),DYNERR> {
        if parent.is_empty() {
            return Ok((VOL_KEY_BLOCK,true));
        }
        let (_,_,loc,_) = self.resolve(parent)?;
        let loc = loc.ok_or_else(|| -> DYNERR { Box::new(Error::PathNotFound) })?;
        let is_root = loc.block==VOL_KEY_BLOCK;
        let e = self.get_entry_at(&loc,is_root);
        Ok((e.get_ptr(),false))
    }

    fn read_file(&mut self,path: &str) -> Result<FileImage,DYNERR> {
        let (_,is_root,loc,_) = self.resolve(path)?;
        let loc = loc.ok_or_else(|| -> DYNERR { Box::new(Error::PathNotFound) })?;
        let entry = self.get_entry_at(&loc,is_root);
        if entry.storage_type()==StorageType::SubDirEntry {
            return Err(Box::new(Error::FileTypeMismatch));
        }
        let dat = self.read_data(&entry);
        let mut fimg = self.new_fimg(BLOCK_SIZE);
        entry.metadata_to_fimg(&mut fimg);
        fimg.desequence(&dat);
        Ok(fimg)
    }

    fn write_file(&mut self,path: &str,fimg: &FileImage) -> Result<usize,DYNERR> {
        let (parent,name) = Self::split_path(path);
        if !is_name_valid(&name) {
            return Err(Box::new(Error::Syntax));
        }
        let (dir_key,is_root) = self.dir_key_for(&parent)?;
        let dat = fimg.sequence();
        let (stype,key_ptr,blocks) = self.store_data(&dat)?;
        if let Some(existing) = self.find_in_dir(dir_key,is_root,&name) {
            let old = self.get_entry_at(&existing,is_root);
            self.free_file_storage(&old);
            let mut e = Entry::create_file(&name,fimg,key_ptr,dir_key,None)?;
            e.change_storage_type(stype);
            e.delta_blocks(blocks as i32);
            e.set_eof(dat.len());
            self.set_entry_at(&existing,is_root,e);
            return Ok(dat.len());
        }
        let (loc,_) = self.find_free_slot(dir_key,is_root)?;
        let mut e = Entry::create_file(&name,fimg,key_ptr,dir_key,None)?;
        e.change_storage_type(stype);
        e.delta_blocks(blocks as i32);
        e.set_eof(dat.len());
        self.set_entry_at(&loc,is_root,e);
        self.inc_file_count(dir_key,is_root);
        Ok(dat.len())
    }

    fn modify(&mut self,path: &str,locked: Option<bool>,new_name: Option<&str>,new_type: Option<&str>) -> STDRESULT {
        let (_,is_root,loc,_) = self.resolve(path)?;
        let loc = loc.ok_or_else(|| -> DYNERR { Box::new(Error::PathNotFound) })?;
        let mut e = self.get_entry_at(&loc,is_root);
        if let Some(lock) = locked {
            e.set_access(Access::Write,!lock);
            e.set_access(Access::Rename,!lock);
            e.set_access(Access::Destroy,!lock);
        }
        if let Some(name) = new_name {
            if !is_name_valid(name) {
                return Err(Box::new(Error::Syntax));
            }
            e.rename(name);
        }
        if let Some(typ) = new_type {
            let code = match u8::from_str(typ) {
                Ok(n) => n,
                Err(_) => FileType::from_str(typ).map(|t| t as u8).map_err(|_| -> DYNERR { Box::new(Error::FileTypeMismatch) })?
            };
            e.set_ftype(code);
        }
        self.set_entry_at(&loc,is_root,e);
        Ok(())
    }
}

fn usize_from_le(bytes: &[u8]) -> usize {
    let mut ans: usize = 0;
    for (i,b) in bytes.iter().enumerate() {
        if i>=8 {
            break;
        }
        ans += (*b as usize) << (i*8);
    }
    ans
}

impl super::DiskFS for Disk {
    fn new_fimg(&self,chunk_len: usize) -> FileImage {
        FileImage {
            fimg_version: FileImage::fimg_version(),
            file_system: FS_NAME.to_string(),
            chunk_len,
            eof: vec![0;3],
            fs_type: vec![FileType::Binary as u8],
            aux: vec![0,0],
            access: vec![STD_ACCESS],
            created: vec![0;4],
            modified: vec![0;4],
            version: vec![0],
            min_version: vec![0],
            chunks: HashMap::new()
        }
    }
    fn catalog_to_stdout(&mut self,path: &str) -> STDRESULT {
        let (dir_key,is_root) = if path.is_empty() || path=="/" {
            (VOL_KEY_BLOCK,true)
        } else {
            let (_,_,loc,_) = self.resolve(path)?;
            match loc {
                Some(l) => {
                    let root = l.block==VOL_KEY_BLOCK;
                    (self.get_entry_at(&l,root).get_ptr(),false)
                },
                None => return Err(Box::new(Error::PathNotFound))
            }
        };
        println!();
        println!("{:16}{:4} {:6} {:16} {:16} {:7} {:7}","NAME","TYPE","BLOCKS","MODIFIED","CREATED","ENDFILE","SUBTYPE");
        let chain = self.dir_block_chain(dir_key,is_root);
        for (i,blk) in chain.iter().enumerate() {
            let dir = self.get_dir_block(*blk,i==0,is_root && i==0);
            for loc in dir.entry_locations(*blk) {
                let e = dir.get_entry(&loc);
                if e.is_active() {
                    println!("{}",e);
                }
            }
        }
        println!();
        Ok(())
    }
    fn catalog_entries(&mut self,path: &str) -> Result<Vec<FileEntry>,DYNERR> {
        let (dir_key,is_root) = if path.is_empty() || path=="/" {
            (VOL_KEY_BLOCK,true)
        } else {
            let (_,_,loc,_) = self.resolve(path)?;
            match loc {
                Some(l) => {
                    let root = l.block==VOL_KEY_BLOCK;
                    (self.get_entry_at(&l,root).get_ptr(),false)
                },
                None => return Err(Box::new(Error::PathNotFound))
            }
        };
        let prefix = path.trim_matches('/');
        let mut ans = Vec::new();
        self.walk_dir_entries(dir_key,is_root,prefix,&mut ans);
        Ok(ans)
    }
    fn create(&mut self,path: &str) -> STDRESULT {
        let (parent,name) = Self::split_path(path);
        if !is_name_valid(&name) {
            return Err(Box::new(Error::Syntax));
        }
        let (dir_key,is_root) = self.dir_key_for(&parent)?;
        if self.find_in_dir(dir_key,is_root,&name).is_some() {
            return Err(Box::new(Error::DuplicateFilename));
        }
        let (loc,entry_num) = self.find_free_slot(dir_key,is_root)?;
        let key_block = self.allocate_block()?;
        let mut sub = KeyBlock::<SubDirHeader>::new();
        sub.header.create(&name,dir_key,entry_num,None);
        self.put_block(key_block,&sub.to_bytes());
        let e = Entry::create_subdir(&name,key_block,dir_key,None);
        self.set_entry_at(&loc,is_root,e);
        self.inc_file_count(dir_key,is_root);
        Ok(())
    }
    fn delete(&mut self,path: &str) -> STDRESULT {
        let (dir_key,is_root,loc,_) = self.resolve(path)?;
        let loc = loc.ok_or_else(|| -> DYNERR { Box::new(Error::PathNotFound) })?;
        let e = self.get_entry_at(&loc,is_root);
        if !e.get_access(Access::Destroy) {
            return Err(Box::new(Error::FileLocked));
        }
        match e.storage_type() {
            StorageType::SubDirEntry => {
                let sub_dir = self.get_dir_block(e.get_ptr(),true,false);
                let has_files = sub_dir.entry_locations(e.get_ptr()).iter().any(|l| sub_dir.get_entry(l).is_active());
                if has_files || sub_dir.next()!=0 {
                    return Err(Box::new(Error::DirectoryFull));
                }
                self.free_block(e.get_ptr());
            },
            _ => self.free_file_storage(&e)
        }
        self.set_entry_at(&loc,is_root,Entry::new());
        self.dec_file_count(dir_key,is_root);
        Ok(())
    }
    fn rename(&mut self,path: &str,name: &str) -> STDRESULT {
        self.modify(path,None,Some(name),None)
    }
    fn protect(&mut self,path: &str,_password: &str,read: bool,write: bool,delete: bool) -> STDRESULT {
        let (_,is_root,loc,_) = self.resolve(path)?;
        let loc = loc.ok_or_else(|| -> DYNERR { Box::new(Error::PathNotFound) })?;
        let mut e = self.get_entry_at(&loc,is_root);
        e.set_access(Access::Read,read);
        e.set_access(Access::Write,write);
        e.set_access(Access::Destroy,delete);
        self.set_entry_at(&loc,is_root,e);
        Ok(())
    }
    fn unprotect(&mut self,path: &str) -> STDRESULT {
        let (_,is_root,loc,_) = self.resolve(path)?;
        let loc = loc.ok_or_else(|| -> DYNERR { Box::new(Error::PathNotFound) })?;
        let mut e = self.get_entry_at(&loc,is_root);
        e.set_all_access(STD_ACCESS);
        self.set_entry_at(&loc,is_root,e);
        Ok(())
    }
    fn lock(&mut self,path: &str) -> STDRESULT {
        self.modify(path,Some(true),None,None)
    }
    fn unlock(&mut self,path: &str) -> STDRESULT {
        self.modify(path,Some(false),None,None)
    }
    fn retype(&mut self,path: &str,new_type: &str,_sub_type: &str) -> STDRESULT {
        self.modify(path,None,None,Some(new_type))
    }
    fn bload(&mut self,path: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(path)?;
        let addr = u16::from_le_bytes([*fimg.aux.get(0).unwrap_or(&0),*fimg.aux.get(1).unwrap_or(&0)]);
        let eof = usize_from_le(&fimg.eof);
        Ok((addr,fimg.sequence_limited(eof)))
    }
    fn bsave(&mut self,path: &str,dat: &[u8],start_addr: u16,trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        let padded = match trailing { Some(t) => [dat,t].concat(), None => dat.to_vec() };
        let mut fimg = self.new_fimg(BLOCK_SIZE);
        fimg.fs_type = vec![FileType::Binary as u8];
        fimg.aux = start_addr.to_le_bytes().to_vec();
        fimg.desequence(&padded);
        self.write_file(path,&fimg)
    }
    fn load(&mut self,path: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        self.bload(path)
    }
    fn save(&mut self,path: &str,dat: &[u8],typ: ItemType,trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        let padded = match trailing { Some(t) => [dat,t].concat(), None => dat.to_vec() };
        let ftype = match typ {
            ItemType::ApplesoftTokens => FileType::ApplesoftCode,
            ItemType::IntegerTokens => FileType::IntegerCode,
            ItemType::Binary | ItemType::Raw => FileType::Binary,
            _ => return Err(Box::new(Error::FileTypeMismatch))
        };
        let mut fimg = self.new_fimg(BLOCK_SIZE);
        fimg.fs_type = vec![ftype as u8];
        fimg.desequence(&padded);
        self.write_file(path,&fimg)
    }
    fn read_raw(&mut self,path: &str,trunc: bool) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(path)?;
        let dat = if trunc { fimg.sequence_limited(usize_from_le(&fimg.eof)) } else { fimg.sequence() };
        Ok((0,dat))
    }
    fn write_raw(&mut self,path: &str,dat: &[u8]) -> Result<usize,DYNERR> {
        let mut fimg = self.new_fimg(BLOCK_SIZE);
        fimg.fs_type = vec![FileType::Binary as u8];
        fimg.desequence(dat);
        self.write_file(path,&fimg)
    }
    fn read_text(&mut self,path: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        self.read_raw(path,true)
    }
    fn write_text(&mut self,path: &str,dat: &[u8]) -> Result<usize,DYNERR> {
        let mut fimg = self.new_fimg(BLOCK_SIZE);
        fimg.fs_type = vec![FileType::Text as u8];
        fimg.desequence(dat);
        self.write_file(path,&fimg)
    }
    fn read_records(&mut self,path: &str,record_length: usize) -> Result<Records,DYNERR> {
        let fimg = self.read_file(path)?;
        let l = if record_length>0 {
            record_length
        } else {
            u16::from_le_bytes([*fimg.aux.get(0).unwrap_or(&0),*fimg.aux.get(1).unwrap_or(&0)]) as usize
        };
        if l==0 || l>=32768 {
            return Err(Box::new(Error::Range));
        }
        let encoder = Encoder::new(vec![0x0d]);
        Records::from_fimg(&fimg,l,encoder)
    }
    fn write_records(&mut self,path: &str,records: &Records) -> Result<usize,DYNERR> {
        let mut fimg = self.new_fimg(BLOCK_SIZE);
        fimg.fs_type = vec![FileType::Text as u8];
        fimg.aux = (records.record_len as u16).to_le_bytes().to_vec();
        let encoder = Encoder::new(vec![0x0d]);
        records.update_fimg(&mut fimg,true,encoder)?;
        self.write_file(path,&fimg)
    }
    fn read_any(&mut self,path: &str) -> Result<FileImage,DYNERR> {
        self.read_file(path)
    }
    fn write_any(&mut self,path: &str,fimg: &FileImage) -> Result<usize,DYNERR> {
        if fimg.chunk_len != BLOCK_SIZE {
            warn!("chunk length {} is unusual for ProDOS",fimg.chunk_len);
        }
        self.write_file(path,fimg)
    }
    fn read_block(&mut self,num: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let iblock = usize::from_str(num)?;
        if iblock >= self.total_blocks() {
            return Err(Box::new(Error::Range));
        }
        Ok((0,self.get_block(iblock as u16)))
    }
    fn write_block(&mut self,num: &str,dat: &[u8]) -> Result<usize,DYNERR> {
        let iblock = usize::from_str(num)?;
        if iblock >= self.total_blocks() || dat.len()>BLOCK_SIZE {
            return Err(Box::new(Error::Range));
        }
        self.put_block(iblock as u16,dat);
        Ok(dat.len())
    }
    fn decode_text(&self,dat: &[u8]) -> Result<String,DYNERR> {
        let encoder = Encoder::new(vec![]);
        encoder.decode(dat).ok_or_else(|| Box::new(Error::IOError) as DYNERR)
    }
    fn encode_text(&self,s: &str) -> Result<Vec<u8>,DYNERR> {
        let encoder = Encoder::new(vec![]);
        encoder.encode(s).ok_or_else(|| Box::new(Error::IOError) as DYNERR)
    }
    fn standardize(&mut self,_ref_con: u16) -> HashMap<Block,Vec<usize>> {
        // creation/modification timestamps in the volume header are not reproducible
        HashMap::from([(Block::PO(VOL_KEY_BLOCK as usize),vec![0x1c,0x1d,0x1e,0x1f])])
    }
    fn compare(&mut self,path: &std::path::Path,ignore: &HashMap<Block,Vec<usize>>) {
        let mut emulator_disk = crate::create_fs_from_file(path.to_str().unwrap()).expect("read error");
        let total = self.total_blocks();
        for iblock in 0..total {
            let addr = Block::PO(iblock);
            let mut actual = self.img.read_block(addr).expect("bad block access");
            let mut expected = emulator_disk.get_img().read_block(addr).expect("bad block access");
            if let Some(ignorable) = ignore.get(&addr) {
                for offset in ignorable {
                    actual[*offset] = 0;
                    expected[*offset] = 0;
                }
            }
            for row in 0..16 {
                let mut fmt_actual = String::new();
                let mut fmt_expected = String::new();
                let offset = row*32;
                write!(&mut fmt_actual,"{:02X?}",&actual[offset..offset+32].to_vec()).expect("format error");
                write!(&mut fmt_expected,"{:02X?}",&expected[offset..offset+32].to_vec()).expect("format error");
                assert_eq!(fmt_actual,fmt_expected,"at block {}, row {}",iblock,row);
            }
        }
    }
    fn get_img(&mut self) -> &mut Box<dyn img::DiskImage> {
        &mut self.img
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn name_validation() {
        assert!(is_name_valid("HELLO"));
        assert!(is_name_valid("A.B.C"));
        assert!(!is_name_valid("1BAD"));
        assert!(!is_name_valid(""));
    }
}
