//! # File entries and portable attributes
//!
//! A [`FileEntry`] is the work tree's idea of "a file somewhere in some container":
//! it names a path inside whatever filesystem or archive currently owns it, and
//! carries a [`FileAttribs`] bag describing everything the source format recorded
//! about the file. `FileAttribs` is deliberately a superset of any one format's
//! metadata; fields a destination format cannot represent are dropped on
//! [`FileAttribs::copy_attrs_to`], with the drop recorded in the destination
//! entry's `notes` rather than silently lost.

use std::fmt;
use chrono::NaiveDateTime;

/// Portable bag of file metadata. Every field here is optional because no single
/// source format populates all of them; `None` means "this format doesn't carry
/// this attribute", not "the attribute is zero".
#[derive(Clone,Default)]
pub struct FileAttribs {
    pub name: Option<String>,
    /// ProDOS file type byte, or the DOS text/binary/applesoft/integer code
    pub prodos_type: Option<u8>,
    /// ProDOS/IIgs auxiliary type (16 bits)
    pub aux: Option<u16>,
    /// Mac OS four-character type code
    pub hfs_type: Option<[u8;4]>,
    /// Mac OS four-character creator code
    pub hfs_creator: Option<[u8;4]>,
    /// Access bits, encoding is format-specific (see e.g. `fs::prodos::types::Access`)
    pub access: Option<u8>,
    pub data_len: Option<usize>,
    pub rsrc_len: Option<usize>,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub accessed: Option<NaiveDateTime>,
    pub comment: Option<String>,
    /// Blocks/sectors actually allocated, as opposed to `data_len`/`rsrc_len`
    pub storage_size: Option<usize>
}

impl FileAttribs {
    pub fn new() -> Self {
        Self::default()
    }
    /// Map as many fields as possible onto `dst`. Fields `dst` cannot represent
    /// are left untouched there and reported through `notes` instead of panicking
    /// or erroring, since loss of a cosmetic attribute is not a failure of the
    /// copy as a whole.
    pub fn copy_attrs_to(&self, dst: &mut FileEntry, include_name: bool) {
        if include_name {
            if let Some(name) = &self.name {
                dst.attribs.name = Some(name.clone());
            } else {
                dst.notes.push("source has no name to copy".to_string());
            }
        }
        macro_rules! carry {
            ($field:ident) => {
                if let Some(v) = self.$field {
                    dst.attribs.$field = Some(v);
                }
            };
        }
        carry!(prodos_type);
        carry!(aux);
        carry!(hfs_type);
        carry!(hfs_creator);
        carry!(access);
        carry!(data_len);
        carry!(rsrc_len);
        carry!(created);
        carry!(modified);
        carry!(accessed);
        carry!(storage_size);
        if let Some(c) = &self.comment {
            dst.attribs.comment = Some(c.clone());
        }
        if self.hfs_type.is_some() && dst.supports_hfs_type == false {
            dst.notes.push("destination cannot represent HFS type/creator, dropped".to_string());
            dst.attribs.hfs_type = None;
            dst.attribs.hfs_creator = None;
        }
        if self.rsrc_len.is_some() && dst.supports_rsrc_fork == false {
            dst.notes.push("destination has no resource fork, dropped".to_string());
            dst.attribs.rsrc_len = None;
        }
    }
}

/// A file (or directory) located somewhere in the work tree: a path string
/// meaningful to whatever container currently owns it, plus the attributes that
/// were read from (or are about to be written to) that container.
#[derive(Clone)]
pub struct FileEntry {
    /// Path as understood by the owning filesystem or archive, e.g. `DIR/SUBDIR/FILE`
    pub path: String,
    pub is_dir: bool,
    pub attribs: FileAttribs,
    /// Whether the owning container can store an HFS type/creator pair
    pub supports_hfs_type: bool,
    /// Whether the owning container can store a second (resource) fork
    pub supports_rsrc_fork: bool,
    /// Warnings accumulated while reading or writing this entry; never fatal by
    /// themselves, but surfaced to the caller rather than dropped
    pub notes: Vec<String>
}

impl FileEntry {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            is_dir: false,
            attribs: FileAttribs::new(),
            supports_hfs_type: false,
            supports_rsrc_fork: false,
            notes: Vec::new()
        }
    }
    pub fn name(&self) -> String {
        match self.path.rsplit_once('/') {
            Some((_,name)) => name.to_string(),
            None => self.path.clone()
        }
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,"{}",self.path)
    }
}
