//! # Archive codecs (L1, archive family)
//!
//! An archive stores an ordered list of entries; each entry may carry a data
//! fork and (for formats that support it) a resource fork, plus whatever
//! metadata the format records. This module defines the common [`Archive`]
//! contract and [`Fork`] selector; each concrete format lives in its own
//! sub-module in the style `fs`'s filesystems do for disk images.
//!
//! The contract mirrors the one `fs::DiskFS` establishes for filesystems:
//! given an existing byte stream, produce entries whose parts are read lazily
//! on demand; given an in-memory entry list (as built up by `add`/`delete`),
//! produce a fresh byte stream on `to_bytes`.

pub mod nufx;
pub mod binary2;
pub mod applesingle;
#[cfg(feature = "zip")]
pub mod zip;
#[cfg(feature = "gzip")]
pub mod gzip;

use crate::entry::FileEntry;
use crate::{DYNERR,STDRESULT};

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("archive format is not recognized")]
    UnknownFormat,
    #[error("archive is corrupted or truncated")]
    Corrupted,
    #[error("path not found in archive")]
    PathNotFound,
    #[error("path already exists in archive")]
    PathExists,
    #[error("compression method is not supported")]
    UnsupportedCompression
}

/// Selects which fork of an entry an operation addresses. Most formats only
/// ever populate `Data`; `Rsrc` matters for AppleSingle/Double, ZIP's
/// `__MACOSX/._name` convention, and NuFX resource-fork threads.
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Fork {
    Data,
    Rsrc
}

/// Common behavior of all archive codecs. A concrete type (e.g. `nufx::Disk`)
/// owns the whole entry list and, for formats that are rewritten wholesale
/// rather than patched in place, the raw bytes backing unread parts.
pub trait Archive {
    /// Parse an existing archive. Returns an error if the bytes do not match
    /// this codec's signature/structure.
    fn from_bytes(data: &[u8]) -> Result<Self,DYNERR> where Self: Sized;
    /// Serialize the current entry list to a fresh byte stream.
    fn to_bytes(&mut self) -> Result<Vec<u8>,DYNERR>;
    /// Extensions this codec claims, lowercase, without the leading dot.
    fn file_extensions() -> Vec<String> where Self: Sized;
    /// Entries in archive order. Parts are not read here; call `read_part`.
    fn entries(&self) -> Vec<FileEntry>;
    /// Read one fork of one entry's data into memory.
    fn read_part(&mut self, path: &str, fork: Fork) -> Result<Vec<u8>,DYNERR>;
    /// Insert or replace a fork's bytes for an entry, creating the entry if
    /// it is new. Both the data and, where the format has one, resource fork
    /// may be set independently.
    fn add_part(&mut self, entry: &FileEntry, fork: Fork, data: Vec<u8>) -> STDRESULT;
    /// Remove an entry (all of its forks) entirely.
    fn delete_part(&mut self, path: &str) -> STDRESULT;
    /// Probe a byte stream's first bytes for this codec's signature without
    /// fully parsing it; used by `analyzer::FileAnalyzer`.
    fn probe(data: &[u8]) -> crate::context::ProbeResult where Self: Sized;
}
