//! Partition maps layered atop a disk image's block-addressable storage.
//! Three families exist: map-based (first blocks hold partition records),
//! interleaved (two volumes packed sector-by-sector into one image), and
//! embedded (a host filesystem's own allocation reinterpreted as additional
//! volumes). All three end up producing [`Partition`] values: named block
//! ranges a filesystem can be mounted against.

pub mod apm;
pub mod cffa;
pub mod interleave;
pub mod embedded;

use crate::context::AppHook;
use crate::DYNERR;
use thiserror::Error;

#[derive(Error,Debug)]
pub enum Error {
    #[error("no partition map recognized in this image")]
    NotRecognized,
    #[error("partition map is corrupted")]
    Corrupted,
    #[error("partition index out of range")]
    BadIndex,
    #[error("partition is mounted read-only")]
    ReadOnly
}

/// Whether a partition may be written through. `ReadOnly` is used for
/// partitions whose extent isn't provably disjoint from another view of the
/// same bytes (the DOS/ProDOS hybrid case in `embedded::hybrid_partitions`);
/// everything else defaults to `ReadWrite`.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly
}

/// A named byte range within a disk image, in 512-byte blocks.
#[derive(Clone,Debug)]
pub struct Partition {
    pub name: String,
    pub kind: String,
    pub start_block: usize,
    pub block_count: usize,
    pub access: Access
}

impl Partition {
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.start_block*512 .. (self.start_block+self.block_count)*512
    }

    /// Returns an error unless this partition is writable, or `hook`
    /// overrides that with `force_writable`. Every write path that goes
    /// through a `Partition` (see [`write_partition_image`]) calls this
    /// first, so a hybrid disk's read-only marking can't be bypassed short
    /// of the caller explicitly asking to override it.
    pub fn require_writable(&self, hook: &AppHook) -> Result<(),DYNERR> {
        if self.access == Access::ReadOnly && !hook.force_writable {
            return Err(Box::new(Error::ReadOnly));
        }
        Ok(())
    }
}

/// Copies `partition`'s extent out of the whole image's blocks.
pub fn read_partition_image(whole: &[u8], partition: &Partition) -> Vec<u8> {
    let range = partition.byte_range();
    let end = range.end.min(whole.len());
    if range.start >= end {
        return Vec::new();
    }
    whole[range.start..end].to_vec()
}

/// Writes `data` into `partition`'s extent within the whole image's blocks,
/// refusing if the partition is read-only and `hook` doesn't override it.
pub fn write_partition_image(whole: &mut [u8], partition: &Partition, data: &[u8], hook: &AppHook) -> Result<(),DYNERR> {
    partition.require_writable(hook)?;
    let range = partition.byte_range();
    let end = range.end.min(whole.len());
    if range.start >= end {
        return Err(Box::new(Error::BadIndex));
    }
    let take = data.len().min(end-range.start);
    whole[range.start..range.start+take].copy_from_slice(&data[..take]);
    Ok(())
}

/// Common behavior of a partition map: given the whole image's blocks,
/// enumerate the partitions it describes.
pub trait MultiPart {
    /// Returns `None` if `blocks` does not carry this map's signature.
    fn scan(blocks: &[u8]) -> Option<Vec<Partition>> where Self: Sized;
}
