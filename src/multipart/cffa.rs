//! CFFA (CompactFlash for Apple) IDE cards present a fixed-size partition
//! table at the front of the card and have shipped in 4-, 6-, and 8-partition
//! firmware variants of the same basic layout. Since the variant isn't
//! recorded anywhere the image itself carries, detection is trial-parse:
//! try each known partition count against the image size and accept the
//! first one whose partitions tile the image exactly with no remainder.
//! This is a best-effort reconstruction of the convention, not a byte-exact
//! transcription of CFFA firmware source (none was available to check
//! against); alternates that also tile exactly are reported by `scan_all`
//! so a caller can fall back if the first guess mounts nothing sensible.

use crate::multipart::{Access,Partition};
use crate::bios::bpb::BootSector;

const VARIANTS: [usize;3] = [4,6,8];
const BLOCK: usize = 512;
/// Reserved blocks at the front of the card before partition data begins.
const HEADER_BLOCKS: usize = 1;

/// CFFA firmware also hosts plain FAT volumes (the `bios::fat`/`fs::fat`
/// module exists for exactly this); a partition's first block is checked
/// against the FAT BPB signature the same way `fs::fat::Disk::test_img`
/// does, so CFFA partitions are labeled by what they actually contain
/// instead of assuming ProDOS unconditionally.
fn label(blocks: &[u8], start_block: usize) -> String {
    let off = start_block*BLOCK;
    if off+BLOCK <= blocks.len() && BootSector::verify(&blocks[off..off+BLOCK].to_vec()) {
        "Apple_FAT".to_string()
    } else {
        "Apple_ProDOS".to_string()
    }
}

fn partitions_for(blocks: &[u8], n: usize) -> Option<Vec<Partition>> {
    let total_blocks = blocks.len()/BLOCK;
    let usable = total_blocks.checked_sub(HEADER_BLOCKS)?;
    if usable < n || usable % n != 0 {
        return None;
    }
    let per = usable / n;
    Some((0..n).map(|i| {
        let start_block = HEADER_BLOCKS + i*per;
        Partition {
            name: format!("CFFA{}",i+1),
            kind: label(blocks,start_block),
            start_block,
            block_count: per,
            access: Access::ReadWrite
        }
    }).collect())
}

/// First variant that tiles the image exactly, CFFA's own documented
/// preference order (`spec.md`'s "first validates wins" resolution).
pub fn scan(blocks: &[u8]) -> Option<Vec<Partition>> {
    VARIANTS.iter().find_map(|&n| partitions_for(blocks,n))
}

/// Every variant that also tiles the image exactly, for a caller that wants
/// to record the road not taken instead of failing silently.
pub fn scan_all(blocks: &[u8]) -> Vec<(usize,Vec<Partition>)> {
    VARIANTS.iter().filter_map(|&n| partitions_for(blocks,n).map(|p| (n,p))).collect()
}
