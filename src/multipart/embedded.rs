//! DOS.MASTER-style embedded volumes: a host ProDOS volume reserves a run of
//! blocks (marked used in its own bitmap so ordinary ProDOS file allocation
//! never touches them) and treats each 280-block (140 KB) slice as an
//! independent DOS 3.3 volume. A hybrid DOS+ProDOS disk is the degenerate
//! one-volume case: DOS owns the low tracks by convention, ProDOS owns the
//! rest, and the two allocation maps can in principle overlap — this crate
//! mounts such a hybrid read-only (see `DESIGN.md`'s Open Question
//! resolution) since there is no way to verify that writing through one view
//! wouldn't clobber a file live in the other. The read-only marking lives on
//! [`Partition::access`] and is enforced by
//! [`crate::multipart::write_partition_image`], not just documented here.

use crate::multipart::{Access,Partition};

/// Blocks per embedded 140 KB DOS 3.3 volume.
const DOS_VOLUME_BLOCKS: usize = 280;

/// Lays out `count` embedded DOS volumes back-to-back starting at
/// `start_block`, the reserved region a host ProDOS volume's bitmap already
/// marks used.
pub fn embedded_dos_volumes(start_block: usize, count: usize) -> Vec<Partition> {
    (0..count).map(|i| Partition {
        name: format!("DOS.MASTER.{}",i+1),
        kind: "Apple_DOS".to_string(),
        start_block: start_block + i*DOS_VOLUME_BLOCKS,
        block_count: DOS_VOLUME_BLOCKS,
        access: Access::ReadWrite
    }).collect()
}

/// A hybrid disk: DOS owns the first `dos_tracks` tracks (13 or 16 sectors
/// each, 256 bytes/sector) and ProDOS owns everything from `dos_tracks`
/// onward. Always returned as read-only partitions (see module doc).
pub fn hybrid_partitions(dos_tracks: usize, sectors_per_track: usize, total_blocks: usize) -> Vec<Partition> {
    let dos_blocks = (dos_tracks*sectors_per_track*256)/512;
    vec![
        Partition { name: "DOS".to_string(), kind: "Apple_DOS".to_string(), start_block: 0, block_count: dos_blocks, access: Access::ReadOnly },
        Partition { name: "ProDOS".to_string(), kind: "Apple_PRODOS".to_string(), start_block: dos_blocks, block_count: total_blocks.saturating_sub(dos_blocks), access: Access::ReadOnly }
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppHook;
    use crate::multipart::write_partition_image;

    #[test]
    fn hybrid_partition_write_is_refused_by_default() {
        let parts = hybrid_partitions(4,16,560);
        let mut whole = vec![0u8;560*512];
        let hook = AppHook::default();
        let err = write_partition_image(&mut whole,&parts[0],&[1,2,3],&hook);
        assert!(err.is_err());
    }

    #[test]
    fn hybrid_partition_write_succeeds_with_force_writable() {
        let parts = hybrid_partitions(4,16,560);
        let mut whole = vec![0u8;560*512];
        let hook = AppHook { force_writable: true, ..AppHook::default() };
        assert!(write_partition_image(&mut whole,&parts[1],&[9,9,9],&hook).is_ok());
    }
}
