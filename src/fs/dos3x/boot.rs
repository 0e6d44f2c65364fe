//! Boot code images written into tracks 0-2 when a volume is formatted with
//! `bootable=true`. DOS occupies these tracks with the boot loader and the
//! resident language card / RWTS relocator; a disk image produced by this
//! crate with a real DOS binary layered on top by the caller will boot, but
//! the bytes here are a zeroed placeholder, not the genuine DOS 3.2/3.3
//! master boot code.

/// Three zeroed tracks, 13 sectors each, 256 bytes per sector.
pub const DOS32_TRACKS: [u8;3*13*256] = [0;3*13*256];

/// Three zeroed tracks, 16 sectors each, 256 bytes per sector.
pub const DOS33_TRACKS: [u8;3*16*256] = [0;3*16*256];
