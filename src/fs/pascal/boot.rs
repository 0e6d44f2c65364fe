//! Boot blocks written to blocks 0-1 when a 5.25" Pascal volume is formatted.
//! The real UCSD Pascal boot loader lives here; these are a zeroed
//! placeholder rather than the genuine boot code, so a volume formatted by
//! this crate is structurally valid but will not actually boot until a real
//! loader is written over these blocks.

/// Block 0, 512 bytes.
pub const PASCAL_525_BLOCK0: [u8;512] = [0;512];

/// Block 1, 512 bytes.
pub const PASCAL_525_BLOCK1: [u8;512] = [0;512];
