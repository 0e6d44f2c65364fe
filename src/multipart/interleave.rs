//! AmDOS/OzDOS/UniDOS pack two 400 KB DOS 3.3 volumes into one 800 KB image
//! by splitting every physical 512-byte block in half, giving each logical
//! DOS sector (256 bytes) to a different volume. The three variants differ
//! only in which half of each block belongs to which volume index.

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Interleave {
    AmDos,
    OzDos,
    UniDos
}

const BLOCK: usize = 512;
const HALF: usize = 256;

impl Interleave {
    /// True if `volume` (0 or 1) occupies the first half of each physical
    /// block under this variant's convention.
    fn volume_in_low_half(&self, volume: usize) -> bool {
        match self {
            // UniDOS and OzDOS give volume 0 the low half; AmDOS swaps it.
            Interleave::UniDos | Interleave::OzDos => volume == 0,
            Interleave::AmDos => volume == 1
        }
    }

    /// Extracts the 400 KB logical image for `volume` (0 or 1) out of an
    /// 800 KB interleaved image.
    pub fn extract_volume(&self, image: &[u8], volume: usize) -> Vec<u8> {
        let low = self.volume_in_low_half(volume);
        let mut out = Vec::with_capacity(image.len()/2);
        for block in image.chunks(BLOCK) {
            if block.len() < BLOCK {
                break;
            }
            if low {
                out.extend_from_slice(&block[..HALF]);
            } else {
                out.extend_from_slice(&block[HALF..]);
            }
        }
        out
    }

    /// Rebuilds an interleaved 800 KB image from its two 400 KB volumes.
    pub fn combine(&self, vol0: &[u8], vol1: &[u8]) -> Vec<u8> {
        let (low_vol, high_vol) = if self.volume_in_low_half(0) { (vol0,vol1) } else { (vol1,vol0) };
        let blocks = low_vol.len().max(high_vol.len())/HALF;
        let mut out = Vec::with_capacity(blocks*BLOCK);
        for i in 0..blocks {
            let lo = &low_vol[i*HALF..(i*HALF+HALF).min(low_vol.len())];
            let hi = &high_vol[i*HALF..(i*HALF+HALF).min(high_vol.len())];
            out.extend_from_slice(lo);
            out.resize(out.len()+(HALF-lo.len()),0);
            out.extend_from_slice(hi);
            out.resize(out.len()+(HALF-hi.len()),0);
        }
        out
    }
}
