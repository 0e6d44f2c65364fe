//! Apple Partition Map: a run of fixed 512-byte partition entries starting
//! at block 1 (block 0 is an optional driver descriptor block). Each entry
//! is self-describing, carrying both its own position in the map
//! (`pmMapBlkCnt`) and its partition's extent, so the whole map can be
//! walked from the first entry alone.

use crate::multipart::{Access,MultiPart,Partition};

const SIG: [u8;2] = [0x50,0x4D]; // "PM"
const BLOCK: usize = 512;

fn cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b==0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

pub struct Apm;

impl MultiPart for Apm {
    fn scan(blocks: &[u8]) -> Option<Vec<Partition>> {
        if blocks.len() < BLOCK*2 {
            return None;
        }
        let first = &blocks[BLOCK..BLOCK*2];
        if first[0..2] != SIG {
            return None;
        }
        let map_entries = u32::from_be_bytes([first[4],first[5],first[6],first[7]]) as usize;
        let mut out = Vec::new();
        for i in 0..map_entries {
            let off = BLOCK*(1+i);
            if off+BLOCK > blocks.len() {
                break;
            }
            let entry = &blocks[off..off+BLOCK];
            if entry[0..2] != SIG {
                break;
            }
            let start = u32::from_be_bytes([entry[8],entry[9],entry[10],entry[11]]) as usize;
            let count = u32::from_be_bytes([entry[12],entry[13],entry[14],entry[15]]) as usize;
            let name = cstr(&entry[16..48]);
            let kind = cstr(&entry[48..80]);
            out.push(Partition { name, kind, start_block: start, block_count: count, access: Access::ReadWrite });
        }
        Some(out)
    }
}
