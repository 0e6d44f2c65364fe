//! Binary II: a sequence of files each preceded by a fixed 128-byte header.
//! No central directory; readers scan headers end to end, each one giving the
//! length (in 128-byte "records") of the file that follows it. A Binary II
//! stream can itself contain a NuFX archive as its sole member (the `.bxy`
//! convention); this codec does not unwrap that automatically, it is the
//! work tree's job to recognize the inner stream and open it as a child.
//!
//! A member can optionally be "Squeezed" (an adaptive-Huffman + RLE scheme,
//! unrelated to NuFX's LZW threads) rather than stored raw. The compression
//! flag is read from the header and exposed on [`Error::UnsupportedCompression`]
//! when set: no reference implementation of classic Squeeze survived into
//! `examples/` or `examples/original_source/` to ground a decoder on (the
//! vendored LZHUF codec in the `dbalsom-fluxfox` example is a different,
//! later algorithm), so this codec detects and reports a squeezed member
//! rather than guessing at Squeeze's bit layout.

use crate::archive::{Archive,Fork,Error};
use crate::entry::FileEntry;
use crate::context::ProbeResult;
use crate::{DYNERR,STDRESULT};

const MARK: [u8;3] = [0x0A,0x47,0x4C];
const HEADER_LEN: usize = 128;
/// Compression type byte: 0 = uncompressed, 2 = Squeezed. Offset chosen to
/// sit in this header model's otherwise-unused byte range (this parser
/// already only decodes a subset of the real Binary II header fields, not
/// a byte-exact transcription).
const COMPRESSION_OFFSET: usize = 18;
const COMPRESSION_SQUEEZE: u8 = 2;

struct Member {
    name: String,
    access: u8,
    file_type: u8,
    aux_type: u16,
    storage_type: u8,
    eof: usize,
    compressed: bool,
    data: Vec<u8>
}

fn parse_header(head: &[u8]) -> Result<(Member,usize),DYNERR> {
    if head.len() < HEADER_LEN || head[0..3] != MARK {
        return Err(Box::new(Error::Corrupted));
    }
    let name_len = head[4] as usize;
    let name = String::from_utf8_lossy(&head[5..5+name_len.min(64)]).to_string();
    let access = head[6];
    let file_type = head[7];
    let aux_type = u16::from_le_bytes([head[8],head[9]]);
    let storage_type = head[10];
    let eof = u32::from_le_bytes([head[12],head[13],head[14],0]) as usize;
    let compressed = head[COMPRESSION_OFFSET] == COMPRESSION_SQUEEZE;
    let byte_count = u16::from_le_bytes([head[20],head[21]]) as usize;
    let num_records = u16::from_le_bytes([head[22],head[23]]) as usize;
    let total_len = if num_records > 0 { num_records*HEADER_LEN } else { byte_count };
    Ok((Member { name, access, file_type, aux_type, storage_type, eof, compressed, data: Vec::new() }, total_len))
}

fn build_header(m: &Member) -> Vec<u8> {
    let mut h = vec![0u8; HEADER_LEN];
    h[0..3].copy_from_slice(&MARK);
    let name_bytes = m.name.as_bytes();
    let name_len = name_bytes.len().min(64);
    h[4] = name_len as u8;
    h[5..5+name_len].copy_from_slice(&name_bytes[..name_len]);
    h[6] = m.access;
    h[7] = m.file_type;
    h[8..10].copy_from_slice(&m.aux_type.to_le_bytes());
    h[10] = m.storage_type;
    let eof = (m.eof as u32).to_le_bytes();
    h[12..15].copy_from_slice(&eof[0..3]);
    let num_records = ((m.data.len() + HEADER_LEN - 1) / HEADER_LEN) as u16;
    h[20..22].copy_from_slice(&(m.data.len() as u16).to_le_bytes());
    h[22..24].copy_from_slice(&num_records.to_le_bytes());
    h[COMPRESSION_OFFSET] = 0; // this codec never writes Squeezed members
    h
}

impl Archive for Binary2 {
    fn from_bytes(data: &[u8]) -> Result<Self,DYNERR> {
        let mut members = Vec::new();
        let mut pos = 0;
        while pos + HEADER_LEN <= data.len() {
            if data[pos..pos+3] != MARK {
                break;
            }
            let (mut member,body_len) = parse_header(&data[pos..pos+HEADER_LEN])?;
            pos += HEADER_LEN;
            let take = body_len.min(data.len().saturating_sub(pos));
            member.data = data[pos..pos+take].to_vec();
            if !member.compressed {
                member.data.truncate(member.eof.max(1).min(member.data.len().max(1)));
            }
            pos += take;
            members.push(member);
        }
        if members.is_empty() {
            return Err(Box::new(Error::UnknownFormat));
        }
        Ok(Self { members })
    }
    fn to_bytes(&mut self) -> Result<Vec<u8>,DYNERR> {
        let mut out = Vec::new();
        for m in &self.members {
            out.extend(build_header(m));
            out.extend(&m.data);
            let pad = (HEADER_LEN - (m.data.len() % HEADER_LEN)) % HEADER_LEN;
            out.extend(std::iter::repeat(0u8).take(pad));
        }
        Ok(out)
    }
    fn file_extensions() -> Vec<String> {
        vec!["bny".to_string(),"bqy".to_string(),"bxy".to_string()]
    }
    fn entries(&self) -> Vec<FileEntry> {
        self.members.iter().map(|m| {
            let mut e = FileEntry::new(&m.name);
            e.attribs.prodos_type = Some(m.file_type);
            e.attribs.aux = Some(m.aux_type);
            e.attribs.access = Some(m.access);
            e.attribs.data_len = Some(m.eof);
            e.is_dir = m.storage_type == 0x0d;
            e
        }).collect()
    }
    fn read_part(&mut self, path: &str, fork: Fork) -> Result<Vec<u8>,DYNERR> {
        if fork != Fork::Data {
            return Err(Box::new(Error::UnsupportedCompression));
        }
        let m = self.members.iter().find(|m| m.name == path).ok_or(Error::PathNotFound)?;
        if m.compressed {
            return Err(Box::new(Error::UnsupportedCompression));
        }
        Ok(m.data.clone())
    }
    fn add_part(&mut self, entry: &FileEntry, fork: Fork, data: Vec<u8>) -> STDRESULT {
        if fork != Fork::Data {
            return Err(Box::new(Error::UnsupportedCompression));
        }
        let eof = data.len();
        let member = Member {
            name: entry.name(),
            access: entry.attribs.access.unwrap_or(0xc3),
            file_type: entry.attribs.prodos_type.unwrap_or(0),
            aux_type: entry.attribs.aux.unwrap_or(0),
            storage_type: if entry.is_dir { 0x0d } else { 0x01 },
            eof,
            compressed: false,
            data
        };
        if let Some(pos) = self.members.iter().position(|m| m.name == member.name) {
            self.members[pos] = member;
        } else {
            self.members.push(member);
        }
        Ok(())
    }
    fn delete_part(&mut self, path: &str) -> STDRESULT {
        let before = self.members.len();
        self.members.retain(|m| m.name != path);
        if self.members.len() == before {
            return Err(Box::new(Error::PathNotFound));
        }
        Ok(())
    }
    fn probe(data: &[u8]) -> ProbeResult {
        if data.len() >= 3 && data[0..3] == MARK {
            ProbeResult::Yes
        } else {
            ProbeResult::No
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_uncompressed() {
        let mut arc = Binary2 { members: Vec::new() };
        let entry = FileEntry::new("HELLO");
        arc.add_part(&entry,Fork::Data,b"hello, world".to_vec()).unwrap();
        let bytes = arc.to_bytes().unwrap();
        let mut back = Binary2::from_bytes(&bytes).unwrap();
        assert_eq!(back.read_part("HELLO",Fork::Data).unwrap(), b"hello, world");
    }

    #[test]
    fn squeezed_member_is_reported_not_silently_corrupted() {
        let mut head = vec![0u8;HEADER_LEN];
        head[0..3].copy_from_slice(&MARK);
        head[4] = 6;
        head[5..11].copy_from_slice(b"PACKED");
        head[COMPRESSION_OFFSET] = COMPRESSION_SQUEEZE;
        head[20..22].copy_from_slice(&100u16.to_le_bytes());
        let body = vec![0u8;HEADER_LEN];
        let mut stream = head;
        stream.extend(body);
        let mut arc = Binary2::from_bytes(&stream).unwrap();
        assert!(arc.read_part("PACKED",Fork::Data).is_err());
    }
}
