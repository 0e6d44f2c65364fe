//! Recognizes a raw byte stream and dispatches it to the right container,
//! filesystem, or archive codec. Generalizes the ad hoc probe-and-try
//! dispatch `create_fs_from_bytestream`/`try_img` already do for disk images
//! into a single entry point that also covers the archive codecs.

use crate::archive::{nufx::NuFx,binary2::Binary2,applesingle::AppleSingle,Archive,Error};
use crate::context::ProbeResult;
use crate::fs::DiskFS;
use crate::DYNERR;

/// Whatever a byte stream turned out to be.
pub enum Recognized {
    DiskImage(Box<dyn DiskFS>),
    NuFx(NuFx),
    Binary2(Binary2),
    AppleSingle(AppleSingle),
    #[cfg(feature = "zip")]
    Zip(crate::archive::zip::Zip),
    #[cfg(feature = "gzip")]
    Gzip(crate::archive::gzip::Gzip)
}

#[derive(Default)]
pub struct FileAnalyzer;

impl FileAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Disk images are tried first: they are the more constrained formats
    /// (fixed-size headers, checksums), so a false-positive probe against an
    /// archive codec is more likely than a disk image one matching by
    /// accident. Among archive codecs, the highest `ProbeResult` wins; ties
    /// are broken by the order codecs are tried here.
    pub fn recognize(&self, data: &[u8], maybe_ext: Option<&str>) -> Result<Recognized,DYNERR> {
        if let Ok(fs) = crate::create_fs_from_bytestream(&data.to_vec(),maybe_ext) {
            return Ok(Recognized::DiskImage(fs));
        }
        let mut best: Option<ProbeResult> = None;
        let mut answer: Option<Recognized> = None;
        macro_rules! consider {
            ($ty:ty, $variant:ident) => {
                let p = <$ty as Archive>::probe(data);
                if p > ProbeResult::No && best.map(|b| p > b).unwrap_or(true) {
                    if let Ok(parsed) = <$ty as Archive>::from_bytes(data) {
                        best = Some(p);
                        answer = Some(Recognized::$variant(parsed));
                    }
                }
            };
        }
        consider!(NuFx,NuFx);
        consider!(Binary2,Binary2);
        consider!(AppleSingle,AppleSingle);
        #[cfg(feature = "zip")]
        consider!(crate::archive::zip::Zip,Zip);
        #[cfg(feature = "gzip")]
        consider!(crate::archive::gzip::Gzip,Gzip);
        answer.ok_or_else(|| Box::new(Error::UnknownFormat) as DYNERR)
    }
}
