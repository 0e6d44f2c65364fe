//! # Shared recognition and traversal context
//!
//! Types used by [`crate::analyzer`] to describe what a byte stream turned out to
//! be, and by [`crate::worktree`] to bound how deep it will recurse into nested
//! containers. Kept separate from `analyzer` itself so that `archive`, `multipart`,
//! and `worktree` can all refer to them without depending on the analyzer's probe
//! cascade.

use std::fmt;

/// The three linearizations the same 16x35 (or equivalent) sector image can be
/// stored in. A container codec applies the permutation this implies on every
/// chunk access; see `fs::Block` and the `bios` module for where the permutation
/// itself lives.
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum SectorOrder {
    DOS,
    ProDOS,
    CPM,
    Physical
}

/// What `FileAnalyzer` decided a byte stream is, coarsely. Finer detail (which
/// disk image codec, which archive codec, which filesystem) lives in the
/// concrete objects the analyzer hands back, not in this enum.
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum FileKind {
    DiskImage,
    Archive,
    Unknown
}

/// The verdict a single codec's probe returns for a candidate byte stream.
/// `Maybe` exists because many raw sector/block images are only self-consistent,
/// never self-identifying; the analyzer breaks ties among `Maybe`s using the
/// extension hint and a fixed preference order.
#[derive(PartialEq,Eq,Clone,Copy,Debug,PartialOrd,Ord)]
pub enum ProbeResult {
    No,
    Maybe,
    Yes
}

/// Outcome of a recognition pass.
#[derive(Clone,Copy,Debug)]
pub enum AnalysisResult {
    /// A codec was bound, possibly on a `Maybe` verdict rather than a certain one
    Success,
    /// Every codec returned `No`
    NotImplemented
}

/// How deep `AnalyzeDisk` is willing to recurse when discovering filesystem or
/// partition structure, and (reused by `worktree`) how deep nested containers
/// will be auto-opened.
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Depth {
    /// Only read enough to identify the container
    Header,
    /// Resolve chunk access / sector ordering, but do not open a filesystem
    ChunkOnly,
    /// Fully mount any filesystem or partition map found
    Full
}

/// Bounds recursive auto-opening of containers nested inside containers, so an
/// adversarial or merely deeply-nested input (an archive inside a disk image
/// inside an archive, ...) cannot make `WorkTree::open_child` recurse without
/// bound.
#[derive(Clone,Copy,Debug)]
pub struct DepthLimiter {
    remaining: u32
}

impl DepthLimiter {
    pub fn new(max_depth: u32) -> Self {
        Self { remaining: max_depth }
    }
    /// The default used when a caller does not specify a limit: three levels of
    /// nested container, matching the example in the work tree's design notes
    /// ("do not auto-open archives inside filesystems at level >= 3").
    pub fn default_limit() -> Self {
        Self::new(3)
    }
    pub fn can_descend(&self) -> bool {
        self.remaining > 0
    }
    pub fn descend(&self) -> Self {
        Self { remaining: self.remaining.saturating_sub(1) }
    }
}

/// Behavioral options threaded through engine entry points instead of living
/// as global state (`spec.md` §9, "Global state: avoid"). Cheap to construct
/// and clone; `AppHook::default()` is the right choice for a library caller
/// that doesn't need to override anything.
#[derive(Clone,Copy,Debug)]
pub struct AppHook {
    /// Force high-ASCII (negative ASCII) encoding on DOS text imports. DOS
    /// 3.x text is always written high-ASCII by this crate's encoder
    /// regardless of this flag today; it exists so a future plain-ASCII DOS
    /// text mode (rare, but real on some early DOS 3.2 disks) has somewhere
    /// to be switched from without threading a new parameter everywhere.
    pub force_high_ascii: bool,
    /// Allow writes to flux-only WOZ tracks that have no decodable bit
    /// stream rather than refusing them outright.
    pub allow_flux_writes: bool,
    /// Override a [`crate::multipart::Partition`]'s `ReadOnly` marking (the
    /// DOS/ProDOS hybrid case) and allow a write through anyway. Off by
    /// default: the marking exists because the two views' allocation maps
    /// cannot be proven disjoint, not as an arbitrary restriction.
    pub force_writable: bool,
    /// How deep `WorkTree::open_child` and partition/filesystem discovery
    /// are willing to recurse into nested containers.
    pub depth_limit: DepthLimiter
}

impl Default for AppHook {
    fn default() -> Self {
        Self {
            force_high_ascii: true,
            allow_flux_writes: false,
            force_writable: false,
            depth_limit: DepthLimiter::default_limit()
        }
    }
}

impl fmt::Display for SectorOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DOS => "dos",
            Self::ProDOS => "prodos",
            Self::CPM => "cpm",
            Self::Physical => "physical"
        };
        write!(f,"{}",s)
    }
}
