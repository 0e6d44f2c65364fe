//! Nested-container coordination: an archive inside a disk image inside an
//! archive, and so on. A node's parent and children need to be reachable and
//! independently mutable, which is awkward for a cyclic structure built out
//! of ordinary owned pointers; instead every node lives in one arena and
//! nodes refer to each other by a generation-checked [`NodeId`], the same
//! index-plus-generation idiom the corpus's other arena-shaped state uses.

use crate::analyzer::{FileAnalyzer,Recognized};
use crate::archive::{Archive,Fork};
use crate::context::DepthLimiter;
use crate::entry::FileEntry;
use crate::{DYNERR,STDRESULT};
use thiserror::Error;

#[derive(Error,Debug)]
pub enum Error {
    #[error("node handle refers to a freed or nonexistent node")]
    StaleHandle,
    #[error("recursion depth limit reached while opening a child container")]
    DepthExceeded,
    #[error("child entry does not contain a recognizable container")]
    NotAContainer,
    #[error("cannot commit while a descendant still has an open part")]
    PartsStillOpen
}

/// A handle into the arena, checked against the slot's generation so a
/// handle to a freed node is rejected instead of silently aliasing whatever
/// was allocated into that slot afterward.
#[derive(Clone,Copy,Debug,PartialEq,Eq,Hash)]
pub struct NodeId {
    index: usize,
    generation: u64
}

struct Node {
    parent: Option<NodeId>,
    /// Path of the entry inside `parent` that this node materializes; `None`
    /// only for the root node, which wraps the top-level host file.
    parent_entry_path: Option<String>,
    container: Recognized,
    dirty: bool,
    children: Vec<NodeId>,
    open_parts: usize
}

/// Owns every node opened while walking into nested containers. The root
/// node wraps the top-level host file; `save_updates` commits dirty
/// descendants depth-first and splices their serialized bytes back into
/// their parent.
pub struct WorkTree {
    slots: Vec<Option<Node>>,
    generations: Vec<u64>,
    free: Vec<usize>,
    root: Option<NodeId>
}

impl WorkTree {
    pub fn new() -> Self {
        Self { slots: Vec::new(), generations: Vec::new(), free: Vec::new(), root: None }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let generation = self.generations[index];
            self.slots[index] = Some(node);
            NodeId { index, generation }
        } else {
            let index = self.slots.len();
            self.slots.push(Some(node));
            self.generations.push(0);
            NodeId { index, generation: 0 }
        }
    }

    fn get(&self, id: NodeId) -> Result<&Node,DYNERR> {
        match self.slots.get(id.index) {
            Some(Some(n)) if self.generations[id.index]==id.generation => Ok(n),
            _ => Err(Box::new(Error::StaleHandle))
        }
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node,DYNERR> {
        if self.generations.get(id.index)!=Some(&id.generation) {
            return Err(Box::new(Error::StaleHandle));
        }
        match self.slots.get_mut(id.index) {
            Some(Some(n)) => Ok(n),
            _ => Err(Box::new(Error::StaleHandle))
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.slots[id.index] = None;
        self.generations[id.index] += 1;
        self.free.push(id.index);
    }

    /// Recognizes `data` and installs it as the root node.
    pub fn open_root(&mut self, data: &[u8], maybe_ext: Option<&str>) -> Result<NodeId,DYNERR> {
        let container = FileAnalyzer::new().recognize(data,maybe_ext)?;
        let id = self.alloc(Node { parent: None, parent_entry_path: None, container, dirty: false, children: Vec::new(), open_parts: 0 });
        self.root = Some(id);
        Ok(id)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Archive children enumerate their entries directly. A mounted disk
    /// image's directory tree goes through `fs::DiskFS::catalog_entries`,
    /// which only a subset of file systems implement for real (see its doc
    /// comment); others surface `fs::Error::CatalogNotImplemented` here
    /// rather than silently claiming an empty directory.
    pub fn entries(&mut self, id: NodeId) -> Result<Vec<FileEntry>,DYNERR> {
        Ok(match &mut self.get_mut(id)?.container {
            Recognized::DiskImage(fs) => fs.catalog_entries("")?,
            Recognized::NuFx(a) => a.entries(),
            Recognized::Binary2(a) => a.entries(),
            Recognized::AppleSingle(a) => a.entries(),
            #[cfg(feature = "zip")]
            Recognized::Zip(a) => a.entries(),
            #[cfg(feature = "gzip")]
            Recognized::Gzip(a) => a.entries()
        })
    }

    fn read_entry_bytes(&mut self, id: NodeId, path: &str) -> Result<Vec<u8>,DYNERR> {
        match &mut self.get_mut(id)?.container {
            Recognized::DiskImage(fs) => Ok(fs.read_any(path)?.sequence()),
            Recognized::NuFx(a) => a.read_part(path,Fork::Data),
            Recognized::Binary2(a) => a.read_part(path,Fork::Data),
            Recognized::AppleSingle(a) => a.read_part(path,Fork::Data),
            #[cfg(feature = "zip")]
            Recognized::Zip(a) => a.read_part(path,Fork::Data),
            #[cfg(feature = "gzip")]
            Recognized::Gzip(a) => a.read_part(path,Fork::Data)
        }
    }

    /// Opens `path` inside `parent` as a new child node, if its bytes are
    /// recognized as a container. `limiter` bounds how deep auto-opening is
    /// allowed to recurse, per `spec.md` §4.6.
    pub fn open_child(&mut self, parent: NodeId, path: &str, limiter: &mut DepthLimiter) -> Result<NodeId,DYNERR> {
        if !limiter.can_descend() {
            return Err(Box::new(Error::DepthExceeded));
        }
        let data = self.read_entry_bytes(parent,path)?;
        let container = FileAnalyzer::new().recognize(&data,None)?;
        *limiter = limiter.descend();
        let id = self.alloc(Node {
            parent: Some(parent),
            parent_entry_path: Some(path.to_string()),
            container,
            dirty: false,
            children: Vec::new(),
            open_parts: 0
        });
        self.get_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Marks `id` and every ancestor dirty, per the invariant that a node's
    /// dirty bit implies every ancestor is dirty too.
    pub fn mark_dirty(&mut self, mut id: NodeId) -> STDRESULT {
        loop {
            let parent = {
                let node = self.get_mut(id)?;
                node.dirty = true;
                node.parent
            };
            match parent {
                Some(p) => id = p,
                None => return Ok(())
            }
        }
    }

    pub fn note_part_opened(&mut self, id: NodeId) -> STDRESULT {
        self.get_mut(id)?.open_parts += 1;
        Ok(())
    }

    pub fn note_part_closed(&mut self, id: NodeId) -> STDRESULT {
        let node = self.get_mut(id)?;
        node.open_parts = node.open_parts.saturating_sub(1);
        Ok(())
    }

    fn serialize(&mut self, id: NodeId) -> Result<Vec<u8>,DYNERR> {
        if self.get(id)?.open_parts > 0 {
            return Err(Box::new(Error::PartsStillOpen));
        }
        match &mut self.get_mut(id)?.container {
            Recognized::DiskImage(fs) => Ok(fs.get_img().to_bytes()),
            Recognized::NuFx(a) => a.to_bytes(),
            Recognized::Binary2(a) => a.to_bytes(),
            Recognized::AppleSingle(a) => a.to_bytes(),
            #[cfg(feature = "zip")]
            Recognized::Zip(a) => a.to_bytes(),
            #[cfg(feature = "gzip")]
            Recognized::Gzip(a) => a.to_bytes()
        }
    }

    fn splice_into_parent(&mut self, parent: NodeId, path: &str, bytes: Vec<u8>) -> STDRESULT {
        let entry = FileEntry::new(path);
        match &mut self.get_mut(parent)?.container {
            Recognized::DiskImage(_fs) => Err(Box::new(Error::NotAContainer)),
            Recognized::NuFx(a) => { a.delete_part(path).ok(); a.add_part(&entry,Fork::Data,bytes) },
            Recognized::Binary2(a) => { a.delete_part(path).ok(); a.add_part(&entry,Fork::Data,bytes) },
            Recognized::AppleSingle(a) => { a.delete_part(path).ok(); a.add_part(&entry,Fork::Data,bytes) },
            #[cfg(feature = "zip")]
            Recognized::Zip(a) => { a.delete_part(path).ok(); a.add_part(&entry,Fork::Data,bytes) },
            #[cfg(feature = "gzip")]
            Recognized::Gzip(a) => { a.delete_part(path).ok(); a.add_part(&entry,Fork::Data,bytes) }
        }
    }

    /// Depth-first post-order commit: descend to the deepest dirty
    /// descendant first, serialize it, splice the bytes into its parent
    /// (which becomes dirty as a result), and recurse up. A commit failure
    /// at any level aborts the ascent immediately; levels already committed
    /// stay committed (per-level atomicity, not whole-tree atomicity).
    pub fn save_updates(&mut self, id: NodeId) -> STDRESULT {
        let children: Vec<NodeId> = self.get(id)?.children.clone();
        for child in children {
            if self.get(child)?.dirty {
                self.save_updates(child)?;
            }
        }
        if !self.get(id)?.dirty {
            return Ok(());
        }
        let bytes = self.serialize(id)?;
        let node = self.get(id)?;
        let (parent, path) = (node.parent, node.parent_entry_path.clone());
        match (parent,path) {
            (Some(p),Some(path)) => {
                self.splice_into_parent(p,&path,bytes)?;
                self.get_mut(p)?.dirty = true;
            },
            _ => {
                // Root: the host-file write is the caller's responsibility
                // (write-to-temp + rename), since only the caller knows the
                // host path; `bytes` is returned via `root_bytes` instead.
            }
        }
        self.get_mut(id)?.dirty = false;
        Ok(())
    }

    /// Commits the whole tree and returns the root's freshly serialized
    /// bytes, for the caller to write to the host file (write-to-temp +
    /// rename, per `spec.md` §4.6).
    pub fn commit_root(&mut self) -> Result<Vec<u8>,DYNERR> {
        let root = self.root.ok_or(Error::NotAContainer)?;
        self.save_updates(root)?;
        self.serialize(root)
    }

    /// Frees a child node and its whole subtree after its bytes have been
    /// folded into its parent and it's no longer needed.
    pub fn close(&mut self, id: NodeId) -> STDRESULT {
        let children: Vec<NodeId> = self.get(id)?.children.clone();
        for child in children {
            self.close(child)?;
        }
        self.free_node(id);
        Ok(())
    }
}

/// Writes `bytes` to `host_path` via write-to-temp + rename, so a crash
/// mid-write leaves the original file intact rather than a truncated one.
pub fn write_host_file(host_path: &str, bytes: &[u8]) -> STDRESULT {
    let dir = std::path::Path::new(host_path).parent().unwrap_or(std::path::Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, bytes)?;
    tmp.persist(host_path)?;
    Ok(())
}
