//! Batch operations: `Add`, `Extract`, `Delete`, `Move`, `Copy`, `Test`, and
//! `ClipPaste` all have the same shape, a driver loop over a list of entries
//! that performs one operation per item, reports progress, and can be
//! cancelled between items. This module factors that shape out once instead
//! of repeating it per operation.

use crate::entry::FileEntry;
use crate::fs::DiskFS;
use crate::STDRESULT;

/// Decision returned by [`ProgressCallback::on_file`] before each item is
/// processed.
pub enum WorkerAction {
    Proceed,
    Skip,
    Cancel
}

/// Called once per item, in order, before it is processed.
pub trait ProgressCallback {
    fn on_file(&mut self, entry: &FileEntry) -> WorkerAction;
}

/// A callback that never skips or cancels, for callers with no progress UI.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn on_file(&mut self, _entry: &FileEntry) -> WorkerAction {
        WorkerAction::Proceed
    }
}

/// Outcome of a batch run.
#[derive(Default,Debug)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub cancelled: bool
}

/// Runs `op` once per entry in order, honoring `Skip`/`Cancel` decisions from
/// `progress`. A `Cancel` decision or an error from `op` stops the run
/// immediately; items already processed are not rolled back, consistent with
/// each individual operation committing its own change as it runs.
pub fn run_batch<F>(entries: &[FileEntry], progress: &mut dyn ProgressCallback, mut op: F) -> Result<BatchReport,Box<dyn std::error::Error>>
    where F: FnMut(&FileEntry) -> STDRESULT
{
    let mut report = BatchReport::default();
    for entry in entries {
        match progress.on_file(entry) {
            WorkerAction::Cancel => {
                report.cancelled = true;
                break;
            },
            WorkerAction::Skip => {
                report.skipped += 1;
            },
            WorkerAction::Proceed => {
                op(entry)?;
                report.processed += 1;
            }
        }
    }
    Ok(report)
}

/// `Extract`: read each entry's data from a source and hand it to `sink`.
pub fn extract<R,W>(entries: &[FileEntry], progress: &mut dyn ProgressCallback, mut read: R, mut sink: W) -> Result<BatchReport,Box<dyn std::error::Error>>
    where R: FnMut(&FileEntry) -> Result<Vec<u8>,Box<dyn std::error::Error>>, W: FnMut(&FileEntry,Vec<u8>) -> STDRESULT
{
    run_batch(entries,progress,|e| {
        let data = read(e)?;
        sink(e,data)
    })
}

/// `Add`: same shape as `Extract`, source and destination swapped.
pub fn add<R,W>(entries: &[FileEntry], progress: &mut dyn ProgressCallback, read: R, sink: W) -> Result<BatchReport,Box<dyn std::error::Error>>
    where R: FnMut(&FileEntry) -> Result<Vec<u8>,Box<dyn std::error::Error>>, W: FnMut(&FileEntry,Vec<u8>) -> STDRESULT
{
    extract(entries,progress,read,sink)
}

/// `Add`, text variant: the one place a worker needs to know anything about
/// the target file system. A binary `add` would hand host bytes straight to
/// `write_raw`, but a text import has to go through `fs::DiskFS::encode_text`
/// so the destination's own text convention (DOS's high-ASCII negative
/// encoding, ProDOS's plain low-ASCII, ...) applies; invalid UTF-8 in the
/// host file is lossily repaired first so a foreign byte never aborts the
/// whole import; whatever `encode_text` still can't represent (DOS maps
/// these to `?`) is the file system's call, not the worker's.
pub fn add_text<R>(entries: &[FileEntry], progress: &mut dyn ProgressCallback, fs: &mut dyn DiskFS, mut read: R) -> Result<BatchReport,Box<dyn std::error::Error>>
    where R: FnMut(&FileEntry) -> Result<Vec<u8>,Box<dyn std::error::Error>>
{
    run_batch(entries,progress,|e| {
        let host_bytes = read(e)?;
        let text = String::from_utf8_lossy(&host_bytes).into_owned();
        let encoded = fs.encode_text(&text)?;
        fs.write_text(&e.name(),&encoded)?;
        Ok(())
    })
}

/// `Delete`, `Test`: a plain per-entry operation with no payload to move.
pub fn for_each<F>(entries: &[FileEntry], progress: &mut dyn ProgressCallback, op: F) -> Result<BatchReport,Box<dyn std::error::Error>>
    where F: FnMut(&FileEntry) -> STDRESULT
{
    run_batch(entries,progress,op)
}

/// `Move`, `Copy`, `ClipPaste`: each entry needs both its old and new path;
/// `dest` derives the new path (e.g. a directory prefix swap).
pub fn relocate<D,F>(entries: &[FileEntry], progress: &mut dyn ProgressCallback, mut dest: D, mut op: F) -> Result<BatchReport,Box<dyn std::error::Error>>
    where D: FnMut(&FileEntry) -> String, F: FnMut(&FileEntry,&str) -> STDRESULT
{
    run_batch(entries,progress,|e| {
        let new_path = dest(e);
        op(e,&new_path)
    })
}
