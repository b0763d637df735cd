//! The paged log store: an external collaborator (spec §4.1, §6). This
//! crate only consumes the trait; the shared-memory/LRU paged-file
//! substrate behind it is explicitly out of scope (spec §1).
//!
//! Two implementations are provided for tests, demos, and benches:
//! [`MemoryPagedStore`] (pure in-memory, `Arc`-shareable across threads —
//! the in-process analogue of several OS processes attached to the same
//! shared memory segment) and [`FilePagedStore`] (a minimal on-disk
//! reference implementation, grounded in the original's `pg_notify/`
//! segment-file layout described in spec §6 "On-disk layout").

use crate::config::Config;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read as _, Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};

/// Read-only or exclusive page access mode, per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAccess {
    ReadOnly,
    Exclusive,
}

/// `StoreLock` (spec §5): guards page I/O in the paged store. Lock
/// ordering is enforced by callers, not by this trait — `QueueLock` must
/// already be held (or not needed) before a `StoreLock`-guarded call is
/// made; this store never acquires `QueueLock` itself.
pub trait PagedStore: Send + Sync {
    /// Read a page's contents. `access` is advisory to the store (e.g. to
    /// choose a shared vs. exclusive internal lock); the returned bytes are
    /// always a snapshot the caller may freely inspect.
    fn read_page(&self, page_id: u32, access: PageAccess) -> io::Result<Vec<u8>>;

    /// Allocate and zero-initialize a new page, returning its buffer.
    fn zero_new_page(&self, page_id: u32) -> io::Result<Vec<u8>>;

    /// Write a page's full contents back to the store.
    fn write_page(&self, page_id: u32, data: &[u8]) -> io::Result<()>;

    /// Remove whole segments of `segment_pages` consecutive pages whose
    /// highest page id is logically before `up_to_page`. Segment
    /// granularity avoids gratuitous per-page truncation (spec §4.5).
    fn truncate_up_to(&self, up_to_page: u32) -> io::Result<()>;

    /// Startup cleanup (spec §4.9 Init): remove any on-disk segments left
    /// over from a previous run whose highest page precedes `tail_page`.
    fn scan_and_cleanup(&self, tail_page: u32) -> io::Result<()>;
}

/// In-memory paged store: a `BTreeMap<page_id, Vec<u8>>` behind a single
/// `RwLock`, modeling `StoreLock`. Pages not yet written read back as all
/// zero, same as a freshly zeroed SLRU page.
pub struct MemoryPagedStore {
    cfg: Config,
    pages: RwLock<BTreeMap<u32, Vec<u8>>>,
}

impl MemoryPagedStore {
    #[must_use]
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            pages: RwLock::new(BTreeMap::new()),
        }
    }

    fn segment_of(&self, page_id: u32) -> u32 {
        page_id / self.cfg.segment_pages
    }
}

impl PagedStore for MemoryPagedStore {
    fn read_page(&self, page_id: u32, _access: PageAccess) -> io::Result<Vec<u8>> {
        let pages = self.pages.read();
        Ok(pages
            .get(&page_id)
            .cloned()
            .unwrap_or_else(|| vec![0u8; self.cfg.page_size as usize]))
    }

    fn zero_new_page(&self, page_id: u32) -> io::Result<Vec<u8>> {
        let buf = vec![0u8; self.cfg.page_size as usize];
        self.pages.write().insert(page_id, buf.clone());
        Ok(buf)
    }

    fn write_page(&self, page_id: u32, data: &[u8]) -> io::Result<()> {
        debug_assert_eq!(data.len(), self.cfg.page_size as usize);
        self.pages.write().insert(page_id, data.to_vec());
        Ok(())
    }

    fn truncate_up_to(&self, up_to_page: u32) -> io::Result<()> {
        let target_segment = self.segment_of(up_to_page);
        let mut pages = self.pages.write();
        pages.retain(|&page_id, _| self.segment_of(page_id) >= target_segment);
        Ok(())
    }

    fn scan_and_cleanup(&self, tail_page: u32) -> io::Result<()> {
        self.truncate_up_to(tail_page)
    }
}

/// Minimal on-disk reference implementation. Segments are files named by a
/// four-hex-digit segment id under `dir`, each `segment_pages * page_size`
/// bytes (spec §6 "On-disk layout").
pub struct FilePagedStore {
    cfg: Config,
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FilePagedStore {
    pub fn new(dir: impl Into<PathBuf>, cfg: Config) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            cfg,
            dir,
            lock: RwLock::new(()),
        })
    }

    fn segment_of(&self, page_id: u32) -> u32 {
        page_id / self.cfg.segment_pages
    }

    fn segment_path(&self, segment_id: u32) -> PathBuf {
        self.dir.join(format!("{segment_id:04X}"))
    }

    fn page_offset(&self, page_id: u32) -> u64 {
        u64::from(page_id % self.cfg.segment_pages) * u64::from(self.cfg.page_size)
    }
}

impl PagedStore for FilePagedStore {
    fn read_page(&self, page_id: u32, _access: PageAccess) -> io::Result<Vec<u8>> {
        let _guard = self.lock.read();
        let path = self.segment_path(self.segment_of(page_id));
        let mut buf = vec![0u8; self.cfg.page_size as usize];
        match File::open(&path) {
            Ok(mut f) => {
                f.seek(SeekFrom::Start(self.page_offset(page_id)))?;
                let _ = f.read(&mut buf)?;
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(buf),
            Err(e) => Err(e),
        }
    }

    fn zero_new_page(&self, page_id: u32) -> io::Result<Vec<u8>> {
        let buf = vec![0u8; self.cfg.page_size as usize];
        self.write_page(page_id, &buf)?;
        Ok(buf)
    }

    fn write_page(&self, page_id: u32, data: &[u8]) -> io::Result<()> {
        let _guard = self.lock.write();
        let path = self.segment_path(self.segment_of(page_id));
        let mut f = OpenOptions::new().create(true).write(true).open(&path)?;
        f.seek(SeekFrom::Start(self.page_offset(page_id)))?;
        f.write_all(data)?;
        Ok(())
    }

    fn truncate_up_to(&self, up_to_page: u32) -> io::Result<()> {
        let _guard = self.lock.write();
        let target_segment = self.segment_of(up_to_page);
        remove_segments_before(&self.dir, target_segment)
    }

    fn scan_and_cleanup(&self, tail_page: u32) -> io::Result<()> {
        self.truncate_up_to(tail_page)
    }
}

fn remove_segments_before(dir: &Path, target_segment: u32) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(segment_id) = u32::from_str_radix(name, 16) else {
            continue;
        };
        if segment_id < target_segment {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
