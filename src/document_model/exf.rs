use std::fs::File;
use std::path::{Path, PathBuf};

use bitflags::bitflags;

use super::marks::MarkTable;
use super::undo::ChangeLog;
use crate::error::{Error, Result};
use crate::store::{OOBLNO, Recno, RecordStore};

bitflags! {
    /// State bits of a file session.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SessionFlags: u16 {
        /// Not modified yet; the first change sets up recovery.
        const FIRST_MODIFY = 0x001;
        /// Dirty since the last write.
        const MODIFIED     = 0x002;
        /// Holding the advisory lock on the edited file.
        const MULTI_LOCK   = 0x004;
        /// Changes are not being logged.
        const NO_LOG       = 0x008;
        /// Keep the recovery files when the session ends.
        const RCV_NORM     = 0x010;
        /// Recovery is possible.
        const RCV_ON       = 0x020;
        /// No change since the last undo.
        const UNDO         = 0x040;
        /// The backing file needs a periodic sync.
        const RCV_SYNC     = 0x080;
    }
}

/// Single-line read cache in front of the record store.
#[derive(Debug, Clone, Default)]
pub(crate) struct LineCache {
    pub lno: Recno,
    pub line: Vec<u8>,
}

impl LineCache {
    pub fn is_hit(&self, lno: Recno) -> bool {
        self.lno != OOBLNO && self.lno == lno
    }

    pub fn fill(&mut self, lno: Recno, line: Vec<u8>) {
        self.lno = lno;
        self.line = line;
    }

    pub fn invalidate(&mut self) {
        self.lno = OOBLNO;
    }

    /// Drop the cached line if a change at `lno` can move or alter it.
    pub fn invalidate_from(&mut self, lno: Recno) {
        if self.lno != OOBLNO && lno <= self.lno {
            self.invalidate();
        }
    }
}

/// Paths and lock that make a session recoverable after a crash.
#[derive(Debug, Default)]
pub(crate) struct RecoveryRecord {
    /// Backing snapshot file.
    pub path: Option<PathBuf>,
    /// Crash-mail file.
    pub mpath: Option<PathBuf>,
    /// Open, exclusively locked handle on the crash-mail file.
    pub mail: Option<File>,
}

/// One file being edited, shared by every screen showing it.
pub struct FileSession {
    pub(crate) name: PathBuf,
    pub(crate) refcnt: usize,
    pub(crate) store: Box<dyn RecordStore>,
    pub(crate) cache: LineCache,
    /// Cached line count, once known.
    pub(crate) nlines: Option<Recno>,
    pub(crate) log: ChangeLog,
    pub(crate) marks: MarkTable,
    pub(crate) flags: SessionFlags,
    pub(crate) rcv: RecoveryRecord,
    /// Advisory lock held on the edited file.
    pub(crate) file_lock: Option<File>,
}

impl FileSession {
    pub fn new(name: impl Into<PathBuf>, store: Box<dyn RecordStore>, undo_levels: usize) -> Self {
        Self {
            name: name.into(),
            refcnt: 1,
            store,
            cache: LineCache::default(),
            nlines: None,
            log: ChangeLog::new(undo_levels),
            marks: MarkTable::new(),
            flags: SessionFlags::FIRST_MODIFY,
            rcv: RecoveryRecord::default(),
            file_lock: None,
        }
    }

    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn is_modified(&self) -> bool {
        self.flags.contains(SessionFlags::MODIFIED)
    }

    pub fn is_recoverable(&self) -> bool {
        self.flags.contains(SessionFlags::RCV_ON)
    }

    pub fn refcount(&self) -> usize {
        self.refcnt
    }

    pub fn marks(&self) -> &MarkTable {
        &self.marks
    }

    pub fn marks_mut(&mut self) -> &mut MarkTable {
        &mut self.marks
    }

    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.rcv.path.as_deref()
    }

    pub fn mail_path(&self) -> Option<&Path> {
        self.rcv.mpath.as_deref()
    }

    /// Read the line count from the store, filling the count cache and the
    /// line cache with the last line.
    pub(crate) fn scan_last(&mut self) -> Result<Recno> {
        match self.store.last().map_err(|e| Error::store(OOBLNO, e))? {
            Some((lno, line)) => {
                self.nlines = Some(lno);
                self.cache.fill(lno, line);
                Ok(lno)
            }
            None => Ok(0),
        }
    }

    /// Every record, in order, for writing the file out.
    pub(crate) fn records(&mut self) -> Result<Vec<Vec<u8>>> {
        let last = match self.nlines {
            Some(n) => n,
            None => self.scan_last()?,
        };
        (1..=last)
            .map(|lno| {
                self.store
                    .get(lno)
                    .map_err(|e| Error::store(lno, e))?
                    .ok_or(Error::LineNotFound(lno))
            })
            .collect()
    }
}

impl std::fmt::Debug for FileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSession")
            .field("name", &self.name)
            .field("refcnt", &self.refcnt)
            .field("nlines", &self.nlines)
            .field("flags", &self.flags)
            .field("rcv", &self.rcv)
            .finish_non_exhaustive()
    }
}
