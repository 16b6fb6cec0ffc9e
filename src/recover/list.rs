//! Scanning the recovery directory for abandoned sessions.

use std::fs::{self, File, OpenOptions, ReadDir};
use std::io::{self, BufReader};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};

use super::MAIL_PREFIX;
use super::lock::{self, LockStatus};
use super::mailfile::parse_headers;
use crate::error::{Error, Result};

/// A crash-mail file nobody is editing.
#[derive(Debug)]
pub struct RecoveryEntry {
    /// The edited file, as named in the mail header.
    pub name: String,
    pub snapshot: PathBuf,
    pub mail_path: PathBuf,
    pub mtime: SystemTime,
    /// Open, locked handle on the mail file; the lock goes with it.
    pub(crate) file: File,
}

/// Lazy walk over the recovery directory.
///
/// Yields one entry per recoverable crash-mail file and an error per
/// malformed one. Files held by a live session are skipped, and mail files
/// whose snapshot is gone are deleted as they are found. Each scan starts
/// from a fresh directory read.
pub struct RecoveryScan {
    entries: ReadDir,
}

pub fn scan(dir: &Path) -> io::Result<RecoveryScan> {
    Ok(RecoveryScan {
        entries: fs::read_dir(dir)?,
    })
}

impl Iterator for RecoveryScan {
    type Item = Result<RecoveryEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Ok(dent) = self.entries.next()? else {
                continue;
            };
            if !dent.file_name().to_string_lossy().starts_with(MAIL_PREFIX) {
                continue;
            }
            let mail_path = dent.path();
            let Some(file) = open_candidate(&mail_path) else {
                continue;
            };

            let (name, snapshot) = match parse_headers(BufReader::new(&file)) {
                Ok(Some(headers)) => headers,
                _ => return Some(Err(Error::MalformedRecovery(mail_path))),
            };

            if let Err(e) = fs::metadata(&snapshot) {
                if e.kind() == io::ErrorKind::NotFound {
                    debug!(mail = %mail_path.display(), "removing orphaned recovery file");
                    let _ = fs::remove_file(&mail_path);
                    continue;
                }
            }

            let mtime = file
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(UNIX_EPOCH);
            return Some(Ok(RecoveryEntry {
                name,
                snapshot,
                mail_path,
                mtime,
                file,
            }));
        }
    }
}

/// Open a crash-mail file if it may be recovered: a regular file, not a
/// symlink, mode exactly 0600, and not locked by anyone.
fn open_candidate(path: &Path) -> Option<File> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK)
        .open(path)
        .ok()?;
    let meta = file.metadata().ok()?;
    if !meta.is_file() || meta.permissions().mode() & 0o7777 != 0o600 {
        trace!(path = %path.display(), "not a recovery candidate");
        return None;
    }
    match lock::try_lock(&file) {
        LockStatus::Success => Some(file),
        status => {
            trace!(path = %path.display(), ?status, "skipping locked recovery file");
            None
        }
    }
}
