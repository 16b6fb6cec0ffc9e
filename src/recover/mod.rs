//! Crash recovery.
//!
//! Each session gets a backing snapshot `vi.XXXXXX` in the recovery
//! directory when it is opened. The first change writes a crash-mail file
//! `recover.XXXXXX` naming the edited file and the snapshot, and the session
//! keeps an exclusive lock on it until it ends. A mail file whose lock can
//! be taken belongs to a session that died, and can be recovered with `-r`.
//!
//! The snapshot is mode 0700 until the first change, 0600 after.

pub mod list;
pub mod lock;
pub mod mailfile;

use std::fs::{self, DirBuilder, File, Permissions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use bitflags::bitflags;
use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::document_model::exf::{FileSession, RecoveryRecord, SessionFlags};
use crate::document_model::screen::ScreenMode;
use crate::editor::{Editor, MsgType, ScreenId};
use crate::error::{Error, Result};
use crate::store::{OOBLNO, RecordFile};
use lock::LockStatus;
use mailfile::MailInfo;

pub const BACKING_PREFIX: &str = "vi.";
pub const MAIL_PREFIX: &str = "recover.";

const PROGRAM: &str = env!("CARGO_PKG_NAME");

bitflags! {
    /// Extra work for a recovery sync.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SyncFlags: u8 {
        /// Mail the crash notice to the user.
        const EMAIL       = 0x1;
        /// Ask every screen on the file to exit.
        const END_SESSION = 0x2;
        /// Keep the recovery files when the session ends.
        const PRESERVE    = 0x4;
        /// Take a fresh snapshot with its own mail file.
        const SNAPSHOT    = 0x8;
    }
}

/// Create a uniquely named file in `dir` with exactly `mode`.
fn mktemp(dir: &Path, prefix: &str, mode: u32) -> io::Result<(File, PathBuf)> {
    let tmp = tempfile::Builder::new()
        .prefix(prefix)
        .rand_bytes(6)
        .tempfile_in(dir)?;
    let (file, path) = tmp.keep().map_err(|e| e.error)?;
    if let Err(e) = file.set_permissions(Permissions::from_mode(mode)) {
        let _ = fs::remove_file(&path);
        return Err(e);
    }
    Ok((file, path))
}

fn ensure_dir(dir: &Path) -> io::Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::other("not a directory")),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            DirBuilder::new().recursive(true).mode(0o700).create(dir)
        }
        Err(e) => Err(e),
    }
}

impl Editor {
    fn not_recoverable(&mut self) {
        self.msgq(MsgType::Error, Error::RecoveryDisabled.to_string());
    }

    /// Create the backing snapshot file for a session about to edit `name`.
    pub(crate) fn prepare_backing(&mut self, name: &Path) -> Result<PathBuf> {
        let dir = self.config.recdir.clone();
        if let Err(e) = ensure_dir(&dir) {
            if !self.recdir_warned {
                self.recdir_warned = true;
                self.msgq_io(&dir.display().to_string(), &e);
                self.not_recoverable();
            }
            return Err(Error::RecoveryDisabled);
        }

        // Newlines delimit the mail headers.
        if name.as_os_str().as_bytes().contains(&b'\n') {
            self.msgq(
                MsgType::Error,
                "Files with newlines in the name are unrecoverable",
            );
            self.not_recoverable();
            return Err(Error::RecoveryDisabled);
        }

        match mktemp(&dir, BACKING_PREFIX, 0o700) {
            Ok((_, path)) => {
                debug!(backing = %path.display(), "backing file ready");
                Ok(path)
            }
            Err(e) => {
                self.msgq_io(&dir.display().to_string(), &e);
                self.not_recoverable();
                Err(e.into())
            }
        }
    }

    /// First change to a session: write and lock the crash-mail file, get
    /// the snapshot up to date and mark it as changed.
    pub(crate) fn rcv_init(&mut self, fid: usize) -> Result<()> {
        let ep = &mut self.files[fid];
        ep.flags.remove(SessionFlags::FIRST_MODIFY);
        if !ep.flags.contains(SessionFlags::RCV_ON) {
            return Ok(());
        }
        ep.flags.remove(SessionFlags::RCV_ON);

        if let Err(e) = self.rcv_track(fid) {
            warn!(error = %e, "recovery setup failed");
            self.not_recoverable();
            return Err(e);
        }
        self.files[fid].flags.insert(SessionFlags::RCV_ON);
        Ok(())
    }

    fn rcv_track(&mut self, fid: usize) -> Result<()> {
        // A resumed session already has its mail file.
        if self.files[fid].rcv.mpath.is_none() {
            self.write_mailfile(fid, None)?;
            let ep = &mut self.files[fid];
            ep.scan_last()?;
            if let Err(e) = ep.store.sync() {
                let path = display(ep.rcv.path.as_deref());
                self.msgq(MsgType::SysErr, format!("Preservation failed: {path}: {e}"));
                return Err(Error::store(OOBLNO, e));
            }
        }
        if let Some(path) = &self.files[fid].rcv.path {
            let _ = fs::set_permissions(path, Permissions::from_mode(0o600));
        }
        Ok(())
    }

    /// Write a crash-mail file for session `fid`. With `snapshot`, the mail
    /// describes that copy, is mailed at once and is not kept open;
    /// otherwise it describes the live backing file and the session holds
    /// it locked.
    fn write_mailfile(&mut self, fid: usize, snapshot: Option<PathBuf>) -> Result<()> {
        let user = match mailfile::current_user() {
            Ok(user) => user,
            Err(uid) => {
                self.msgq(
                    MsgType::Error,
                    format!("Information on user id {uid} not found"),
                );
                return Err(Error::RecoveryDisabled);
            }
        };

        let dir = self.config.recdir.clone();
        let (mut file, mpath) = match mktemp(&dir, MAIL_PREFIX, 0o600) {
            Ok(created) => created,
            Err(e) => {
                self.msgq_io(&dir.display().to_string(), &e);
                return Err(e.into());
            }
        };
        if lock::try_lock(&file) != LockStatus::Success {
            self.msgq(MsgType::SysErr, "Unable to lock recovery file");
        }

        let issync = snapshot.is_some();
        let ep = &self.files[fid];
        let snapshot = snapshot.or_else(|| ep.rcv.path.clone()).unwrap_or_default();
        let name = ep.name.to_string_lossy().into_owned();
        let text = mailfile::compose(&MailInfo {
            file: &name,
            snapshot: &snapshot,
            user: &user,
            host: &mailfile::hostname(),
            when: Local::now(),
        });
        if let Err(e) = file.write_all(text.as_bytes()).and_then(|()| file.flush()) {
            self.msgq_io("Recovery file", &e);
            let _ = fs::remove_file(&mpath);
            return Err(e.into());
        }
        debug!(mail = %mpath.display(), "wrote recovery mail file");

        if issync {
            self.rcv_email(&file);
        } else {
            let rcv = &mut self.files[fid].rcv;
            rcv.mail = Some(file);
            rcv.mpath = Some(mpath);
        }
        Ok(())
    }

    /// Hand a crash-mail file to sendmail.
    fn rcv_email(&mut self, file: &File) {
        if self.config.secure {
            return;
        }
        let sendmail = self.config.sendmail.clone();
        if !sendmail.is_absolute() || fs::metadata(&sendmail).is_err() {
            self.msgq(
                MsgType::SysErr,
                format!("not sending email: {}", sendmail.display()),
            );
            return;
        }

        let stdin = match file.try_clone().and_then(|mut f| {
            f.seek(SeekFrom::Start(0))?;
            Ok(f)
        }) {
            Ok(f) => f,
            Err(e) => {
                self.msgq_io("lseek", &e);
                return;
            }
        };
        match Command::new(&sendmail)
            .arg("-t")
            .stdin(Stdio::from(stdin))
            .status()
        {
            Ok(status) => debug!(%status, "sendmail finished"),
            Err(e) => self.msgq_io(&sendmail.display().to_string(), &e),
        }
    }

    /// Sync the recovery state of the file behind a screen.
    pub fn sync(&mut self, sid: ScreenId, flags: SyncFlags) -> Result<()> {
        let fid = self.file_of(sid)?;
        self.rcv_sync(fid, flags)
    }

    pub(crate) fn rcv_sync(&mut self, fid: usize, flags: SyncFlags) -> Result<()> {
        if !self.files[fid].flags.contains(SessionFlags::RCV_ON) {
            return Ok(());
        }

        if self.files[fid].flags.contains(SessionFlags::MODIFIED) {
            let ep = &mut self.files[fid];
            ep.flags.remove(SessionFlags::RCV_SYNC);
            if let Err(e) = ep.store.sync() {
                ep.flags.remove(SessionFlags::RCV_ON | SessionFlags::RCV_NORM);
                let path = display(ep.rcv.path.as_deref());
                self.msgq(MsgType::SysErr, format!("File backup failed: {path}: {e}"));
                return Err(Error::store(OOBLNO, e));
            }
            if flags.contains(SyncFlags::PRESERVE) {
                ep.flags.insert(SessionFlags::RCV_NORM);
            }
            if flags.contains(SyncFlags::EMAIL) {
                if let Some(Ok(mail)) = ep.rcv.mail.as_ref().map(File::try_clone) {
                    self.rcv_email(&mail);
                }
            }
        }

        let mut result = Ok(());
        if flags.contains(SyncFlags::SNAPSHOT) {
            result = self.rcv_snapshot(fid);
        }

        if flags.contains(SyncFlags::END_SESSION) {
            for (_, sp) in self.screens.iter_mut() {
                if sp.file == Some(fid) {
                    sp.exit_force = true;
                }
            }
        }
        result
    }

    /// Copy the backing file to a new snapshot with its own mail file, as
    /// if the file had been opened again.
    fn rcv_snapshot(&mut self, fid: usize) -> Result<()> {
        let Some(source) = self.files[fid].rcv.path.clone() else {
            return Err(Error::RecoveryDisabled);
        };
        self.files[fid]
            .store
            .sync()
            .map_err(|e| Error::store(OOBLNO, e))?;

        let dir = self.config.recdir.clone();
        let (mut file, path) = match mktemp(&dir, BACKING_PREFIX, 0o600) {
            Ok(created) => created,
            Err(e) => {
                self.msgq_io(&dir.display().to_string(), &e);
                return Err(e.into());
            }
        };
        let copied = File::open(&source)
            .and_then(|mut src| io::copy(&mut src, &mut file))
            .and_then(|_| file.sync_all());
        drop(file);

        let result = match copied {
            Ok(()) => self.write_mailfile(fid, Some(path.clone())),
            Err(e) => {
                self.msgq_io(&source.display().to_string(), &e);
                Err(e.into())
            }
        };
        if result.is_err() {
            let _ = fs::remove_file(&path);
        } else {
            info!(snapshot = %path.display(), "snapshot taken");
        }
        result
    }

    /// `:preserve`: keep the recovery files past the end of the session.
    pub fn preserve(&mut self, sid: ScreenId) -> Result<()> {
        let fid = self.file_of(sid)?;
        if !self.files[fid].flags.contains(SessionFlags::RCV_ON) {
            return Err(Error::Command(
                "Preservation of this file not possible".to_string(),
            ));
        }
        self.files[fid].flags.insert(SessionFlags::RCV_NORM);
        self.rcv_sync(fid, SyncFlags::SNAPSHOT)?;
        self.msgq(MsgType::Info, "File preserved");
        Ok(())
    }

    /// Input ended before the file was written. A modified session keeps
    /// its recovery files past close, and the user is told either way.
    pub fn hangup(&mut self, sid: ScreenId) -> Result<()> {
        let fid = self.file_of(sid)?;
        let ep = &self.files[fid];
        if !ep.flags.contains(SessionFlags::MODIFIED) {
            return Ok(());
        }
        let name = ep.name.display().to_string();
        if !ep.flags.contains(SessionFlags::RCV_ON) {
            self.msgq(
                MsgType::Error,
                format!("{name}: modified and not written; changes are lost"),
            );
            return Ok(());
        }
        self.rcv_sync(fid, SyncFlags::PRESERVE | SyncFlags::EMAIL)?;
        warn!(file = %name, "input ended with unwritten changes");
        self.msgq(
            MsgType::Error,
            format!("{name}: modified and not written; preserved for recovery"),
        );
        Ok(())
    }

    /// Tear down a session whose last screen closed.
    pub(crate) fn end_session(&mut self, ep: FileSession) {
        if !ep.flags.contains(SessionFlags::RCV_NORM) {
            for path in [ep.rcv.path.as_ref(), ep.rcv.mpath.as_ref()]
                .into_iter()
                .flatten()
            {
                if let Err(e) = fs::remove_file(path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        self.msgq_io(&path.display().to_string(), &e);
                    }
                }
            }
        }
        info!(file = %ep.name.display(), "file session ended");
    }

    /// Lines for `-r` with no file: `date: name` per recoverable file.
    pub fn list_recovery(&mut self) -> Result<Vec<String>> {
        let dir = self.config.recdir.clone();
        let entries = match list::scan(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.msgq_io(&format!("recdir: {}", dir.display()), &e);
                return Err(e.into());
            }
        };

        let mut out = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => out.push(format!(
                    "{}: {}",
                    mailfile::ctime(&DateTime::<Local>::from(entry.mtime)),
                    entry.name
                )),
                Err(e) => self.msgq(MsgType::Error, e.to_string()),
            }
        }
        if out.is_empty() {
            out.push(format!("{PROGRAM}: No files to recover"));
        }
        Ok(out)
    }

    /// Resume editing `name` from the newest recovery snapshot for it. The
    /// session takes over the snapshot and the locked mail file.
    pub fn recover(&mut self, name: &str, mode: ScreenMode) -> Result<ScreenId> {
        let dir = self.config.recdir.clone();
        let entries = match list::scan(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.msgq_io(&dir.display().to_string(), &e);
                return Err(e.into());
            }
        };

        let (mut found, mut requested) = (0, 0);
        let mut best: Option<list::RecoveryEntry> = None;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.msgq(MsgType::Error, e.to_string());
                    continue;
                }
            };
            found += 1;
            if entry.name != name {
                continue;
            }
            requested += 1;
            if best.as_ref().is_none_or(|b| b.mtime < entry.mtime) {
                best = Some(entry);
            }
        }

        let Some(best) = best else {
            let err = Error::NoRecoveryFile(name.to_string());
            self.msgq(MsgType::Info, err.to_string());
            return Err(err);
        };
        if requested > 1 {
            self.msgq(
                MsgType::Info,
                "There are older versions of this file for you to recover",
            );
        }
        if found > requested {
            self.msgq(MsgType::Info, "There are other files for you to recover");
        }

        let store = RecordFile::open_snapshot(&best.snapshot).map_err(|e| Error::store(OOBLNO, e))?;
        info!(file = name, snapshot = %best.snapshot.display(), "recovering");
        let mut ep = FileSession::new(name, Box::new(store), self.config.undo_levels);
        ep.rcv = RecoveryRecord {
            path: Some(best.snapshot),
            mpath: Some(best.mail_path),
            mail: Some(best.file),
        };
        ep.flags.insert(SessionFlags::RCV_ON | SessionFlags::MODIFIED);
        self.lock_edited_file(&mut ep);
        Ok(self.attach(ep, mode))
    }
}

fn display(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}
