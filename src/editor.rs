use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::config::RcConfig;
use crate::document_model::exf::{FileSession, SessionFlags};
use crate::document_model::registers::CutBuffers;
use crate::document_model::screen::{Screen, ScreenMode};
use crate::error::{Error, Result};
use crate::events::EventState;
use crate::recover::lock::{self, LockStatus};
use crate::store::record_file::write_lines;
use crate::store::{OOBLNO, RecordFile};

/// Handle on one screen of the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Info,
    Error,
    SysErr,
}

/// A message waiting to be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MsgType,
    pub text: String,
}

/// Slot vector; closed entries leave a hole so handles stay stable.
#[derive(Debug)]
pub(crate) struct Slots<T> {
    items: Vec<Option<T>>,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self { items: Vec::new() }
    }

    fn insert(&mut self, item: T) -> usize {
        match self.items.iter().position(Option::is_none) {
            Some(i) => {
                self.items[i] = Some(item);
                i
            }
            None => {
                self.items.push(Some(item));
                self.items.len() - 1
            }
        }
    }

    fn remove(&mut self, i: usize) -> Option<T> {
        self.items.get_mut(i).and_then(Option::take)
    }

    pub(crate) fn get(&self, i: usize) -> Option<&T> {
        self.items.get(i).and_then(Option::as_ref)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.as_ref().map(|item| (i, item)))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(|(i, item)| item.as_mut().map(|item| (i, item)))
    }
}

impl<T> Index<usize> for Slots<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        match self.items.get(i) {
            Some(Some(item)) => item,
            _ => panic!("slot {i} is closed"),
        }
    }
}

impl<T> IndexMut<usize> for Slots<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        match self.items.get_mut(i) {
            Some(Some(item)) => item,
            _ => panic!("slot {i} is closed"),
        }
    }
}

/// Editor-wide state: open files, the screens on them, cut buffers,
/// queued messages and pending events.
pub struct Editor {
    pub(crate) config: RcConfig,
    pub(crate) files: Slots<FileSession>,
    pub(crate) screens: Slots<Screen>,
    pub(crate) cuts: CutBuffers,
    pub(crate) messages: VecDeque<Message>,
    pub(crate) events: EventState,
    /// The recovery directory problem was reported already.
    pub(crate) recdir_warned: bool,
}

impl Editor {
    pub fn new(config: RcConfig) -> Self {
        let events = EventState::new(config.sync_period);
        Self {
            config,
            files: Slots::new(),
            screens: Slots::new(),
            cuts: CutBuffers::new(),
            messages: VecDeque::new(),
            events,
            recdir_warned: false,
        }
    }

    pub fn config(&self) -> &RcConfig {
        &self.config
    }

    pub fn cut_buffers(&self) -> &CutBuffers {
        &self.cuts
    }

    /// Queue a message for the user.
    pub fn msgq(&mut self, kind: MsgType, text: impl Into<String>) {
        let text = text.into();
        match kind {
            MsgType::Info => info!(target: "msg", "{text}"),
            MsgType::Error => warn!(target: "msg", "{text}"),
            MsgType::SysErr => error!(target: "msg", "{text}"),
        }
        self.messages.push_back(Message { kind, text });
    }

    pub(crate) fn msgq_io(&mut self, what: &str, err: &io::Error) {
        self.msgq(MsgType::SysErr, format!("{what}: {err}"));
    }

    pub fn take_messages(&mut self) -> Vec<Message> {
        self.messages.drain(..).collect()
    }

    /// Open a line-editor screen on `path`.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<ScreenId> {
        self.open_with_mode(path, ScreenMode::Ex)
    }

    /// Open a screen on `path`, sharing the session if the file is already
    /// being edited.
    pub fn open_with_mode(&mut self, path: impl AsRef<Path>, mode: ScreenMode) -> Result<ScreenId> {
        let path = path.as_ref();
        if let Some(fid) = self.find_session(path) {
            self.files[fid].refcnt += 1;
            debug!(file = %path.display(), refcnt = self.files[fid].refcnt, "sharing session");
            return Ok(ScreenId(self.screens.insert(Screen::new(Some(fid), mode))));
        }

        let backing = match self.prepare_backing(path) {
            Ok(backing) => Some(backing),
            Err(e) => {
                debug!(error = %e, "no backing file");
                None
            }
        };
        let store = match RecordFile::from_text(path, backing.clone()) {
            Ok(store) => store,
            Err(e) => {
                if let Some(backing) = &backing {
                    let _ = std::fs::remove_file(backing);
                }
                return Err(Error::store(OOBLNO, e));
            }
        };

        let mut ep = FileSession::new(path, Box::new(store), self.config.undo_levels);
        if backing.is_some() {
            ep.rcv.path = backing;
            ep.flags.insert(SessionFlags::RCV_ON);
        }
        self.lock_edited_file(&mut ep);
        Ok(self.attach(ep, mode))
    }

    pub(crate) fn attach(&mut self, ep: FileSession, mode: ScreenMode) -> ScreenId {
        info!(file = %ep.name.display(), "file session started");
        let fid = self.files.insert(ep);
        ScreenId(self.screens.insert(Screen::new(Some(fid), mode)))
    }

    /// A screen with no file behind it.
    pub fn open_empty(&mut self, mode: ScreenMode) -> ScreenId {
        ScreenId(self.screens.insert(Screen::new(None, mode)))
    }

    /// Another screen on the same file session.
    pub fn split(&mut self, sid: ScreenId, mode: ScreenMode) -> Result<ScreenId> {
        let fid = self.file_of(sid)?;
        self.files[fid].refcnt += 1;
        let mut sp = Screen::new(Some(fid), mode);
        sp.cursor = self.screens[sid.0].cursor;
        Ok(ScreenId(self.screens.insert(sp)))
    }

    /// Close a screen; the last screen on a file ends its session.
    pub fn close(&mut self, sid: ScreenId) -> Result<()> {
        let Some(sp) = self.screens.remove(sid.0) else {
            return Ok(());
        };
        let Some(fid) = sp.file else {
            return Ok(());
        };
        self.files[fid].refcnt -= 1;
        if self.files[fid].refcnt == 0 {
            if let Some(ep) = self.files.remove(fid) {
                self.end_session(ep);
            }
        }
        Ok(())
    }

    /// Write the file out, to its own name unless `path` is given.
    /// Returns the number of bytes written.
    pub fn write(&mut self, sid: ScreenId, path: Option<&Path>) -> Result<usize> {
        let fid = self.file_of(sid)?;
        let records = self.files[fid].records()?;
        let own_name = self.files[fid].name.clone();
        let target: PathBuf = path.map_or_else(|| own_name.clone(), Path::to_path_buf);

        let bytes = write_lines(&target, records.iter().map(Vec::as_slice))?;
        if target == own_name {
            self.files[fid].flags.remove(SessionFlags::MODIFIED);
        }
        self.msgq(
            MsgType::Info,
            format!(
                "\"{}\" {} lines, {} characters",
                target.display(),
                records.len(),
                bytes
            ),
        );
        Ok(bytes)
    }

    /// The screen behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the screen was closed. Fallible operations take the
    /// handle instead and report `Error::NoFile`.
    pub fn screen(&self, sid: ScreenId) -> &Screen {
        &self.screens[sid.0]
    }

    pub fn screen_mut(&mut self, sid: ScreenId) -> &mut Screen {
        &mut self.screens[sid.0]
    }

    /// The file session behind a screen.
    pub fn session(&self, sid: ScreenId) -> Result<&FileSession> {
        let fid = self.file_of(sid)?;
        Ok(&self.files[fid])
    }

    pub fn session_mut(&mut self, sid: ScreenId) -> Result<&mut FileSession> {
        let fid = self.file_of(sid)?;
        Ok(&mut self.files[fid])
    }

    pub(crate) fn file_of(&self, sid: ScreenId) -> Result<usize> {
        self.screens
            .get(sid.0)
            .and_then(|sp| sp.file)
            .ok_or(Error::NoFile)
    }

    fn find_session(&self, path: &Path) -> Option<usize> {
        self.files
            .iter()
            .find(|(_, ep)| ep.name == path)
            .map(|(fid, _)| fid)
    }

    /// Screens other than `sid` backed by file `fid`.
    pub(crate) fn sharing_screens(&self, sid: ScreenId, fid: usize) -> Vec<usize> {
        self.screens
            .iter()
            .filter(|(i, sp)| *i != sid.0 && sp.file == Some(fid))
            .map(|(i, _)| i)
            .collect()
    }

    /// Take the advisory lock on the file being edited, so a second editor
    /// process can tell it is not alone.
    pub(crate) fn lock_edited_file(&mut self, ep: &mut FileSession) {
        let file = match File::open(&ep.name) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                debug!(file = %ep.name.display(), error = %e, "cannot open for locking");
                return;
            }
        };
        match lock::try_lock(&file) {
            LockStatus::Success => {
                ep.file_lock = Some(file);
                ep.flags.insert(SessionFlags::MULTI_LOCK);
            }
            LockStatus::Unavailable => {
                let name = ep.name.display().to_string();
                self.msgq(
                    MsgType::Error,
                    format!("{name}: already locked by another process"),
                );
            }
            LockStatus::Failed => debug!(file = %ep.name.display(), "locking not supported"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_open_shares_session() {
        let (mut ed, sid, dir) = editor_with("a\nb\n", ScreenMode::Ex);
        let again = ed.open(dir.path().join("file.txt")).unwrap();
        assert_ne!(sid, again);
        assert_eq!(ed.session(sid).unwrap().refcount(), 2);

        ed.close(again).unwrap();
        assert_eq!(ed.session(sid).unwrap().refcount(), 1);
    }

    #[test]
    fn test_open_prepares_backing_file() {
        let (ed, sid, dir) = editor_with("a\n", ScreenMode::Ex);
        let ep = ed.session(sid).unwrap();
        assert!(ep.is_recoverable());
        let backing = ep.snapshot_path().unwrap();
        assert!(backing.starts_with(dir.path().join("recover")));
        assert!(backing.exists());
        assert!(ep.flags().contains(SessionFlags::MULTI_LOCK));
    }

    #[test]
    fn test_close_last_screen_removes_recovery_files() {
        let (mut ed, sid, _dir) = editor_with("a\n", ScreenMode::Ex);
        let backing = ed.session(sid).unwrap().snapshot_path().unwrap().to_path_buf();
        ed.close(sid).unwrap();
        assert!(!backing.exists());
        assert!(matches!(ed.session(sid), Err(Error::NoFile)));
    }

    #[test]
    fn test_screen_without_file() {
        let mut ed = Editor::new(RcConfig::default());
        let sid = ed.open_empty(ScreenMode::Ex);
        assert!(matches!(ed.last_line(sid), Err(Error::NoFile)));
        assert!(matches!(ed.delete_line(sid, 1), Err(Error::NoFile)));
    }

    #[test]
    fn test_write_clears_modified() {
        let (mut ed, sid, dir) = editor_with("a\n", ScreenMode::Ex);
        ed.append_line(sid, 1, b"b").unwrap();
        assert!(ed.session(sid).unwrap().is_modified());

        let bytes = ed.write(sid, None).unwrap();
        assert_eq!(bytes, 4);
        assert!(!ed.session(sid).unwrap().is_modified());
        assert_eq!(std::fs::read(dir.path().join("file.txt")).unwrap(), b"a\nb\n");
        assert!(ed.take_messages().iter().any(|m| m.text.contains("2 lines")));
    }

    #[test]
    fn test_slots_reuse_holes() {
        let mut slots = Slots::new();
        let a = slots.insert('a');
        let b = slots.insert('b');
        assert_eq!(slots.remove(a), Some('a'));
        assert_eq!(slots.insert('c'), a);
        assert_eq!(slots[b], 'b');
        assert_eq!(slots.iter().count(), 2);
    }
}
