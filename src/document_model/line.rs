//! Line access for screens: lookups through pending input, the line cache
//! and the record store, and the four mutations that keep the cache, the
//! marks, the change log and every sharing screen in step.

use bitflags::bitflags;
use tracing::{debug, trace};

use super::exf::SessionFlags;
use super::marks::{Mark, MarkId};
use super::screen::{LineOp, ScreenMode};
use super::text::TextInput;
use super::undo::LogEntry;
use crate::editor::{Editor, ScreenId};
use crate::error::{Error, Result};
use crate::store::{OOBLNO, PutMode, Recno};

bitflags! {
    /// Options for line lookups.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GetFlags: u8 {
        /// A missing line is an error, not `None`.
        const FATAL    = 0x1;
        /// Skip pending input and the line cache.
        const NO_CACHE = 0x2;
    }
}

fn missing_line<'a>(lno: Recno, flags: GetFlags) -> Result<Option<&'a [u8]>> {
    if flags.contains(GetFlags::FATAL) {
        debug!(lno, "line not found");
        Err(Error::LineNotFound(lno))
    } else {
        Ok(None)
    }
}

impl Editor {
    /// Look up line `lno` as the screen sees it.
    ///
    /// Lines being typed shadow the file; lines after them are renumbered
    /// past the pending input. A line that does not exist is `Ok(None)`
    /// unless `FATAL` is given.
    pub fn get_line(&mut self, sid: ScreenId, lno: Recno, flags: GetFlags) -> Result<Option<&[u8]>> {
        let fid = self.file_of(sid)?;
        if lno == OOBLNO {
            return missing_line(lno, flags);
        }

        let mut lno = lno;
        if !flags.contains(GetFlags::NO_CACHE) {
            let mut in_input = false;
            if let Some(tp) = &self.screens[sid.0].tinput {
                if tp.contains(lno) {
                    in_input = true;
                } else if lno > tp.last_lno() {
                    lno -= tp.extra_lines();
                }
            }
            if in_input {
                return Ok(self.screens[sid.0].tinput.as_ref().and_then(|tp| tp.get(lno)));
            }
            if self.files[fid].cache.is_hit(lno) {
                trace!(lno, "line cache hit");
                return Ok(Some(&self.files[fid].cache.line));
            }
        }

        let ep = &mut self.files[fid];
        ep.cache.invalidate();
        match ep.store.get(lno) {
            Ok(Some(line)) => {
                ep.cache.fill(lno, line);
                Ok(Some(&ep.cache.line))
            }
            Ok(None) => missing_line(lno, flags),
            Err(e) => Err(Error::store(lno, e)),
        }
    }

    /// Like `get_line`, but an empty file answers lines 0 and 1 with
    /// `Ok(None)` instead of an error. Every other missing line is an error.
    pub fn get_line_or_empty(&mut self, sid: ScreenId, lno: Recno) -> Result<Option<&[u8]>> {
        if self.get_line(sid, lno, GetFlags::empty())?.is_some() {
            return self.get_line(sid, lno, GetFlags::empty());
        }
        if (lno == OOBLNO || lno == 1) && self.last_line(sid)? == 0 {
            return Ok(None);
        }
        Err(Error::LineNotFound(lno))
    }

    /// Whether line `lno` exists as the screen sees it.
    pub fn line_exists(&mut self, sid: ScreenId, lno: Recno) -> Result<bool> {
        let fid = self.file_of(sid)?;
        if lno == OOBLNO {
            return Ok(false);
        }
        if let Some(nlines) = self.files[fid].nlines {
            return Ok(lno <= self.visible_last(sid, nlines));
        }
        Ok(self.get_line(sid, lno, GetFlags::empty())?.is_some())
    }

    /// Number of the last line as the screen sees it; 0 for an empty file.
    pub fn last_line(&mut self, sid: ScreenId) -> Result<Recno> {
        let fid = self.file_of(sid)?;
        let nlines = match self.files[fid].nlines {
            Some(nlines) => nlines,
            None => self.files[fid].scan_last()?,
        };
        Ok(self.visible_last(sid, nlines))
    }

    /// Last line once pending input is counted in. Input into an empty
    /// file supplies every line.
    fn visible_last(&self, sid: ScreenId, nlines: Recno) -> Recno {
        match &self.screens[sid.0].tinput {
            Some(tp) if nlines == 0 => tp.last_lno(),
            Some(tp) => nlines + tp.extra_lines(),
            None => nlines,
        }
    }

    /// Current file content of `lno`, ignoring pending input.
    fn stored_line(&mut self, fid: usize, lno: Recno) -> Result<Vec<u8>> {
        let ep = &mut self.files[fid];
        if ep.cache.is_hit(lno) {
            return Ok(ep.cache.line.clone());
        }
        ep.store
            .get(lno)
            .map_err(|e| Error::store(lno, e))?
            .ok_or(Error::LineNotFound(lno))
    }

    /// Delete line `lno`.
    pub fn delete_line(&mut self, sid: ScreenId, lno: Recno) -> Result<()> {
        let fid = self.file_of(sid)?;
        trace!(lno, "delete line");
        let prior = self.stored_line(fid, lno)?;

        let ep = &mut self.files[fid];
        ep.store.delete(lno).map_err(|e| Error::store(lno, e))?;
        ep.cache.invalidate_from(lno);
        if let Some(n) = ep.nlines.as_mut() {
            *n -= 1;
        }
        ep.marks.on_delete(lno);

        self.log_entry(fid, LogEntry::Delete { line: lno, text: prior });
        self.modified(fid, lno);
        self.notify_screens(sid, lno, LineOp::Delete, true)
    }

    /// Append a line after `lno`; 0 puts it first.
    pub fn append_line(&mut self, sid: ScreenId, lno: Recno, text: &[u8]) -> Result<()> {
        self.append(sid, true, lno, text)
    }

    /// Append, telling the current screen only when `update` is set. Other
    /// screens on the file are always told.
    pub(crate) fn append(&mut self, sid: ScreenId, update: bool, lno: Recno, text: &[u8]) -> Result<()> {
        let fid = self.file_of(sid)?;
        trace!(lno, "append line");

        let ep = &mut self.files[fid];
        ep.store
            .put(lno, text, PutMode::After)
            .map_err(|e| Error::store(lno, e))?;
        ep.cache.invalidate_from(lno + 1);
        if let Some(n) = ep.nlines.as_mut() {
            *n += 1;
        }
        self.shift_marks_for_insert(fid, lno + 1)?;

        self.log_entry(
            fid,
            LogEntry::Insert {
                line: lno + 1,
                text: text.to_vec(),
            },
        );
        self.modified(fid, lno + 1);
        self.notify_screens(sid, lno, LineOp::Append, update)
    }

    /// Insert a line before `lno`.
    pub fn insert_line(&mut self, sid: ScreenId, lno: Recno, text: &[u8]) -> Result<()> {
        let fid = self.file_of(sid)?;
        trace!(lno, "insert line");

        let ep = &mut self.files[fid];
        ep.store
            .put(lno, text, PutMode::Before)
            .map_err(|e| Error::store(lno, e))?;
        ep.cache.invalidate_from(lno);
        if let Some(n) = ep.nlines.as_mut() {
            *n += 1;
        }
        self.shift_marks_for_insert(fid, lno)?;

        self.log_entry(
            fid,
            LogEntry::Insert {
                line: lno,
                text: text.to_vec(),
            },
        );
        self.modified(fid, lno);
        self.notify_screens(sid, lno, LineOp::Insert, true)
    }

    /// Replace the text of line `lno`.
    pub fn set_line(&mut self, sid: ScreenId, lno: Recno, text: &[u8]) -> Result<()> {
        let fid = self.file_of(sid)?;
        trace!(lno, "set line");
        let prior = self.stored_line(fid, lno)?;

        let ep = &mut self.files[fid];
        ep.store
            .put(lno, text, PutMode::Replace)
            .map_err(|e| Error::store(lno, e))?;
        ep.cache.invalidate_from(lno);

        self.log_entry(fid, LogEntry::ResetBefore { line: lno, text: prior });
        self.log_entry(
            fid,
            LogEntry::ResetAfter {
                line: lno,
                text: text.to_vec(),
            },
        );
        self.modified(fid, lno);
        self.notify_screens(sid, lno, LineOp::Reset, true)
    }

    /// Move marks for a new line at `lno`. The first line of an empty file
    /// moves nothing: there was nothing to move past.
    fn shift_marks_for_insert(&mut self, fid: usize, lno: Recno) -> Result<()> {
        if lno == 1 {
            let last = match self.files[fid].nlines {
                Some(n) => n,
                None => self.files[fid].scan_last()?,
            };
            if last == 1 {
                return Ok(());
            }
        }
        self.files[fid].marks.on_insert(lno);
        Ok(())
    }

    fn log_entry(&mut self, fid: usize, entry: LogEntry) {
        let ep = &mut self.files[fid];
        if !self.config.log || ep.flags.contains(SessionFlags::NO_LOG) {
            return;
        }
        ep.flags.remove(SessionFlags::UNDO);
        ep.log.record(entry);
    }

    /// Bookkeeping after any successful mutation.
    fn modified(&mut self, fid: usize, lno: Recno) {
        if self.files[fid].flags.contains(SessionFlags::FIRST_MODIFY) {
            if let Err(e) = self.rcv_init(fid) {
                debug!(error = %e, "recovery setup failed");
            }
        }
        let ep = &mut self.files[fid];
        ep.flags.insert(SessionFlags::MODIFIED | SessionFlags::RCV_SYNC);
        ep.marks.set(MarkId::LastChange, Mark::new(lno.max(1), 0));
    }

    /// Tell screens about a changed line. Line-editor screens have nothing
    /// to redraw.
    fn notify_screens(&mut self, sid: ScreenId, lno: Recno, op: LineOp, update: bool) -> Result<()> {
        if self.screens[sid.0].mode == ScreenMode::Ex {
            return Ok(());
        }
        let fid = self.file_of(sid)?;
        if self.files[fid].refcnt > 1 {
            for other in self.sharing_screens(sid, fid) {
                self.screens[other].change(lno, op)?;
            }
        }
        if update {
            self.screens[sid.0].change(lno, op)?;
        }
        Ok(())
    }

    /// Begin typing over line `lno`. The line's current text, if any,
    /// becomes the first input line.
    pub fn start_input(&mut self, sid: ScreenId, lno: Recno) -> Result<()> {
        let current = self.get_line(sid, lno, GetFlags::empty())?.map(<[u8]>::to_vec);
        let mut input = TextInput::new(lno.max(1));
        if let Some(current) = current {
            input.set_current(current);
        }
        self.screens[sid.0].tinput = Some(input);
        Ok(())
    }

    /// Begin typing new lines that go in before line `lno`.
    pub fn start_insert(&mut self, sid: ScreenId, lno: Recno) -> Result<()> {
        self.file_of(sid)?;
        self.screens[sid.0].tinput = Some(TextInput::inserting(lno.max(1)));
        Ok(())
    }

    /// Replace the text of the input line being typed.
    pub fn input_text(&mut self, sid: ScreenId, text: &[u8]) -> Result<()> {
        self.file_of(sid)?;
        if let Some(tp) = self.screens[sid.0].tinput.as_mut() {
            tp.set_current(text.to_vec());
        }
        Ok(())
    }

    /// Start a new input line after the current one.
    pub fn input_newline(&mut self, sid: ScreenId) -> Result<()> {
        self.file_of(sid)?;
        if let Some(tp) = self.screens[sid.0].tinput.as_mut() {
            tp.newline();
        }
        Ok(())
    }

    /// Throw pending input away.
    pub fn cancel_input(&mut self, sid: ScreenId) -> Result<()> {
        self.file_of(sid)?;
        self.screens[sid.0].tinput = None;
        Ok(())
    }

    /// Write pending input into the file as one logical change. Input that
    /// replaces a line sets that line and appends the rest after it; an
    /// unchanged first line is left alone. Inserted input is appended line
    /// by line. The current screen already shows the extra lines.
    pub fn commit_input(&mut self, sid: ScreenId) -> Result<()> {
        self.file_of(sid)?;
        let Some(input) = self.screens[sid.0].tinput.take() else {
            return Ok(());
        };
        let replaces = input.replaces();
        let mut lines = input.into_lines().into_iter();
        let Some(first) = lines.next() else {
            return Ok(());
        };

        self.begin_change(sid)?;
        let current = if replaces {
            self.get_line(sid, first.lno, GetFlags::empty())?.map(<[u8]>::to_vec)
        } else {
            None
        };
        match current {
            Some(text) if text == first.lb => {}
            Some(_) => self.set_line(sid, first.lno, &first.lb)?,
            None => self.append(sid, true, first.lno - 1, &first.lb)?,
        }
        let mut last = first.lno;
        for tp in lines {
            self.append(sid, false, tp.lno - 1, &tp.lb)?;
            last = tp.lno;
        }
        self.screens[sid.0].cursor = Mark::new(last, 0);
        self.end_change(sid)
    }
}
