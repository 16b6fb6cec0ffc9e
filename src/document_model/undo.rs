use tracing::debug;

use super::exf::SessionFlags;
use super::marks::Mark;
use crate::editor::{Editor, ScreenId};
use crate::error::{Error, Result};
use crate::store::Recno;

/// One logged line mutation, holding enough to run it again or undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A line now exists at `line` with `text`.
    Insert { line: Recno, text: Vec<u8> },
    /// The line at `line`, holding `text`, was removed.
    Delete { line: Recno, text: Vec<u8> },
    /// Before image of a replaced line.
    ResetBefore { line: Recno, text: Vec<u8> },
    /// After image of a replaced line.
    ResetAfter { line: Recno, text: Vec<u8> },
}

impl LogEntry {
    /// The entry that undoes this one when groups are replayed backwards.
    pub fn invert(&self) -> LogEntry {
        match self {
            LogEntry::Insert { line, text } => LogEntry::Delete {
                line: *line,
                text: text.clone(),
            },
            LogEntry::Delete { line, text } => LogEntry::Insert {
                line: *line,
                text: text.clone(),
            },
            LogEntry::ResetBefore { line, text } => LogEntry::ResetAfter {
                line: *line,
                text: text.clone(),
            },
            LogEntry::ResetAfter { line, text } => LogEntry::ResetBefore {
                line: *line,
                text: text.clone(),
            },
        }
    }

    pub fn line(&self) -> Recno {
        match self {
            LogEntry::Insert { line, .. }
            | LogEntry::Delete { line, .. }
            | LogEntry::ResetBefore { line, .. }
            | LogEntry::ResetAfter { line, .. } => *line,
        }
    }
}

/// Entries making up one logical change, with the cursor around it.
#[derive(Debug, Clone)]
pub struct ChangeGroup {
    pub entries: Vec<LogEntry>,
    pub cursor_before: Mark,
    pub cursor_after: Mark,
}

impl ChangeGroup {
    pub fn new(cursor: Mark) -> Self {
        Self {
            entries: Vec::new(),
            cursor_before: cursor,
            cursor_after: cursor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Undo and redo stacks of change groups for one file session.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    undo_stack: Vec<ChangeGroup>,
    redo_stack: Vec<ChangeGroup>,
    current: Option<ChangeGroup>,
    max_levels: usize,
}

impl ChangeLog {
    pub fn new(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            current: None,
            max_levels: max_levels.max(1),
        }
    }

    /// Open a new logical change, closing any open one.
    pub fn begin(&mut self, cursor: Mark) {
        self.finish_current();
        self.current = Some(ChangeGroup::new(cursor));
    }

    /// Log one entry into the open change. Any logged change makes the
    /// undone future unreachable, grouped or not.
    pub fn record(&mut self, entry: LogEntry) {
        self.redo_stack.clear();
        let group = self
            .current
            .get_or_insert_with(|| ChangeGroup::new(Mark::new(entry.line(), 0)));
        group.entries.push(entry);
    }

    pub fn record_insert(&mut self, line: Recno, text: &[u8]) {
        self.record(LogEntry::Insert {
            line,
            text: text.to_vec(),
        });
    }

    pub fn record_delete(&mut self, line: Recno, prior: &[u8]) {
        self.record(LogEntry::Delete {
            line,
            text: prior.to_vec(),
        });
    }

    pub fn record_reset_before(&mut self, line: Recno, prior: &[u8]) {
        self.record(LogEntry::ResetBefore {
            line,
            text: prior.to_vec(),
        });
    }

    pub fn record_reset_after(&mut self, line: Recno, text: &[u8]) {
        self.record(LogEntry::ResetAfter {
            line,
            text: text.to_vec(),
        });
    }

    /// Close the open change; empty changes are dropped.
    pub fn end(&mut self, cursor: Mark) {
        if let Some(mut group) = self.current.take() {
            if !group.is_empty() {
                group.cursor_after = cursor;
                self.push_undo(group);
            }
        }
    }

    fn finish_current(&mut self) {
        if let Some(group) = self.current.take() {
            if !group.is_empty() {
                self.push_undo(group);
            }
        }
    }

    fn push_undo(&mut self, group: ChangeGroup) {
        self.undo_stack.push(group);
        if self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }
        // A new change makes the undone future unreachable.
        self.redo_stack.clear();
    }

    /// Pop the newest change for undoing; it moves to the redo stack.
    pub fn undo(&mut self) -> Option<ChangeGroup> {
        self.finish_current();
        let group = self.undo_stack.pop()?;
        self.redo_stack.push(group.clone());
        Some(group)
    }

    /// Pop the newest undone change for redoing; it moves back to the undo
    /// stack without clearing the rest of the redo stack.
    pub fn redo(&mut self) -> Option<ChangeGroup> {
        self.finish_current();
        let group = self.redo_stack.pop()?;
        self.undo_stack.push(group.clone());
        Some(group)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.current.as_ref().is_some_and(|g| !g.is_empty())
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// The newest closed change, the one `undo` would pop.
    pub fn last_change(&self) -> Option<&ChangeGroup> {
        self.undo_stack.last()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current = None;
    }
}

impl Editor {
    /// Start a logical change at the screen's cursor.
    pub fn begin_change(&mut self, sid: ScreenId) -> Result<()> {
        let fid = self.file_of(sid)?;
        let cursor = self.screen(sid).cursor;
        self.files[fid].log.begin(cursor);
        Ok(())
    }

    /// Close the logical change, remembering where the cursor ended up.
    pub fn end_change(&mut self, sid: ScreenId) -> Result<()> {
        let fid = self.file_of(sid)?;
        let cursor = self.screen(sid).cursor;
        self.files[fid].log.end(cursor);
        Ok(())
    }

    /// Undo the newest logical change. Returns the cursor to restore.
    pub fn undo(&mut self, sid: ScreenId) -> Result<Mark> {
        let fid = self.file_of(sid)?;
        let group = self.files[fid].log.undo().ok_or(Error::NothingToUndo)?;
        debug!(entries = group.entries.len(), "undo");
        let inverted: Vec<LogEntry> = group.entries.iter().rev().map(LogEntry::invert).collect();
        self.replay(sid, &inverted)?;
        self.restore_cursor(sid, group.cursor_before)
    }

    /// Redo the newest undone change. Returns the cursor to restore.
    pub fn redo(&mut self, sid: ScreenId) -> Result<Mark> {
        let fid = self.file_of(sid)?;
        let group = self.files[fid].log.redo().ok_or(Error::NothingToRedo)?;
        debug!(entries = group.entries.len(), "redo");
        self.replay(sid, &group.entries)?;
        self.restore_cursor(sid, group.cursor_after)
    }

    /// Apply entries with logging off so the replay does not log itself.
    fn replay(&mut self, sid: ScreenId, entries: &[LogEntry]) -> Result<()> {
        let fid = self.file_of(sid)?;
        let was_off = self.files[fid].flags.contains(SessionFlags::NO_LOG);
        self.files[fid].flags.insert(SessionFlags::NO_LOG);

        let mut result = Ok(());
        for entry in entries {
            result = self.apply_entry(sid, entry);
            if result.is_err() {
                break;
            }
        }

        let flags = &mut self.files[fid].flags;
        flags.set(SessionFlags::NO_LOG, was_off);
        flags.insert(SessionFlags::UNDO);
        result
    }

    fn apply_entry(&mut self, sid: ScreenId, entry: &LogEntry) -> Result<()> {
        match entry {
            LogEntry::Insert { line, text } => self.append_line(sid, line - 1, text),
            LogEntry::Delete { line, .. } => self.delete_line(sid, *line),
            LogEntry::ResetBefore { .. } => Ok(()),
            LogEntry::ResetAfter { line, text } => self.set_line(sid, *line, text),
        }
    }

    fn restore_cursor(&mut self, sid: ScreenId, cursor: Mark) -> Result<Mark> {
        let last = self.last_line(sid)?;
        let lno = cursor.lno.clamp(1, last.max(1));
        let len = self.get_line(sid, lno, Default::default())?.map_or(0, <[u8]>::len);
        let restored = Mark::new(lno, cursor.cno.min(len.saturating_sub(1)));
        self.screen_mut(sid).cursor = restored;
        Ok(restored)
    }
}
