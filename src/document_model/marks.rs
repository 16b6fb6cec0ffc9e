use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::store::{OOBLNO, Recno};

/// Name of an entry in a file's mark table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkId {
    /// User marks a-z.
    User(char),
    /// The '' / `` context mark, set before jumps.
    Context,
    /// The '. mark, last changed line.
    LastChange,
    /// Per-line bookmarks a running global command iterates over.
    Global(usize),
}

impl MarkId {
    pub fn from_char(ch: char) -> Result<Self> {
        match ch {
            'a'..='z' => Ok(Self::User(ch)),
            '\'' | '`' => Ok(Self::Context),
            '.' => Ok(Self::LastChange),
            _ => Err(Error::InvalidMark(ch)),
        }
    }

    /// The name users type, if the mark is user visible.
    pub fn as_char(self) -> Option<char> {
        match self {
            Self::User(ch) => Some(ch),
            Self::Context => Some('\''),
            Self::LastChange => Some('.'),
            Self::Global(_) => None,
        }
    }
}

/// A line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mark {
    pub lno: Recno,
    pub cno: usize,
}

impl Mark {
    pub fn new(lno: Recno, cno: usize) -> Self {
        Self { lno, cno }
    }

    pub fn is_valid(&self) -> bool {
        self.lno != OOBLNO
    }
}

/// Marks of one file session, kept in step with line inserts and deletes.
///
/// A mark whose line is deleted keeps its entry with an out-of-band line
/// number so lookups can tell "deleted" apart from "never set".
#[derive(Debug, Clone, Default)]
pub struct MarkTable {
    marks: HashMap<MarkId, Mark>,
}

impl MarkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: MarkId, mark: Mark) {
        self.marks.insert(id, mark);
    }

    /// Look up a user mark by the character the user typed.
    pub fn get(&self, ch: char) -> Result<Mark> {
        let id = MarkId::from_char(ch)?;
        match self.marks.get(&id) {
            None => Err(Error::MarkNotSet(ch)),
            Some(mark) if !mark.is_valid() => Err(Error::MarkDeleted(ch)),
            Some(mark) => Ok(*mark),
        }
    }

    /// Position of any mark, `None` if it was never set or its line is gone.
    pub fn position(&self, id: MarkId) -> Option<Mark> {
        self.marks.get(&id).copied().filter(Mark::is_valid)
    }

    pub fn remove(&mut self, id: MarkId) -> Option<Mark> {
        self.marks.remove(&id)
    }

    /// A line was inserted at `lno`: everything at or below it moves down.
    pub fn on_insert(&mut self, lno: Recno) {
        for mark in self.marks.values_mut() {
            if mark.is_valid() && mark.lno >= lno {
                mark.lno += 1;
            }
        }
    }

    /// Line `lno` was deleted: marks on it become invalid, marks below it
    /// move up.
    pub fn on_delete(&mut self, lno: Recno) {
        for mark in self.marks.values_mut() {
            if mark.lno == lno {
                mark.lno = OOBLNO;
            } else if mark.lno > lno {
                mark.lno -= 1;
            }
        }
    }

    /// Drop the bookmarks left by a global command.
    pub fn clear_global(&mut self) {
        self.marks.retain(|id, _| !matches!(id, MarkId::Global(_)));
    }

    pub fn clear(&mut self) {
        self.marks.clear();
    }

    /// User-visible marks that still point at a line, sorted by name
    /// (for :marks).
    pub fn list(&self) -> Vec<(char, Mark)> {
        let mut marks: Vec<_> = self
            .marks
            .iter()
            .filter(|(_, mark)| mark.is_valid())
            .filter_map(|(id, mark)| id.as_char().map(|ch| (ch, *mark)))
            .collect();
        marks.sort_by_key(|(ch, _)| *ch);
        marks
    }
}
