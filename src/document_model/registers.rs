use std::collections::HashMap;

use bitflags::bitflags;
use tracing::debug;

use super::line::GetFlags;
use super::marks::Mark;
use super::text::Text;
use crate::editor::{Editor, ScreenId};
use crate::error::{Error, Result};
use crate::store::{OOBLNO, Recno};

/// Slots in the numbered ring, `1` through `9`.
pub const RING_SIZE: usize = 9;

bitflags! {
    /// How a cut picks its buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CutFlags: u8 {
        /// Whole lines.
        const LINEMODE = 0x1;
        /// Numbered ring if the cut is line mode or crosses lines.
        const NUMOPT   = 0x2;
        /// Numbered ring always.
        const NUMREQ   = 0x4;
    }
}

/// Text held by one cut buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CutBuffer {
    text: Vec<Text>,
    linemode: bool,
}

impl CutBuffer {
    pub fn text(&self) -> &[Text] {
        &self.text
    }

    pub fn is_linemode(&self) -> bool {
        self.linemode
    }

    /// Total bytes held.
    pub fn len(&self) -> usize {
        self.text.iter().map(Text::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Where a buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Unnamed,
    Named(char),
    Ring(usize),
}

impl Slot {
    /// Digits `1`-`9` address the ring; every other name is a named buffer.
    fn of(name: char) -> Self {
        match name.to_digit(10) {
            Some(n @ 1..=9) => Slot::Ring(n as usize - 1),
            _ => Slot::Named(name),
        }
    }
}

/// All cut buffers of the editor: named buffers, the numbered ring, and the
/// unnamed buffer. The default buffer is whichever one was cut into last.
#[derive(Debug, Clone, Default)]
pub struct CutBuffers {
    named: HashMap<char, CutBuffer>,
    ring: [Option<CutBuffer>; RING_SIZE],
    unnamed: Option<CutBuffer>,
    default: Option<Slot>,
}

impl CutBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look a buffer up by name (case-insensitive), or the default buffer.
    pub fn get(&self, name: Option<char>) -> Option<&CutBuffer> {
        match name {
            Some(name) => self.slot(Slot::of(lower(name))),
            None => self.default.and_then(|slot| self.slot(slot)),
        }
    }

    fn slot(&self, slot: Slot) -> Option<&CutBuffer> {
        match slot {
            Slot::Unnamed => self.unnamed.as_ref(),
            Slot::Named(name) => self.named.get(&name),
            Slot::Ring(i) => self.ring[i].as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut CutBuffer {
        match slot {
            Slot::Unnamed => self.unnamed.get_or_insert_with(CutBuffer::default),
            Slot::Named(name) => self.named.entry(name).or_default(),
            Slot::Ring(i) => self.ring[i].get_or_insert_with(CutBuffer::default),
        }
    }

    /// Shift the ring one slot: `9` falls off, `1` is left empty.
    pub fn rotate(&mut self) {
        self.ring.rotate_right(1);
        self.ring[0] = None;
    }

    fn fill(&mut self, slot: Slot, text: &[Text], linemode: bool, append: bool) {
        let cb = self.slot_mut(slot);
        if !append {
            cb.text.clear();
            cb.linemode = false;
        }
        cb.text.extend_from_slice(text);
        cb.linemode |= linemode;
        self.default = Some(slot);
    }

    /// File freshly cut text into the right buffers.
    ///
    /// A numbered cut rotates the ring and lands in `1`, also when a buffer
    /// was named. An uppercase name appends to the lowercase buffer; when
    /// there was no rotation the cut is copied into the unnamed buffer too.
    pub(crate) fn store(&mut self, name: Option<char>, text: Vec<Text>, linemode: bool, numeric: bool) {
        match name {
            Some(name) => {
                if numeric {
                    self.rotate();
                }
                let append = name.is_uppercase();
                self.fill(Slot::of(lower(name)), &text, linemode, append);
                if numeric {
                    self.fill(Slot::Ring(0), &text, linemode, false);
                } else if append {
                    self.fill(Slot::Unnamed, &text, linemode, false);
                }
            }
            None if numeric => {
                self.rotate();
                self.fill(Slot::Ring(0), &text, linemode, false);
            }
            None => self.fill(Slot::Unnamed, &text, linemode, false),
        }
    }

    /// Human-readable listing of every buffer holding text, named buffers
    /// first, then the ring, then the unnamed buffer.
    pub fn display(&self) -> Vec<String> {
        let mut names: Vec<char> = self.named.keys().copied().collect();
        names.sort_unstable();

        let mut out = Vec::new();
        let buffers = names
            .into_iter()
            .map(|name| (name.to_string(), self.named.get(&name)))
            .chain(
                self.ring
                    .iter()
                    .enumerate()
                    .map(|(i, cb)| ((i + 1).to_string(), cb.as_ref())),
            )
            .chain(std::iter::once(("default buffer".to_string(), self.unnamed.as_ref())));
        for (name, cb) in buffers {
            let Some(cb) = cb.filter(|cb| !cb.is_empty()) else {
                continue;
            };
            let mode = if cb.linemode { "line" } else { "character" };
            out.push(format!("********** {name} ({mode} mode)"));
            out.extend(cb.text.iter().map(|tp| String::from_utf8_lossy(&tp.lb).into_owned()));
        }
        out
    }
}

fn lower(name: char) -> char {
    name.to_lowercase().next().unwrap_or(name)
}

impl Editor {
    /// Copy the range `from`..=`to` into cut buffers. Nothing is deleted.
    ///
    /// Character-mode ranges include the character under `to`. If any line
    /// cannot be read the buffers are left as they were.
    pub fn cut(&mut self, sid: ScreenId, name: Option<char>, from: Mark, to: Mark, flags: CutFlags) -> Result<()> {
        if from.lno == OOBLNO || to.lno == OOBLNO {
            return Err(Error::LineNotFound(OOBLNO));
        }
        let linemode = flags.contains(CutFlags::LINEMODE);
        let numeric = flags.contains(CutFlags::NUMREQ)
            || (flags.contains(CutFlags::NUMOPT) && (linemode || from.lno != to.lno));

        let mut text = Vec::new();
        if linemode {
            for lno in from.lno..=to.lno {
                text.push(self.cut_line(sid, lno, 0, None)?);
            }
        } else {
            let first_len = (from.lno == to.lno).then(|| to.cno.saturating_sub(from.cno) + 1);
            text.push(self.cut_line(sid, from.lno, from.cno, first_len)?);
            for lno in from.lno + 1..to.lno {
                text.push(self.cut_line(sid, lno, 0, None)?);
            }
            if to.lno != from.lno {
                text.push(self.cut_line(sid, to.lno, 0, Some(to.cno + 1))?);
            }
        }

        debug!(?name, lines = text.len(), linemode, numeric, "cut");
        self.cuts.store(name, text, linemode, numeric);
        Ok(())
    }

    /// `len` bytes of line `lno` from column `start`, or to the end of the
    /// line when `len` is `None`.
    fn cut_line(&mut self, sid: ScreenId, lno: Recno, start: usize, len: Option<usize>) -> Result<Text> {
        let line = self
            .get_line(sid, lno, GetFlags::FATAL)?
            .ok_or(Error::LineNotFound(lno))?;
        let start = start.min(line.len());
        let end = len.map_or(line.len(), |len| (start + len).min(line.len()));
        Ok(Text::new(&line[start..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_model::screen::ScreenMode;
    use crate::editor::test_support::editor_with;

    fn texts(cb: &CutBuffer) -> Vec<String> {
        cb.text()
            .iter()
            .map(|tp| String::from_utf8(tp.lb.clone()).unwrap())
            .collect()
    }

    fn line(lno: Recno) -> (Mark, Mark) {
        (Mark::new(lno, 0), Mark::new(lno, 0))
    }

    #[test]
    fn test_unnamed_cut_is_default() {
        let (mut ed, sid, _dir) = editor_with("hello world\n", ScreenMode::Ex);
        ed.cut(sid, None, Mark::new(1, 6), Mark::new(1, 10), CutFlags::empty())
            .unwrap();
        let cb = ed.cut_buffers().get(None).unwrap();
        assert_eq!(texts(cb), vec!["world"]);
        assert!(!cb.is_linemode());
        assert!(ed.cut_buffers().get(Some('1')).is_none());
    }

    #[test]
    fn test_character_cut_across_lines() {
        let (mut ed, sid, _dir) = editor_with("abcdef\nmiddle\nuvwxyz\n", ScreenMode::Ex);
        ed.cut(sid, Some('x'), Mark::new(1, 3), Mark::new(3, 1), CutFlags::empty())
            .unwrap();
        let cb = ed.cut_buffers().get(Some('x')).unwrap();
        assert_eq!(texts(cb), vec!["def", "middle", "uv"]);
        assert_eq!(cb.len(), 11);
    }

    #[test]
    fn test_numeric_rotation_rules() {
        let (mut ed, sid, _dir) = editor_with("one two\nthree\n", ScreenMode::Ex);
        // Within one line with NUMOPT: unnamed only.
        ed.cut(sid, None, Mark::new(1, 0), Mark::new(1, 2), CutFlags::NUMOPT)
            .unwrap();
        assert!(ed.cut_buffers().get(Some('1')).is_none());

        // Crossing a line boundary with NUMOPT: ring.
        ed.cut(sid, None, Mark::new(1, 4), Mark::new(2, 1), CutFlags::NUMOPT)
            .unwrap();
        assert_eq!(texts(ed.cut_buffers().get(Some('1')).unwrap()), vec!["two", "th"]);

        // NUMREQ always rotates.
        ed.cut(sid, None, Mark::new(2, 0), Mark::new(2, 0), CutFlags::NUMREQ)
            .unwrap();
        assert_eq!(texts(ed.cut_buffers().get(Some('1')).unwrap()), vec!["t"]);
        assert_eq!(texts(ed.cut_buffers().get(Some('2')).unwrap()), vec!["two", "th"]);
        assert_eq!(texts(ed.cut_buffers().get(None).unwrap()), vec!["t"]);
    }

    #[test]
    fn test_named_numeric_cut_copies_into_one() {
        let (mut ed, sid, _dir) = editor_with("a\nb\n", ScreenMode::Ex);
        let (from, to) = line(2);
        ed.cut(sid, Some('q'), from, to, CutFlags::LINEMODE | CutFlags::NUMOPT)
            .unwrap();
        assert_eq!(texts(ed.cut_buffers().get(Some('q')).unwrap()), vec!["b"]);
        assert_eq!(texts(ed.cut_buffers().get(Some('1')).unwrap()), vec!["b"]);
        assert!(ed.cut_buffers().get(None).unwrap().is_linemode());
    }

    #[test]
    fn test_uppercase_appends() {
        let (mut ed, sid, _dir) = editor_with("first\nsecond\n", ScreenMode::Ex);
        let (from, to) = line(1);
        ed.cut(sid, Some('a'), from, to, CutFlags::LINEMODE).unwrap();
        let (from, to) = line(2);
        ed.cut(sid, Some('A'), from, to, CutFlags::LINEMODE).unwrap();

        assert_eq!(
            texts(ed.cut_buffers().get(Some('a')).unwrap()),
            vec!["first", "second"]
        );
        assert_eq!(texts(ed.cut_buffers().get(Some('A')).unwrap()).len(), 2);
        assert_eq!(texts(ed.cut_buffers().get(None).unwrap()), vec!["second"]);
        // Without rotation the copy goes to the unnamed buffer, not the ring.
        assert!(ed.cut_buffers().get(Some('1')).is_none());
    }

    #[test]
    fn test_failed_cut_leaves_buffers() {
        let (mut ed, sid, _dir) = editor_with("a\nb\n", ScreenMode::Ex);
        let (from, to) = line(1);
        ed.cut(sid, Some('k'), from, to, CutFlags::LINEMODE).unwrap();

        let err = ed.cut(sid, Some('k'), Mark::new(1, 0), Mark::new(5, 0), CutFlags::LINEMODE);
        assert!(matches!(err, Err(Error::LineNotFound(3))));
        assert_eq!(texts(ed.cut_buffers().get(Some('k')).unwrap()), vec!["a"]);
        assert!(ed.cut(sid, None, Mark::new(0, 0), to, CutFlags::LINEMODE).is_err());
    }

    #[test]
    fn test_ring_discards_ninth() {
        let mut cuts = CutBuffers::new();
        for i in 1..=10 {
            cuts.store(None, vec![Text::new(format!("cut {i}"))], true, true);
        }
        assert_eq!(cuts.get(Some('1')).unwrap().text()[0].lb, b"cut 10");
        assert_eq!(cuts.get(Some('9')).unwrap().text()[0].lb, b"cut 2");
    }

    #[test]
    fn test_display_lists_buffers() {
        let mut cuts = CutBuffers::new();
        cuts.store(Some('b'), vec![Text::new("bee")], false, false);
        cuts.store(None, vec![Text::new("x"), Text::new("y")], true, true);
        let shown = cuts.display();
        assert_eq!(
            shown,
            vec![
                "********** b (character mode)",
                "bee",
                "********** 1 (line mode)",
                "x",
                "y",
            ]
        );
    }
}
