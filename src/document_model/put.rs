use tracing::debug;

use super::line::GetFlags;
use super::marks::Mark;
use super::text::Text;
use crate::editor::{Editor, ScreenId};
use crate::error::{Error, Result};
use crate::store::Recno;

impl Editor {
    /// Put buffer `name` (or the default buffer) at `cursor`, `count` times.
    /// `append` puts after the cursor rather than before it.
    ///
    /// Returns where the cursor should go: the first put line at its first
    /// nonblank for line-mode text, otherwise the first put character.
    pub fn put(&mut self, sid: ScreenId, name: Option<char>, cursor: Mark, append: bool, count: usize) -> Result<Mark> {
        let cb = match name {
            None => self.cuts.get(None).ok_or(Error::DefaultBufferEmpty)?,
            Some(ch) => self.cuts.get(Some(ch)).ok_or(Error::BufferEmpty(ch))?,
        };
        let linemode = cb.is_linemode();
        let text: Vec<Text> = cb.text().to_vec();
        if text.is_empty() {
            return Err(name.map_or(Error::DefaultBufferEmpty, Error::BufferEmpty));
        }
        let count = count.max(1);
        debug!(?name, fragments = text.len(), linemode, count, "put");

        // The buffer becomes the file: no blank line is kept.
        if linemode && cursor.lno == 1 && self.last_line(sid)? == 0 {
            let mut lno = 0;
            for _ in 0..count {
                for tp in &text {
                    self.append_line(sid, lno, &tp.lb)?;
                    lno += 1;
                }
            }
            return Ok(Mark::new(1, 0));
        }

        if linemode {
            let mut lno = if append { cursor.lno } else { cursor.lno.saturating_sub(1) };
            let first = lno + 1;
            for _ in 0..count {
                for tp in &text {
                    self.append_line(sid, lno, &tp.lb)?;
                    lno += 1;
                }
            }
            let cno = self.nonblank(sid, first)?;
            return Ok(Mark::new(first, cno));
        }

        self.put_chars(sid, &text, cursor, append, count)
    }

    /// Splice character-mode text into the cursor line.
    fn put_chars(&mut self, sid: ScreenId, text: &[Text], cursor: Mark, append: bool, count: usize) -> Result<Mark> {
        let lno = cursor.lno;
        let (line, empty_file) = match self.get_line_or_empty(sid, lno)? {
            Some(line) => (line.to_vec(), false),
            None => (Vec::new(), true),
        };

        let split = if line.is_empty() {
            0
        } else {
            (cursor.cno + usize::from(append)).min(line.len())
        };
        let (left, right) = line.split_at(split);
        let first = &text[0];

        let mut head = left.to_vec();
        for _ in 0..count {
            head.extend_from_slice(&first.lb);
        }
        let cno = if line.is_empty() {
            0
        } else {
            cursor.cno + usize::from(append && !first.is_empty())
        };

        let Some((last, middle)) = text[1..].split_last() else {
            head.extend_from_slice(right);
            self.replace_or_create(sid, lno, &head, empty_file)?;
            return Ok(Mark::new(lno, cno));
        };

        let mut tail = last.lb.clone();
        tail.extend_from_slice(right);

        self.replace_or_create(sid, lno, &head, empty_file)?;
        let mut at = lno;
        for tp in middle {
            self.append_line(sid, at, &tp.lb)?;
            at += 1;
        }
        self.append_line(sid, at, &tail)?;
        Ok(Mark::new(lno, cno))
    }

    fn replace_or_create(&mut self, sid: ScreenId, lno: Recno, text: &[u8], empty_file: bool) -> Result<()> {
        if empty_file {
            self.append_line(sid, 0, text)
        } else {
            self.set_line(sid, lno, text)
        }
    }

    /// Column of the first non-blank character of `lno`, or the last column
    /// of an all-blank line.
    pub fn nonblank(&mut self, sid: ScreenId, lno: Recno) -> Result<usize> {
        let line = self.get_line(sid, lno, GetFlags::FATAL)?.unwrap_or_default();
        Ok(match line.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(cno) => cno,
            None => line.len().saturating_sub(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_model::registers::CutFlags;
    use crate::document_model::screen::ScreenMode;
    use crate::editor::test_support::{editor_with, lines};

    #[test]
    fn test_put_empty_buffers() {
        let (mut ed, sid, _dir) = editor_with("a\n", ScreenMode::Ex);
        assert!(matches!(
            ed.put(sid, None, Mark::new(1, 0), true, 1),
            Err(Error::DefaultBufferEmpty)
        ));
        let err = ed.put(sid, Some('z'), Mark::new(1, 0), true, 1).unwrap_err();
        assert_eq!(err.to_string(), "Buffer z is empty");
    }

    #[test]
    fn test_line_put_after_and_before() {
        let (mut ed, sid, _dir) = editor_with("one\n  two\nthree\n", ScreenMode::Ex);
        ed.cut(sid, None, Mark::new(2, 0), Mark::new(2, 0), CutFlags::LINEMODE)
            .unwrap();

        let cursor = ed.put(sid, None, Mark::new(3, 0), true, 1).unwrap();
        assert_eq!(cursor, Mark::new(4, 2));
        let cursor = ed.put(sid, None, Mark::new(1, 0), false, 2).unwrap();
        assert_eq!(cursor, Mark::new(1, 2));
        assert_eq!(
            lines(&mut ed, sid),
            vec!["  two", "  two", "one", "  two", "three", "  two"]
        );
    }

    #[test]
    fn test_line_put_into_empty_file() {
        let (mut ed, sid, dir) = editor_with("x\ny\n", ScreenMode::Ex);
        ed.cut(sid, Some('a'), Mark::new(1, 0), Mark::new(2, 0), CutFlags::LINEMODE)
            .unwrap();

        let empty = dir.path().join("empty.txt");
        let other = ed.open(&empty).unwrap();
        let cursor = ed.put(other, Some('a'), Mark::new(1, 0), true, 1).unwrap();
        assert_eq!(cursor, Mark::new(1, 0));
        assert_eq!(lines(&mut ed, other), vec!["x", "y"]);
    }

    #[test]
    fn test_char_put_within_line() {
        let (mut ed, sid, _dir) = editor_with("abcdef\n", ScreenMode::Ex);
        ed.cut(sid, None, Mark::new(1, 0), Mark::new(1, 1), CutFlags::empty())
            .unwrap();

        let cursor = ed.put(sid, None, Mark::new(1, 3), true, 2).unwrap();
        assert_eq!(cursor, Mark::new(1, 4));
        assert_eq!(lines(&mut ed, sid), vec!["abcdababef"]);

        let cursor = ed.put(sid, None, Mark::new(1, 0), false, 1).unwrap();
        assert_eq!(cursor, Mark::new(1, 0));
        assert_eq!(lines(&mut ed, sid), vec!["ababcdababef"]);
    }

    #[test]
    fn test_char_put_across_lines() {
        let (mut ed, sid, _dir) = editor_with("12345\nmid\nabc\nXY\n", ScreenMode::Ex);
        ed.cut(sid, None, Mark::new(1, 3), Mark::new(3, 1), CutFlags::empty())
            .unwrap();

        let cursor = ed.put(sid, None, Mark::new(4, 0), true, 1).unwrap();
        assert_eq!(cursor, Mark::new(4, 1));
        assert_eq!(
            lines(&mut ed, sid),
            vec!["12345", "mid", "abc", "X45", "mid", "abY"]
        );
    }

    #[test]
    fn test_char_put_into_empty_file() {
        let (mut ed, sid, dir) = editor_with("word\n", ScreenMode::Ex);
        ed.cut(sid, None, Mark::new(1, 0), Mark::new(1, 3), CutFlags::empty())
            .unwrap();
        let other = ed.open(dir.path().join("new.txt")).unwrap();
        let cursor = ed.put(other, None, Mark::new(1, 0), true, 1).unwrap();
        assert_eq!(cursor, Mark::new(1, 0));
        assert_eq!(lines(&mut ed, other), vec!["word"]);
    }

    #[test]
    fn test_nonblank() {
        let (mut ed, sid, _dir) = editor_with("\t x\n   \n\n", ScreenMode::Ex);
        assert_eq!(ed.nonblank(sid, 1).unwrap(), 2);
        assert_eq!(ed.nonblank(sid, 2).unwrap(), 2);
        assert_eq!(ed.nonblank(sid, 3).unwrap(), 0);
    }
}
