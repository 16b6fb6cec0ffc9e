use regex::bytes::Regex;
use tracing::{debug, trace};

use crate::document_model::{CutFlags, GetFlags, Mark, MarkId};
use crate::editor::{Editor, MsgType, ScreenId};
use crate::error::{Error, Result};
use crate::events::Events;
use crate::store::Recno;

/// Changes of at least this many lines are reported.
const REPORT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmd {
    Append,
    Delete,
    Display,
    Equal,
    Global,
    Insert,
    Mark,
    Marks,
    Preserve,
    Print,
    Put,
    Quit,
    Redo,
    Undo,
    VGlobal,
    Write,
    Yank,
}

/// What addresses a command takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Addr {
    None,
    /// One line, the current one by default.
    Line,
    /// One line that may be 0, for commands that add text after it.
    LineOrZero,
    /// A range, the current line by default.
    Range,
    /// A range, the whole file by default.
    All,
}

struct CmdDef {
    name: &'static str,
    /// Shortest accepted abbreviation.
    abbrev: &'static str,
    cmd: Cmd,
    addr: Addr,
}

const fn cmd_def(name: &'static str, abbrev: &'static str, cmd: Cmd, addr: Addr) -> CmdDef {
    CmdDef { name, abbrev, cmd, addr }
}

// Checked in order; longer names that share a prefix come first.
const COMMANDS: &[CmdDef] = &[
    cmd_def("append", "a", Cmd::Append, Addr::LineOrZero),
    cmd_def("delete", "d", Cmd::Delete, Addr::Range),
    cmd_def("display", "di", Cmd::Display, Addr::None),
    cmd_def("global", "g", Cmd::Global, Addr::All),
    cmd_def("insert", "i", Cmd::Insert, Addr::LineOrZero),
    cmd_def("k", "k", Cmd::Mark, Addr::Line),
    cmd_def("marks", "marks", Cmd::Marks, Addr::None),
    cmd_def("mark", "ma", Cmd::Mark, Addr::Line),
    cmd_def("print", "p", Cmd::Print, Addr::Range),
    cmd_def("put", "pu", Cmd::Put, Addr::LineOrZero),
    cmd_def("preserve", "pre", Cmd::Preserve, Addr::None),
    cmd_def("quit", "q", Cmd::Quit, Addr::None),
    cmd_def("redo", "red", Cmd::Redo, Addr::None),
    cmd_def("undo", "u", Cmd::Undo, Addr::None),
    cmd_def("vglobal", "v", Cmd::VGlobal, Addr::All),
    cmd_def("write", "w", Cmd::Write, Addr::None),
    cmd_def("yank", "y", Cmd::Yank, Addr::Range),
    cmd_def("=", "=", Cmd::Equal, Addr::LineOrZero),
];

fn lookup(name: &str) -> Option<&'static CmdDef> {
    COMMANDS
        .iter()
        .find(|c| c.name.starts_with(name) && name.len() >= c.abbrev.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    from: Recno,
    to: Recno,
    /// Number of addresses typed.
    given: usize,
}

fn command_error(msg: impl Into<String>) -> Error {
    Error::Command(msg.into())
}

/// Line-editor (ex) commands run against one screen.
///
/// Lines go in through `handle_line`. After `a` or `i` the controller
/// collects text lines through the screen's text input until a line
/// holding a single `.`. Printed lines are buffered for the caller.
pub struct CommandController {
    sid: ScreenId,
    output: Vec<String>,
    /// Text lines typed since `a`/`i`, when collecting input.
    input: Option<usize>,
    in_global: bool,
}

impl CommandController {
    pub fn new(sid: ScreenId) -> Self {
        Self {
            sid,
            output: Vec::new(),
            input: None,
            in_global: false,
        }
    }

    pub fn screen(&self) -> ScreenId {
        self.sid
    }

    pub fn is_inputting(&self) -> bool {
        self.input.is_some()
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Handle one line from the user. Returns true when the user asked to
    /// quit.
    pub fn handle_line(&mut self, ed: &mut Editor, line: &str) -> Result<bool> {
        match self.input {
            Some(typed) => {
                self.handle_input(ed, line, typed)?;
                Ok(false)
            }
            None => self.execute(ed, line),
        }
    }

    fn handle_input(&mut self, ed: &mut Editor, line: &str, typed: usize) -> Result<()> {
        let sid = self.sid;
        if line == "." {
            self.input = None;
            if typed == 0 {
                ed.cancel_input(sid)?;
                return Ok(());
            }
            ed.commit_input(sid)?;
            if typed >= REPORT {
                ed.msgq(MsgType::Info, format!("{typed} more lines"));
            }
            return Ok(());
        }
        if typed > 0 {
            ed.input_newline(sid)?;
        }
        ed.input_text(sid, line.as_bytes())?;
        self.input = Some(typed + 1);
        Ok(())
    }

    fn execute(&mut self, ed: &mut Editor, line: &str) -> Result<bool> {
        let sid = self.sid;
        let line = line.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
        trace!(command = line, "ex command");

        if line.trim().is_empty() {
            let last = ed.last_line(sid)?;
            let next = ed.screen(sid).cursor.lno.min(last) + 1;
            if next > last {
                return Err(command_error("At end-of-file"));
            }
            self.goto(ed, next)?;
            return Ok(false);
        }

        let (range, rest) = self.parse_range(ed, line)?;
        let rest = rest.trim_start();
        let (name, rest) = split_name(rest);
        let (force, args) = match rest.strip_prefix('!') {
            Some(args) => (true, args.trim()),
            None => (false, rest.trim()),
        };

        if name.is_empty() {
            if range.given == 0 {
                return Err(command_error(format!("The {} command is unknown", line.trim())));
            }
            let lno = self.check_line(ed, range.to, false)?;
            self.goto(ed, lno)?;
            return Ok(false);
        }

        // "ka" is "k a"
        let (name, args) = match name.strip_prefix('k') {
            Some(mark) if mark.len() == 1 => ("k", mark),
            _ => (name, args),
        };
        let Some(def) = lookup(name) else {
            return Err(command_error(format!("The {name} command is unknown")));
        };
        if self.in_global && matches!(def.cmd, Cmd::Append | Cmd::Insert | Cmd::Global | Cmd::VGlobal | Cmd::Quit) {
            return Err(command_error(format!(
                "The {} command can't be used as part of a global command",
                def.name
            )));
        }
        let range = self.resolve(ed, def, range)?;
        debug!(command = def.name, ?range, force, args, "run");

        match def.cmd {
            Cmd::Append => self.start_text(ed, range.to + 1)?,
            Cmd::Insert => self.start_text(ed, range.to.max(1))?,
            Cmd::Delete => self.delete(ed, range, parse_buffer(args)?)?,
            Cmd::Yank => self.yank(ed, range, parse_buffer(args)?)?,
            Cmd::Put => self.put(ed, range.to, parse_buffer(args)?)?,
            Cmd::Print => self.print(ed, range)?,
            Cmd::Equal => self.output.push(range.to.to_string()),
            Cmd::Undo => {
                ed.undo(sid)?;
            }
            Cmd::Redo => {
                ed.redo(sid)?;
            }
            Cmd::Mark => self.mark(ed, range.to, args)?,
            Cmd::Marks => self.marks(ed)?,
            Cmd::Display => self.display(ed, args)?,
            Cmd::Global => self.global(ed, range, force, args)?,
            Cmd::VGlobal => self.global(ed, range, true, args)?,
            Cmd::Write => {
                let path = (!args.is_empty()).then(|| std::path::Path::new(args));
                ed.write(sid, path)?;
            }
            Cmd::Preserve => ed.preserve(sid)?,
            Cmd::Quit => {
                if !force && ed.session(sid)?.is_modified() {
                    return Err(command_error(
                        "File modified since last complete write; write or use ! to override",
                    ));
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Fill in default addresses and check the range against the file.
    fn resolve(&self, ed: &mut Editor, def: &CmdDef, range: Range) -> Result<Range> {
        let last = ed.last_line(self.sid)?;
        match def.addr {
            Addr::None => {
                if range.given > 0 {
                    return Err(command_error(format!(
                        "The {} command doesn't support an address",
                        def.name
                    )));
                }
                Ok(range)
            }
            Addr::All if range.given == 0 => Ok(Range {
                from: last.min(1),
                to: last,
                given: 0,
            }),
            Addr::LineOrZero if range.given == 0 && def.cmd == Cmd::Equal => Ok(Range {
                from: last,
                to: last,
                given: 0,
            }),
            Addr::Line | Addr::LineOrZero => {
                let zero_ok = def.addr == Addr::LineOrZero;
                let to = self.check_line(ed, range.to, zero_ok)?;
                Ok(Range {
                    from: to,
                    to,
                    given: range.given,
                })
            }
            Addr::Range | Addr::All => {
                if range.from > range.to {
                    return Err(command_error("The second address is smaller than the first"));
                }
                self.check_line(ed, range.from, def.addr == Addr::All)?;
                self.check_line(ed, range.to, def.addr == Addr::All)?;
                Ok(range)
            }
        }
    }

    fn check_line(&self, ed: &mut Editor, lno: Recno, zero_ok: bool) -> Result<Recno> {
        let last = ed.last_line(self.sid)?;
        if lno > last {
            return Err(command_error(format!(
                "Illegal address: only {last} lines in the file"
            )));
        }
        if lno == 0 && !zero_ok {
            return Err(command_error(if last == 0 {
                "Empty file"
            } else {
                "The address 0 is not permitted here"
            }));
        }
        Ok(lno)
    }

    fn parse_range<'a>(&self, ed: &mut Editor, s: &'a str) -> Result<(Range, &'a str)> {
        let last = ed.last_line(self.sid)?;
        let current = ed.screen(self.sid).cursor.lno.min(last);
        let s = s.trim_start();

        if let Some(rest) = s.strip_prefix('%') {
            let range = Range {
                from: last.min(1),
                to: last,
                given: 2,
            };
            return Ok((range, rest));
        }

        let (first, rest) = self.parse_address(ed, s, current, last)?;
        let rest = rest.trim_start();
        match rest.strip_prefix(',') {
            Some(after) => {
                let from = first.unwrap_or(current);
                let (second, rest) = self.parse_address(ed, after, current, last)?;
                let range = Range {
                    from,
                    to: second.unwrap_or(current),
                    given: 2,
                };
                Ok((range, rest))
            }
            None => {
                let lno = first.unwrap_or(current);
                let range = Range {
                    from: lno,
                    to: lno,
                    given: usize::from(first.is_some()),
                };
                Ok((range, rest))
            }
        }
    }

    /// One address: a number, `.`, `$` or `'x`, followed by any number of
    /// `+N`/`-N` offsets. A bare offset is relative to the current line.
    fn parse_address<'a>(
        &self,
        ed: &mut Editor,
        s: &'a str,
        current: Recno,
        last: Recno,
    ) -> Result<(Option<Recno>, &'a str)> {
        let s = s.trim_start();
        let (mut lno, mut rest) = match s.chars().next() {
            Some(c) if c.is_ascii_digit() => {
                let (n, rest) = leading_number(s)?;
                (Some(n), rest)
            }
            Some('.') => (Some(current), &s[1..]),
            Some('$') => (Some(last), &s[1..]),
            Some('\'') => {
                let ch = s[1..]
                    .chars()
                    .next()
                    .ok_or_else(|| command_error("No mark name supplied"))?;
                let mark = ed.session(self.sid)?.marks().get(ch)?;
                (Some(mark.lno), &s[1 + ch.len_utf8()..])
            }
            _ => (None, s),
        };

        loop {
            let forward = match rest.chars().next() {
                Some('+') => true,
                Some('-') => false,
                _ => break,
            };
            let (n, after) = if rest[1..].starts_with(|c: char| c.is_ascii_digit()) {
                leading_number(&rest[1..])?
            } else {
                (1, &rest[1..])
            };
            rest = after;
            let base = lno.unwrap_or(current);
            lno = Some(if forward {
                base + n
            } else {
                base.checked_sub(n)
                    .ok_or_else(|| command_error("Reference to a line number less than 0"))?
            });
        }
        Ok((lno, rest))
    }

    fn goto(&mut self, ed: &mut Editor, lno: Recno) -> Result<()> {
        let range = Range {
            from: lno,
            to: lno,
            given: 1,
        };
        self.print(ed, range)?;
        let cno = ed.nonblank(self.sid, lno)?;
        ed.screen_mut(self.sid).cursor = Mark::new(lno, cno);
        Ok(())
    }

    fn print(&mut self, ed: &mut Editor, range: Range) -> Result<()> {
        for lno in range.from..=range.to {
            let line = ed
                .get_line(self.sid, lno, GetFlags::FATAL)?
                .ok_or(Error::LineNotFound(lno))?;
            self.output.push(String::from_utf8_lossy(line).into_owned());
        }
        ed.screen_mut(self.sid).cursor = Mark::new(range.to, 0);
        Ok(())
    }

    fn start_text(&mut self, ed: &mut Editor, before: Recno) -> Result<()> {
        ed.start_insert(self.sid, before)?;
        self.input = Some(0);
        Ok(())
    }

    /// Run `f` as one logical change, unless a global command already
    /// opened one.
    fn change<T>(&self, ed: &mut Editor, f: impl FnOnce(&mut Editor) -> Result<T>) -> Result<T> {
        if self.in_global {
            return f(ed);
        }
        ed.begin_change(self.sid)?;
        let result = f(ed);
        ed.end_change(self.sid)?;
        result
    }

    fn delete(&mut self, ed: &mut Editor, range: Range, name: Option<char>) -> Result<()> {
        let sid = self.sid;
        let (from, to) = (Mark::new(range.from, 0), Mark::new(range.to, 0));
        ed.cut(sid, name, from, to, CutFlags::LINEMODE | CutFlags::NUMOPT)?;

        self.change(ed, |ed| {
            for _ in range.from..=range.to {
                ed.delete_line(sid, range.from)?;
            }
            let lno = range.from.min(ed.last_line(sid)?);
            let cursor = match lno {
                0 => Mark::new(1, 0),
                lno => Mark::new(lno, ed.nonblank(sid, lno)?),
            };
            ed.screen_mut(sid).cursor = cursor;
            Ok(())
        })?;

        let count = range.to - range.from + 1;
        if count >= REPORT {
            ed.msgq(MsgType::Info, format!("{count} fewer lines"));
        }
        Ok(())
    }

    fn yank(&mut self, ed: &mut Editor, range: Range, name: Option<char>) -> Result<()> {
        let (from, to) = (Mark::new(range.from, 0), Mark::new(range.to, 0));
        ed.cut(self.sid, name, from, to, CutFlags::LINEMODE)?;
        let count = range.to - range.from + 1;
        if count >= REPORT {
            ed.msgq(MsgType::Info, format!("{count} lines yanked"));
        }
        Ok(())
    }

    fn put(&mut self, ed: &mut Editor, after: Recno, name: Option<char>) -> Result<()> {
        let sid = self.sid;
        self.change(ed, |ed| {
            let cursor = ed.put(sid, name, Mark::new(after, 0), true, 1)?;
            ed.screen_mut(sid).cursor = cursor;
            Ok(())
        })
    }

    fn mark(&mut self, ed: &mut Editor, lno: Recno, args: &str) -> Result<()> {
        let mut chars = args.chars();
        let ch = match (chars.next(), chars.next()) {
            (Some(ch), None) => ch,
            (None, _) => return Err(command_error("No mark name supplied")),
            (Some(_), Some(_)) => return Err(command_error("Mark names must be a single character")),
        };
        if !ch.is_ascii_lowercase() {
            return Err(Error::InvalidMark(ch));
        }
        ed.session_mut(self.sid)?
            .marks_mut()
            .set(MarkId::User(ch), Mark::new(lno, 0));
        Ok(())
    }

    fn marks(&mut self, ed: &mut Editor) -> Result<()> {
        let marks = ed.session(self.sid)?.marks().list();
        if marks.is_empty() {
            ed.msgq(MsgType::Info, "No marks set");
            return Ok(());
        }
        self.output.push("mark   line  col".to_string());
        for (ch, mark) in marks {
            self.output.push(format!(" {ch}   {:>6} {:>4}", mark.lno, mark.cno));
        }
        Ok(())
    }

    fn display(&mut self, ed: &mut Editor, args: &str) -> Result<()> {
        if args.is_empty() || !"buffers".starts_with(args) {
            return Err(command_error("Usage: display b[uffers]"));
        }
        let lines = ed.cut_buffers().display();
        if lines.is_empty() {
            ed.msgq(MsgType::Info, "No cut buffers to display");
        }
        self.output.extend(lines);
        Ok(())
    }

    /// `g/re/cmd` and `v/re/cmd`. Matching lines are bookmarked first so
    /// the command sees them at their current position as earlier runs
    /// add and remove lines. The whole run is one change.
    fn global(&mut self, ed: &mut Editor, range: Range, invert: bool, args: &str) -> Result<()> {
        let sid = self.sid;
        let (pattern, command) = split_global(args)?;
        if pattern.is_empty() {
            return Err(command_error("No previous regular expression"));
        }
        let re = Regex::new(&pattern).map_err(|e| command_error(e.to_string()))?;
        let command = if command.trim().is_empty() { "p" } else { command };

        let mut matched = 0;
        for lno in range.from.max(1)..=range.to {
            let line = ed
                .get_line(sid, lno, GetFlags::FATAL)?
                .ok_or(Error::LineNotFound(lno))?;
            if re.is_match(line) != invert {
                ed.session_mut(sid)?
                    .marks_mut()
                    .set(MarkId::Global(matched), Mark::new(lno, 0));
                matched += 1;
            }
        }
        debug!(pattern = %pattern, invert, matched, "global");
        if matched == 0 {
            ed.msgq(MsgType::Info, "No lines match the pattern");
            return Ok(());
        }

        ed.begin_change(sid)?;
        self.in_global = true;
        let mut result = Ok(());
        for i in 0..matched {
            let events = ed.poll_events();
            if events.contains(Events::INTERRUPT) {
                ed.raise(events - Events::INTERRUPT);
                ed.msgq(MsgType::Info, "Interrupted");
                break;
            }
            ed.raise(events);
            let Some(mark) = ed.session(sid)?.marks().position(MarkId::Global(i)) else {
                continue;
            };
            ed.screen_mut(sid).cursor = Mark::new(mark.lno, 0);
            if let Err(e) = self.execute(ed, command) {
                result = Err(e);
                break;
            }
        }
        self.in_global = false;
        ed.session_mut(sid)?.marks_mut().clear_global();
        ed.end_change(sid)?;
        result
    }
}

/// Split the command name off the front: a run of letters, or `=`.
fn split_name(s: &str) -> (&str, &str) {
    if let Some(rest) = s.strip_prefix('=') {
        return ("=", rest);
    }
    let end = s
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    s.split_at(end)
}

fn leading_number(s: &str) -> Result<(Recno, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let n = s[..end]
        .parse::<Recno>()
        .map_err(|_| command_error("Address value overflow"))?;
    Ok((n, &s[end..]))
}

/// A cut buffer argument: empty, or one letter or digit 1-9.
fn parse_buffer(args: &str) -> Result<Option<char>> {
    let mut chars = args.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(None),
        (Some(ch), None) if ch.is_ascii_alphabetic() || ('1'..='9').contains(&ch) => Ok(Some(ch)),
        _ => Err(command_error(format!("Invalid buffer name: {args}"))),
    }
}

/// Split `/re/cmd` into the pattern, with escaped delimiters unescaped,
/// and the command.
fn split_global(args: &str) -> Result<(String, &str)> {
    let mut chars = args.char_indices();
    let delim = match chars.next() {
        Some((_, c)) if !c.is_alphanumeric() && c != '\\' && !c.is_whitespace() => c,
        _ => {
            return Err(command_error(
                "Regular expression must be delimited by a non-alphanumeric character",
            ));
        }
    };

    let mut pattern = String::new();
    while let Some((i, c)) = chars.next() {
        if c == delim {
            return Ok((pattern, &args[i + c.len_utf8()..]));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, next)) if next == delim => pattern.push(next),
                Some((_, next)) => {
                    pattern.push('\\');
                    pattern.push(next);
                }
                None => pattern.push('\\'),
            }
            continue;
        }
        pattern.push(c);
    }
    Ok((pattern, ""))
}
