use super::marks::Mark;
use super::text::TextInput;
use crate::error::Result;
use crate::store::Recno;

/// What happened to a line, as reported to screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    Append,
    Delete,
    Insert,
    Reset,
}

/// Hook for whatever draws a screen. Called once per committed mutation for
/// every screen backed by the changed file.
pub trait ScreenObserver {
    fn line_changed(&mut self, lno: Recno, op: LineOp) -> Result<()>;
}

/// Which command surface a screen is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenMode {
    /// Line editor; nothing to redraw.
    #[default]
    Ex,
    /// Full-screen editor.
    Vi,
}

/// Lines a screen must redraw, in the order the changes arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Damage {
    changes: Vec<(Recno, LineOp)>,
}

impl Damage {
    pub fn push(&mut self, lno: Recno, op: LineOp) {
        self.changes.push((lno, op));
    }

    pub fn changes(&self) -> &[(Recno, LineOp)] {
        &self.changes
    }

    /// Lowest line touched since the last redraw.
    pub fn first_line(&self) -> Option<Recno> {
        self.changes.iter().map(|(lno, _)| *lno).min()
    }

    pub fn take(&mut self) -> Vec<(Recno, LineOp)> {
        std::mem::take(&mut self.changes)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// One view onto a file session.
pub struct Screen {
    pub(crate) file: Option<usize>,
    pub mode: ScreenMode,
    pub cursor: Mark,
    /// Pending multi-line input, not yet in the file.
    pub(crate) tinput: Option<TextInput>,
    pub(crate) damage: Damage,
    pub(crate) observer: Option<Box<dyn ScreenObserver>>,
    /// Set when a recovery sync asked for the session to end.
    pub exit_force: bool,
}

impl Screen {
    pub(crate) fn new(file: Option<usize>, mode: ScreenMode) -> Self {
        Self {
            file,
            mode,
            cursor: Mark::new(1, 0),
            tinput: None,
            damage: Damage::default(),
            observer: None,
            exit_force: false,
        }
    }

    pub fn damage(&self) -> &Damage {
        &self.damage
    }

    pub fn take_damage(&mut self) -> Vec<(Recno, LineOp)> {
        self.damage.take()
    }

    pub fn set_observer(&mut self, observer: Box<dyn ScreenObserver>) {
        self.observer = Some(observer);
    }

    pub fn input(&self) -> Option<&TextInput> {
        self.tinput.as_ref()
    }

    /// Record a change to the file this screen shows.
    pub(crate) fn change(&mut self, lno: Recno, op: LineOp) -> Result<()> {
        self.damage.push(lno, op);
        match self.observer.as_mut() {
            Some(observer) => observer.line_changed(lno, op),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screen")
            .field("file", &self.file)
            .field("mode", &self.mode)
            .field("cursor", &self.cursor)
            .field("tinput", &self.tinput)
            .field("damage", &self.damage)
            .finish_non_exhaustive()
    }
}
