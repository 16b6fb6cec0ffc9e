use crate::store::Recno;

/// One owned line fragment, used by cut buffers and pending input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Text {
    /// Line number the text belongs to while it is pending input.
    pub lno: Recno,
    pub lb: Vec<u8>,
}

impl Text {
    pub fn new(lb: impl Into<Vec<u8>>) -> Self {
        Self { lno: 0, lb: lb.into() }
    }

    pub fn at(lno: Recno, lb: impl Into<Vec<u8>>) -> Self {
        Self { lno, lb: lb.into() }
    }

    pub fn len(&self) -> usize {
        self.lb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lb.is_empty()
    }
}

/// Multi-line input typed on a screen but not yet committed to the file.
///
/// The lines are numbered consecutively starting at `lno`, so line lookups
/// can see them before they reach the store. Input either stands in for
/// the file line it started on or goes in before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInput {
    lines: Vec<Text>,
    replaces: bool,
}

impl TextInput {
    /// Start input over line `lno` with one empty line.
    pub fn new(lno: Recno) -> Self {
        Self {
            lines: vec![Text::at(lno, Vec::new())],
            replaces: true,
        }
    }

    /// Start input of new lines before file line `lno`.
    pub fn inserting(lno: Recno) -> Self {
        Self {
            replaces: false,
            ..Self::new(lno)
        }
    }

    /// Whether the first input line stands in for an existing file line.
    pub fn replaces(&self) -> bool {
        self.replaces
    }

    pub fn first_lno(&self) -> Recno {
        self.lines[0].lno
    }

    pub fn last_lno(&self) -> Recno {
        self.lines[self.lines.len() - 1].lno
    }

    /// Lines the input adds to the file as the screen sees it.
    pub fn extra_lines(&self) -> Recno {
        let added = self.last_lno() - self.first_lno();
        if self.replaces { added } else { added + 1 }
    }

    pub fn contains(&self, lno: Recno) -> bool {
        self.first_lno() <= lno && lno <= self.last_lno()
    }

    pub fn get(&self, lno: Recno) -> Option<&[u8]> {
        self.lines
            .iter()
            .find(|tp| tp.lno == lno)
            .map(|tp| tp.lb.as_slice())
    }

    /// Replace the text of the line currently being typed.
    pub fn set_current(&mut self, text: impl Into<Vec<u8>>) {
        let last = self.lines.len() - 1;
        self.lines[last].lb = text.into();
    }

    /// Finish the current line and start a new empty one after it.
    pub fn newline(&mut self) {
        let lno = self.last_lno() + 1;
        self.lines.push(Text::at(lno, Vec::new()));
    }

    pub fn lines(&self) -> &[Text] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<Text> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_numbering() {
        let mut input = TextInput::new(4);
        input.set_current("first");
        input.newline();
        input.set_current("second");
        input.newline();

        assert_eq!(input.first_lno(), 4);
        assert_eq!(input.last_lno(), 6);
        assert_eq!(input.extra_lines(), 2);
        assert!(input.contains(5));
        assert!(!input.contains(7));
        assert_eq!(input.get(5), Some(b"second".as_slice()));
        assert_eq!(input.get(6), Some(b"".as_slice()));
    }

    #[test]
    fn test_inserting_input_adds_every_line() {
        let mut input = TextInput::inserting(3);
        input.set_current("new");
        assert!(!input.replaces());
        assert_eq!(input.extra_lines(), 1);
        input.newline();
        assert_eq!(input.extra_lines(), 2);
        assert!(input.contains(4));
    }

    #[test]
    fn test_text_len() {
        let tp = Text::new("abc");
        assert_eq!(tp.len(), 3);
        assert!(!tp.is_empty());
        assert!(Text::default().is_empty());
    }
}
