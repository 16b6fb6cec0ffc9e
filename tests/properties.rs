//! Editing properties checked through the public editor API.

use std::fs;

use tempfile::TempDir;
use vi_db::config::RcConfig;
use vi_db::document_model::{CutFlags, GetFlags, Mark, MarkId, ScreenMode};
use vi_db::{Editor, Error, ScreenId};

fn editor(text: &str) -> (Editor, ScreenId, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let recdir = dir.path().join("recover");
    fs::create_dir(&recdir).unwrap();
    let path = dir.path().join("file.txt");
    fs::write(&path, text).unwrap();

    let mut ed = Editor::new(RcConfig {
        recdir,
        secure: true,
        ..RcConfig::default()
    });
    let sid = ed.open_with_mode(&path, ScreenMode::Ex).unwrap();
    (ed, sid, dir)
}

fn lines(ed: &mut Editor, sid: ScreenId) -> Vec<String> {
    let last = ed.last_line(sid).unwrap();
    (1..=last)
        .map(|lno| {
            let line = ed.get_line(sid, lno, GetFlags::FATAL).unwrap().unwrap();
            String::from_utf8_lossy(line).into_owned()
        })
        .collect()
}

fn buffer(ed: &Editor, name: Option<char>) -> Vec<String> {
    ed.cut_buffers()
        .get(name)
        .map(|cb| {
            cb.text()
                .iter()
                .map(|tp| String::from_utf8_lossy(&tp.lb).into_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn delete_first_line(ed: &mut Editor, sid: ScreenId) {
    let first = Mark::new(1, 0);
    ed.cut(sid, None, first, first, CutFlags::LINEMODE | CutFlags::NUMOPT)
        .unwrap();
    ed.begin_change(sid).unwrap();
    ed.delete_line(sid, 1).unwrap();
    ed.end_change(sid).unwrap();
}

#[test]
fn undo_then_redo_is_an_inverse() {
    let (mut ed, sid, _dir) = editor("alpha\nbeta\ngamma\n");
    let initial = lines(&mut ed, sid);

    type Op = fn(&mut Editor, ScreenId) -> vi_db::Result<()>;
    let ops: [Op; 5] = [
        |ed, sid| ed.append_line(sid, 3, b"delta"),
        |ed, sid| ed.set_line(sid, 1, b"ALPHA"),
        |ed, sid| ed.delete_line(sid, 2),
        |ed, sid| ed.insert_line(sid, 1, b"zero"),
        |ed, sid| ed.append_line(sid, 0, b"minus one"),
    ];
    for op in ops {
        ed.begin_change(sid).unwrap();
        op(&mut ed, sid).unwrap();
        ed.end_change(sid).unwrap();
    }
    let edited = lines(&mut ed, sid);
    assert_eq!(edited, vec!["minus one", "zero", "ALPHA", "gamma", "delta"]);

    for _ in 0..ops.len() {
        ed.undo(sid).unwrap();
    }
    assert_eq!(lines(&mut ed, sid), initial);
    assert!(matches!(ed.undo(sid), Err(Error::NothingToUndo)));

    for _ in 0..ops.len() {
        ed.redo(sid).unwrap();
    }
    assert_eq!(lines(&mut ed, sid), edited);
    assert!(matches!(ed.redo(sid), Err(Error::NothingToRedo)));
}

#[test]
fn marks_shift_with_inserts_and_deletes() {
    let (mut ed, sid, _dir) = editor("1\n2\n3\n4\n5\n6\n");
    {
        let marks = ed.session_mut(sid).unwrap().marks_mut();
        marks.set(MarkId::User('a'), Mark::new(2, 1));
        marks.set(MarkId::User('b'), Mark::new(4, 0));
        marks.set(MarkId::User('c'), Mark::new(6, 0));
    }

    ed.insert_line(sid, 4, b"new").unwrap();
    let marks = ed.session(sid).unwrap().marks();
    assert_eq!(marks.get('a').unwrap(), Mark::new(2, 1));
    assert_eq!(marks.get('b').unwrap(), Mark::new(5, 0));
    assert_eq!(marks.get('c').unwrap(), Mark::new(7, 0));

    ed.delete_line(sid, 5).unwrap();
    let marks = ed.session(sid).unwrap().marks();
    assert_eq!(marks.get('a').unwrap().lno, 2);
    assert!(matches!(marks.get('b'), Err(Error::MarkDeleted('b'))));
    assert_eq!(marks.get('c').unwrap().lno, 6);
}

#[test]
fn numbered_buffers_form_a_ring() {
    let text: String = (1..=12).map(|i| format!("line {i}\n")).collect();
    let (mut ed, sid, _dir) = editor(&text);

    for _ in 0..9 {
        delete_first_line(&mut ed, sid);
    }
    assert_eq!(buffer(&ed, Some('9')), vec!["line 1"]);
    assert_eq!(buffer(&ed, Some('1')), vec!["line 9"]);
    assert_eq!(buffer(&ed, None), vec!["line 9"]);

    // The tenth deletion pushes the first one out of the ring.
    delete_first_line(&mut ed, sid);
    assert_eq!(buffer(&ed, Some('1')), vec!["line 10"]);
    assert_eq!(buffer(&ed, Some('9')), vec!["line 2"]);
    let held: Vec<String> = ('1'..='9').flat_map(|n| buffer(&ed, Some(n))).collect();
    assert!(!held.contains(&"line 1".to_string()));
}

#[test]
fn uppercase_name_appends() {
    let (mut ed, sid, _dir) = editor("first\nsecond\nthird\n");
    let line = |lno| (Mark::new(lno, 0), Mark::new(lno, 0));

    let (from, to) = line(1);
    ed.cut(sid, Some('a'), from, to, CutFlags::LINEMODE).unwrap();
    let (from, to) = line(2);
    ed.cut(sid, Some('A'), from, to, CutFlags::LINEMODE).unwrap();

    assert_eq!(buffer(&ed, Some('a')), vec!["first", "second"]);
    assert_eq!(buffer(&ed, None), vec!["second"]);
}

#[test]
fn yank_and_put_round_trip() {
    let (mut ed, sid, _dir) = editor("a\nb\nc\nd\ne\n");
    let (l, k) = (2, 3);
    let before = ed.last_line(sid).unwrap();

    ed.cut(sid, None, Mark::new(l, 0), Mark::new(l + k - 1, 0), CutFlags::LINEMODE)
        .unwrap();
    ed.begin_change(sid).unwrap();
    let cursor = ed.put(sid, None, Mark::new(l - 1, 0), true, 1).unwrap();
    ed.end_change(sid).unwrap();

    assert_eq!(cursor.lno, l);
    assert_eq!(ed.last_line(sid).unwrap(), before + k);
    assert_eq!(lines(&mut ed, sid), vec!["a", "b", "c", "d", "b", "c", "d", "e"]);
}

#[test]
fn put_into_empty_file_keeps_no_blank_line() {
    let (mut ed, sid, dir) = editor("x\ny\n");
    ed.cut(sid, None, Mark::new(1, 0), Mark::new(2, 0), CutFlags::LINEMODE)
        .unwrap();

    let empty = dir.path().join("empty.txt");
    let other = ed.open(&empty).unwrap();
    assert_eq!(ed.last_line(other).unwrap(), 0);
    assert!(ed.get_line_or_empty(other, 1).unwrap().is_none());

    ed.put(other, None, Mark::new(1, 0), true, 1).unwrap();
    assert_eq!(lines(&mut ed, other), vec!["x", "y"]);
}

#[test]
fn shared_session_sees_every_change() {
    let (mut ed, sid, _dir) = editor("one\n");
    let left = ed.split(sid, ScreenMode::Vi).unwrap();
    let right = ed.split(sid, ScreenMode::Vi).unwrap();
    ed.append_line(left, 1, b"two").unwrap();

    assert_eq!(lines(&mut ed, sid), vec!["one", "two"]);
    assert_eq!(ed.screen(left).damage().changes().len(), 1);
    assert_eq!(ed.screen(right).damage().changes().len(), 1);
    assert_eq!(ed.session(sid).unwrap().refcount(), 3);
}
