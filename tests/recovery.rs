//! Recovery directory behavior: orphans, live sessions, resume.

use std::fs::{self, File, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use vi_db::config::RcConfig;
use vi_db::document_model::{GetFlags, ScreenMode};
use vi_db::recover::SyncFlags;
use vi_db::store::RecordFile;
use vi_db::{Editor, Error, ScreenId};

fn recdir() -> (TempDir, RcConfig) {
    let dir = tempfile::tempdir().unwrap();
    let recdir = dir.path().join("recover");
    fs::create_dir(&recdir).unwrap();
    let config = RcConfig {
        recdir,
        secure: true,
        ..RcConfig::default()
    };
    (dir, config)
}

/// A crash-mail file naming `file` with a snapshot holding `text`.
fn crash_files(recdir: &Path, suffix: &str, file: &str, text: &[u8], mtime: SystemTime) -> PathBuf {
    let snapshot = recdir.join(format!("vi.{suffix}"));
    fs::write(&snapshot, RecordFile::from_bytes(text, None).encode()).unwrap();

    let mail = recdir.join(format!("recover.{suffix}"));
    fs::write(
        &mail,
        format!(
            "X-vi-recover-file: {file}\nX-vi-recover-path: {}\nTo: nobody\n\nsaved\n",
            snapshot.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&mail, Permissions::from_mode(0o600)).unwrap();
    File::options()
        .write(true)
        .open(&mail)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
    mail
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

#[test]
fn orphaned_mail_files_are_removed_not_listed() {
    let (_dir, config) = recdir();
    let recdir = config.recdir.clone();
    let mail = crash_files(&recdir, "orphan", "/tmp/gone.txt", b"x\n", SystemTime::now());
    fs::remove_file(recdir.join("vi.orphan")).unwrap();

    let mut ed = Editor::new(config);
    assert_eq!(ed.list_recovery().unwrap(), vec!["vi-db: No files to recover"]);
    assert!(!mail.exists());
}

#[test]
fn resume_picks_the_newest_snapshot() {
    let (_dir, config) = recdir();
    let recdir = config.recdir.clone();
    let now = SystemTime::now();
    let old = crash_files(&recdir, "older", "/home/u/notes.txt", b"old\n", now - Duration::from_secs(3600));
    let new = crash_files(&recdir, "newer", "/home/u/notes.txt", b"new\ntext\n", now);
    crash_files(&recdir, "other", "/home/u/other.txt", b"o\n", now);

    let mut ed = Editor::new(config);
    assert_eq!(ed.list_recovery().unwrap().len(), 3);

    let sid = ed.recover("/home/u/notes.txt", ScreenMode::Ex).unwrap();
    assert_eq!(lines(&mut ed, sid), vec!["new", "text"]);
    let ep = ed.session(sid).unwrap();
    assert!(ep.is_modified());
    assert!(ep.is_recoverable());
    assert_eq!(ep.mail_path(), Some(new.as_path()));

    let messages: Vec<String> = ed.take_messages().into_iter().map(|m| m.text).collect();
    assert!(messages.contains(&"There are older versions of this file for you to recover".to_string()));
    assert!(messages.contains(&"There are other files for you to recover".to_string()));

    // The resumed session holds its mail file; only the others are listed.
    let listed = ed.list_recovery().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|l| l.ends_with(": /home/u/notes.txt")));
    assert!(listed.iter().any(|l| l.ends_with(": /home/u/other.txt")));
    assert!(old.exists());
}

#[test]
fn unknown_file_is_reported() {
    let (_dir, config) = recdir();
    let mut ed = Editor::new(config);
    assert!(matches!(
        ed.recover("/nowhere.txt", ScreenMode::Ex),
        Err(Error::NoRecoveryFile(name)) if name == "/nowhere.txt"
    ));
}

#[test]
fn crashed_session_can_be_resumed() {
    let (dir, config) = recdir();
    let path = dir.path().join("draft.txt");
    fs::write(&path, "one\n").unwrap();

    let mut crashed = Editor::new(config.clone());
    let sid = crashed.open(&path).unwrap();
    crashed.append_line(sid, 1, b"two").unwrap();
    crashed.set_line(sid, 1, b"ONE").unwrap();
    crashed.sync(sid, SyncFlags::empty()).unwrap();

    // While the first session lives its files are locked and not listed.
    let mut survivor = Editor::new(config);
    assert_eq!(survivor.list_recovery().unwrap(), vec!["vi-db: No files to recover"]);

    // Dropping the editor without closing is a crash: the files stay, the
    // locks go.
    drop(crashed);
    let name = path.to_string_lossy().into_owned();
    let listed = survivor.list_recovery().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].ends_with(&format!(": {name}")));

    let sid = survivor.recover(&name, ScreenMode::Ex).unwrap();
    assert_eq!(lines(&mut survivor, sid), vec!["ONE", "two"]);

    // Writing and closing the resumed session cleans the recovery files.
    let snapshot = survivor.session(sid).unwrap().snapshot_path().unwrap().to_path_buf();
    survivor.write(sid, None).unwrap();
    survivor.close(sid).unwrap();
    assert!(!snapshot.exists());
    assert_eq!(fs::read_to_string(&path).unwrap(), "ONE\ntwo\n");
}
