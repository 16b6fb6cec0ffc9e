//! Crash-mail files: compose, wrap and parse.
//!
//! The first two lines name the edited file and its snapshot so a directory
//! scan can read them without touching the snapshot. The rest is an
//! ordinary mail message for `sendmail -t`.

use std::ffi::CStr;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const FILE_HEADER: &str = "X-vi-recover-file: ";
pub const PATH_HEADER: &str = "X-vi-recover-path: ";

/// Body lines are wrapped to this many display columns.
pub const MAIL_COLUMNS: usize = 60;

const PROGRAM: &str = env!("CARGO_PKG_NAME");

/// What goes into a crash-mail file.
#[derive(Debug, Clone)]
pub struct MailInfo<'a> {
    /// The edited file, as the user named it.
    pub file: &'a str,
    pub snapshot: &'a Path,
    pub user: &'a str,
    pub host: &'a str,
    pub when: DateTime<Local>,
}

/// Headers and wrapped body of a crash-mail file.
pub fn compose(info: &MailInfo<'_>) -> String {
    let base = info.file.rsplit('/').next().unwrap_or(info.file);
    let mut out = format!(
        "{FILE_HEADER}{}\n{PATH_HEADER}{}\nReply-To: root\nFrom: root ({PROGRAM} recovery program)\nTo: {}\nSubject: {PROGRAM} saved the file {}\nPrecedence: bulk\nAuto-Submitted: auto-generated\n\n",
        info.file,
        info.snapshot.display(),
        info.user,
        base,
    );
    let body = format!(
        "On {}, the user {} was editing a file named {} on the machine {}, when it was saved for recovery. You can recover most, if not all, of the changes to this file using the -r option to {PROGRAM}:\n\n\t{PROGRAM} -r {}\n\n",
        ctime(&info.when),
        info.user,
        info.file,
        info.host,
        info.file,
    );
    out.push_str(&wrap(&body, MAIL_COLUMNS));
    out
}

/// Break lines wider than `cols` at the last space that keeps them within
/// `cols`, or at the first space if there is none. Words longer than the
/// limit are left whole.
pub fn wrap(text: &str, cols: usize) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / cols.max(1));
    for line in text.lines() {
        let mut rest = line;
        while rest.width() > cols {
            let mut width = 0;
            let mut best = None;
            for (i, ch) in rest.char_indices() {
                if ch == ' ' {
                    if width <= cols || best.is_none() {
                        best = Some(i);
                    }
                    if width > cols {
                        break;
                    }
                }
                width += ch.width().unwrap_or(0);
            }
            let Some(at) = best else {
                break;
            };
            out.push_str(&rest[..at]);
            out.push('\n');
            rest = &rest[at + 1..];
        }
        out.push_str(rest);
        out.push('\n');
    }
    out
}

/// Read the two leading headers: the edited file name and the snapshot
/// path. `None` if either is missing or malformed.
pub fn parse_headers<R: BufRead>(mut reader: R) -> io::Result<Option<(String, PathBuf)>> {
    let Some(file) = read_header(&mut reader, FILE_HEADER)? else {
        return Ok(None);
    };
    let Some(path) = read_header(&mut reader, PATH_HEADER)? else {
        return Ok(None);
    };
    Ok(Some((file, PathBuf::from(path))))
}

fn read_header<R: BufRead>(reader: &mut R, header: &str) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let Some(value) = line.strip_prefix(header).and_then(|v| v.strip_suffix('\n')) else {
        return Ok(None);
    };
    Ok(Some(value.to_string()))
}

/// Date in the classic 24-column `ctime` layout.
pub fn ctime(when: &DateTime<Local>) -> String {
    when.format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Login name of the real user, or the uid when it has no passwd entry.
pub fn current_user() -> Result<String, u32> {
    // SAFETY: getuid has no preconditions
    let uid = unsafe { libc::getuid() };
    // SAFETY: getpwuid returns null or a pointer to static storage that stays
    // valid until the next getpw* call; the name is copied out before that
    let pw = unsafe { libc::getpwuid(uid) };
    if pw.is_null() {
        return Err(uid);
    }
    // SAFETY: pw is non-null and pw_name is a NUL-terminated string
    let name = unsafe { CStr::from_ptr((*pw).pw_name) };
    Ok(name.to_string_lossy().into_owned())
}

pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for buf.len() bytes
    let result = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if result != 0 {
        return String::from("localhost");
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
