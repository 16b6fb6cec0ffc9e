//! Advisory whole-file locks.
//!
//! A live session holds an exclusive `flock` on its crash-mail file. The
//! lock belongs to the open file description, so it lasts exactly as long
//! as the session keeps the file open, and a second open of the same file,
//! even in the same process, sees it as taken.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;

/// Outcome of a non-blocking lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// The lock is ours.
    Success,
    /// Someone else holds it.
    Unavailable,
    /// The filesystem does not support locking, or the call failed.
    Failed,
}

/// Try to take an exclusive lock on `file` without blocking.
pub fn try_lock(file: &File) -> LockStatus {
    // SAFETY: flock only reads the descriptor, which `file` keeps open
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return LockStatus::Success;
    }
    match io::Error::last_os_error().raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => LockStatus::Unavailable,
        _ => LockStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_open_sees_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recover.test");
        let first = File::create(&path).unwrap();
        assert_eq!(try_lock(&first), LockStatus::Success);

        let second = File::open(&path).unwrap();
        assert_eq!(try_lock(&second), LockStatus::Unavailable);

        drop(first);
        assert_eq!(try_lock(&second), LockStatus::Success);
    }

    #[test]
    fn test_relock_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("x")).unwrap();
        assert_eq!(try_lock(&file), LockStatus::Success);
        assert_eq!(try_lock(&file), LockStatus::Success);
    }
}
