//! Error types for vi-db.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::store::{Recno, StoreError};

/// Result type alias for editor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for editor operations.
///
/// Nothing here is fatal on its own; the command layer decides whether a
/// failure ends the session.
#[derive(Debug, Error)]
pub enum Error {
    /// The screen has no file session behind it.
    #[error("No file loaded yet")]
    NoFile,

    /// A line that should exist could not be retrieved.
    #[error("Error: unable to retrieve line {0}")]
    LineNotFound(Recno),

    /// The record store failed while touching a line.
    #[error("line {line}: {source}")]
    Store {
        line: Recno,
        #[source]
        source: StoreError,
    },

    /// Put with no buffer named and nothing cut yet.
    #[error("The default buffer is empty")]
    DefaultBufferEmpty,

    /// Put from a named buffer that holds nothing.
    #[error("Buffer {0} is empty")]
    BufferEmpty(char),

    #[error("Mark {0}: not set")]
    MarkNotSet(char),

    #[error("Mark {0}: the line was deleted")]
    MarkDeleted(char),

    #[error("Invalid mark name: {0}")]
    InvalidMark(char),

    #[error("No changes to undo")]
    NothingToUndo,

    #[error("No changes to redo")]
    NothingToRedo,

    /// Recovery was never possible or was lost earlier in the session.
    #[error("Modifications not recoverable if the session fails")]
    RecoveryDisabled,

    /// A crash-mail file whose two leading headers are missing or broken.
    #[error("{}: malformed recovery file", .0.display())]
    MalformedRecovery(PathBuf),

    #[error("No files named {0}, readable by you, to recover")]
    NoRecoveryFile(String),

    /// A command the line editor could not parse or run.
    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn store(line: Recno, source: StoreError) -> Self {
        Self::Store { line, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::LineNotFound(12).to_string(),
            "Error: unable to retrieve line 12"
        );
        assert_eq!(Error::BufferEmpty('a').to_string(), "Buffer a is empty");

        let err = Error::MalformedRecovery(PathBuf::from("/tmp/recover.abc"));
        assert!(err.to_string().contains("malformed recovery file"));
    }

    #[test]
    fn test_store_error_keeps_line() {
        let err = Error::store(7, StoreError::NotFound(7));
        assert!(err.to_string().starts_with("line 7"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
