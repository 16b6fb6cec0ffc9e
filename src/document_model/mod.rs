/// Document model subsystem - the file/buffer core
///
/// File sessions and their screens, line access through the cache, the
/// change log, marks, cut buffers and put.

pub mod exf;
pub mod line;
pub mod marks;
pub mod put;
pub mod registers;
pub mod screen;
pub mod text;
pub mod undo;

// Re-export main types for convenience
pub use exf::{FileSession, SessionFlags};
pub use line::GetFlags;
pub use marks::{Mark, MarkId, MarkTable};
pub use registers::{CutBuffer, CutBuffers, CutFlags};
pub use screen::{Damage, LineOp, Screen, ScreenMode, ScreenObserver};
pub use text::{Text, TextInput};
pub use undo::{ChangeGroup, ChangeLog, LogEntry};
