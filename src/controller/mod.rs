/// Controller subsystem - the line-editor command surface
///
/// Parses ex-style command lines and runs them against one screen of the
/// editor. A full-screen surface would sit beside it and share the same
/// editor through the `ScreenObserver` boundary.

pub mod command;

// Re-export public interface
pub use command::CommandController;
