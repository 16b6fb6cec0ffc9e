//! vi-db: the file and buffer core of a modal editor.
//!
//! Edited files live in a line-record store behind a read-through cache.
//! Every mutation is logged for undo, keeps marks in step, is announced to
//! the screens sharing the file and is backed by an on-disk recovery
//! snapshot with a crash-mail companion file.

pub mod config;
pub mod controller;
pub mod document_model;
pub mod editor;
pub mod error;
pub mod events;
pub mod recover;
pub mod store;

pub use editor::{Editor, Message, MsgType, ScreenId};
pub use error::{Error, Result};
