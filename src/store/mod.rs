/// Record store subsystem - Ordered line records keyed by line number
///
/// The editor core only talks to storage through the `RecordStore` trait:
/// get, put before/after/replace, delete, last and sync. `RecordFile` is the
/// concrete store, an in-memory record vector synced to a backing file.

pub mod record_file;

use std::io;

use thiserror::Error;

pub use record_file::RecordFile;

/// A 1-based line number.
pub type Recno = usize;

/// Out-of-band line number: "no such line".
pub const OOBLNO: Recno = 0;

/// Where `put` places the record relative to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    Replace,
    Before,
    After,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} does not exist")]
    NotFound(Recno),

    #[error("corrupt record file: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Ordered key to bytes store keyed by line number.
pub trait RecordStore {
    /// Fetch a record; `Ok(None)` when the line does not exist.
    fn get(&self, lno: Recno) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&mut self, lno: Recno, data: &[u8], mode: PutMode) -> Result<(), StoreError>;

    fn delete(&mut self, lno: Recno) -> Result<(), StoreError>;

    /// The highest record, if any.
    fn last(&self) -> Result<Option<(Recno, Vec<u8>)>, StoreError>;

    /// Flush the records to the backing file.
    fn sync(&mut self) -> Result<(), StoreError>;
}
