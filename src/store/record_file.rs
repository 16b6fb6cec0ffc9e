use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::{PutMode, Recno, RecordStore, StoreError};

const MAGIC: &[u8; 5] = b"VIDB\x01";

/// In-memory line records with an optional on-disk backing file.
///
/// The backing file uses a length-prefixed record format so it can be read
/// back without knowing the original text's line endings.
#[derive(Debug, Default)]
pub struct RecordFile {
    records: Vec<Vec<u8>>,
    backing: Option<PathBuf>,
}

impl RecordFile {
    pub fn new(backing: Option<PathBuf>) -> Self {
        Self {
            records: Vec::new(),
            backing,
        }
    }

    /// Split text into records on `\n`. A trailing newline does not make an
    /// extra empty record.
    pub fn from_bytes(text: &[u8], backing: Option<PathBuf>) -> Self {
        let mut records: Vec<Vec<u8>> = text.split(|&b| b == b'\n').map(<[u8]>::to_vec).collect();
        if text.is_empty() || text.ends_with(b"\n") {
            records.pop();
        }
        Self { records, backing }
    }

    /// Load a text file. A missing file is an empty store, not an error.
    pub fn from_text(source: &Path, backing: Option<PathBuf>) -> Result<Self, StoreError> {
        match fs::read(source) {
            Ok(text) => {
                debug!(file = %source.display(), bytes = text.len(), "loaded text");
                Ok(Self::from_bytes(&text, backing))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new(backing)),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-open a snapshot previously written by `sync`. The snapshot becomes
    /// the backing file again.
    pub fn open_snapshot(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path)?;
        let records = Self::decode(&bytes)?;
        debug!(snapshot = %path.display(), records = records.len(), "opened snapshot");
        Ok(Self {
            records,
            backing: Some(path.to_path_buf()),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn backing_path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    pub fn encode(&self) -> Vec<u8> {
        let size = self.records.iter().map(|r| r.len() + 4).sum::<usize>();
        let mut out = Vec::with_capacity(MAGIC.len() + size);
        out.extend_from_slice(MAGIC);
        for record in &self.records {
            out.extend_from_slice(&(record.len() as u32).to_le_bytes());
            out.extend_from_slice(record);
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut rest = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| StoreError::Corrupt("bad magic".to_string()))?;
        let mut records = Vec::new();
        while !rest.is_empty() {
            if rest.len() < 4 {
                return Err(StoreError::Corrupt("truncated length".to_string()));
            }
            let (len, tail) = rest.split_at(4);
            let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
            if tail.len() < len {
                return Err(StoreError::Corrupt(format!(
                    "record {} truncated",
                    records.len() + 1
                )));
            }
            let (record, tail) = tail.split_at(len);
            records.push(record.to_vec());
            rest = tail;
        }
        Ok(records)
    }

    fn index(&self, lno: Recno) -> Option<usize> {
        (lno >= 1 && lno <= self.records.len()).then(|| lno - 1)
    }
}

impl RecordStore for RecordFile {
    fn get(&self, lno: Recno) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.index(lno).map(|i| self.records[i].clone()))
    }

    fn put(&mut self, lno: Recno, data: &[u8], mode: PutMode) -> Result<(), StoreError> {
        let n = self.records.len();
        match mode {
            PutMode::Replace if lno >= 1 && lno <= n => self.records[lno - 1] = data.to_vec(),
            // Storing one past the end creates the record.
            PutMode::Replace if lno == n + 1 => self.records.push(data.to_vec()),
            PutMode::Before if lno >= 1 && lno <= n + 1 => {
                self.records.insert(lno - 1, data.to_vec());
            }
            PutMode::After if lno <= n => self.records.insert(lno, data.to_vec()),
            _ => return Err(StoreError::NotFound(lno)),
        }
        trace!(lno, ?mode, "put record");
        Ok(())
    }

    fn delete(&mut self, lno: Recno) -> Result<(), StoreError> {
        let i = self.index(lno).ok_or(StoreError::NotFound(lno))?;
        self.records.remove(i);
        Ok(())
    }

    fn last(&self) -> Result<Option<(Recno, Vec<u8>)>, StoreError> {
        Ok(self
            .records
            .last()
            .map(|line| (self.records.len(), line.clone())))
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        let Some(path) = self.backing.as_ref() else {
            return Ok(());
        };
        // Truncate in place so the permission bits set by recovery survive.
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut out = BufWriter::new(&file);
        out.write_all(&self.encode())?;
        out.flush()?;
        drop(out);
        file.sync_all()?;
        debug!(backing = %path.display(), records = self.records.len(), "synced backing store");
        Ok(())
    }
}

/// Write records out as newline-terminated text. Returns bytes written.
pub fn write_lines<'a, I>(path: &Path, lines: I) -> io::Result<usize>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    let mut written = 0;
    for line in lines {
        out.write_all(line)?;
        out.write_all(b"\n")?;
        written += line.len() + 1;
    }
    out.flush()?;
    Ok(written)
}
