use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::Result;
use crate::store::{IndexInput, IndexOutput, Tracked};

/// A flat namespace of write-once files.
pub trait Directory: Send + Sync {
    /// Create (or truncate) `name` for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>>;

    /// Open a closed file for reading.
    fn open_input(&self, name: &str) -> Result<IndexInput>;
}

// ── In-memory ──────────────────────────────────────────────────────────────

/// Heap-backed directory. Files become visible to `open_input` once their
/// output is closed. Clones share the same file map.
#[derive(Clone, Default)]
pub struct RamDirectory {
    files: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl RamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_names(&self) -> Vec<String> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = files.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn file_len(&self, name: &str) -> Option<u64> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.get(name).map(|b| b.len() as u64)
    }
}

impl Directory for RamDirectory {
    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        Ok(Box::new(RamOutput {
            name: name.to_string(),
            buf: Tracked::new(Vec::new()),
            files: self.files.clone(),
        }))
    }

    fn open_input(&self, name: &str) -> Result<IndexInput> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let data = files.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {name}"))
        })?;
        Ok(IndexInput::new(name, data))
    }
}

struct RamOutput {
    name: String,
    buf: Tracked<Vec<u8>>,
    files: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl Write for RamOutput {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl IndexOutput for RamOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_pointer(&self) -> u64 {
        self.buf.position()
    }

    fn checksum(&self) -> u64 {
        self.buf.digest()
    }

    fn close(self: Box<Self>) -> Result<()> {
        let RamOutput { name, buf, files } = *self;
        let mut files = files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(name, Bytes::from(buf.inner));
        Ok(())
    }
}

// ── Filesystem ─────────────────────────────────────────────────────────────

/// Directory of plain files under `root`. Inputs load the whole file.
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Directory for FsDirectory {
    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        let file = File::create(self.root.join(name))?;
        Ok(Box::new(FsOutput {
            name: name.to_string(),
            out: Tracked::new(BufWriter::new(file)),
        }))
    }

    fn open_input(&self, name: &str) -> Result<IndexInput> {
        let data = std::fs::read(self.root.join(name))?;
        Ok(IndexInput::new(name, Bytes::from(data)))
    }
}

struct FsOutput {
    name: String,
    out: Tracked<BufWriter<File>>,
}

impl Write for FsOutput {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.out.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl IndexOutput for FsOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_pointer(&self) -> u64 {
        self.out.position()
    }

    fn checksum(&self) -> u64 {
        self.out.digest()
    }

    fn close(self: Box<Self>) -> Result<()> {
        let file = self.out.inner.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}
