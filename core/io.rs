//! Backing files for spilled partitions.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::Result;

/// I/O buffer size for spill file reads and writes.
const SPILL_IO_BUFFER_SIZE: usize = 64 * 1024;

/// Hands out one exclusively-owned backing file per partition.
pub trait SpillFileAllocator {
    fn allocate(&self, partition_idx: usize) -> Result<SpillFile>;
}

/// A partition's backing file. The file exists from allocation until [`SpillFile::remove`].
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
    /// Keeps the directory the file lives in alive for as long as the file is.
    /// None if the allocator does not own its directory.
    _temp_dir: Option<Arc<tempfile::TempDir>>,
}

impl SpillFile {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: PathBuf) -> Result<Self> {
        Self::create_in(path, None)
    }

    fn create_in(path: PathBuf, temp_dir: Option<Arc<tempfile::TempDir>>) -> Result<Self> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        trace!("created spill file {}", path.display());
        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Opens an append-only handle positioned at the end of the file.
    pub fn open_writer(&self) -> Result<BufWriter<File>> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(BufWriter::with_capacity(SPILL_IO_BUFFER_SIZE, file))
    }

    /// Opens a sequential reader positioned at the start of the file.
    pub fn open_reader(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.path)?;
        Ok(BufReader::with_capacity(SPILL_IO_BUFFER_SIZE, file))
    }

    /// Deletes the file. Returns false if it was already gone.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                trace!("removed spill file {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Allocates spill files inside a private temporary directory. The directory is
/// deleted once the allocator and every file it handed out are dropped.
#[derive(Debug)]
pub struct TempDirAllocator {
    temp_dir: Arc<tempfile::TempDir>,
    next_file_id: AtomicUsize,
}

impl TempDirAllocator {
    /// Creates the directory under the system temporary directory.
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new().prefix("hashspill").tempdir()?;
        Ok(Self::from_temp_dir(temp_dir))
    }

    /// Creates the directory under `parent`.
    pub fn new_in(parent: impl AsRef<Path>) -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("hashspill")
            .tempdir_in(parent)?;
        Ok(Self::from_temp_dir(temp_dir))
    }

    fn from_temp_dir(temp_dir: tempfile::TempDir) -> Self {
        Self {
            temp_dir: Arc::new(temp_dir),
            next_file_id: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl SpillFileAllocator for TempDirAllocator {
    fn allocate(&self, partition_idx: usize) -> Result<SpillFile> {
        let file_id = self.next_file_id.fetch_add(1, Ordering::Relaxed);
        let path = self
            .temp_dir
            .path()
            .join(format!("partition_{partition_idx}_{file_id}.spill"));
        SpillFile::create_in(path, Some(self.temp_dir.clone()))
    }
}

impl<A: SpillFileAllocator + ?Sized> SpillFileAllocator for &A {
    fn allocate(&self, partition_idx: usize) -> Result<SpillFile> {
        (**self).allocate(partition_idx)
    }
}
