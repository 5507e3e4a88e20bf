//! Column file store
//!
//! A single file holding one `f64` column, written with positional IO so a
//! batch can land anywhere in the column without reading or rewriting the rest.
//!
//! # File Format
//!
//! ```text
//! offset  size  field
//!      0     6  magic "GWCOL\0"
//!      6     2  format version (u16 LE)
//!      8     8  number of values (u64 LE)
//!     16     8  sentinel bit pattern (u64 LE)
//!     24     8  reserved, zero
//!     32   8*n  values (f64 LE)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gatherwrite::store::OutputStore;
//! use gatherwrite::store::file::ColumnFile;
//! use std::path::Path;
//!
//! let mut store = ColumnFile::create(Path::new("/tmp/out.col"), 1024, f64::NAN)?;
//! store.write_slice(&[0, 1, 2], &[0.0, 0.5, 1.0])?;
//! store.close()?;
//!
//! let reader = ColumnFile::open_read(Path::new("/tmp/out.col"))?;
//! assert_eq!(reader.len(), 1024);
//! # Ok::<(), anyhow::Error>(())
//! ```

use super::{contiguous_runs, OutputStore};
use crate::Result;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 6] = b"GWCOL\0";
const FORMAT_VERSION: u16 = 1;
const VALUE_SIZE: u64 = 8;

/// Size of the file header in bytes
pub const HEADER_LEN: u64 = 32;

/// Values written per chunk while filling a new file with the sentinel
const FILL_CHUNK: usize = 64 * 1024;

/// Single-column file store
#[derive(Debug)]
pub struct ColumnFile {
    path: PathBuf,
    file: Option<File>,
    len: u64,
    sentinel: f64,
    writable: bool,
}

impl ColumnFile {
    /// Create (or replace) a column file with `len` sentinel values
    ///
    /// The fill is streamed in chunks, so the column never has to fit in memory.
    pub fn create(path: &Path, len: u64, sentinel: f64) -> Result<Self> {
        let total_size = file_size_for(len)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create column file: {}", path.display()))?;

        preallocate(&file, total_size)
            .with_context(|| format!("Failed to allocate {} bytes for {}", total_size, path.display()))?;

        file.write_all(&encode_header(len, sentinel))
            .with_context(|| format!("Failed to write header: {}", path.display()))?;

        let chunk: Vec<u8> = std::iter::repeat(sentinel.to_le_bytes())
            .take(FILL_CHUNK)
            .flatten()
            .collect();
        let mut remaining = len;
        while remaining > 0 {
            let count = remaining.min(FILL_CHUNK as u64) as usize;
            file.write_all(&chunk[..count * VALUE_SIZE as usize])
                .with_context(|| format!("Failed to fill column file: {}", path.display()))?;
            remaining -= count as u64;
        }

        file.sync_all()
            .with_context(|| format!("Failed to sync column file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), len, "column file created");

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            len,
            sentinel,
            writable: true,
        })
    }

    /// Open an existing column file for positional writes
    pub fn open_for_update(path: &Path) -> Result<Self> {
        Self::open(path, true)
    }

    /// Open an existing column file read-only
    pub fn open_read(path: &Path) -> Result<Self> {
        Self::open(path, false)
    }

    fn open(path: &Path, writable: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .with_context(|| format!("Failed to open column file: {}", path.display()))?;

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact_at(&mut header, 0)
            .with_context(|| format!("Failed to read header: {}", path.display()))?;
        let (len, sentinel) = decode_header(&header)
            .with_context(|| format!("Invalid column file: {}", path.display()))?;

        let actual_size = file
            .metadata()
            .with_context(|| format!("Failed to stat column file: {}", path.display()))?
            .len();
        let expected_size = file_size_for(len)
            .with_context(|| format!("Invalid column file: {}", path.display()))?;
        if actual_size < expected_size {
            anyhow::bail!(
                "column file {} is truncated: {} bytes, expected {}",
                path.display(),
                actual_size,
                expected_size
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            len,
            sentinel,
            writable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("column file is closed: {}", self.path.display()))
    }
}

impl OutputStore for ColumnFile {
    fn len(&self) -> u64 {
        self.len
    }

    fn sentinel(&self) -> f64 {
        self.sentinel
    }

    fn write_slice(&mut self, indices: &[u64], values: &[f64]) -> Result<()> {
        if !self.writable {
            anyhow::bail!("column file opened read-only: {}", self.path.display());
        }
        if indices.len() != values.len() {
            anyhow::bail!(
                "write_slice got {} indices and {} values",
                indices.len(),
                values.len()
            );
        }

        let file = self.file()?;
        for (start, run) in contiguous_runs(indices, values) {
            if start + run.len() as u64 > self.len {
                anyhow::bail!(
                    "write at [{}, {}) past end of column ({})",
                    start,
                    start + run.len() as u64,
                    self.len
                );
            }

            let buf: Vec<u8> = run.iter().flat_map(|v| v.to_le_bytes()).collect();
            file.write_all_at(&buf, HEADER_LEN + start * VALUE_SIZE)
                .with_context(|| {
                    format!("write at index {} failed: path={}", start, self.path.display())
                })?;
        }

        Ok(())
    }

    fn read_all(&self) -> Result<Vec<f64>> {
        let file = self.file()?;
        let bytes = usize::try_from(self.len * VALUE_SIZE)
            .with_context(|| format!("column too large to read into memory: {}", self.path.display()))?;
        let mut buf = vec![0u8; bytes];
        file.read_exact_at(&mut buf, HEADER_LEN)
            .with_context(|| format!("Failed to read values: {}", self.path.display()))?;

        Ok(buf
            .chunks_exact(VALUE_SIZE as usize)
            .map(|b| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(b);
                f64::from_le_bytes(bytes)
            })
            .collect())
    }

    fn flush(&mut self) -> Result<()> {
        if self.writable {
            self.file()?
                .sync_data()
                .with_context(|| format!("fsync failed: path={}", self.path.display()))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_some() {
            self.flush()?;
            self.file = None;
        }
        Ok(())
    }
}

impl Drop for ColumnFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Total file size for a column of `len` values
fn file_size_for(len: u64) -> Result<u64> {
    len.checked_mul(VALUE_SIZE)
        .and_then(|bytes| bytes.checked_add(HEADER_LEN))
        .ok_or_else(|| anyhow::anyhow!("invalid column length {}", len))
}

fn encode_header(len: u64, sentinel: f64) -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[0..6].copy_from_slice(MAGIC);
    header[6..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header[8..16].copy_from_slice(&len.to_le_bytes());
    header[16..24].copy_from_slice(&sentinel.to_bits().to_le_bytes());
    header
}

fn decode_header(header: &[u8; HEADER_LEN as usize]) -> Result<(u64, f64)> {
    if &header[0..6] != MAGIC {
        anyhow::bail!("bad magic");
    }

    let version = u16::from_le_bytes([header[6], header[7]]);
    if version != FORMAT_VERSION {
        anyhow::bail!("unsupported format version {}", version);
    }

    let mut word = [0u8; 8];
    word.copy_from_slice(&header[8..16]);
    let len = u64::from_le_bytes(word);
    word.copy_from_slice(&header[16..24]);
    let sentinel = f64::from_bits(u64::from_le_bytes(word));

    Ok((len, sentinel))
}

#[cfg(target_os = "linux")]
fn preallocate(file: &File, size: u64) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let result = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, size as libc::off_t) };
    match result {
        0 => Ok(()),
        // Filesystem without fallocate support; the sentinel fill extends the file anyway
        libc::EOPNOTSUPP | libc::EINVAL => Ok(()),
        errno => Err(std::io::Error::from_raw_os_error(errno)).context("posix_fallocate failed"),
    }
}

#[cfg(not(target_os = "linux"))]
fn preallocate(file: &File, size: u64) -> Result<()> {
    file.set_len(size).context("set_len failed")
}
