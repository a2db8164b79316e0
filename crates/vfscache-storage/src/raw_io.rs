//! Positioned read-only file access
//!
//! Reads never move a shared cursor, so one `RawFile` can serve any number
//! of threads at once.

use bytes::Bytes;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use vfscache_common::{Error, Result};

/// Wrap an I/O error with the path it happened on
pub(crate) fn io_error(path: &Path, action: &str, err: &io::Error) -> Error {
    Error::Io(io::Error::new(
        err.kind(),
        format!("failed to {action} {}: {err}", path.display()),
    ))
}

/// Read-only file handle with positioned reads
#[derive(Debug)]
pub struct RawFile {
    file: File,
    path: PathBuf,
    size: u64,
}

impl RawFile {
    /// Open a file for positioned reads
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| io_error(&path, "open", &e))?;
        let size = file
            .metadata()
            .map_err(|e| io_error(&path, "stat", &e))?
            .len();

        Ok(Self { file, path, size })
    }

    /// Get the file size
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `len` bytes starting at `offset`
    ///
    /// A range past the end of the file is corruption of whoever pointed here.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        let end = offset.checked_add(len as u64);
        if end.is_none_or(|end| end > self.size) {
            return Err(Error::corrupt(format!(
                "read of {len} bytes at {offset} exceeds {} ({} bytes)",
                self.path.display(),
                self.size
            )));
        }

        let mut buf = vec![0u8; len];
        self.read_exact_at(&mut buf, offset)
            .map_err(|e| io_error(&self.path, "read", &e))?;
        Ok(Bytes::from(buf))
    }

    /// Read the whole file into memory
    pub fn read_all(&self) -> Result<Bytes> {
        let len = usize::try_from(self.size).map_err(|_| {
            Error::corrupt(format!("{} is too large to load", self.path.display()))
        })?;
        self.read_at(0, len)
    }

    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match self.file.seek_read(buf, offset) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
