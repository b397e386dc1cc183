use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::StoreError;

/// A read/write handle holding an exclusive advisory lock on its file.
///
/// The lock is `flock(LOCK_EX | LOCK_NB)`, owned by this open file
/// description: a second handle contends even inside the same process.
/// Dropping the handle releases the lock.
#[derive(Debug)]
pub struct ExclusiveFile {
    file: File,
    path: PathBuf,
}

impl ExclusiveFile {
    /// Opens an existing file and locks it without blocking.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| StoreError::io("opening context file", path, source))?;

        match try_flock_exclusive(&file) {
            Ok(true) => {
                trace!(path = %path.display(), "context lock acquired");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Ok(false) => Err(StoreError::LockContention {
                path: path.to_path_buf(),
            }),
            Err(source) => Err(StoreError::io("locking context file", path, source)),
        }
    }

    /// Reports whether some other handle currently holds the lock on `path`.
    /// A missing file is never held.
    pub fn is_held(path: &Path) -> io::Result<bool> {
        let file = match OpenOptions::new().read(true).open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(error),
        };
        // Acquiring succeeds only when nobody holds it; dropping `file`
        // releases the probe lock again.
        Ok(!try_flock_exclusive(&file)?)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for ExclusiveFile {
    fn drop(&mut self) {
        unlock(&self.file);
        trace!(path = %self.path.display(), "context lock released");
    }
}

fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor owned by `file` for the whole call.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let error = io::Error::last_os_error();
        if error.kind() == io::ErrorKind::WouldBlock
            || error.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(error)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

fn unlock(file: &File) {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: `fd` is a valid descriptor owned by `file`. Closing the file
        // would release the lock as well; failure here is harmless.
        unsafe {
            libc::flock(file.as_raw_fd(), libc::LOCK_UN);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
    }
}
