use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use llmq_plugin::Document;
use tracing::{debug, warn};

use crate::diff::{write_diff, CommitStats};
use crate::error::StoreError;
use crate::lock::ExclusiveFile;
use crate::owner::OwnerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Write an owner record next to the context while the lock is held.
    pub record_owner: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            record_owner: cfg!(not(target_os = "linux")),
        }
    }
}

/// An exclusively locked context file plus its last committed bytes.
///
/// Every commit rewrites only the spans that differ from the previous
/// serialization, so appending to the last message of a long conversation
/// costs a handful of bytes.
#[derive(Debug)]
pub struct ContextStore {
    // Fields drop in order: the owner record must go while the lock is held.
    owner: Option<OwnerRecord>,
    lock: ExclusiveFile,
    current: Vec<u8>,
}

impl ContextStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: &Path, options: StoreOptions) -> Result<Self, StoreError> {
        let mut lock = ExclusiveFile::acquire(path)?;

        let mut current = Vec::new();
        lock.file_mut()
            .read_to_end(&mut current)
            .map_err(|source| StoreError::io("reading context file", path, source))?;

        let owner = if options.record_owner {
            match OwnerRecord::write(path, std::process::id()) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(path = %path.display(), %error, "failed to write owner record");
                    None
                }
            }
        } else {
            None
        };

        debug!(path = %path.display(), bytes = current.len(), "context opened");
        Ok(Self {
            lock,
            current,
            owner,
        })
    }

    /// Creates `path` (and its parent directories) as an empty owner-only
    /// file when missing. Returns whether the file was created.
    pub fn create(path: &Path) -> Result<bool, StoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| StoreError::io("creating context directory", parent, source))?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        match options.open(path) {
            Ok(_) => {
                debug!(path = %path.display(), "context created");
                Ok(true)
            }
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(source) => Err(StoreError::io("creating context file", path, source)),
        }
    }

    /// Deletes the context file. Returns whether a file was removed.
    pub fn remove(path: &Path) -> Result<bool, StoreError> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "context removed");
                Ok(true)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::io("removing context file", path, source)),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.lock.path()
    }

    #[must_use]
    pub fn current_bytes(&self) -> &[u8] {
        &self.current
    }

    #[must_use]
    pub fn owner(&self) -> Option<&OwnerRecord> {
        self.owner.as_ref()
    }

    pub fn load(&self) -> Result<Document, StoreError> {
        Document::parse(&self.current).map_err(|source| StoreError::Parse {
            path: self.path().to_path_buf(),
            source,
        })
    }

    /// Serializes `document` and writes the spans that differ from the last
    /// committed bytes. On error the in-memory view is left unchanged.
    pub fn commit(&mut self, document: &Document) -> Result<CommitStats, StoreError> {
        let new = document
            .to_yaml()
            .map_err(|source| StoreError::Serialize {
                path: self.path().to_path_buf(),
                source,
            })?
            .into_bytes();

        let path = self.lock.path().to_path_buf();
        let file = self.lock.file_mut();
        let stats = write_diff(&self.current, &new, file)
            .map_err(|source| StoreError::io("writing context file", &path, source))?;
        file.flush()
            .map_err(|source| StoreError::io("flushing context file", &path, source))?;

        if stats.spans > 0 || stats.truncated {
            debug!(
                path = %path.display(),
                bytes_written = stats.bytes_written,
                spans = stats.spans,
                truncated = stats.truncated,
                "context committed"
            );
        }
        self.current = new;
        Ok(stats)
    }

    /// Re-reads the file from disk, for verifying what a commit produced.
    pub fn reread(&mut self) -> Result<Vec<u8>, StoreError> {
        let path = self.lock.path().to_path_buf();
        let file = self.lock.file_mut();
        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut bytes))
            .map_err(|source| StoreError::io("reading context file", &path, source))?;
        Ok(bytes)
    }
}

/// Parses a context without locking it.
pub fn read_document(path: &Path) -> Result<Document, StoreError> {
    let bytes =
        fs::read(path).map_err(|source| StoreError::io("reading context file", path, source))?;
    Document::parse(&bytes).map_err(|source| StoreError::Parse {
        path: PathBuf::from(path),
        source,
    })
}
