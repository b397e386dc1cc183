use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::paths::owner_record_path;

/// Sidecar naming the pid that holds a context's lock. Removed on drop
/// unless another process has since rewritten it.
#[derive(Debug)]
pub struct OwnerRecord {
    path: PathBuf,
    pid: u32,
}

impl OwnerRecord {
    /// Writes `pid` to the owner record of `context_path`, replacing any
    /// stale record left by a process that exited without cleanup.
    pub fn write(context_path: &Path, pid: u32) -> io::Result<Self> {
        let path = owner_record_path(context_path);
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        writeln!(file, "{pid}")?;
        debug!(path = %path.display(), pid, "owner record written");
        Ok(Self { path, pid })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OwnerRecord {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().parse::<u32>().ok() == Some(self.pid) => {}
            Ok(_) => {
                debug!(
                    path = %self.path.display(),
                    pid = self.pid,
                    "owner record taken over, leaving it"
                );
                return;
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => return,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "failed to read owner record");
                return;
            }
        }
        if let Err(error) = fs::remove_file(&self.path) {
            if error.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), %error, "failed to remove owner record");
            }
        }
    }
}

/// Reads the pid recorded for `context_path`. A missing or unparseable
/// record is `None`.
pub fn read_owner(context_path: &Path) -> io::Result<Option<u32>> {
    let path = owner_record_path(context_path);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(text.trim().parse::<u32>().ok().filter(|pid| *pid != 0)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}
