//! Finding and terminating the llmq process that holds a context open.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::LocateError;
use crate::lock::ExclusiveFile;
use crate::owner::read_owner;

const DELETED_SUFFIX: &str = " (deleted)";

/// Delivers the termination signal.
pub trait Signaller {
    fn terminate(&self, pid: u32) -> Result<(), LocateError>;
}

/// Sends `SIGTERM` with `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SigTerm;

impl Signaller for SigTerm {
    fn terminate(&self, pid: u32) -> Result<(), LocateError> {
        let raw = i32::try_from(pid).map_err(|_| LocateError::Signal {
            pid,
            source: io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"),
        })?;
        #[cfg(unix)]
        {
            // SAFETY: plain kill(2) with a validated positive pid.
            let result = unsafe { libc::kill(raw, libc::SIGTERM) };
            if result == 0 {
                return Ok(());
            }
            let source = io::Error::last_os_error();
            if source.raw_os_error() == Some(libc::EPERM) {
                return Err(LocateError::PermissionDenied { pid });
            }
            Err(LocateError::Signal { pid, source })
        }
        #[cfg(not(unix))]
        {
            let _ = raw;
            Err(LocateError::Signal {
                pid,
                source: io::Error::new(io::ErrorKind::Unsupported, "signals are unix-only"),
            })
        }
    }
}

/// A strategy for finding the process holding a context.
pub trait Locator {
    /// Signals the holder of `context_path` and returns its pid.
    fn find_and_signal(&self, context_path: &Path) -> Result<u32, LocateError>;
}

/// Scans a `/proc`-style tree for sibling processes of the same executable
/// with the context open.
#[derive(Debug)]
pub struct ProcScanner<S = SigTerm> {
    root: PathBuf,
    self_pid: u32,
    self_exe: PathBuf,
    signaller: S,
}

impl ProcScanner<SigTerm> {
    /// Scanner over the live `/proc` for the calling process.
    pub fn current() -> Result<Self, LocateError> {
        let root = PathBuf::from("/proc");
        let exe_link = root.join("self").join("exe");
        let self_exe = fs::read_link(&exe_link)
            .map(|exe| executable_identity(&exe))
            .map_err(|source| LocateError::io("resolving own executable", &exe_link, source))?;
        Ok(Self::with_root(root, std::process::id(), self_exe, SigTerm))
    }
}

impl<S: Signaller> ProcScanner<S> {
    pub fn with_root(
        root: impl Into<PathBuf>,
        self_pid: u32,
        self_exe: impl Into<PathBuf>,
        signaller: S,
    ) -> Self {
        Self {
            root: root.into(),
            self_pid,
            self_exe: self_exe.into(),
            signaller,
        }
    }

    #[must_use]
    pub fn signaller(&self) -> &S {
        &self.signaller
    }

    /// Pids of sibling processes holding `target` open, ascending.
    ///
    /// Processes or descriptors that vanish mid-scan are skipped.
    pub fn holders(&self, target: &Path) -> Result<Vec<u32>, LocateError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|source| LocateError::io("listing processes", &self.root, source))?;

        let mut pids = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = parse_pid(&entry.file_name()) else {
                continue;
            };
            if pid == self.self_pid {
                continue;
            }
            let process = entry.path();
            if !self.same_executable(&process) {
                continue;
            }
            if has_open(&process, target) {
                pids.push(pid);
            }
        }
        pids.sort_unstable();
        Ok(pids)
    }

    fn same_executable(&self, process: &Path) -> bool {
        fs::read_link(process.join("exe"))
            .map(|exe| executable_identity(&exe) == self.self_exe)
            .unwrap_or(false)
    }
}

impl<S: Signaller> Locator for ProcScanner<S> {
    fn find_and_signal(&self, context_path: &Path) -> Result<u32, LocateError> {
        let target = fs::canonicalize(context_path).unwrap_or_else(|_| context_path.to_path_buf());
        let holders = self.holders(&target)?;

        let Some(&pid) = holders.first() else {
            return Err(LocateError::NotFound { path: target });
        };
        if holders.len() > 1 {
            warn!(
                path = %target.display(),
                ?holders,
                "several llmq processes hold the context; signalling the lowest pid"
            );
        }

        debug!(pid, path = %target.display(), "terminating context holder");
        self.signaller.terminate(pid)?;
        Ok(pid)
    }
}

/// Locates the holder through the owner record written while the context
/// lock is held.
#[derive(Debug, Default)]
pub struct OwnerRecordLocator<S = SigTerm> {
    signaller: S,
}

impl<S: Signaller> OwnerRecordLocator<S> {
    pub fn new(signaller: S) -> Self {
        Self { signaller }
    }

    #[must_use]
    pub fn signaller(&self) -> &S {
        &self.signaller
    }
}

impl<S: Signaller> Locator for OwnerRecordLocator<S> {
    fn find_and_signal(&self, context_path: &Path) -> Result<u32, LocateError> {
        let not_found = || LocateError::NotFound {
            path: context_path.to_path_buf(),
        };

        let pid = read_owner(context_path)
            .map_err(|source| LocateError::io("reading owner record", context_path, source))?
            .ok_or_else(not_found)?;

        let held = ExclusiveFile::is_held(context_path)
            .map_err(|source| LocateError::io("probing context lock", context_path, source))?;
        if !held {
            debug!(pid, path = %context_path.display(), "owner record is stale");
            return Err(not_found());
        }

        debug!(pid, path = %context_path.display(), "terminating context holder");
        self.signaller.terminate(pid)?;
        Ok(pid)
    }
}

/// Locator suited to the current platform.
pub fn default_locator() -> Result<Box<dyn Locator>, LocateError> {
    if cfg!(target_os = "linux") {
        Ok(Box::new(ProcScanner::current()?))
    } else {
        Ok(Box::new(OwnerRecordLocator::new(SigTerm)))
    }
}

/// Resolved executable path with the kernel's ` (deleted)` marker removed,
/// so a process survives its binary being replaced.
fn executable_identity(exe: &Path) -> PathBuf {
    match exe.to_str().and_then(|text| text.strip_suffix(DELETED_SUFFIX)) {
        Some(stripped) => PathBuf::from(stripped),
        None => exe.to_path_buf(),
    }
}

fn parse_pid(name: &OsStr) -> Option<u32> {
    let name = name.to_str()?;
    if name.is_empty() || !name.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

fn has_open(process: &Path, target: &Path) -> bool {
    let Ok(descriptors) = fs::read_dir(process.join("fd")) else {
        return false;
    };
    descriptors
        .flatten()
        .filter_map(|descriptor| fs::read_link(descriptor.path()).ok())
        .any(|link| link == target)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{executable_identity, parse_pid};

    #[test]
    fn deleted_marker_is_stripped() {
        assert_eq!(
            executable_identity(Path::new("/usr/bin/llmq (deleted)")),
            Path::new("/usr/bin/llmq")
        );
        assert_eq!(
            executable_identity(Path::new("/usr/bin/llmq")),
            Path::new("/usr/bin/llmq")
        );
    }

    #[test]
    fn only_numeric_entries_are_processes() {
        assert_eq!(parse_pid("1234".as_ref()), Some(1234));
        assert_eq!(parse_pid("self".as_ref()), None);
        assert_eq!(parse_pid("12a".as_ref()), None);
        assert_eq!(parse_pid("".as_ref()), None);
    }
}
