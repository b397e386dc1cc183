use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

/// Creates an empty owner-only auth file (and its directory) when missing.
pub fn ensure_auth_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("could not create directory {}", parent.display()))?;
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
            debug!(path = %path.display(), "auth file created");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(error) => {
            Err(error).with_context(|| format!("could not create file {}", path.display()))
        }
    }
}

/// Reads and trims the auth file, warning when others can access it.
pub fn read_auth(path: &Path) -> Result<String> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("error getting the status of authfile {}", path.display()))?;
    if !metadata.is_file() {
        bail!(
            "plugin authfile {} exists and is not a regular file",
            path.display()
        );
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if !is_private_mode(metadata.permissions().mode()) {
            warn!(
                path = %path.display(),
                "plugin authfile has insecure permissions! please set to 400 or 600"
            );
        }
    }

    let auth = fs::read_to_string(path)
        .with_context(|| format!("could not read authfile {}", path.display()))?;
    Ok(auth.trim().to_owned())
}

/// Only `0400` and `0600` keep credentials private.
#[must_use]
pub fn is_private_mode(mode: u32) -> bool {
    matches!(mode & 0o777, 0o400 | 0o600)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{ensure_auth_file, is_private_mode, read_auth};

    #[test]
    fn private_modes() {
        assert!(is_private_mode(0o100600));
        assert!(is_private_mode(0o400));
        assert!(!is_private_mode(0o644));
        assert!(!is_private_mode(0o700));
    }

    #[test]
    fn auth_file_is_created_once_and_trimmed_on_read() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("conf").join(".auth");

        ensure_auth_file(&path).expect("created");
        assert_eq!(read_auth(&path).expect("read"), "");

        fs::write(&path, "\n  key: sk-1\n\n").expect("write");
        ensure_auth_file(&path).expect("existing file kept");
        assert_eq!(read_auth(&path).expect("read"), "key: sk-1");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert!(is_private_mode(mode));
        }
    }

    #[test]
    fn directory_is_not_an_auth_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let error = read_auth(dir.path()).expect_err("directory");
        assert!(error.to_string().contains("not a regular file"));
    }
}
