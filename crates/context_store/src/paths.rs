use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;

/// Suffix of every stored context file. Context names omit it.
pub const CONTEXT_EXTENSION: &str = "yml";

/// Suffix appended to a context path to name its owner record.
pub const OWNER_RECORD_SUFFIX: &str = ".owner";

/// Resolves `<data_dir>/<name>.yml`. Names may nest with `/` but must stay
/// inside `data_dir`.
pub fn context_path(data_dir: &Path, name: &str) -> Result<PathBuf, StoreError> {
    validate_context_name(name)?;
    let mut path = data_dir.join(name).into_os_string();
    path.push(".");
    path.push(CONTEXT_EXTENSION);
    Ok(PathBuf::from(path))
}

#[must_use]
pub fn owner_record_path(context_path: &Path) -> PathBuf {
    let mut path = context_path.as_os_str().to_os_string();
    path.push(OWNER_RECORD_SUFFIX);
    PathBuf::from(path)
}

fn validate_context_name(name: &str) -> Result<(), StoreError> {
    let invalid = |reason| StoreError::InvalidContext {
        name: name.to_owned(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.ends_with('/') {
        return Err(invalid("must name a file, not a directory"));
    }
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("must not contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("must be relative to the data directory"))
            }
        }
    }
    Ok(())
}
