use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

pub const FALLBACK_EDITOR: &str = "vi";

/// `$EDITOR`, or `vi` when unset.
#[must_use]
pub fn editor_command(configured: Option<&str>) -> String {
    match configured {
        Some(editor) => editor.to_owned(),
        None => {
            warn!("$EDITOR does not exist, falling back to {FALLBACK_EDITOR}");
            FALLBACK_EDITOR.to_owned()
        }
    }
}

/// Runs `editor file` through the shell from `dir`, so `EDITOR` may carry
/// its own arguments.
pub fn spawn_editor(editor: &str, dir: &Path, file: &Path) -> Result<()> {
    debug!(editor, file = %file.display(), "spawning editor");
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{editor} \"$1\""))
        .arg("sh")
        .arg(file)
        .current_dir(dir)
        .status()
        .with_context(|| format!("could not edit {}", file.display()))?;
    if !status.success() {
        bail!("could not edit {}: editor exited with {status}", file.display());
    }
    Ok(())
}
