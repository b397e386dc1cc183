use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use llmq_plugin::Plugin;

const APP_DIR: &str = "llmq";
const AUTH_FILE: &str = ".auth";

/// Per-plugin configuration and data directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDirs {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl PluginDirs {
    /// Plugin overrides first, then `$XDG_*_HOME/llmq/<plugin>` with the
    /// usual `~/.config` and `~/.local/share` fallbacks.
    pub fn resolve(plugin: &dyn Plugin) -> Result<Self> {
        let name = plugin.name();
        let config_dir = match plugin.config_dir() {
            Some(dir) => checked_override(name, "confdir", dir)?,
            None => default_dir(name, dirs::config_dir(), "config")?,
        };
        let data_dir = match plugin.data_dir() {
            Some(dir) => checked_override(name, "datadir", dir)?,
            None => default_dir(name, dirs::data_dir(), "data")?,
        };
        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    #[must_use]
    pub fn auth_file(&self) -> PathBuf {
        self.config_dir.join(AUTH_FILE)
    }
}

fn checked_override(plugin: &str, kind: &str, dir: PathBuf) -> Result<PathBuf> {
    let dir = std::path::absolute(&dir)
        .with_context(|| format!("resolving {kind} {} for plugin <{plugin}>", dir.display()))?;
    ensure_not_file(&dir).with_context(|| format!("configured {kind} for plugin <{plugin}>"))?;
    Ok(dir)
}

fn default_dir(plugin: &str, base: Option<PathBuf>, kind: &str) -> Result<PathBuf> {
    let base = base.ok_or_else(|| anyhow!("could not determine the user {kind} directory"))?;
    let dir = base.join(APP_DIR).join(plugin);
    ensure_not_file(&dir)
        .with_context(|| format!("fallback {kind} directory for plugin <{plugin}>"))?;
    Ok(dir)
}

fn ensure_not_file(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        bail!("{} exists and is not a directory", dir.display());
    }
    Ok(())
}
