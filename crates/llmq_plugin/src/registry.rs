use std::sync::Arc;

use crate::error::PluginError;
use crate::Plugin;

/// Fixed set of plugins available to one llmq process.
///
/// Built once at startup from statically known implementations; nothing can
/// be registered after construction.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new(
        plugins: impl IntoIterator<Item = Arc<dyn Plugin>>,
    ) -> Result<Self, PluginError> {
        let mut registered: Vec<Arc<dyn Plugin>> = Vec::new();
        for plugin in plugins {
            if registered.iter().any(|known| known.name() == plugin.name()) {
                return Err(PluginError::DuplicatePlugin {
                    name: plugin.name().to_owned(),
                });
            }
            registered.push(plugin);
        }
        Ok(Self {
            plugins: registered,
        })
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Plugin>, PluginError> {
        self.plugins
            .iter()
            .find(|plugin| plugin.name() == name)
            .cloned()
            .ok_or_else(|| PluginError::UnknownPlugin {
                name: name.to_owned(),
                available: self.names().join(", "),
            })
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    /// One `name : description` line per plugin, names padded to a common width.
    #[must_use]
    pub fn listing(&self) -> String {
        let width = self
            .plugins
            .iter()
            .map(|plugin| plugin.name().len())
            .max()
            .unwrap_or(0);

        self.plugins
            .iter()
            .map(|plugin| {
                format!(
                    "{:<width$} : {}\n",
                    plugin.name(),
                    plugin.description(),
                    width = width
                )
            })
            .collect()
    }
}
