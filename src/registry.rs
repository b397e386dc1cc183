use std::sync::Arc;

use llmq_plugin::{Plugin, PluginError, PluginRegistry};
use llmq_plugin_gpt::GptPlugin;

/// Every plugin compiled into llmq.
pub fn builtin_registry() -> Result<PluginRegistry, PluginError> {
    PluginRegistry::new([Arc::new(GptPlugin) as Arc<dyn Plugin>])
}
