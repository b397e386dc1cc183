//! Environment configuration.

use std::env;
use std::time::Duration;

pub const LOG_ENV: &str = "LLMQ_LOG";
pub const EDITOR_ENV: &str = "EDITOR";
pub const TIMEOUT_ENV: &str = "LLMQ_TIMEOUT_SECS";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// `tracing` filter directives overriding the verbosity flags.
    pub log_filter: Option<String>,
    pub editor: Option<String>,
    /// Default transport timeout; `--timeout` takes precedence.
    pub timeout: Option<Duration>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            log_filter: env_string_opt(LOG_ENV),
            editor: env_string_opt(EDITOR_ENV),
            timeout: env_string_opt(TIMEOUT_ENV)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{EnvConfig, EDITOR_ENV, LOG_ENV, TIMEOUT_ENV};
    use std::env;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn env_defaults_are_unset() {
        let _lock = env_lock();
        let _g1 = set_env_guard(LOG_ENV, None);
        let _g2 = set_env_guard(EDITOR_ENV, None);
        let _g3 = set_env_guard(TIMEOUT_ENV, None);

        assert_eq!(EnvConfig::from_env(), EnvConfig::default());
    }

    #[test]
    fn env_values_are_read() {
        let _lock = env_lock();
        let _g1 = set_env_guard(LOG_ENV, Some("llmq=trace"));
        let _g2 = set_env_guard(EDITOR_ENV, Some("nano -w"));
        let _g3 = set_env_guard(TIMEOUT_ENV, Some(" 30 "));

        let config = EnvConfig::from_env();
        assert_eq!(config.log_filter.as_deref(), Some("llmq=trace"));
        assert_eq!(config.editor.as_deref(), Some("nano -w"));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn blank_or_invalid_values_are_ignored() {
        let _lock = env_lock();
        let _g1 = set_env_guard(EDITOR_ENV, Some("  "));
        let _g2 = set_env_guard(TIMEOUT_ENV, Some("soon"));

        let config = EnvConfig::from_env();
        assert!(config.editor.is_none());
        assert!(config.timeout.is_none());
    }
}
