use serde::Deserialize;

use llmq_plugin::PluginError;

use crate::url::DEFAULT_BASE_URL;

const AUTH_SHAPE: &str = "authfile must be a YAML map with properties \"key\" and optionally \"org\"";

/// Credentials and endpoint for Chat Completions requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Bearer token passed to `Authorization`.
    pub api_key: String,
    /// Optional `OpenAI-Organization` header value.
    pub organization: Option<String>,
    /// Base URL; normalized to the completions endpoint at request time.
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
struct AuthFile {
    key: Option<String>,
    org: Option<String>,
    base_url: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            organization: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ChatConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parses the plugin auth file: a YAML map with a required `key`, an
    /// optional `org` and an optional `base_url`.
    pub fn from_auth(auth: &str) -> Result<Self, PluginError> {
        if auth.trim().is_empty() {
            return Err(PluginError::InvalidAuth(AUTH_SHAPE.to_owned()));
        }

        let parsed = serde_yaml::from_str::<AuthFile>(auth)
            .map_err(|error| PluginError::InvalidAuth(format!("{AUTH_SHAPE}: {error}")))?;
        let api_key = parsed
            .key
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| PluginError::InvalidAuth(AUTH_SHAPE.to_owned()))?;

        let mut config = Self::new(api_key);
        if let Some(org) = parsed.org.filter(|org| !org.trim().is_empty()) {
            config = config.with_organization(org.trim());
        }
        if let Some(base_url) = parsed.base_url.filter(|url| !url.trim().is_empty()) {
            config = config.with_base_url(base_url.trim());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use llmq_plugin::PluginError;

    use super::ChatConfig;
    use crate::url::DEFAULT_BASE_URL;

    #[test]
    fn from_auth_reads_key_and_org() {
        let config = ChatConfig::from_auth("key: sk-123\norg: org-9\n").expect("auth parses");
        assert_eq!(config.api_key, "sk-123");
        assert_eq!(config.organization.as_deref(), Some("org-9"));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn from_auth_accepts_base_url_override() {
        let config = ChatConfig::from_auth("key: k\nbase_url: http://localhost:1234/v1\n")
            .expect("auth parses");
        assert_eq!(config.base_url, "http://localhost:1234/v1");
        assert!(config.organization.is_none());
    }

    #[test]
    fn from_auth_rejects_missing_key() {
        for auth in ["", "org: x\n", "key: ''\n", "- key\n"] {
            assert!(
                matches!(ChatConfig::from_auth(auth), Err(PluginError::InvalidAuth(_))),
                "auth {auth:?} should be rejected"
            );
        }
    }
}
