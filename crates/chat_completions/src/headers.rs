use llmq_plugin::PluginError;

use crate::config::ChatConfig;

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_ORGANIZATION: &str = "OpenAI-Organization";

/// Build the ordered request headers for a Chat Completions request.
pub fn build_headers(config: &ChatConfig) -> Result<Vec<(String, String)>, PluginError> {
    let key = config.api_key.trim();
    if key.is_empty() {
        return Err(PluginError::InvalidAuth("api key is required".to_owned()));
    }

    let mut headers = vec![
        (
            HEADER_CONTENT_TYPE.to_owned(),
            "application/json".to_owned(),
        ),
        (HEADER_AUTHORIZATION.to_owned(), format!("Bearer {key}")),
    ];

    if let Some(organization) = config
        .organization
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        headers.push((HEADER_ORGANIZATION.to_owned(), organization.to_owned()));
    }

    Ok(headers)
}
