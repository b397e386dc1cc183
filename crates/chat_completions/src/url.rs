/// Default base URL for Chat Completions requests.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const ENDPOINT_PATH: &str = "/chat/completions";

/// Normalize a base URL to the Chat Completions endpoint.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_BASE_URL`]
/// 2) keep `/chat/completions` unchanged
/// 3) append `/chat/completions` otherwise
pub fn normalize_chat_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(ENDPOINT_PATH) {
        return trimmed.to_string();
    }
    format!("{trimmed}{ENDPOINT_PATH}")
}
