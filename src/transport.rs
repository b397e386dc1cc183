use std::io;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use llmq_plugin::PluginError;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Delay before the single `--retry` reissue.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// One outgoing request as a plugin session describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// `Some` issues a POST with this body, `None` a GET.
    pub body: Option<String>,
}

/// Receives reply bytes as they arrive. Returning `false` ends the transfer
/// early; an error aborts it and is returned from [`Transport::send`].
pub type ChunkHandler<'a> = dyn FnMut(&[u8]) -> Result<bool> + 'a;

pub trait Transport {
    fn send(&self, request: &Request, on_chunk: &mut ChunkHandler<'_>) -> Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed with status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid header {name}")]
    InvalidHeader { name: String },
    #[error("failed to initialize tokio runtime: {0}")]
    Runtime(#[source] io::Error),
}

impl TransportError {
    /// Rate limits, overloaded upstreams and refused connections.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, message } => {
                is_retryable_http_error(status.as_u16(), message)
            }
            Self::Request(error) => {
                error.is_connect()
                    || error.is_timeout()
                    || retryable_status_regex().is_match(&error.to_string())
            }
            Self::InvalidHeader { .. } | Self::Runtime(_) => false,
        }
    }
}

fn retryable_status_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|overloaded|service.?unavailable|upstream.?connect|connection.?refused")
            .expect("retry regex must compile")
    })
}

pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504) || retryable_status_regex().is_match(error_text)
}

/// Whether a failed invocation may be reissued under `--retry`: transient
/// transport failures or a reply stream the plugin could not make sense of.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        if let Some(transport) = cause.downcast_ref::<TransportError>() {
            return transport.is_retryable();
        }
        if let Some(plugin) = cause.downcast_ref::<PluginError>() {
            return plugin.is_reply_error();
        }
        false
    })
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayloadFields {
    message: Option<String>,
}

/// Pulls `error.message` out of a JSON error body, falling back to the raw
/// body text.
pub fn parse_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|payload| payload.error)
        .and_then(|fields| fields.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_owned())
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
    let mut out = HeaderMap::new();
    for (key, value) in headers {
        out.insert(
            HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| TransportError::InvalidHeader { name: key.clone() })?,
            HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeader { name: key.clone() })?,
        );
    }
    Ok(out)
}

/// Blocking HTTP transport: one current-thread runtime per request.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn stream(
        &self,
        request: &Request,
        on_chunk: &mut ChunkHandler<'_>,
    ) -> Result<()> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(TransportError::from)?;

        let headers = header_map(&request.headers)?;
        let builder = match &request.body {
            Some(body) => {
                debug!(url = %request.url, body = %body, "POST");
                http.post(&request.url).body(body.clone())
            }
            None => {
                debug!(url = %request.url, "GET");
                http.get(&request.url)
            }
        };

        let response = builder
            .headers(headers)
            .send()
            .await
            .map_err(TransportError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status,
                message: parse_error_message(&body),
            }
            .into());
        }

        let mut bytes = response.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(TransportError::from)?;
            if !on_chunk(&chunk)? {
                debug!("reply handler ended the transfer early");
                break;
            }
        }
        Ok(())
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &Request, on_chunk: &mut ChunkHandler<'_>) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;

        runtime.block_on(self.stream(request, on_chunk))
    }
}
