//! Remote text extraction using a hosted "reader" service.
//!
//! The service renders a PDF and hands back its text. It works well for PDFs
//! with a real text layer, and poorly for scans, which is why its output is
//! checked by [`crate::quality`] before anybody trusts it.

use std::env;

use clap::Args;

use crate::{errors::RemoteError, prelude::*};

pub mod jina;

/// The reader service we use unless told otherwise.
pub const DEFAULT_READER_API_BASE: &str = "https://r.jina.ai/";

/// Environment variable which overrides [`DEFAULT_READER_API_BASE`].
pub const READER_API_BASE_VAR: &str = "READER_API_BASE";

/// Options for talking to the reader service.
#[derive(Args, Clone, Debug)]
pub struct RemoteOpts {
    /// Base URL of the reader service. Defaults to `$READER_API_BASE`, or
    /// `https://r.jina.ai/` if that is not set.
    #[clap(long)]
    pub reader_api_base: Option<String>,

    /// A timeout, in seconds, for each request to the reader service.
    #[clap(long, default_value = "60")]
    pub remote_timeout: u64,

    /// The advisory `X-Timeout` value, in seconds, sent when retrying a
    /// request that returned too little text.
    #[clap(long, default_value = "5")]
    pub retry_timeout_hint: u64,
}

impl Default for RemoteOpts {
    fn default() -> Self {
        Self {
            reader_api_base: None,
            remote_timeout: 60,
            retry_timeout_hint: 5,
        }
    }
}

impl RemoteOpts {
    /// The base URL to use, always ending in `/`.
    pub fn api_base(&self) -> String {
        let base = self
            .reader_api_base
            .clone()
            .or_else(|| env::var(READER_API_BASE_VAR).ok())
            .unwrap_or_else(|| DEFAULT_READER_API_BASE.to_owned());
        if base.ends_with('/') {
            base
        } else {
            format!("{base}/")
        }
    }
}

/// Interface to a remote extraction service.
///
/// Both methods return `None` when the service produced nothing usable. This
/// is a normal outcome, not an error: the caller falls back to OCR.
#[async_trait]
pub trait RemoteExtractor: Send + Sync + 'static {
    /// Ask the service to fetch and read the PDF at `url` itself.
    async fn extract_from_url(&self, url: &str) -> Option<String>;

    /// Upload the PDF to the service and read it.
    async fn extract_from_bytes(&self, pdf: &[u8]) -> Option<String>;
}

/// A parsed response from the reader service.
///
/// We expect `{"data": {"content": "...", "usage": {"tokens": 123}}}`, but we
/// keep the raw JSON so that we can make each check separately and report
/// exactly which part was missing.
#[derive(Clone, Debug)]
pub struct RemoteResponse {
    payload: Value,
}

impl RemoteResponse {
    /// Parse a response body.
    pub fn parse(body: &str) -> Result<Self, RemoteError> {
        let payload = serde_json::from_str::<Value>(body)
            .map_err(|err| RemoteError::Malformed(err.to_string()))?;
        Ok(Self { payload })
    }

    /// The `data` field, if present.
    pub fn data(&self) -> Option<&Value> {
        self.payload.get("data")
    }

    /// The `data.usage.tokens` field, if present.
    pub fn token_usage(&self) -> Option<&Value> {
        self.data()?.get("usage")?.get("tokens")
    }

    /// The `data.content` field, if it is a string.
    pub fn content(&self) -> Option<&str> {
        self.data()?.get("content")?.as_str()
    }

    /// Return our content, but only if the service also reported token usage.
    ///
    /// The reader service only reports usage for documents it actually
    /// processed, so a response without it is not trustworthy.
    pub fn into_content_with_usage(self) -> Result<String, RemoteError> {
        let tokens = self.token_usage().ok_or(RemoteError::MissingTokens)?;
        info!(%tokens, "Reader service token usage");
        self.content()
            .map(str::to_owned)
            .ok_or(RemoteError::MissingContent)
    }

    /// Return our content.
    pub fn into_content(self) -> Result<String, RemoteError> {
        self.content()
            .map(str::to_owned)
            .ok_or(RemoteError::MissingContent)
    }
}
