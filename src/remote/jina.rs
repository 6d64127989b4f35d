//! A [`RemoteExtractor`] backed by the Jina Reader API.

use std::time::Duration;

use base64::{Engine as _, prelude::BASE64_STANDARD};
use keen_retry::{ExponentialJitter, ResolvedResult};
use reqwest::{RequestBuilder, StatusCode, header::ACCEPT};
use serde_json::json;

use super::{RemoteExtractor, RemoteOpts, RemoteResponse};
use crate::{
    errors::RemoteError,
    prelude::*,
    quality::{WORD_THRESHOLD, repr_word_count},
    retry::{
        AttemptResult, retry_result_fatal, retry_result_ok, retry_result_transient,
        try_fatal,
    },
};

/// The reader service insists on a URL, even when we upload the PDF directly.
const PLACEHOLDER_UPLOAD_URL: &str = "https://example.com";

/// Client for the Jina Reader API.
pub struct JinaReader {
    client: reqwest::Client,
    api_base: String,
    retry_timeout_hint: u64,
}

impl JinaReader {
    /// Create a new client.
    pub fn new(opts: &RemoteOpts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(opts.remote_timeout))
            .build()
            .context("could not build HTTP client")?;
        Ok(Self {
            client,
            api_base: opts.api_base(),
            retry_timeout_hint: opts.retry_timeout_hint,
        })
    }

    /// Headers common to every request we send.
    fn with_common_headers(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(ACCEPT, "application/json")
            .header("X-No-Cache", "true")
    }

    /// Ask the reader service to fetch `url`, and parse what it sends back.
    ///
    /// The reader URL is the base followed by the raw target URL. The service
    /// expects it unescaped.
    async fn get_url(
        &self,
        url: &str,
        timeout_hint: Option<u64>,
    ) -> Result<RemoteResponse, RemoteError> {
        let mut req = self.with_common_headers(
            self.client.get(format!("{}{}", self.api_base, url)),
        );
        if let Some(hint) = timeout_hint {
            req = req.header("X-Timeout", hint.to_string());
        }

        debug!(?timeout_hint, "Sending URL to reader service");
        let response = req.send().await.map_err(RemoteError::Transport)?;
        let status = response.status();
        debug!(%status, "Reader service responded");
        if status != StatusCode::OK {
            return Err(RemoteError::Status(status));
        }
        let body = response.text().await.map_err(RemoteError::Transport)?;
        RemoteResponse::parse(&body)
    }

    /// Our first try. A short answer is worth one more attempt.
    async fn first_url_attempt(&self, url: &str) -> AttemptResult<RemoteResponse, RemoteError> {
        let response = try_fatal!(self.get_url(url, None).await);
        match response.data().map(repr_word_count) {
            None => {
                warn!("Reader response has no data, retrying");
                retry_result_transient(RemoteError::MissingData)
            }
            Some(words) if words < WORD_THRESHOLD => {
                warn!(words, "Reader response is too short, retrying");
                retry_result_transient(RemoteError::TooShort { words })
            }
            Some(_) => retry_result_ok(response),
        }
    }

    /// Our second try, with a timeout hint. Whatever we get here is final, so
    /// we don't look at the word count again.
    async fn retry_url_attempt(&self, url: &str) -> AttemptResult<RemoteResponse, RemoteError> {
        let response =
            try_fatal!(self.get_url(url, Some(self.retry_timeout_hint)).await);
        if response.data().is_none() {
            return retry_result_fatal(RemoteError::MissingData);
        }
        retry_result_ok(response)
    }

    /// Upload `pdf` to the reader service. Exactly one attempt.
    async fn post_bytes(&self, pdf: &[u8]) -> Result<String, RemoteError> {
        let body = json!({
            "url": PLACEHOLDER_UPLOAD_URL,
            "pdf": BASE64_STANDARD.encode(pdf),
        });
        let req = self
            .with_common_headers(self.client.post(&self.api_base))
            .header("X-With-Images-Summary", "true")
            .json(&body);

        debug!(bytes = pdf.len(), "Uploading PDF to reader service");
        let response = req.send().await.map_err(RemoteError::Transport)?;
        let status = response.status();
        debug!(%status, "Reader service responded");
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }
        let body = response.text().await.map_err(RemoteError::Transport)?;
        RemoteResponse::parse(&body)?.into_content()
    }
}

#[async_trait]
impl RemoteExtractor for JinaReader {
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    async fn extract_from_url(&self, url: &str) -> Option<String> {
        // One retry, shortly after the first attempt.
        let jitter = ExponentialJitter::FromBackoffRange {
            backoff_range_millis: 100..=1_000,
            re_attempts: 1,
            jitter_ratio: 0.2,
        };

        let result = self
            .first_url_attempt(url)
            .await
            .retry_with_async(|_| async { self.retry_url_attempt(url).await })
            .with_exponential_jitter(|| jitter)
            .await
            .inspect_recovered(|_, _, retry_errors_list| {
                info!(
                    "Reader service succeeded on retry (earlier attempts: [{}])",
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            });

        let response = match result {
            ResolvedResult::Ok { output, .. } | ResolvedResult::Recovered { output, .. } => {
                output
            }
            ResolvedResult::Fatal { error, .. } => {
                warn!("Reader service failed: {error}");
                return None;
            }
            ResolvedResult::GivenUp { fatal_error, .. }
            | ResolvedResult::Unrecoverable { fatal_error, .. } => {
                warn!("Reader service failed after retrying: {fatal_error}");
                return None;
            }
        };

        response
            .into_content_with_usage()
            .inspect_err(|err| warn!("Reader service gave no usable content: {err}"))
            .ok()
    }

    #[instrument(level = "debug", skip_all)]
    async fn extract_from_bytes(&self, pdf: &[u8]) -> Option<String> {
        self.post_bytes(pdf)
            .await
            .inspect_err(|err| warn!("Reader service upload failed: {err}"))
            .ok()
    }
}
