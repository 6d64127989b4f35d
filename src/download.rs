//! Fetching PDFs from URLs, for local OCR.

use std::time::Duration;

use reqwest::{StatusCode, header::CONTENT_TYPE};

use crate::{errors::DownloadError, prelude::*};

/// Something that can fetch a PDF.
#[async_trait]
pub trait Downloader: Send + Sync + 'static {
    /// Download the PDF at `url`.
    async fn download_pdf(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

/// A [`Downloader`] using plain HTTP(S).
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Create a new downloader. `timeout` covers the entire request.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("could not build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[instrument(level = "debug", skip(self))]
    async fn download_pdf(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(DownloadError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DownloadError::Status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        if !content_type.contains("application/pdf") {
            return Err(DownloadError::NotPdf { content_type });
        }

        let bytes = response.bytes().await.map_err(DownloadError::Transport)?;
        if bytes.is_empty() {
            return Err(DownloadError::Empty);
        }
        debug!(bytes = bytes.len(), "Downloaded PDF");
        Ok(bytes.to_vec())
    }
}
