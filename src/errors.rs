//! Error types for the extraction pipeline.
//!
//! Most plumbing uses [`anyhow`], but the failures which decide what the
//! pipeline does next get their own types.

use reqwest::StatusCode;
use thiserror::Error;

/// Why the reader service did not give us usable content.
///
/// These never escape [`crate::remote`]. They are logged, and the caller sees
/// "no content".
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The service answered with an unexpected status.
    #[error("unexpected status code {0}")]
    Status(StatusCode),

    /// The body was not the JSON we expected.
    #[error("invalid JSON response: {0}")]
    Malformed(String),

    /// The payload had no `data` field.
    #[error("response has no `data` field")]
    MissingData,

    /// The `data` field was too short to be worth keeping.
    #[error("response `data` has only {words} words")]
    TooShort { words: usize },

    /// The payload had no `data.usage.tokens` field.
    #[error("response has no `data.usage.tokens` field")]
    MissingTokens,

    /// The payload had no `data.content` string.
    #[error("response has no `data.content` field")]
    MissingContent,
}

/// Failure to fetch a PDF for local OCR.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request never produced a response, or the body could not be read.
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered with something other than 200.
    #[error("failed to download the PDF (status code {0})")]
    Status(StatusCode),

    /// The server did not claim to be sending a PDF.
    #[error("the URL does not point to a PDF file (content type {content_type:?})")]
    NotPdf { content_type: String },

    /// The server sent a PDF content type, but no data.
    #[error("the downloaded PDF is empty")]
    Empty,
}

/// A failure which ends an extraction request.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// We needed the PDF bytes for OCR, and could not get them.
    #[error("could not download {url}")]
    Download {
        url: String,
        #[source]
        source: DownloadError,
    },

    /// The PDF could not be turned into page images.
    #[error("could not convert PDF to page images: {0:#}")]
    Conversion(anyhow::Error),

    /// The request was cancelled before it finished.
    #[error("extraction was cancelled")]
    Cancelled,
}
