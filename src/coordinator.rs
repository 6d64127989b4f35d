//! Deciding between the reader service and local OCR.
//!
//! We always ask the reader service first, because it's fast and handles
//! PDFs with a real text layer well. If it gives us too little text, we assume
//! the PDF is a scan and OCR it ourselves.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    errors::ExtractError,
    ocr::{DocumentOcrEngine, PageResult},
    prelude::*,
    quality::{passes_quality_gate, word_count},
    rasterize::check_is_pdf,
    remote::RemoteExtractor,
};

/// Where our text came from.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtractionResult {
    /// Text from the reader service.
    Remote(String),
    /// Text from local OCR, one entry per page.
    Pages(Vec<PageResult>),
}

/// A PDF to extract text from.
#[derive(Clone, Debug)]
pub enum PdfSource {
    /// A PDF on the web. The reader service fetches it directly, and we only
    /// download it ourselves if we need to OCR it.
    Url(String),
    /// A PDF we already have.
    Bytes(Vec<u8>),
}

impl PdfSource {
    /// Interpret a command-line argument as either a URL or a local file.
    pub async fn from_arg(arg: &str) -> Result<Self> {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            return Ok(Self::Url(arg.to_owned()));
        }
        let bytes = tokio::fs::read(arg)
            .await
            .with_context(|| format!("cannot read {arg:?}"))?;
        check_is_pdf(&bytes).with_context(|| format!("cannot process {arg:?}"))?;
        Ok(Self::Bytes(bytes))
    }
}

/// Runs the remote-first, OCR-second extraction policy.
pub struct Coordinator {
    remote: Arc<dyn RemoteExtractor>,
    ocr: Arc<dyn DocumentOcrEngine>,
}

impl Coordinator {
    pub fn new(remote: Arc<dyn RemoteExtractor>, ocr: Arc<dyn DocumentOcrEngine>) -> Self {
        Self { remote, ocr }
    }

    /// Extract text from `source`.
    pub async fn extract(
        &self,
        source: &PdfSource,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractError> {
        match source {
            PdfSource::Url(url) => self.extract_url(url, cancel).await,
            PdfSource::Bytes(pdf) => self.extract_bytes(pdf, cancel).await,
        }
    }

    /// Extract text from the PDF at `url`.
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    pub async fn extract_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractError> {
        let remote_text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
            text = self.remote.extract_from_url(url) => text,
        };
        if let Some(text) = accept(remote_text) {
            return Ok(ExtractionResult::Remote(text));
        }
        let pages = self.ocr.ocr_url(url, cancel).await?;
        Ok(ExtractionResult::Pages(pages))
    }

    /// Extract text from an in-memory PDF.
    #[instrument(level = "debug", skip_all, fields(bytes = pdf.len()))]
    pub async fn extract_bytes(
        &self,
        pdf: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractError> {
        let remote_text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
            text = self.remote.extract_from_bytes(pdf) => text,
        };
        if let Some(text) = accept(remote_text) {
            return Ok(ExtractionResult::Remote(text));
        }
        let pages = self.ocr.ocr_bytes(pdf, cancel).await?;
        Ok(ExtractionResult::Pages(pages))
    }
}

/// Keep the reader's text only if it passes the quality gate.
fn accept(remote_text: Option<String>) -> Option<String> {
    match remote_text {
        Some(text) if passes_quality_gate(&text) => {
            info!(words = word_count(&text), "Using text from reader service");
            Some(text)
        }
        Some(text) => {
            info!(
                words = word_count(&text),
                "Reader service text is too short, falling back to OCR"
            );
            None
        }
        None => {
            info!("Reader service returned nothing, falling back to OCR");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write as _,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    use super::*;
    use crate::{
        ocr::tests::{FakeDownloader, FakeRasterizer, WidthEngine, fake_engine},
        remote::{RemoteOpts, jina::JinaReader},
    };

    /// A reader service which returns fixed text, and counts calls.
    struct CountingRemote {
        text: Option<String>,
        url_calls: AtomicUsize,
        bytes_calls: AtomicUsize,
    }

    impl CountingRemote {
        fn new(text: Option<String>) -> Arc<Self> {
            Arc::new(Self {
                text,
                url_calls: AtomicUsize::new(0),
                bytes_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RemoteExtractor for CountingRemote {
        async fn extract_from_url(&self, _url: &str) -> Option<String> {
            self.url_calls.fetch_add(1, Ordering::SeqCst);
            self.text.clone()
        }

        async fn extract_from_bytes(&self, _pdf: &[u8]) -> Option<String> {
            self.bytes_calls.fetch_add(1, Ordering::SeqCst);
            self.text.clone()
        }
    }

    /// An OCR engine which counts calls and returns a single page.
    #[derive(Default)]
    struct CountingOcr {
        url_calls: AtomicUsize,
        bytes_calls: AtomicUsize,
    }

    fn one_page() -> Vec<PageResult> {
        vec![PageResult {
            page_number: 1,
            text: "ocr text".to_owned(),
            confidence: 0.99,
        }]
    }

    #[async_trait]
    impl DocumentOcrEngine for CountingOcr {
        async fn ocr_bytes(
            &self,
            _pdf: &[u8],
            _cancel: &CancellationToken,
        ) -> Result<Vec<PageResult>, ExtractError> {
            self.bytes_calls.fetch_add(1, Ordering::SeqCst);
            Ok(one_page())
        }

        async fn ocr_url(
            &self,
            _url: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<PageResult>, ExtractError> {
            self.url_calls.fetch_add(1, Ordering::SeqCst);
            Ok(one_page())
        }
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    const URL: &str = "https://example.com/report.pdf";

    #[tokio::test]
    async fn short_remote_text_falls_back_to_ocr_once() {
        let remote = CountingRemote::new(Some(words(50)));
        let ocr = Arc::new(CountingOcr::default());
        let coordinator = Coordinator::new(remote.clone(), ocr.clone());

        let result = coordinator
            .extract(&PdfSource::Bytes(b"%PDF-".to_vec()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, ExtractionResult::Pages(one_page()));
        assert_eq!(remote.bytes_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ocr.bytes_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ocr.url_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn long_remote_text_is_used_as_is() {
        let remote = CountingRemote::new(Some(words(51)));
        let ocr = Arc::new(CountingOcr::default());
        let coordinator = Coordinator::new(remote, ocr.clone());

        let result = coordinator
            .extract(&PdfSource::Url(URL.to_owned()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, ExtractionResult::Remote(words(51)));
        assert_eq!(ocr.url_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ocr.bytes_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_remote_text_falls_back_to_ocr() {
        let remote = CountingRemote::new(None);
        let ocr = Arc::new(CountingOcr::default());
        let coordinator = Coordinator::new(remote.clone(), ocr.clone());

        let result = coordinator
            .extract(&PdfSource::Url(URL.to_owned()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, ExtractionResult::Pages(one_page()));
        assert_eq!(remote.url_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ocr.url_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn accepted_remote_text_never_downloads_or_rasterizes() {
        let downloader = Arc::new(FakeDownloader::new(true));
        let rasterizer = Arc::new(FakeRasterizer::new(Some(vec![100])));
        let ocr = fake_engine(
            rasterizer.clone(),
            downloader.clone(),
            WidthEngine {
                fail_width: None,
                hang: false,
            },
            1,
        );
        let coordinator = Coordinator::new(CountingRemote::new(Some(words(80))), Arc::new(ocr));

        coordinator
            .extract_url(URL, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reader_outage_gives_ordered_ocr_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        let remote = JinaReader::new(&RemoteOpts {
            reader_api_base: Some(server.uri()),
            ..RemoteOpts::default()
        })
        .unwrap();

        let downloader = Arc::new(FakeDownloader::new(true));
        let ocr = fake_engine(
            Arc::new(FakeRasterizer::new(Some(vec![100, 110, 120]))),
            downloader.clone(),
            WidthEngine {
                fail_width: None,
                hang: false,
            },
            3,
        );
        let coordinator = Coordinator::new(Arc::new(remote), Arc::new(ocr));

        let result = coordinator
            .extract_url(URL, &CancellationToken::new())
            .await
            .unwrap();
        let ExtractionResult::Pages(pages) = result else {
            panic!("expected OCR pages, got {result:?}");
        };
        let numbers = pages.iter().map(|p| p.page_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(pages[2].text, "width 120");
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reader_outage_on_upload_gives_ordered_ocr_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        let remote = JinaReader::new(&RemoteOpts {
            reader_api_base: Some(server.uri()),
            ..RemoteOpts::default()
        })
        .unwrap();

        let downloader = Arc::new(FakeDownloader::new(true));
        let rasterizer = Arc::new(FakeRasterizer::new(Some(vec![100, 110, 120])));
        let ocr = fake_engine(
            rasterizer.clone(),
            downloader.clone(),
            WidthEngine {
                fail_width: None,
                hang: false,
            },
            3,
        );
        let coordinator = Coordinator::new(Arc::new(remote), Arc::new(ocr));

        let result = coordinator
            .extract_bytes(b"%PDF-1.7\n", &CancellationToken::new())
            .await
            .unwrap();
        let ExtractionResult::Pages(pages) = result else {
            panic!("expected OCR pages, got {result:?}");
        };
        let numbers = pages.iter().map(|p| p.page_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(pages[0].text, "width 100");
        assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_requests_stop_before_the_reader() {
        let remote = CountingRemote::new(Some(words(80)));
        let coordinator = Coordinator::new(remote.clone(), Arc::new(CountingOcr::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coordinator
            .extract(&PdfSource::Bytes(b"%PDF-".to_vec()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
        assert_eq!(remote.bytes_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sources_are_parsed_from_arguments() {
        assert!(matches!(
            PdfSource::from_arg(URL).await.unwrap(),
            PdfSource::Url(url) if url == URL
        ));

        let mut pdf = tempfile::NamedTempFile::new().unwrap();
        pdf.write_all(b"%PDF-1.7\n").unwrap();
        let path = pdf.path().to_str().unwrap().to_owned();
        assert!(matches!(
            PdfSource::from_arg(&path).await.unwrap(),
            PdfSource::Bytes(_)
        ));

        let mut html = tempfile::NamedTempFile::new().unwrap();
        html.write_all(b"<html></html>").unwrap();
        let path = html.path().to_str().unwrap().to_owned();
        assert!(PdfSource::from_arg(&path).await.is_err());
    }
}
