//! Local OCR for whole documents.

use std::{sync::Arc, time::Duration};

use clap::Args;
use futures::{StreamExt as _, stream};
use tokio_util::sync::CancellationToken;

use self::{
    engines::tesseract::TesseractOcrEngine,
    page::{ConfidencePolicy, PageOcrPipeline},
};
use crate::{
    download::{Downloader, HttpDownloader},
    errors::ExtractError,
    prelude::*,
    rasterize::{PopplerRasterizer, RasterizeOpts, Rasterizer},
    ui::{ProgressConfig, Ui},
};

pub mod deskew;
pub mod engines;
pub mod page;

/// The OCR result for one page.
#[derive(Clone, Debug, PartialEq)]
pub struct PageResult {
    /// 1-based page number.
    pub page_number: usize,
    /// Body text, or a description of what went wrong.
    pub text: String,
    /// From 0.0 to 1.0, or -1.0 if the page failed.
    pub confidence: f32,
}

/// Local OCR options.
#[derive(Args, Clone, Debug)]
pub struct OcrOpts {
    /// How many pages to OCR at once.
    #[clap(short = 'j', long, default_value_t = num_cpus::get())]
    pub jobs: usize,

    /// Tesseract language code, like `eng` or `eng+fra`.
    #[clap(long, default_value = "eng")]
    pub language: String,

    /// How to compute page confidence.
    #[clap(long, value_enum, default_value_t = ConfidencePolicy::Fixed)]
    pub confidence: ConfidencePolicy,

    /// A timeout, in seconds, for downloading PDFs from URLs.
    #[clap(long, default_value = "120")]
    pub download_timeout: u64,

    #[clap(flatten)]
    pub rasterize: RasterizeOpts,
}

/// OCR for a complete PDF.
#[async_trait]
pub trait DocumentOcrEngine: Send + Sync + 'static {
    /// OCR every page of `pdf`.
    async fn ocr_bytes(
        &self,
        pdf: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<PageResult>, ExtractError>;

    /// Download the PDF at `url` and OCR every page.
    async fn ocr_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageResult>, ExtractError>;
}

/// A [`DocumentOcrEngine`] that splits a document into page images, and OCRs
/// each page.
pub struct SplitPagesOcrEngine {
    rasterizer: Arc<dyn Rasterizer>,
    downloader: Arc<dyn Downloader>,
    pipeline: Arc<PageOcrPipeline>,
    concurrency_limit: usize,
    ui: Ui,
}

impl SplitPagesOcrEngine {
    /// Create a new `SplitPagesOcrEngine`.
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        downloader: Arc<dyn Downloader>,
        pipeline: Arc<PageOcrPipeline>,
        concurrency_limit: usize,
        ui: Ui,
    ) -> Self {
        Self {
            rasterizer,
            downloader,
            pipeline,
            concurrency_limit: concurrency_limit.max(1),
            ui,
        }
    }

    /// Create a `SplitPagesOcrEngine` using Poppler and Tesseract.
    pub fn from_opts(opts: &OcrOpts, ui: Ui) -> Result<Self> {
        let engine = Arc::new(TesseractOcrEngine::new(opts.language.clone()));
        let downloader =
            HttpDownloader::new(Duration::from_secs(opts.download_timeout))?;
        Ok(Self::new(
            Arc::new(PopplerRasterizer::new(opts.rasterize.clone())),
            Arc::new(downloader),
            Arc::new(PageOcrPipeline::new(engine, opts.confidence)),
            opts.jobs,
            ui,
        ))
    }

    /// Rasterize `pdf` and OCR the pages, without watching for cancellation.
    async fn ocr_pdf(&self, pdf: &[u8]) -> Result<Vec<PageResult>, ExtractError> {
        let images = self
            .rasterizer
            .rasterize(pdf)
            .await
            .map_err(ExtractError::Conversion)?;
        if images.is_empty() {
            return Err(ExtractError::Conversion(anyhow!("PDF has no pages")));
        }
        debug!(pages = images.len(), "OCRing pages");

        let pb = self.ui.new_progress_bar(
            &ProgressConfig {
                emoji: "📄",
                msg: "OCRing pages",
                done_msg: "OCRed pages",
            },
            images.len() as u64,
        );
        let page_results = stream::iter(images.into_iter().enumerate())
            .map(|(page_idx, image)| {
                let pipeline = self.pipeline.clone();
                async move {
                    let page = pipeline.process_page(image).await;
                    PageResult {
                        page_number: page_idx + 1,
                        text: page.text,
                        confidence: page.confidence,
                    }
                }
            })
            // Work on several pages at once, but keep them in page order.
            .buffered(self.concurrency_limit);
        Ok(pb.wrap_stream(page_results).collect::<Vec<_>>().await)
    }
}

#[async_trait]
impl DocumentOcrEngine for SplitPagesOcrEngine {
    #[instrument(level = "debug", skip_all, fields(bytes = pdf.len()))]
    async fn ocr_bytes(
        &self,
        pdf: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<PageResult>, ExtractError> {
        // Dropping the page futures kills any running external processes.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExtractError::Cancelled),
            result = self.ocr_pdf(pdf) => result,
        }
    }

    #[instrument(level = "debug", skip_all, fields(url = %url))]
    async fn ocr_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageResult>, ExtractError> {
        let pdf = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
            result = self.downloader.download_pdf(url) => {
                result.map_err(|source| ExtractError::Download {
                    url: url.to_owned(),
                    source,
                })?
            }
        };
        self.ocr_bytes(&pdf, cancel).await
    }
}
