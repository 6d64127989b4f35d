//! The `ocr` subcommand, which skips the reader service.

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::{
    coordinator::{ExtractionResult, PdfSource},
    ocr::{DocumentOcrEngine as _, OcrOpts, SplitPagesOcrEngine},
    output::{OutputOpts, render, write_output},
    prelude::*,
    ui::Ui,
};

/// OCR command line arguments.
#[derive(Debug, Args)]
pub struct OcrCmdOpts {
    /// A PDF file, or an http(s) URL pointing to one.
    #[clap(value_name = "PDF")]
    pub input: String,

    #[clap(flatten)]
    pub ocr: OcrOpts,

    #[clap(flatten)]
    pub output: OutputOpts,
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input))]
pub async fn cmd_ocr(ui: Ui, opts: &OcrCmdOpts, cancel: &CancellationToken) -> Result<()> {
    let source = PdfSource::from_arg(&opts.input).await?;
    let engine = SplitPagesOcrEngine::from_opts(&opts.ocr, ui)?;
    let pages = match &source {
        PdfSource::Url(url) => engine.ocr_url(url, cancel).await?,
        PdfSource::Bytes(pdf) => engine.ocr_bytes(pdf, cancel).await?,
    };
    let rendered = render(ExtractionResult::Pages(pages), &opts.output)?;
    write_output(opts.output.output_path.as_deref(), &rendered).await
}
