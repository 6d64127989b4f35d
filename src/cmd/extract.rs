//! The `extract` subcommand.

use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::{
    coordinator::{Coordinator, PdfSource},
    ocr::{OcrOpts, SplitPagesOcrEngine},
    output::{OutputOpts, render, write_output},
    prelude::*,
    remote::{RemoteOpts, jina::JinaReader},
    ui::Ui,
};

/// Extract command line arguments.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    /// A PDF file, or an http(s) URL pointing to one.
    #[clap(value_name = "PDF")]
    pub input: String,

    #[clap(flatten)]
    pub remote: RemoteOpts,

    #[clap(flatten)]
    pub ocr: OcrOpts,

    #[clap(flatten)]
    pub output: OutputOpts,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input))]
pub async fn cmd_extract(
    ui: Ui,
    opts: &ExtractOpts,
    cancel: &CancellationToken,
) -> Result<()> {
    let source = PdfSource::from_arg(&opts.input).await?;
    let coordinator = Coordinator::new(
        Arc::new(JinaReader::new(&opts.remote)?),
        Arc::new(SplitPagesOcrEngine::from_opts(&opts.ocr, ui)?),
    );
    let result = coordinator.extract(&source, cancel).await?;
    let rendered = render(result, &opts.output)?;
    write_output(opts.output.output_path.as_deref(), &rendered).await
}
