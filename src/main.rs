use std::str::FromStr;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod cmd;
mod coordinator;
mod cpu_limit;
mod download;
mod errors;
mod ocr;
mod output;
mod prelude;
mod quality;
mod rasterize;
mod remote;
mod retry;
mod ui;

/// Extract text from PDFs, using a reader service first and local OCR as a
/// fallback.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - READER_API_BASE (optional): Override the reader service URL.
    Defaults to https://r.jina.ai/.
  - RUST_LOG (optional): Logging filter, like `debug` or
    `pdf_fallback_ocr=trace`.

  These variables may be set in a standard `.env` file.

Local OCR requires `pdfinfo`, `pdftocairo` (from Poppler) and `tesseract`.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Extract text from a PDF, falling back to OCR if the reader service
    /// returns too little text.
    Extract(cmd::extract::ExtractOpts),
    /// Ask only the reader service.
    Remote(cmd::remote::RemoteCmdOpts),
    /// Only run local OCR.
    Ocr(cmd::ocr::OcrCmdOpts),
    /// Print schemas for output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Extract(opts) => opts.output.output_path.is_none(),
            Cmd::Remote(opts) => opts.output.output_path.is_none(),
            Cmd::Ocr(opts) => opts.output.output_path.is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Ctrl-C cancels whatever request is in flight.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match &opts.subcmd {
        Cmd::Extract(opts) => cmd::extract::cmd_extract(ui, opts, &cancel).await?,
        Cmd::Remote(opts) => cmd::remote::cmd_remote(ui, opts, &cancel).await?,
        Cmd::Ocr(opts) => cmd::ocr::cmd_ocr(ui, opts, &cancel).await?,
        Cmd::Schema(schema_opts) => cmd::schema::cmd_schema(schema_opts).await?,
    }
    Ok(())
}
