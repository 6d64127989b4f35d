//! Writing extraction results.

use clap::{Args, ValueEnum};
use schemars::JsonSchema;
use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt as _, BufWriter},
};

use crate::{coordinator::ExtractionResult, ocr::PageResult, prelude::*};

/// Separator between pages in plain-text output.
pub const PAGE_BREAK: &str = "\n\x0C\n";

/// Output options shared by the subcommands.
#[derive(Args, Clone, Debug)]
pub struct OutputOpts {
    /// Output file. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    /// Output format.
    #[clap(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Include per-page OCR confidence in JSON output.
    #[clap(long)]
    pub include_confidence: bool,
}

/// How to print our results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// A JSON string for reader text, or a JSON array of pages for OCR.
    Json,
    /// Plain text, with pages separated by form feeds.
    Text,
}

/// The JSON we print.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractionOutput {
    /// Text returned by the reader service.
    Text(String),
    /// Text from local OCR, in page order.
    Pages(Vec<PageRecord>),
}

/// OCR output for a single page.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct PageRecord {
    /// 1-based page number.
    pub page_number: usize,
    /// Body text, without the header and footer. If OCR failed, this describes
    /// the error instead.
    pub text: String,
    /// From 0.0 to 1.0, or -1.0 if OCR failed. Only present on request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl PageRecord {
    fn from_page(page: PageResult, include_confidence: bool) -> Self {
        Self {
            page_number: page.page_number,
            text: page.text,
            confidence: include_confidence.then_some(page.confidence),
        }
    }
}

impl ExtractionOutput {
    pub fn new(result: ExtractionResult, include_confidence: bool) -> Self {
        match result {
            ExtractionResult::Remote(text) => Self::Text(text),
            ExtractionResult::Pages(pages) => Self::Pages(
                pages
                    .into_iter()
                    .map(|page| PageRecord::from_page(page, include_confidence))
                    .collect(),
            ),
        }
    }
}

/// Render `result` in the requested format.
pub fn render(result: ExtractionResult, opts: &OutputOpts) -> Result<String> {
    let mut rendered = match opts.format {
        OutputFormat::Json => {
            let output = ExtractionOutput::new(result, opts.include_confidence);
            serde_json::to_string_pretty(&output).context("failed to serialize output")?
        }
        OutputFormat::Text => match result {
            ExtractionResult::Remote(text) => text,
            ExtractionResult::Pages(pages) => pages
                .into_iter()
                .map(|page| page.text)
                .collect::<Vec<_>>()
                .join(PAGE_BREAK),
        },
    };
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write `contents` to either standard output or a file.
pub async fn write_output(path: Option<&Path>, contents: &str) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    writer
        .write_all(contents.as_bytes())
        .await
        .context("Failed to write output")?;
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}
