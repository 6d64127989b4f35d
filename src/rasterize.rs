//! Turning PDFs into page images, using Poppler's command-line tools.

use std::{
    collections::BTreeMap,
    sync::LazyLock,
};

use clap::Args;
use image::DynamicImage;
use regex::Regex;
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    cpu_limit::with_cpu_semaphore,
    prelude::*,
};

/// MIME type we insist on before handing anything to Poppler.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// A default error regex for checking command output.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Page numbers in `pdftocairo` output file names, which may be zero-padded.
static PAGE_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)\.png$").expect("failed to compile regex"));

/// Does this line contain an error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// Rasterization options.
#[derive(Args, Clone, Debug)]
pub struct RasterizeOpts {
    /// The DPI to use when rasterizing PDF pages.
    #[clap(long, default_value = "300")]
    pub rasterize_dpi: u32,

    /// Only OCR the first N pages.
    #[clap(long)]
    pub max_pages: Option<usize>,
}

impl Default for RasterizeOpts {
    fn default() -> Self {
        Self {
            rasterize_dpi: 300,
            max_pages: None,
        }
    }
}

/// Something that can turn a PDF into page images.
#[async_trait]
pub trait Rasterizer: Send + Sync + 'static {
    /// Render every page of `pdf`, in page order.
    async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<DynamicImage>>;
}

/// A [`Rasterizer`] using `pdfinfo` and `pdftocairo`.
pub struct PopplerRasterizer {
    opts: RasterizeOpts,
}

impl PopplerRasterizer {
    /// Create a new rasterizer.
    pub fn new(opts: RasterizeOpts) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl Rasterizer for PopplerRasterizer {
    #[instrument(level = "debug", skip_all, fields(bytes = pdf.len(), dpi = self.opts.rasterize_dpi))]
    async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<DynamicImage>> {
        check_is_pdf(pdf)?;

        // Poppler wants a real file.
        let tmpdir = tempfile::TempDir::with_prefix("pages")?;
        let pdf_path = tmpdir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, pdf)
            .await
            .with_context(|| format!("failed to write {:?}", pdf_path.display()))?;

        let total_pages = get_pdf_page_count(&pdf_path).await?;
        if total_pages == 0 {
            return Err(anyhow!("PDF has no pages"));
        }

        let out_dir = tmpdir.path().join("out");
        tokio::fs::create_dir(&out_dir)
            .await
            .context("failed to create page image directory")?;

        // We use `with_cpu_semaphore` because `pdftocairo` will use _at least_
        // 100% of a CPU.
        let mut cmd = Command::new("pdftocairo");
        cmd.kill_on_drop(true)
            .arg("-png")
            .arg("-r")
            .arg(self.opts.rasterize_dpi.to_string());
        add_last_page_arg_if_needed(&self.opts, total_pages, &mut cmd);
        let output = with_cpu_semaphore(|| async {
            cmd.arg(&pdf_path)
                .arg(out_dir.join("page"))
                .output()
                .await
                .context("failed to run pdftocairo")
        })
        .await?;
        check_for_command_failure("pdftocairo", &output, Some(&is_error_line))?;

        let page_paths = sorted_page_paths(&out_dir)?;
        if page_paths.is_empty() {
            return Err(anyhow!("pdftocairo produced no pages"));
        }
        debug!(pages = page_paths.len(), total_pages, "Rasterized PDF");

        // Decoding 300 DPI PNGs is real work, so keep it off the executor. The
        // temporary directory moves along so it outlives the reads.
        spawn_blocking_propagating_panics(move || {
            let images = page_paths
                .iter()
                .map(|path| {
                    image::open(path).with_context(|| {
                        format!("failed to decode page image {:?}", path.display())
                    })
                })
                .collect::<Result<Vec<_>>>();
            drop(tmpdir);
            images
        })
        .await
    }
}

/// Reject anything that does not look like a PDF.
pub fn check_is_pdf(data: &[u8]) -> Result<()> {
    let mime_type = infer::get(data)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");
    if mime_type != PDF_MIME_TYPE {
        return Err(anyhow!("expected a PDF file, found {mime_type}"));
    }
    Ok(())
}

/// List the PNG files in `dir`, ordered by page number.
fn sorted_page_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages = BTreeMap::new();
    for entry in dir
        .read_dir()
        .with_context(|| format!("failed to read directory {:?}", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("failed to read entry in {:?}", dir.display()))?
            .path();
        let Some(page) = page_number_from_path(&path) else {
            warn!(path = %path.display(), "Ignoring unexpected file");
            continue;
        };
        pages.insert(page, path);
    }
    Ok(pages.into_values().collect())
}

/// Extract the page number from a `pdftocairo` output file name.
fn page_number_from_path(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    PAGE_NUMBER_REGEX.captures(name)?.get(1)?.as_str().parse().ok()
}

/// Get the number of pages in a PDF file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn get_pdf_page_count(path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .kill_on_drop(true)
        .arg(path)
        .output()
        .await
        .with_context(|| format!("failed to run pdfinfo on {:?}", path.display()))?;
    check_for_command_failure("pdfinfo", &output, None)?;

    let output =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    parse_pdfinfo_page_count(&output)
}

/// Find the `Pages:` line in `pdfinfo` output.
fn parse_pdfinfo_page_count(output: &str) -> Result<usize> {
    let page_count_str = output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "Pages")
        .map(|(_, value)| value.trim())
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str
        .parse::<usize>()
        .with_context(|| format!("failed to parse page count {page_count_str:?}"))
}

/// Add a "last page" argument to a [`Command`].
fn add_last_page_arg_if_needed(opts: &RasterizeOpts, total_pages: usize, cmd: &mut Command) {
    if let Some(max_pages) = opts.max_pages
        && total_pages > max_pages
    {
        // Poppler page ranges are 1-based and inclusive.
        cmd.arg("-l").arg(max_pages.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_PDF_PATH: &str = "tests/fixtures/two_pages.pdf";

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("error: something went wrong"));
        assert!(is_error_line("Syntax Error: Couldn't find trailer dictionary"));
        assert!(!is_error_line("Syntax Warning: something is odd"));
        assert!(!is_error_line(
            "Internal Error: xref num 1234 not found but needed, document has changes, reconstruct aborted"
        ));
    }

    #[test]
    fn page_numbers_sort_numerically() {
        assert_eq!(page_number_from_path(Path::new("/tmp/x/page-07.png")), Some(7));
        assert_eq!(page_number_from_path(Path::new("/tmp/x/page-12.png")), Some(12));
        assert_eq!(page_number_from_path(Path::new("/tmp/x/input.pdf")), None);
    }

    #[test]
    fn pdfinfo_output_is_parsed() {
        let output = "Title:          Report\nPages:          3\nEncrypted:      no\n";
        assert_eq!(parse_pdfinfo_page_count(output).unwrap(), 3);
        assert!(parse_pdfinfo_page_count("Title: Report\n").is_err());
    }

    #[test]
    fn non_pdf_input_is_rejected() {
        assert!(check_is_pdf(b"<html>not a pdf</html>").is_err());
        assert!(check_is_pdf(b"%PDF-1.7\n").is_ok());
    }

    #[tokio::test]
    async fn rasterizer_rejects_non_pdf_before_running_poppler() {
        let rasterizer = PopplerRasterizer::new(RasterizeOpts::default());
        let err = rasterizer.rasterize(b"GIF89a").await.unwrap_err();
        assert!(err.to_string().contains("expected a PDF"));
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn page_count_returns_correct_number_of_pages() -> Result<()> {
        let page_count = get_pdf_page_count(Path::new(TEST_PDF_PATH)).await?;
        assert_eq!(page_count, 2);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn rasterizer_obeys_max_pages() -> Result<()> {
        let pdf = tokio::fs::read(TEST_PDF_PATH).await?;
        let all = PopplerRasterizer::new(RasterizeOpts::default())
            .rasterize(&pdf)
            .await?;
        assert_eq!(all.len(), 2);

        let first = PopplerRasterizer::new(RasterizeOpts {
            rasterize_dpi: 72,
            max_pages: Some(1),
        })
        .rasterize(&pdf)
        .await?;
        assert_eq!(first.len(), 1);
        Ok(())
    }
}
