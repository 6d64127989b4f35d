//! Tesseract OCR engine.

use image::GrayImage;
use tokio::process::Command;

use super::{OcrEngine, TokenRow};
use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    cpu_limit::with_cpu_semaphore,
    prelude::*,
};

/// OCR engine wrapping the `tesseract` CLI tool.
pub struct TesseractOcrEngine {
    /// Tesseract language code, like `eng` or `eng+fra`.
    language: String,
}

impl TesseractOcrEngine {
    /// Create a new `tesseract` engine.
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcrEngine {
    #[instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    async fn image_to_data(&self, image: GrayImage) -> Result<Vec<TokenRow>> {
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join("input.png");

        // PNG encoding a full page takes a while.
        let path = input_path.clone();
        spawn_blocking_propagating_panics(move || {
            image
                .save(&path)
                .context("cannot write tesseract input file")
        })
        .await?;

        let output = with_cpu_semaphore(|| async {
            Command::new("tesseract")
                .kill_on_drop(true)
                .arg(&input_path)
                .arg("stdout")
                .arg("-l")
                .arg(&self.language)
                .arg("tsv")
                .output()
                .await
                .context("cannot run tesseract")
        })
        .await?;
        check_for_command_failure("tesseract", &output, None)?;

        parse_tsv(&output.stdout)
    }
}

/// Parse Tesseract's TSV output.
///
/// The `text` column is raw, so quotes have no special meaning, and rows
/// without any text may omit it entirely.
pub fn parse_tsv(data: &[u8]) -> Result<Vec<TokenRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_reader(data);
    let headers = rdr
        .headers()
        .context("cannot read tesseract output header")?
        .clone();
    rdr.records()
        .enumerate()
        .map(|(idx, record)| {
            let mut record = record
                .with_context(|| format!("cannot read tesseract output row {}", idx + 1))?;
            // Only the trailing `text` column may be missing.
            if record.len() + 1 == headers.len() {
                record.push_field("");
            }
            record
                .deserialize::<TokenRow>(Some(&headers))
                .with_context(|| format!("cannot parse tesseract output row {}", idx + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engines::level;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t2550\t3300\t-1\t
2\t1\t1\t0\t0\t0\t300\t200\t900\t60\t-1\t
3\t1\t1\t1\t0\t0\t300\t200\t900\t60\t-1\t
4\t1\t1\t1\t1\t0\t300\t200\t900\t60\t-1\t
5\t1\t1\t1\t1\t1\t300\t200\t400\t60\t96.512344\t\"Quoted\"
5\t1\t1\t1\t1\t2\t720\t200\t480\t60\t91\tHeader
2\t1\t2\t0\t0\t0\t300\t400\t900\t60\t-1
";

    #[test]
    fn parses_tesseract_tsv() {
        let rows = parse_tsv(SAMPLE_TSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].level, level::PAGE);
        assert_eq!(rows[0].text, "");
        assert_eq!(rows[4].text, "\"Quoted\"");
        assert!((rows[4].conf - 96.512344).abs() < 1e-4);
        assert!(rows[5].is_word());
        assert_eq!(rows[5].text, "Header");
        // Row with no text column at all.
        assert_eq!(rows[6].block_num, 2);
        assert_eq!(rows[6].text, "");
    }

    #[test]
    fn accepts_rows_without_a_text_column() {
        let data = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
2\t1\t1\t0\t0\t0\t3\t2\t9\t6\t-1
";
        let rows = parse_tsv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].level, level::BLOCK);
        assert_eq!(rows[0].text, "");
    }

    #[test]
    fn rejects_rows_missing_more_than_the_text() {
        let data = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
2\t1\t1\t0\t0\t0\t3\t2\t9\t6
";
        assert!(parse_tsv(data.as_bytes()).is_err());
    }

    #[test]
    fn rejects_garbage() {
        let data = "level\tpage_num\nnot-a-number\t1\n";
        assert!(parse_tsv(data.as_bytes()).is_err());
    }

    #[tokio::test]
    #[ignore = "Requires tesseract to be installed"]
    async fn blank_page_has_no_words() -> Result<()> {
        let image = GrayImage::from_pixel(200, 100, image::Luma([255]));
        let rows = TesseractOcrEngine::new("eng").image_to_data(image).await?;
        assert!(rows.iter().all(|row| !row.is_word() || row.text.trim().is_empty()));
        Ok(())
    }
}
