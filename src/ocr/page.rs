//! OCR for a single page image.

use std::sync::Arc;

use clap::ValueEnum;
use image::DynamicImage;

use super::{
    deskew::deskew,
    engines::{OcrEngine, TokenRow, level},
};
use crate::{async_utils::spawn_blocking_propagating_panics, prelude::*};

/// The confidence reported by [`ConfidencePolicy::Fixed`].
pub const PLACEHOLDER_CONFIDENCE: f32 = 0.99;

/// The confidence reported for a page we could not OCR.
pub const FAILED_CONFIDENCE: f32 = -1.0;

/// How to compute a page's confidence score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ConfidencePolicy {
    /// Always report 0.99.
    #[default]
    Fixed,
    /// Report the mean Tesseract word confidence, scaled to 0.0 to 1.0.
    MeanWordConfidence,
}

/// The result of OCRing one page.
#[derive(Clone, Debug, PartialEq)]
pub struct PageOcr {
    /// A score from 0.0 to 1.0, or [`FAILED_CONFIDENCE`].
    pub confidence: f32,
    /// The body text of the page, or an error description.
    pub text: String,
}

/// Turns page images into body text.
///
/// Each page is converted to grayscale, deskewed, OCRed, and stripped of its
/// first block (usually the running header) and last block (usually the
/// footer or page number).
pub struct PageOcrPipeline {
    engine: Arc<dyn OcrEngine>,
    confidence_policy: ConfidencePolicy,
}

impl PageOcrPipeline {
    pub fn new(engine: Arc<dyn OcrEngine>, confidence_policy: ConfidencePolicy) -> Self {
        Self {
            engine,
            confidence_policy,
        }
    }

    /// OCR a page. This never fails. Instead, failures are reported with a
    /// confidence of [`FAILED_CONFIDENCE`] and the error as the text, so that
    /// one bad page doesn't cost us the rest of the document.
    pub async fn process_page(&self, image: DynamicImage) -> PageOcr {
        match self.try_process_page(image).await {
            Ok(page) => page,
            Err(err) => {
                warn!("Could not OCR page: {err:#}");
                PageOcr {
                    confidence: FAILED_CONFIDENCE,
                    text: format!("{err:#}"),
                }
            }
        }
    }

    async fn try_process_page(&self, image: DynamicImage) -> Result<PageOcr> {
        let deskewed = spawn_blocking_propagating_panics(move || {
            let gray = image.into_luma8();
            deskew(&gray).map(|(deskewed, _angle)| deskewed)
        })
        .await
        .context("could not deskew page")?;

        let rows = self.engine.image_to_data(deskewed).await?;
        let text = body_text(&rows)?;
        let confidence = match self.confidence_policy {
            ConfidencePolicy::Fixed => PLACEHOLDER_CONFIDENCE,
            ConfidencePolicy::MeanWordConfidence => mean_word_confidence(&rows),
        };
        Ok(PageOcr { confidence, text })
    }
}

/// Join the words of a token table, skipping the header and footer blocks.
///
/// The header is block 1, and the footer is the highest-numbered block.
/// Words keep their table order.
pub fn body_text(rows: &[TokenRow]) -> Result<String> {
    let footer_block = rows
        .iter()
        .filter(|row| row.level == level::BLOCK)
        .map(|row| row.block_num)
        .max()
        .ok_or_else(|| anyhow!("OCR found no text blocks on this page"))?;

    let words = rows
        .iter()
        .filter(|row| {
            row.is_word() && row.block_num != 1 && row.block_num != footer_block
        })
        .map(|row| row.text.as_str())
        .collect::<Vec<_>>();
    Ok(words.join(" "))
}

/// The average confidence of all words, from 0.0 to 1.0.
pub fn mean_word_confidence(rows: &[TokenRow]) -> f32 {
    let confidences = rows
        .iter()
        .filter(|row| row.is_word() && row.conf >= 0.0)
        .map(|row| row.conf)
        .collect::<Vec<_>>();
    if confidences.is_empty() {
        return 0.0;
    }
    let mean = confidences.iter().sum::<f32>() / confidences.len() as f32;
    (mean / 100.0).clamp(0.0, 1.0)
}
