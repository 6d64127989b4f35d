//! OCR engine interface.
//!
//! An engine turns one page image into Tesseract's token table. Everything
//! above that (deskewing, header and footer removal, confidence) lives in
//! [`super::page`], so that it works the same way for any engine.

use image::GrayImage;

use crate::prelude::*;

pub mod tesseract;

/// Values of [`TokenRow::level`].
#[allow(dead_code)]
pub mod level {
    pub const PAGE: u32 = 1;
    pub const BLOCK: u32 = 2;
    pub const PARAGRAPH: u32 = 3;
    pub const LINE: u32 = 4;
    pub const WORD: u32 = 5;
}

/// One row of an OCR token table, in Tesseract's TSV layout.
///
/// Rows form a hierarchy (page, block, paragraph, line, word), flattened into
/// a table in reading order. Only word rows carry text.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TokenRow {
    pub level: u32,
    pub page_num: u32,
    pub block_num: u32,
    pub par_num: u32,
    pub line_num: u32,
    pub word_num: u32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// Word confidence from 0 to 100, or -1 for rows which aren't words.
    pub conf: f32,
    #[serde(default)]
    pub text: String,
}

impl TokenRow {
    /// Is this a word row?
    pub fn is_word(&self) -> bool {
        self.level == level::WORD
    }
}

/// Something that can read the words on a page image.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Return the token table for `image`.
    async fn image_to_data(&self, image: GrayImage) -> Result<Vec<TokenRow>>;
}
