//! The word-count quality gate.
//!
//! Reader output is only trusted when it contains a reasonable amount of text.
//! Scanned PDFs typically come back from the reader service as an empty or
//! near-empty document, which is our cue to OCR them locally.

use std::io;

use serde_json::ser::Formatter;

use crate::prelude::*;

/// The number of words that separates "real" text from "basically nothing".
pub const WORD_THRESHOLD: usize = 50;

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Should we accept this text instead of falling back to OCR?
///
/// Note that this requires _more than_ [`WORD_THRESHOLD`] words.
pub fn passes_quality_gate(text: &str) -> bool {
    word_count(text) > WORD_THRESHOLD
}

/// Count the words in the printed representation of a JSON value.
///
/// The reader service's `data` field is an object, and we judge it as a
/// whole, keys and all. We render it with a space after every `,` and `:` so
/// that keys, values and list items are counted as separate words, the way a
/// person reading the payload would count them.
pub fn repr_word_count(value: &Value) -> usize {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    match value.serialize(&mut serializer) {
        Ok(()) => word_count(&String::from_utf8_lossy(&buf)),
        Err(err) => {
            // Serializing a `Value` into memory should never fail.
            warn!("could not render JSON value for word count: {err}");
            word_count(&value.to_string())
        }
    }
}

/// A compact JSON formatter which puts a space after separators.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
