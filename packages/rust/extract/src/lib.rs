//! Text extraction adapter.
//!
//! Turns uploaded document blobs into plain text and aggregates every blob of a
//! category into one [`ExtractedText`], each source preceded by a provenance
//! header naming the file it came from.

mod docx;

use std::path::Path;

use tracing::{debug, instrument, warn};

use sdsynth_shared::{DocumentCategory, ExtractedText, Result, SynthError};

/// An uploaded document: raw bytes plus the name and category it was given.
#[derive(Debug, Clone)]
pub struct DocumentBlob {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub category: DocumentCategory,
}

impl DocumentBlob {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>, category: DocumentCategory) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            category,
        }
    }

    /// Read a blob from disk. The file name (without directories) becomes the
    /// provenance label.
    pub fn from_path(path: &Path, category: DocumentCategory) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| SynthError::io(path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(filename, bytes, category))
    }

    /// Lower-cased extension of the file name, empty when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Supported source formats, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    PlainText,
    Pdf,
    Docx,
}

impl SourceFormat {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" | "md" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

/// Extract the plain text of a single blob.
pub fn extract_blob(blob: &DocumentBlob) -> Result<String> {
    let ext = blob.extension();
    let format = SourceFormat::from_extension(&ext)
        .ok_or(SynthError::UnsupportedFileType { extension: ext })?;

    match format {
        SourceFormat::PlainText => String::from_utf8(blob.bytes.clone())
            .map_err(|e| SynthError::extraction(&blob.filename, format!("not valid UTF-8: {e}"))),
        SourceFormat::Pdf => pdf_extract::extract_text_from_mem(&blob.bytes)
            .map_err(|e| SynthError::extraction(&blob.filename, format!("failed to read PDF: {e}"))),
        SourceFormat::Docx => docx::extract_docx(&blob.bytes)
            .map_err(|message| SynthError::extraction(&blob.filename, message)),
    }
}

/// Aggregated text for one category plus the blobs that could not be read.
#[derive(Debug, Default)]
pub struct CategoryExtraction {
    pub text: ExtractedText,
    pub failures: Vec<(String, SynthError)>,
}

impl CategoryExtraction {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Provenance header placed before each source's text.
pub fn provenance_header(filename: &str) -> String {
    format!("\n\n--- Content from {filename} ---\n\n")
}

/// Concatenate every blob in upload order. A blob that fails still contributes
/// its header; its error is collected instead of aborting the category.
#[instrument(skip_all, fields(blobs = blobs.len()))]
pub fn extract_category(blobs: &[DocumentBlob]) -> CategoryExtraction {
    let mut combined = String::new();
    let mut failures = Vec::new();

    for blob in blobs {
        combined.push_str(&provenance_header(&blob.filename));
        match extract_blob(blob) {
            Ok(text) => {
                debug!(file = %blob.filename, bytes = text.len(), "extracted");
                combined.push_str(&text);
            }
            Err(e) => {
                warn!(file = %blob.filename, error = %e, "extraction failed");
                failures.push((blob.filename.clone(), e));
            }
        }
    }

    CategoryExtraction {
        text: ExtractedText::new(combined),
        failures,
    }
}
