//! Core domain types for the synthesizer.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SynthError};

/// Prefix shared by every auto-numbered change-request key.
pub const CR_PREFIX: &str = "CR";

/// Zero-padded width of the numeric part of an auto-numbered key.
pub const CR_DIGITS: usize = 6;

static CR_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CR([0-9]+)$").expect("valid regex"));

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CrKey
// ---------------------------------------------------------------------------

/// A change-request identifier, the key of a knowledge base record.
///
/// Auto-generated keys have the form `CR` + 6-digit zero-padded number
/// (`CR000001`). Keys typed by a user are accepted as-is once trimmed, so a
/// key need not follow the numbered format; [`CrKey::number`] returns `None`
/// for such keys and they are ignored when computing the next key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrKey(String);

impl CrKey {
    /// Build a numbered key, e.g. `CrKey::from_number(4)` is `CR000004`.
    pub fn from_number(n: u64) -> Self {
        Self(format!("{CR_PREFIX}{n:0width$}", width = CR_DIGITS))
    }

    /// Parse a user-supplied key. Surrounding whitespace is removed; an empty
    /// key is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SynthError::validation("change request key must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Numeric suffix for keys matching `CR` + digits.
    pub fn number(&self) -> Option<u64> {
        numeric_suffix(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CrKey {
    type Err = SynthError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CrKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Numeric suffix of a raw key string if it matches `CR` + digits.
///
/// Suffixes with no successor in `u64` are treated as non-conforming, so
/// the next key can always be computed.
pub fn numeric_suffix(key: &str) -> Option<u64> {
    CR_KEY_RE
        .captures(key)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .filter(|n| *n < u64::MAX)
}

// ---------------------------------------------------------------------------
// DocumentCategory
// ---------------------------------------------------------------------------

/// The declared category of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Regulatory,
    BusinessRequirement,
    Supporting,
}

impl DocumentCategory {
    /// Short name used in logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regulatory => "regulatory",
            Self::BusinessRequirement => "business_requirement",
            Self::Supporting => "supporting",
        }
    }

    /// Description handed to the relevance classifier.
    pub fn classifier_label(&self) -> &'static str {
        match self {
            Self::Regulatory => "Regulatory or Compliance",
            Self::BusinessRequirement => "Business Requirement or Use Case",
            Self::Supporting => "Supporting Reference",
        }
    }

    /// Heading used when reporting problems with this category to the user.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Regulatory => "Regulatory Document",
            Self::BusinessRequirement => "BRD/URF Document",
            Self::Supporting => "Supporting Document",
        }
    }
}

impl std::fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExtractedText
// ---------------------------------------------------------------------------

/// Plain text aggregated from every document of one category, trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedText(String);

impl ExtractedText {
    /// Wrap text, trimming leading and trailing whitespace.
    pub fn new(text: impl AsRef<str>) -> Self {
        Self(text.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// The first `max_chars` characters (not bytes).
    pub fn head(&self, max_chars: usize) -> &str {
        head_chars(&self.0, max_chars)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Slice `text` to at most `max_chars` characters on a char boundary.
pub fn head_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// SourceTexts
// ---------------------------------------------------------------------------

/// Every input a synthesis request embeds, cached across a supplement pause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTexts {
    pub regulatory: ExtractedText,
    pub business: ExtractedText,
    /// Optional supporting text; may grow with user-supplied supplements.
    pub supporting: String,
    /// Raw template markup.
    pub template: String,
    /// Previously stored document used as non-authoritative background.
    pub parent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cr_key_from_number_is_zero_padded() {
        assert_eq!(CrKey::from_number(1).as_str(), "CR000001");
        assert_eq!(CrKey::from_number(1234567).as_str(), "CR1234567");
    }

    #[test]
    fn cr_key_number_ignores_non_conforming_keys() {
        assert_eq!(CrKey::parse("CR000042").unwrap().number(), Some(42));
        assert_eq!(CrKey::parse("CR").unwrap().number(), None);
        assert_eq!(CrKey::parse("legacy-7").unwrap().number(), None);
        assert_eq!(CrKey::parse("cr000001").unwrap().number(), None);
        assert_eq!(numeric_suffix("CR12a"), None);
        assert_eq!(numeric_suffix("CR18446744073709551614"), Some(u64::MAX - 1));
        assert_eq!(numeric_suffix("CR18446744073709551615"), None);
    }

    #[test]
    fn cr_key_parse_trims_and_rejects_empty() {
        assert_eq!(CrKey::parse("  CR000009 ").unwrap().as_str(), "CR000009");
        assert!(CrKey::parse("   ").is_err());
    }

    #[test]
    fn extracted_text_trims_and_truncates_on_chars() {
        let text = ExtractedText::new("\n  héllo wörld \n");
        assert_eq!(text.as_str(), "héllo wörld");
        assert_eq!(text.head(5), "héllo");
        assert_eq!(text.head(500), "héllo wörld");
        assert!(ExtractedText::new(" \n\t").is_blank());
    }

    #[test]
    fn category_labels() {
        assert_eq!(
            DocumentCategory::Regulatory.classifier_label(),
            "Regulatory or Compliance"
        );
        assert_eq!(
            DocumentCategory::BusinessRequirement.classifier_label(),
            "Business Requirement or Use Case"
        );
    }

    #[test]
    fn run_id_display_matches_uuid() {
        let id = RunId::new();
        assert_eq!(id.to_string(), id.0.to_string());
    }
}
