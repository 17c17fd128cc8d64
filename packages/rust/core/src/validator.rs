//! Relevance validator: does this text plausibly belong to the expected category?
//!
//! The classifier answers with a sentinel. The answer is parsed into a
//! [`Verdict`] right here; nothing downstream looks at the raw response.
//! Backend failure is fail-closed: it yields `Invalid` with the error as reason.

use tracing::{debug, instrument, warn};

use sdsynth_llm::{ChatMessage, CompletionRequest, LlmBackend};
use sdsynth_shared::{DocumentCategory, ExtractedText, ValidationPolicy};

use crate::ModelParams;

pub const VALID_SENTINEL: &str = "VALID";
pub const INVALID_SENTINEL: &str = "INVALID";

/// Only the head of a document is classified.
pub const VALIDATION_INPUT_CHARS: usize = 4000;

/// Outcome of a relevance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid { reason: String },
}

impl Verdict {
    /// Parse a classifier response.
    ///
    /// Lenient: anything not starting with `INVALID` is valid.
    /// Strict: the trimmed response must be exactly `VALID`.
    pub fn parse(response: &str, policy: ValidationPolicy) -> Self {
        let response = response.trim();

        if let Some(rest) = response.strip_prefix(INVALID_SENTINEL) {
            let reason = rest.trim_start().trim_start_matches(':').trim();
            let reason = if reason.is_empty() {
                "the document does not match the expected category".to_string()
            } else {
                reason.to_string()
            };
            return Self::Invalid { reason };
        }

        match policy {
            ValidationPolicy::Lenient => Self::Valid,
            ValidationPolicy::Strict if response == VALID_SENTINEL => Self::Valid,
            ValidationPolicy::Strict => Self::Invalid {
                reason: format!("unrecognised classifier response: {response}"),
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid { reason } => Some(reason),
        }
    }
}

fn classifier_prompt(category: DocumentCategory) -> String {
    let label = category.classifier_label();
    format!(
        "You classify documents.\n\
         Decide whether the text you are given is a '{label}' document.\n\
         - If it is one, or clearly contains material of a {label} document, answer with exactly one word: {VALID_SENTINEL}\n\
         - If it is unrelated (a recipe, source code, a personal letter, an unrelated subject), answer: {INVALID_SENTINEL}: <one-sentence reason>"
    )
}

/// The classifier request for the first [`VALIDATION_INPUT_CHARS`] characters.
pub fn validation_request(
    params: &ModelParams,
    text: &ExtractedText,
    category: DocumentCategory,
) -> CompletionRequest {
    params
        .request()
        .message(ChatMessage::system(classifier_prompt(category)))
        .message(ChatMessage::user(format!(
            "Document Text:\n{}",
            text.head(VALIDATION_INPUT_CHARS)
        )))
}

/// Classify `text` against `category`.
#[instrument(skip_all, fields(category = %category, bytes = text.as_str().len()))]
pub async fn validate(
    backend: &dyn LlmBackend,
    params: &ModelParams,
    policy: ValidationPolicy,
    text: &ExtractedText,
    category: DocumentCategory,
) -> Verdict {
    let request = validation_request(params, text, category);

    let verdict = match backend.complete(request).await {
        Ok(response) => Verdict::parse(&response, policy),
        Err(e) => Verdict::Invalid {
            reason: format!("API error during validation - {e}"),
        },
    };

    match &verdict {
        Verdict::Valid => debug!("document accepted"),
        Verdict::Invalid { reason } => warn!(%reason, "document rejected"),
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBackend;
    use sdsynth_llm::Role;
    use sdsynth_shared::AppConfig;

    fn params() -> ModelParams {
        ModelParams::validation(&AppConfig::default())
    }

    #[test]
    fn invalid_prefix_is_stripped_from_reason() {
        let verdict = Verdict::parse(
            "INVALID: This is a cooking recipe.",
            ValidationPolicy::Lenient,
        );
        assert_eq!(verdict.reason(), Some("This is a cooking recipe."));
        assert_eq!(
            Verdict::parse("INVALID", ValidationPolicy::Lenient).reason(),
            Some("the document does not match the expected category")
        );
    }

    #[test]
    fn lenient_accepts_anything_else() {
        assert!(Verdict::parse("VALID", ValidationPolicy::Lenient).is_valid());
        assert!(Verdict::parse("Valid - looks regulatory", ValidationPolicy::Lenient).is_valid());
        assert!(Verdict::parse("  VALID\n", ValidationPolicy::Lenient).is_valid());
    }

    #[test]
    fn strict_requires_exact_sentinel() {
        assert!(Verdict::parse(" VALID ", ValidationPolicy::Strict).is_valid());
        let verdict = Verdict::parse("Looks fine", ValidationPolicy::Strict);
        assert_eq!(
            verdict.reason(),
            Some("unrecognised classifier response: Looks fine")
        );
    }

    #[test]
    fn request_truncates_to_head() {
        let text = ExtractedText::new("é".repeat(5000));
        let req = validation_request(&params(), &text, DocumentCategory::Regulatory);

        let user = req.content_of(Role::User).unwrap();
        assert_eq!(user.chars().count(), "Document Text:\n".len() + VALIDATION_INPUT_CHARS);
        assert!(req
            .content_of(Role::System)
            .unwrap()
            .contains("'Regulatory or Compliance'"));
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.max_tokens, 60);
    }

    #[tokio::test]
    async fn backend_failure_is_fail_closed() {
        let backend = ScriptedBackend::new().fail("HTTP 401 Unauthorized: bad key");
        let verdict = validate(
            &backend,
            &params(),
            ValidationPolicy::Lenient,
            &ExtractedText::new("text"),
            DocumentCategory::BusinessRequirement,
        )
        .await;

        let reason = verdict.reason().unwrap();
        assert!(reason.starts_with("API error during validation"));
        assert!(reason.contains("bad key"));
    }

    #[tokio::test]
    async fn valid_response_passes() {
        let backend = ScriptedBackend::new().reply("VALID");
        let verdict = validate(
            &backend,
            &params(),
            ValidationPolicy::Lenient,
            &ExtractedText::new("Article 12 of the regulation"),
            DocumentCategory::Regulatory,
        )
        .await;
        assert!(verdict.is_valid());
        assert_eq!(backend.calls(), 1);
    }
}
