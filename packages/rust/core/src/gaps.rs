//! Gap analyzer: which template sections have no supporting source material?
//!
//! Fail-open: a backend failure is treated as "no gaps" so that an analysis
//! outage never blocks synthesis.

use tracing::{info, instrument, warn};

use sdsynth_llm::{ChatMessage, CompletionRequest, LlmBackend};
use sdsynth_shared::ExtractedText;

use crate::ModelParams;

pub const NO_GAPS_SENTINEL: &str = "NONE";

/// Characters of each source document included in the comparison.
pub const GAP_INPUT_CHARS: usize = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapReport {
    /// Nothing the template needs is missing.
    Complete,
    /// Free-text list of missing details.
    Missing(String),
}

impl GapReport {
    /// `NONE` exactly, or an empty answer, means no gaps.
    pub fn parse(response: &str) -> Self {
        let response = response.trim();
        if response.is_empty() || response == NO_GAPS_SENTINEL {
            Self::Complete
        } else {
            Self::Missing(response.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn missing(&self) -> Option<&str> {
        match self {
            Self::Complete => None,
            Self::Missing(report) => Some(report),
        }
    }
}

pub fn gap_request(
    params: &ModelParams,
    template: &str,
    regulatory: &ExtractedText,
    business: &ExtractedText,
) -> CompletionRequest {
    let prompt = format!(
        "You are a meticulous business analyst.\n\
         Compare the solution document template (XML) below with the input documents and find \
         any section the template requires that the inputs do not cover at all.\n\n\
         - If the inputs contain everything needed to fill the template, answer with exactly one word: {NO_GAPS_SENTINEL}\n\
         - Otherwise answer with a short bulleted list of the missing details. Do not write the solution document.\n\n\
         Template XML:\n{template}\n\n\
         Input Documents:\n\
         [Regulatory]: {regulatory}\n\
         [BRD/URF]: {business}\n",
        regulatory = regulatory.head(GAP_INPUT_CHARS),
        business = business.head(GAP_INPUT_CHARS),
    );

    params.request().message(ChatMessage::user(prompt))
}

#[instrument(skip_all, fields(template_bytes = template.len()))]
pub async fn analyze_gaps(
    backend: &dyn LlmBackend,
    params: &ModelParams,
    template: &str,
    regulatory: &ExtractedText,
    business: &ExtractedText,
) -> GapReport {
    let request = gap_request(params, template, regulatory, business);

    match backend.complete(request).await {
        Ok(response) => {
            let report = GapReport::parse(&response);
            info!(gaps = !report.is_empty(), "gap analysis finished");
            report
        }
        Err(e) => {
            warn!(error = %e, "gap analysis failed, continuing without it");
            GapReport::Complete
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBackend;
    use sdsynth_llm::Role;
    use sdsynth_shared::AppConfig;

    fn params() -> ModelParams {
        ModelParams::gap_analysis(&AppConfig::default())
    }

    #[test]
    fn sentinel_means_complete() {
        assert!(GapReport::parse("NONE").is_empty());
        assert!(GapReport::parse("  NONE\n").is_empty());
        assert!(GapReport::parse("").is_empty());

        let report = GapReport::parse("- Data retention period\n- System owner");
        assert_eq!(report.missing(), Some("- Data retention period\n- System owner"));
    }

    #[test]
    fn request_embeds_template_and_truncated_inputs() {
        let reg = ExtractedText::new("r".repeat(4000));
        let brd = ExtractedText::new("use case");
        let req = gap_request(&params(), "<SD><Scope/></SD>", &reg, &brd);

        assert_eq!(req.messages.len(), 1);
        let prompt = req.content_of(Role::User).unwrap();
        assert!(prompt.contains("<SD><Scope/></SD>"));
        assert!(prompt.contains(&format!("[Regulatory]: {}\n", "r".repeat(3000))));
        assert!(!prompt.contains(&"r".repeat(3001)));
        assert!(prompt.contains("[BRD/URF]: use case"));
        assert_eq!(req.max_tokens, 300);
    }

    #[tokio::test]
    async fn backend_failure_is_fail_open() {
        let backend = ScriptedBackend::new().fail("timeout");
        let report = analyze_gaps(
            &backend,
            &params(),
            "<SD/>",
            &ExtractedText::new("reg"),
            &ExtractedText::new("brd"),
        )
        .await;
        assert_eq!(report, GapReport::Complete);
    }

    #[tokio::test]
    async fn missing_items_are_reported() {
        let backend = ScriptedBackend::new().reply("- Go-live date");
        let report = analyze_gaps(
            &backend,
            &params(),
            "<SD/>",
            &ExtractedText::new("reg"),
            &ExtractedText::new("brd"),
        )
        .await;
        assert_eq!(report, GapReport::Missing("- Go-live date".into()));
    }
}
