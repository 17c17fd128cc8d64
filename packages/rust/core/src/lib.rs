//! Document synthesis pipeline.
//!
//! Ties the relevance validator, gap analyzer, synthesis and refinement engines
//! together behind the [`Orchestrator`] state machine. Every backend call goes
//! through [`sdsynth_llm::LlmBackend`].

pub mod gaps;
pub mod pipeline;
pub mod synthesis;
pub mod template;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

use sdsynth_llm::CompletionRequest;
use sdsynth_shared::AppConfig;

pub use gaps::GapReport;
pub use pipeline::{
    AnalyzeRequest, Orchestrator, PipelineSettings, PipelineState, ProgressReporter, Resolution,
    SilentProgress, StateKind, StepError, StoredAt, Transition,
};
pub use template::{Template, TemplateSection};
pub use validator::Verdict;

/// Model tier and sampling settings for one kind of backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelParams {
    /// Fast tier, deterministic, short output.
    pub fn validation(config: &AppConfig) -> Self {
        Self {
            model: config.llm.fast_model.clone(),
            temperature: config.generation.validation_temperature,
            max_tokens: config.generation.validation_max_tokens,
        }
    }

    pub fn gap_analysis(config: &AppConfig) -> Self {
        Self {
            model: config.llm.fast_model.clone(),
            temperature: config.generation.gap_temperature,
            max_tokens: config.generation.gap_max_tokens,
        }
    }

    pub fn synthesis(config: &AppConfig) -> Self {
        Self {
            model: config.llm.synthesis_model.clone(),
            temperature: config.generation.synthesis_temperature,
            max_tokens: config.generation.max_output_tokens,
        }
    }

    pub fn refinement(config: &AppConfig) -> Self {
        Self {
            model: config.llm.synthesis_model.clone(),
            temperature: config.generation.refinement_temperature,
            max_tokens: config.generation.max_output_tokens,
        }
    }

    pub(crate) fn request(&self) -> CompletionRequest {
        CompletionRequest::new(self.model.clone(), self.temperature, self.max_tokens)
    }
}
