//! Orchestrator: validation → gap check → (supplement pause) → synthesis →
//! refinement loop → store.
//!
//! The pipeline state is an explicit value. Each transition consumes the
//! current [`PipelineState`] and returns the next one; a failed step returns a
//! [`StepError`] carrying the unchanged pre-call state so the user can retry.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use sdsynth_llm::LlmBackend;
use sdsynth_shared::{
    AppConfig, CrKey, DocumentCategory, ExtractedText, Result, RunId, SourceTexts, SynthError,
    ValidationPolicy,
};
use sdsynth_storage::{DocumentLog, DocumentStore};

use crate::ModelParams;
use crate::gaps::{self, GapReport};
use crate::synthesis;
use crate::template::Template;
use crate::validator::{self, Verdict};

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Where a stored document ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredAt {
    /// Keyed knowledge base record.
    Key(CrKey),
    /// Position in the append-only document log.
    Position(usize),
}

impl std::fmt::Display for StoredAt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Position(index) => write!(f, "#{}", index + 1),
        }
    }
}

/// State of one pipeline run.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    /// A required document failed the relevance check. Terminal for the attempt.
    Blocked {
        category: DocumentCategory,
        reason: String,
    },
    /// Gaps were found; waiting for supplemental text or cancellation.
    AwaitingSupplement {
        run: RunId,
        inputs: SourceTexts,
        gaps: String,
    },
    /// Validated with no gaps, synthesis not yet successful.
    ReadyToSynthesize { run: RunId, inputs: SourceTexts },
    /// A document exists. `conflict` is set when a store hit an existing key.
    Synthesized {
        run: RunId,
        document: String,
        conflict: Option<CrKey>,
    },
    Stored { at: StoredAt },
    Discarded,
}

/// Data-free view of a state, for messages and progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Idle,
    /// Transient: only observable through [`ProgressReporter`].
    Validating,
    Blocked,
    AwaitingSupplement,
    ReadyToSynthesize,
    Synthesized,
    Stored,
    Discarded,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Blocked => "blocked",
            Self::AwaitingSupplement => "awaiting supplemental information",
            Self::ReadyToSynthesize => "ready to synthesize",
            Self::Synthesized => "synthesized",
            Self::Stored => "stored",
            Self::Discarded => "discarded",
        }
    }
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineState {
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Idle => StateKind::Idle,
            Self::Blocked { .. } => StateKind::Blocked,
            Self::AwaitingSupplement { .. } => StateKind::AwaitingSupplement,
            Self::ReadyToSynthesize { .. } => StateKind::ReadyToSynthesize,
            Self::Synthesized { .. } => StateKind::Synthesized,
            Self::Stored { .. } => StateKind::Stored,
            Self::Discarded => StateKind::Discarded,
        }
    }

    /// `Stored`, `Discarded` and `Blocked` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Stored { .. } | Self::Discarded | Self::Blocked { .. }
        )
    }

    /// States a new analysis may start from.
    fn accepts_analyze(&self) -> bool {
        matches!(self, Self::Idle) || self.is_terminal()
    }

    /// The current document, if one has been synthesized.
    pub fn document(&self) -> Option<&str> {
        match self {
            Self::Synthesized { document, .. } => Some(document),
            _ => None,
        }
    }

    pub fn conflict(&self) -> Option<&CrKey> {
        match self {
            Self::Synthesized { conflict, .. } => conflict.as_ref(),
            _ => None,
        }
    }

    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::AwaitingSupplement { run, .. }
            | Self::ReadyToSynthesize { run, .. }
            | Self::Synthesized { run, .. } => Some(*run),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed transition. `state` is the state before the call, unchanged.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct StepError {
    pub state: PipelineState,
    pub error: SynthError,
}

impl StepError {
    fn new(state: PipelineState, error: SynthError) -> Self {
        Self { state, error }
    }

    fn invalid(action: &'static str, state: PipelineState) -> Self {
        let error = SynthError::InvalidTransition {
            action,
            state: state.kind().to_string(),
        };
        Self { state, error }
    }
}

/// Result of one orchestrator transition.
pub type Transition = std::result::Result<PipelineState, StepError>;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for long-running transitions.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the transition has produced its next state.
    fn finished(&self, outcome: StateKind);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn finished(&self, _outcome: StateKind) {}
}

pub const PHASE_VALIDATE_REGULATORY: &str = "Validating regulatory document relevance";
pub const PHASE_VALIDATE_BUSINESS: &str = "Validating business requirement document relevance";
pub const PHASE_GAP_CHECK: &str = "Cross-referencing inputs with template requirements";
pub const PHASE_SYNTHESIZE: &str = "Synthesizing solution document";
pub const PHASE_REFINE: &str = "Refining document";

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs besides the backend.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub template_path: PathBuf,
    pub validation: ModelParams,
    pub gap_analysis: ModelParams,
    pub synthesis: ModelParams,
    pub refinement: ModelParams,
    pub policy: ValidationPolicy,
    /// Name of the credential variable, used in the missing-credential message.
    pub credential_env: String,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            template_path: config.paths.template.clone(),
            validation: ModelParams::validation(config),
            gap_analysis: ModelParams::gap_analysis(config),
            synthesis: ModelParams::synthesis(config),
            refinement: ModelParams::refinement(config),
            policy: config.validation.policy,
            credential_env: config.llm.api_key_env.clone(),
        }
    }
}

/// Inputs of one analysis attempt.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeRequest {
    pub regulatory: ExtractedText,
    pub business: ExtractedText,
    pub supporting: String,
    /// Previously stored document used as background, already looked up.
    pub parent: Option<String>,
}

/// How to settle a store conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Store under a freshly computed key.
    AutoAssign,
    /// Retry with a caller-supplied key.
    Manual(CrKey),
}

/// Drives pipeline transitions. Holds no run state of its own.
pub struct Orchestrator {
    settings: PipelineSettings,
    backend: Option<Arc<dyn LlmBackend>>,
}

impl Orchestrator {
    /// `backend` is `None` when no credential is configured; generation
    /// actions then fail with a config error before any call.
    pub fn new(settings: PipelineSettings, backend: Option<Arc<dyn LlmBackend>>) -> Self {
        Self { settings, backend }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&dyn LlmBackend> {
        self.backend.as_deref().ok_or_else(|| {
            SynthError::config(format!(
                "no backend credential configured. Set {} to enable generation.",
                self.settings.credential_env
            ))
        })
    }

    /// Check preconditions, validate both required documents, run the gap
    /// check, and synthesize right away when nothing is missing.
    ///
    /// Preconditions are checked in order: template, required documents,
    /// credential. A failed precondition leaves `state` unchanged.
    #[instrument(skip_all, fields(from = %state.kind()))]
    pub async fn analyze(
        &self,
        state: PipelineState,
        request: AnalyzeRequest,
        progress: &dyn ProgressReporter,
    ) -> Transition {
        if !state.accepts_analyze() {
            return Err(StepError::invalid("analyze documents", state));
        }

        let template = match Template::load(&self.settings.template_path) {
            Ok(template) => template,
            Err(e) => return Err(StepError::new(state, e)),
        };
        for (text, category) in [
            (&request.regulatory, DocumentCategory::Regulatory),
            (&request.business, DocumentCategory::BusinessRequirement),
        ] {
            if text.is_blank() {
                let error = SynthError::validation(format!("{} is required", category.display_name()));
                return Err(StepError::new(state, error));
            }
        }
        let backend = match self.backend() {
            Ok(backend) => backend,
            Err(e) => return Err(StepError::new(state, e)),
        };

        let run = RunId::new();
        info!(%run, "analysis started");

        let checks = [
            (PHASE_VALIDATE_REGULATORY, &request.regulatory, DocumentCategory::Regulatory),
            (PHASE_VALIDATE_BUSINESS, &request.business, DocumentCategory::BusinessRequirement),
        ];
        for (phase, text, category) in checks {
            progress.phase(phase);
            let verdict = validator::validate(
                backend,
                &self.settings.validation,
                self.settings.policy,
                text,
                category,
            )
            .await;
            if let Verdict::Invalid { reason } = verdict {
                warn!(%run, %category, "run blocked by relevance check");
                progress.finished(StateKind::Blocked);
                return Ok(PipelineState::Blocked { category, reason });
            }
        }

        progress.phase(PHASE_GAP_CHECK);
        let report = gaps::analyze_gaps(
            backend,
            &self.settings.gap_analysis,
            template.markup(),
            &request.regulatory,
            &request.business,
        )
        .await;

        let inputs = SourceTexts {
            regulatory: request.regulatory,
            business: request.business,
            supporting: request.supporting,
            template: template.markup().to_string(),
            parent: request.parent,
        };

        match report {
            GapReport::Missing(gaps) => {
                info!(%run, "awaiting supplemental information");
                progress.finished(StateKind::AwaitingSupplement);
                Ok(PipelineState::AwaitingSupplement { run, inputs, gaps })
            }
            GapReport::Complete => {
                self.run_synthesis(PipelineState::ReadyToSynthesize { run, inputs }, progress)
                    .await
            }
        }
    }

    /// Append the supplement (if any) to the cached supporting text and synthesize.
    #[instrument(skip_all, fields(run = ?state.run_id()))]
    pub async fn proceed(
        &self,
        state: PipelineState,
        supplement: &str,
        progress: &dyn ProgressReporter,
    ) -> Transition {
        let PipelineState::AwaitingSupplement { run, inputs, .. } = &state else {
            return Err(StepError::invalid("proceed", state));
        };
        let backend = match self.backend() {
            Ok(backend) => backend,
            Err(e) => return Err(StepError::new(state, e)),
        };

        let run = *run;
        let mut inputs = inputs.clone();
        synthesis::append_supplement(&mut inputs.supporting, supplement);

        progress.phase(PHASE_SYNTHESIZE);
        match synthesis::synthesize(backend, &self.settings.synthesis, &inputs).await {
            Ok(document) => {
                progress.finished(StateKind::Synthesized);
                Ok(PipelineState::Synthesized {
                    run,
                    document,
                    conflict: None,
                })
            }
            Err(e) => Err(StepError::new(state, e)),
        }
    }

    /// Retry synthesis from `ReadyToSynthesize`.
    pub async fn synthesize(&self, state: PipelineState, progress: &dyn ProgressReporter) -> Transition {
        if !matches!(state, PipelineState::ReadyToSynthesize { .. }) {
            return Err(StepError::invalid("synthesize", state));
        }
        self.run_synthesis(state, progress).await
    }

    async fn run_synthesis(&self, state: PipelineState, progress: &dyn ProgressReporter) -> Transition {
        let PipelineState::ReadyToSynthesize { run, inputs } = &state else {
            return Err(StepError::invalid("synthesize", state));
        };
        let backend = match self.backend() {
            Ok(backend) => backend,
            Err(e) => return Err(StepError::new(state, e)),
        };

        progress.phase(PHASE_SYNTHESIZE);
        match synthesis::synthesize(backend, &self.settings.synthesis, inputs).await {
            Ok(document) => {
                progress.finished(StateKind::Synthesized);
                Ok(PipelineState::Synthesized {
                    run: *run,
                    document,
                    conflict: None,
                })
            }
            Err(e) => {
                warn!(run = %run, error = %e, "synthesis failed");
                Err(StepError::new(state, e))
            }
        }
    }

    /// Drop the cached inputs of a paused or pending run.
    pub fn cancel(&self, state: PipelineState) -> Transition {
        match state {
            PipelineState::AwaitingSupplement { run, .. }
            | PipelineState::ReadyToSynthesize { run, .. } => {
                info!(%run, "run cancelled");
                Ok(PipelineState::Idle)
            }
            other => Err(StepError::invalid("cancel", other)),
        }
    }

    /// Replace the current document with the backend's revision.
    #[instrument(skip_all, fields(run = ?state.run_id()))]
    pub async fn refine(
        &self,
        state: PipelineState,
        instruction: &str,
        progress: &dyn ProgressReporter,
    ) -> Transition {
        let PipelineState::Synthesized {
            run,
            document,
            conflict,
        } = &state
        else {
            return Err(StepError::invalid("refine", state));
        };
        let backend = match self.backend() {
            Ok(backend) => backend,
            Err(e) => return Err(StepError::new(state, e)),
        };

        progress.phase(PHASE_REFINE);
        match synthesis::refine(backend, &self.settings.refinement, document, instruction).await {
            Ok(revised) => {
                progress.finished(StateKind::Synthesized);
                Ok(PipelineState::Synthesized {
                    run: *run,
                    document: revised,
                    conflict: conflict.clone(),
                })
            }
            Err(e) => Err(StepError::new(state, e)),
        }
    }

    /// Store the document under `key`, or under the store's next key.
    ///
    /// A key collision is not an error: the document stays `Synthesized` with
    /// the conflict flag set, awaiting [`Orchestrator::resolve_conflict`].
    #[instrument(skip_all, fields(run = ?state.run_id()))]
    pub fn store(
        &self,
        state: PipelineState,
        store: &mut dyn DocumentStore,
        key: Option<CrKey>,
    ) -> Transition {
        if !matches!(state, PipelineState::Synthesized { .. }) {
            return Err(StepError::invalid("store", state));
        }
        let key = key.unwrap_or_else(|| store.next_key());
        insert_keyed(state, store, key)
    }

    /// Settle a pending conflict.
    pub fn resolve_conflict(
        &self,
        state: PipelineState,
        store: &mut dyn DocumentStore,
        resolution: Resolution,
    ) -> Transition {
        if state.conflict().is_none() {
            return Err(StepError::invalid("resolve a conflict", state));
        }
        let key = match resolution {
            Resolution::AutoAssign => store.next_key(),
            Resolution::Manual(key) => key,
        };
        insert_keyed(state, store, key)
    }

    /// Append the document to the unkeyed log. Never conflicts.
    pub fn store_in_log(&self, state: PipelineState, log: &mut DocumentLog) -> Transition {
        let Some(document) = state.document() else {
            return Err(StepError::invalid("store", state));
        };
        match log.append(document) {
            Ok(()) => Ok(PipelineState::Stored {
                at: StoredAt::Position(log.len() - 1),
            }),
            Err(e) => Err(StepError::new(state, e)),
        }
    }

    /// Clear all run state. Discarding while idle is a no-op.
    pub fn discard(&self, state: PipelineState) -> PipelineState {
        match state {
            PipelineState::Idle => PipelineState::Idle,
            other => {
                if let Some(run) = other.run_id() {
                    info!(%run, "run discarded");
                }
                PipelineState::Discarded
            }
        }
    }
}

fn insert_keyed(state: PipelineState, store: &mut dyn DocumentStore, key: CrKey) -> Transition {
    let (run, document) = match state {
        PipelineState::Synthesized { run, document, .. } => (run, document),
        other => return Err(StepError::invalid("store", other)),
    };

    match store.insert(&key, &document) {
        Ok(()) => {
            info!(%run, %key, "document stored");
            Ok(PipelineState::Stored {
                at: StoredAt::Key(key),
            })
        }
        Err(SynthError::Conflict { .. }) => {
            warn!(%run, %key, "key already exists, awaiting resolution");
            Ok(PipelineState::Synthesized {
                run,
                document,
                conflict: Some(key),
            })
        }
        Err(e) => Err(StepError::new(
            PipelineState::Synthesized {
                run,
                document,
                conflict: None,
            },
            e,
        )),
    }
}
