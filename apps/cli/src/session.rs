//! Interactive `generate` session: drives one pipeline run from the terminal.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::eyre::{Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use sdsynth_core::{
    AnalyzeRequest, Orchestrator, PipelineSettings, PipelineState, ProgressReporter, Resolution,
    StateKind, StepError, Transition,
};
use sdsynth_extract::{DocumentBlob, extract_category};
use sdsynth_llm::LlmBackend;
use sdsynth_markdown::{ExportFormat, export_to_file, output_path};
use sdsynth_shared::{AppConfig, CrKey, DocumentCategory, ExtractedText};

use crate::commands::Store;

/// File arguments of `sdsynth generate`.
pub(crate) struct GenerateArgs {
    pub regulatory: Vec<PathBuf>,
    pub business: Vec<PathBuf>,
    pub supporting: Vec<PathBuf>,
    pub cr: Option<String>,
    pub parent: Option<String>,
}

const REVIEW_HELP: &str = "\
Type a revision instruction to refine the document, or one of:
  :show           print the current document
  :store [KEY]    save to the knowledge base
  :export [PATH]  write the document to a file (.html, .md or .txt)
  :discard        drop the document
  :help           show this message";

// ---------------------------------------------------------------------------
// Review commands
// ---------------------------------------------------------------------------

/// One line typed while reviewing a synthesized document.
#[derive(Debug, PartialEq, Eq)]
enum ReviewCommand {
    Empty,
    Show,
    Store(Option<String>),
    Export(Option<PathBuf>),
    Discard,
    Help,
    Unknown(String),
    Refine(String),
}

impl ReviewCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix(':') else {
            return Self::Refine(line.to_string());
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (command, None),
        };
        match name {
            "show" => Self::Show,
            "store" | "save" => Self::Store(arg.map(str::to_string)),
            "export" => Self::Export(arg.map(PathBuf::from)),
            "discard" | "quit" | "q" => Self::Discard,
            "help" | "h" | "?" => Self::Help,
            other => Self::Unknown(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Line-oriented prompt over any buffered reader.
pub(crate) struct Console<R> {
    input: R,
}

impl<R: BufRead> Console<R> {
    pub(crate) fn new(input: R) -> Self {
        Self { input }
    }

    /// Print `label` and read one line. `None` at end of input.
    fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        print!("{label}");
        std::io::stdout().flush()?;
        self.read_line()
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Read lines until a blank line. `None` when input ends before any text.
    fn read_block(&mut self) -> Result<Option<String>> {
        let mut lines: Vec<String> = Vec::new();
        loop {
            match self.read_line()? {
                Some(line) if line.trim().is_empty() => break,
                Some(line) => lines.push(line),
                None if lines.is_empty() => return Ok(None),
                None => break,
            }
        }
        Ok(Some(lines.join("\n")))
    }

    /// Yes/no question, defaulting to no.
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.prompt(&format!("{question} [y/N] "))?;
        Ok(matches!(
            answer.as_deref().map(str::trim),
            Some("y" | "Y" | "yes" | "Yes")
        ))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One interactive run: extraction, analysis, review, storage.
pub(crate) struct Session<'a, R> {
    config: &'a AppConfig,
    orchestrator: Orchestrator,
    store: Store,
    console: Console<R>,
    requested_key: Option<CrKey>,
}

impl<'a, R: BufRead> Session<'a, R> {
    pub(crate) fn new(
        config: &'a AppConfig,
        backend: Option<Arc<dyn LlmBackend>>,
        store: Store,
        input: R,
    ) -> Self {
        Self {
            config,
            orchestrator: Orchestrator::new(PipelineSettings::from_config(config), backend),
            store,
            console: Console::new(input),
            requested_key: None,
        }
    }

    pub(crate) async fn run(&mut self, args: GenerateArgs) -> Result<()> {
        self.requested_key = args.cr.as_deref().map(CrKey::parse).transpose()?;
        let request = self.prepare(&args)?;

        let progress = CliProgress::new();
        let mut state = match self
            .orchestrator
            .analyze(PipelineState::Idle, request, &progress)
            .await
        {
            Ok(state) => state,
            // Nothing happened yet: a failed precondition ends the command.
            Err(e) if e.state == PipelineState::Idle => return Err(e.error.into()),
            Err(e) => report(e),
        };
        drop(progress);

        loop {
            state = match state {
                PipelineState::Idle => {
                    println!("Run cancelled. No document was generated.");
                    return Ok(());
                }
                PipelineState::Blocked { category, reason } => {
                    bail!(
                        "the {} failed the relevance check: {reason}",
                        category.display_name()
                    );
                }
                s @ PipelineState::AwaitingSupplement { .. } => self.supplement(s).await?,
                s @ PipelineState::ReadyToSynthesize { .. } => {
                    if self.console.confirm("Synthesis failed. Retry?")? {
                        let progress = CliProgress::new();
                        settle(self.orchestrator.synthesize(s, &progress).await)
                    } else {
                        settle(self.orchestrator.cancel(s))
                    }
                }
                s @ PipelineState::Synthesized { .. } => self.review(s).await?,
                PipelineState::Stored { at } => {
                    println!("✓ Stored in the knowledge base as {at}.");
                    return Ok(());
                }
                PipelineState::Discarded => {
                    println!("Document discarded.");
                    return Ok(());
                }
            };
        }
    }

    /// Read every input file and build the analysis request.
    fn prepare(&self, args: &GenerateArgs) -> Result<AnalyzeRequest> {
        let regulatory = load_category(&args.regulatory, DocumentCategory::Regulatory)?;
        let business = load_category(&args.business, DocumentCategory::BusinessRequirement)?;
        let supporting = load_category(&args.supporting, DocumentCategory::Supporting)?;

        let parent = args.parent.as_deref().and_then(|key| match self.store.find(key) {
            Some(document) => {
                debug!(key, bytes = document.len(), "parent document loaded");
                Some(document.to_string())
            }
            None => {
                eprintln!("⚠ No stored document under '{key}'; continuing without a parent.");
                None
            }
        });

        Ok(AnalyzeRequest {
            regulatory,
            business,
            supporting: supporting.into_string(),
            parent,
        })
    }

    async fn supplement(&mut self, state: PipelineState) -> Result<PipelineState> {
        if let PipelineState::AwaitingSupplement { gaps, .. } = &state {
            println!();
            println!("The template asks for information the documents do not provide:");
            println!("{gaps}");
            println!();
            println!(
                "Enter supplemental information (end with a blank line). \
                 An empty entry proceeds as-is; type :cancel to stop."
            );
        }

        let supplement = match self.console.read_block()? {
            None => return Ok(settle(self.orchestrator.cancel(state))),
            Some(text) if text.trim() == ":cancel" => {
                return Ok(settle(self.orchestrator.cancel(state)));
            }
            Some(text) => text,
        };

        let progress = CliProgress::new();
        Ok(settle(
            self.orchestrator.proceed(state, &supplement, &progress).await,
        ))
    }

    /// Refinement loop. Returns once the document is stored or discarded.
    async fn review(&mut self, mut state: PipelineState) -> Result<PipelineState> {
        print_document(&state);
        println!("{REVIEW_HELP}");

        loop {
            if let Some(key) = state.conflict().cloned() {
                state = self.resolve(state, &key)?;
                if state.is_terminal() {
                    return Ok(state);
                }
                continue;
            }

            let Some(line) = self.console.prompt("\nrefine> ")? else {
                return Ok(self.orchestrator.discard(state));
            };

            match ReviewCommand::parse(&line) {
                ReviewCommand::Empty => {}
                ReviewCommand::Show => print_document(&state),
                ReviewCommand::Help => println!("{REVIEW_HELP}"),
                ReviewCommand::Unknown(name) => {
                    eprintln!("Unknown command ':{name}'. Type :help for the list.");
                }
                ReviewCommand::Discard => return Ok(self.orchestrator.discard(state)),
                ReviewCommand::Export(path) => {
                    if let Some(document) = state.document() {
                        self.export(document, path.as_deref());
                    }
                }
                ReviewCommand::Store(key) => {
                    let key = match key.as_deref().map(CrKey::parse).transpose() {
                        Ok(key) => key.or_else(|| self.requested_key.clone()),
                        Err(e) => {
                            eprintln!("✗ {e}");
                            continue;
                        }
                    };
                    state = settle(self.store_document(state, key));
                    if state.is_terminal() {
                        return Ok(state);
                    }
                }
                ReviewCommand::Refine(instruction) => {
                    let before = state.document().map(str::to_string);
                    let progress = CliProgress::new();
                    state = settle(
                        self.orchestrator
                            .refine(state, &instruction, &progress)
                            .await,
                    );
                    if state.document().map(str::to_string) != before {
                        print_document(&state);
                    }
                }
            }
        }
    }

    fn store_document(&mut self, state: PipelineState, key: Option<CrKey>) -> Transition {
        match &mut self.store {
            Store::Keyed(kb) => self.orchestrator.store(state, kb, key),
            Store::Unkeyed(log) => {
                if key.is_some() {
                    warn!("the unkeyed document log ignores change-request keys");
                }
                self.orchestrator.store_in_log(state, log)
            }
        }
    }

    fn resolve(&mut self, state: PipelineState, key: &CrKey) -> Result<PipelineState> {
        eprintln!("⚠ {key} already exists in the knowledge base.");
        let Some(answer) = self
            .console
            .prompt("Press Enter (or 'a') to auto-assign the next key, or type a new key: ")?
        else {
            return Ok(self.orchestrator.discard(state));
        };

        let resolution = match answer.trim() {
            "" | "a" | "A" => Resolution::AutoAssign,
            raw => match CrKey::parse(raw) {
                Ok(key) => Resolution::Manual(key),
                Err(e) => {
                    eprintln!("✗ {e}");
                    return Ok(state);
                }
            },
        };

        let Store::Keyed(kb) = &mut self.store else {
            return Ok(state);
        };
        Ok(settle(self.orchestrator.resolve_conflict(state, kb, resolution)))
    }

    fn export(&self, document: &str, path: Option<&Path>) {
        let format = path.and_then(ExportFormat::from_path).unwrap_or_default();
        let target = output_path(path, &self.config.paths.export_dir, format);
        match export_to_file(document, format, &target) {
            Ok(rendered) => {
                if rendered.degraded {
                    eprintln!("⚠ Formatted rendering failed; exported as plain text layout.");
                }
                println!("✓ Exported to {}", target.display());
            }
            Err(e) => eprintln!("✗ Export failed: {e}"),
        }
    }
}

/// Print the error of a failed step and continue from its unchanged state.
fn report(e: StepError) -> PipelineState {
    eprintln!("✗ {}", e.error);
    e.state
}

fn settle(transition: Transition) -> PipelineState {
    transition.unwrap_or_else(report)
}

fn print_document(state: &PipelineState) {
    if let Some(document) = state.document() {
        println!();
        println!("{document}");
        println!();
    }
}

/// Read and extract one category. Unreadable paths abort; files that cannot
/// be extracted are reported and skipped.
fn load_category(paths: &[PathBuf], category: DocumentCategory) -> Result<ExtractedText> {
    let blobs = paths
        .iter()
        .map(|path| DocumentBlob::from_path(path, category))
        .collect::<sdsynth_shared::Result<Vec<_>>>()?;

    let extraction = extract_category(&blobs);
    for (file, error) in &extraction.failures {
        eprintln!("⚠ {}: could not read {file}: {error}", category.display_name());
    }
    Ok(extraction.text)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner shown while a transition waits on the backend.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(format!("{name}..."));
    }

    fn finished(&self, outcome: StateKind) {
        debug!(%outcome, "transition finished");
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBackend;
    use sdsynth_llm::Role;
    use sdsynth_storage::{DocumentStore, KnowledgeBase};
    use std::io::Cursor;

    #[test]
    fn plain_text_is_a_refinement() {
        assert_eq!(
            ReviewCommand::parse("  make section 2 shorter "),
            ReviewCommand::Refine("make section 2 shorter".into())
        );
        assert_eq!(ReviewCommand::parse("   "), ReviewCommand::Empty);
    }

    #[test]
    fn colon_commands_take_optional_arguments() {
        assert_eq!(ReviewCommand::parse(":store"), ReviewCommand::Store(None));
        assert_eq!(
            ReviewCommand::parse(":store  CR000042 "),
            ReviewCommand::Store(Some("CR000042".into()))
        );
        assert_eq!(
            ReviewCommand::parse(":export out/sd.md"),
            ReviewCommand::Export(Some(PathBuf::from("out/sd.md")))
        );
        assert_eq!(ReviewCommand::parse(":discard"), ReviewCommand::Discard);
        assert_eq!(
            ReviewCommand::parse(":frobnicate now"),
            ReviewCommand::Unknown("frobnicate".into())
        );
    }

    #[test]
    fn block_stops_at_blank_line() {
        let mut console = Console::new(Cursor::new("Go-live: Q3\nOwner: Ops\n\nnext\n"));
        assert_eq!(
            console.read_block().unwrap().as_deref(),
            Some("Go-live: Q3\nOwner: Ops")
        );
        assert_eq!(console.read_line().unwrap().as_deref(), Some("next"));
    }

    #[test]
    fn block_at_end_of_input() {
        let mut console = Console::new(Cursor::new("only line"));
        assert_eq!(console.read_block().unwrap().as_deref(), Some("only line"));
        assert_eq!(console.read_block().unwrap(), None);

        let mut console = Console::new(Cursor::new("\n"));
        assert_eq!(console.read_block().unwrap().as_deref(), Some(""));
    }

    #[test]
    fn confirm_defaults_to_no() {
        let mut console = Console::new(Cursor::new("\ny\nnope\n"));
        assert!(!console.confirm("Retry?").unwrap());
        assert!(console.confirm("Retry?").unwrap());
        assert!(!console.confirm("Retry?").unwrap());
        assert!(!console.confirm("Retry?").unwrap());
    }

    // -----------------------------------------------------------------------
    // Full sessions
    // -----------------------------------------------------------------------

    struct Fixture {
        dir: tempfile::TempDir,
        config: AppConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.xml");
        std::fs::write(&template, "<SD><Scope/><Owner/></SD>").unwrap();
        std::fs::write(dir.path().join("reg.txt"), "Article 5: retain records.").unwrap();
        std::fs::write(dir.path().join("brd.txt"), "UC-1: archive records.").unwrap();

        let mut config = AppConfig::default();
        config.paths.template = template;
        config.paths.export_dir = dir.path().to_path_buf();
        Fixture { dir, config }
    }

    fn args(fx: &Fixture, cr: Option<&str>) -> GenerateArgs {
        GenerateArgs {
            regulatory: vec![fx.dir.path().join("reg.txt")],
            business: vec![fx.dir.path().join("brd.txt")],
            supporting: Vec::new(),
            cr: cr.map(str::to_string),
            parent: None,
        }
    }

    fn knowledge_base(records: &[(&str, &str)]) -> Store {
        let mut kb = KnowledgeBase::in_memory();
        for (key, document) in records {
            kb.insert(&CrKey::parse(key).unwrap(), document).unwrap();
        }
        Store::Keyed(kb)
    }

    fn keyed(store: &Store) -> &KnowledgeBase {
        match store {
            Store::Keyed(kb) => kb,
            Store::Unkeyed(_) => panic!("expected the keyed store"),
        }
    }

    /// Run one `generate` session over scripted input; returns the outcome
    /// and the store it wrote to.
    async fn run_session(
        fx: &Fixture,
        backend: &Arc<ScriptedBackend>,
        store: Store,
        args: GenerateArgs,
        input: &str,
    ) -> (Result<()>, Store) {
        let backend: Arc<dyn LlmBackend> = backend.clone();
        let mut session = Session::new(&fx.config, Some(backend), store, Cursor::new(input.to_string()));
        let outcome = session.run(args).await;
        let Session { store, .. } = session;
        (outcome, store)
    }

    fn clean_run(document: &str) -> ScriptedBackend {
        ScriptedBackend::new()
            .reply("VALID")
            .reply("VALID")
            .reply("NONE")
            .reply(document)
    }

    #[tokio::test]
    async fn store_uses_next_key_by_default() {
        let fx = fixture();
        let backend = Arc::new(clean_run("# SD"));

        let (outcome, store) =
            run_session(&fx, &backend, knowledge_base(&[]), args(&fx, None), ":store\n").await;

        outcome.unwrap();
        assert_eq!(keyed(&store).lookup("CR000001"), Some("# SD"));
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn conflict_then_enter_auto_assigns_next_key() {
        let fx = fixture();
        let backend = Arc::new(clean_run("# New SD"));
        let store = knowledge_base(&[("CR000001", "old")]);

        let (outcome, store) =
            run_session(&fx, &backend, store, args(&fx, Some("CR000001")), ":store\n\n").await;

        outcome.unwrap();
        let kb = keyed(&store);
        assert_eq!(kb.lookup("CR000001"), Some("old"));
        assert_eq!(kb.lookup("CR000002"), Some("# New SD"));
    }

    #[tokio::test]
    async fn typed_key_can_conflict_again_before_storing() {
        let fx = fixture();
        let backend = Arc::new(clean_run("# SD"));
        let store = knowledge_base(&[("CR000001", "a"), ("CR-LEGACY", "b")]);

        let (outcome, store) = run_session(
            &fx,
            &backend,
            store,
            args(&fx, None),
            ":store CR000001\nCR-LEGACY\nCR-NEW\n",
        )
        .await;

        outcome.unwrap();
        let kb = keyed(&store);
        assert_eq!(kb.lookup("CR-NEW"), Some("# SD"));
        assert_eq!(kb.lookup("CR-LEGACY"), Some("b"));
        assert_eq!(kb.len(), 3);
    }

    #[tokio::test]
    async fn cancel_at_supplement_prompt_stores_nothing() {
        let fx = fixture();
        for input in [":cancel\n\n", ""] {
            let backend = Arc::new(
                ScriptedBackend::new()
                    .reply("VALID")
                    .reply("VALID")
                    .reply("- System owner"),
            );

            let (outcome, store) =
                run_session(&fx, &backend, knowledge_base(&[]), args(&fx, None), input).await;

            outcome.unwrap();
            assert!(keyed(&store).is_empty());
            assert_eq!(backend.calls(), 3, "no synthesis after cancelling with {input:?}");
        }
    }

    #[tokio::test]
    async fn supplement_then_refine_stores_revised_document() {
        let fx = fixture();
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("VALID")
                .reply("VALID")
                .reply("- System owner")
                .reply("# Draft")
                .reply("# Final"),
        );

        let (outcome, store) = run_session(
            &fx,
            &backend,
            knowledge_base(&[]),
            args(&fx, None),
            "Owner: Operations\n\nmake it formal\n:store\n",
        )
        .await;

        outcome.unwrap();
        assert_eq!(keyed(&store).lookup("CR000001"), Some("# Final"));
        let refine = backend.last_request().unwrap();
        assert!(
            refine
                .content_of(Role::User)
                .unwrap()
                .ends_with("### REVISION INSTRUCTIONS:\nmake it formal")
        );
    }

    #[tokio::test]
    async fn end_of_input_while_reviewing_discards() {
        let fx = fixture();
        let backend = Arc::new(clean_run("# SD"));

        let (outcome, store) =
            run_session(&fx, &backend, knowledge_base(&[]), args(&fx, None), "").await;

        outcome.unwrap();
        assert!(keyed(&store).is_empty());
    }

    #[tokio::test]
    async fn failed_synthesis_is_retried_on_confirmation() {
        let fx = fixture();
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("VALID")
                .reply("VALID")
                .reply("NONE")
                .fail("HTTP 503")
                .reply("# SD"),
        );

        let (outcome, store) =
            run_session(&fx, &backend, knowledge_base(&[]), args(&fx, None), "y\n:store\n").await;

        outcome.unwrap();
        assert_eq!(keyed(&store).lookup("CR000001"), Some("# SD"));
        assert_eq!(backend.calls(), 5);
    }

    #[tokio::test]
    async fn declining_retry_cancels_the_run() {
        let fx = fixture();
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("VALID")
                .reply("VALID")
                .reply("NONE")
                .fail("HTTP 503"),
        );

        let (outcome, store) =
            run_session(&fx, &backend, knowledge_base(&[]), args(&fx, None), "n\n").await;

        outcome.unwrap();
        assert!(keyed(&store).is_empty());
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn relevance_failure_ends_with_error() {
        let fx = fixture();
        let backend = Arc::new(ScriptedBackend::new().reply("INVALID: This is a recipe."));

        let (outcome, store) =
            run_session(&fx, &backend, knowledge_base(&[]), args(&fx, None), ":store\n").await;

        let message = outcome.unwrap_err().to_string();
        assert!(message.contains("Regulatory Document failed the relevance check"));
        assert!(message.contains("This is a recipe."));
        assert!(keyed(&store).is_empty());
    }

    #[tokio::test]
    async fn export_command_writes_file_and_keeps_reviewing() {
        let fx = fixture();
        let backend = Arc::new(clean_run("# Exported SD\n\nBody"));
        let target = fx.dir.path().join("sd.md");
        let input = format!(":export {}\n:discard\n", target.display());

        let (outcome, store) =
            run_session(&fx, &backend, knowledge_base(&[]), args(&fx, None), &input).await;

        outcome.unwrap();
        let written = std::fs::read_to_string(&target).unwrap();
        assert!(written.starts_with("# Exported SD"));
        assert!(keyed(&store).is_empty());
    }
}
