//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, bail, eyre};
use tracing::{info, warn};

use sdsynth_core::Template;
use sdsynth_extract::{DocumentBlob, extract_blob};
use sdsynth_llm::{ChatCompletionsClient, LlmBackend};
use sdsynth_markdown::{ExportFormat, export_to_file, output_path};
use sdsynth_shared::{
    AppConfig, CrKey, DocumentCategory, StoreVariant, init_config, load_config, resolve_api_key,
};
use sdsynth_storage::{DocumentLog, DocumentStore, KnowledgeBase, derive_label};

use crate::session::{GenerateArgs, Session};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// sdsynth: turn regulatory and business requirement documents into a solution document.
#[derive(Parser)]
#[command(
    name = "sdsynth",
    version,
    about = "Synthesize solution documents from regulatory and business requirement documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Template file (overrides `paths.template`).
    #[arg(long, global = true)]
    pub template: Option<PathBuf>,

    /// Knowledge base file (overrides `paths.knowledge_base` or `paths.document_log`).
    #[arg(long, global = true)]
    pub kb: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Export format argument.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum FormatArg {
    Html,
    Md,
    Txt,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Html => ExportFormat::Html,
            FormatArg::Md => ExportFormat::Markdown,
            FormatArg::Txt => ExportFormat::Text,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Validate inputs, synthesize a solution document, then refine and store it.
    Generate {
        /// Regulatory document(s): .txt, .md, .pdf or .docx.
        #[arg(long, required = true, num_args = 1..)]
        regulatory: Vec<PathBuf>,

        /// Business requirement document(s) (BRD/URF).
        #[arg(long, required = true, num_args = 1..)]
        business: Vec<PathBuf>,

        /// Optional supporting document(s).
        #[arg(long, num_args = 1..)]
        supporting: Vec<PathBuf>,

        /// Change-request key to store under (defaults to the next free key).
        #[arg(long)]
        cr: Option<String>,

        /// Stored document to use as background context.
        #[arg(long)]
        parent: Option<String>,
    },

    /// Browse and manage the knowledge base.
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Export a stored document.
    Export {
        /// Key of the stored document (or `#N` position for the unkeyed log).
        #[arg(long)]
        cr: String,

        /// Output format; inferred from `--out` when omitted.
        #[arg(long)]
        format: Option<FormatArg>,

        /// Output file (defaults to `<export_dir>/Synthesized_Solution_Document.<ext>`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the section outline of the template.
    Template,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Knowledge base subcommands.
#[derive(Subcommand)]
pub(crate) enum KbAction {
    /// List stored documents, most recent first.
    List,
    /// Print a stored document.
    Show {
        /// Change-request key (or `#N` position for the unkeyed log).
        key: String,
    },
    /// Print the key the next stored document would receive.
    NextKey,
    /// Insert an existing document file.
    Import {
        /// Document to import (.txt, .md, .pdf, .docx).
        file: PathBuf,

        /// Key to store under (defaults to the next free key).
        #[arg(long)]
        cr: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so they do not
/// interleave with documents printed on stdout.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sdsynth=warn",
        1 => "sdsynth=info",
        2 => "sdsynth=debug",
        _ => "sdsynth=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config()?;
    if let Some(template) = &cli.template {
        config.paths.template = template.clone();
    }
    if let Some(kb) = &cli.kb {
        match config.store.variant {
            StoreVariant::Keyed => config.paths.knowledge_base = kb.clone(),
            StoreVariant::Unkeyed => config.paths.document_log = kb.clone(),
        }
    }

    match cli.command {
        Command::Generate {
            regulatory,
            business,
            supporting,
            cr,
            parent,
        } => {
            let args = GenerateArgs {
                regulatory,
                business,
                supporting,
                cr,
                parent,
            };
            cmd_generate(&config, args).await
        }
        Command::Kb { action } => match action {
            KbAction::List => cmd_kb_list(&config),
            KbAction::Show { key } => cmd_kb_show(&config, &key),
            KbAction::NextKey => cmd_kb_next_key(&config),
            KbAction::Import { file, cr } => cmd_kb_import(&config, &file, cr.as_deref()),
        },
        Command::Export { cr, format, out } => {
            cmd_export(&config, &cr, format.map(ExportFormat::from), out.as_deref())
        }
        Command::Template => cmd_template(&config),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// Store selection
// ---------------------------------------------------------------------------

/// The knowledge base model selected by `[store] variant`.
pub(crate) enum Store {
    Keyed(KnowledgeBase),
    Unkeyed(DocumentLog),
}

impl Store {
    pub(crate) fn open(config: &AppConfig) -> Result<Self> {
        Ok(match config.store.variant {
            StoreVariant::Keyed => Self::Keyed(KnowledgeBase::open(&config.paths.knowledge_base)?),
            StoreVariant::Unkeyed => Self::Unkeyed(DocumentLog::open(&config.paths.document_log)?),
        })
    }

    /// Find a document by key, or by `#N` / `N` position in the unkeyed log.
    pub(crate) fn find(&self, key: &str) -> Option<&str> {
        match self {
            Self::Keyed(kb) => kb.lookup(key.trim()),
            Self::Unkeyed(log) => {
                let position: usize = key.trim().trim_start_matches('#').parse().ok()?;
                log.get(position.checked_sub(1)?)
            }
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Keyed(kb) => kb.is_empty(),
            Self::Unkeyed(log) => log.is_empty(),
        }
    }
}

/// Build the backend if a credential is configured. Absence is a visible
/// warning, not an error.
pub(crate) fn build_backend(config: &AppConfig) -> Result<Option<Arc<dyn LlmBackend>>> {
    match resolve_api_key(config) {
        Some(key) => {
            let client = ChatCompletionsClient::new(key, &config.llm)?;
            info!(endpoint = client.endpoint(), "backend configured");
            Ok(Some(Arc::new(client)))
        }
        None => {
            eprintln!(
                "⚠ No API key found. Set {} in your environment or .env file; generation is disabled.",
                config.llm.api_key_env
            );
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(config: &AppConfig, args: GenerateArgs) -> Result<()> {
    let backend = build_backend(config)?;
    let store = Store::open(config)?;
    let mut session = Session::new(config, backend, store, std::io::stdin().lock());
    session.run(args).await
}

fn cmd_kb_list(config: &AppConfig) -> Result<()> {
    let store = Store::open(config)?;
    if store.is_empty() {
        println!(
            "The knowledge base is empty. Generated documents can be stored here for future reference."
        );
        return Ok(());
    }

    match &store {
        Store::Keyed(kb) => {
            for (key, document) in kb.list() {
                println!("  {key:<12} {}", derive_label(document));
            }
        }
        Store::Unkeyed(log) => {
            for entry in log.list() {
                println!("  #{:<11} {}", entry.index + 1, entry.label);
            }
        }
    }
    Ok(())
}

fn cmd_kb_show(config: &AppConfig, key: &str) -> Result<()> {
    let store = Store::open(config)?;
    let document = store
        .find(key)
        .ok_or_else(|| eyre!("no stored document under '{key}'"))?;
    println!("{document}");
    Ok(())
}

fn cmd_kb_next_key(config: &AppConfig) -> Result<()> {
    match Store::open(config)? {
        Store::Keyed(kb) => println!("{}", kb.next_key()),
        Store::Unkeyed(_) => bail!("the unkeyed document log has no change-request keys"),
    }
    Ok(())
}

fn cmd_kb_import(config: &AppConfig, file: &Path, cr: Option<&str>) -> Result<()> {
    let blob = DocumentBlob::from_path(file, DocumentCategory::Supporting)?;
    let text = extract_blob(&blob)?;
    let text = text.trim();
    if text.is_empty() {
        bail!("{} contains no extractable text", file.display());
    }

    match Store::open(config)? {
        Store::Keyed(mut kb) => {
            let key = match cr {
                Some(raw) => {
                    let key = CrKey::parse(raw)?;
                    if let Err(e) = kb.insert(&key, text) {
                        if e.is_conflict() {
                            bail!("{key} already exists in the knowledge base; choose another key with --cr");
                        }
                        return Err(e.into());
                    }
                    key
                }
                None => kb.insert_with_next_key(text)?,
            };
            println!("Imported {} as {key}", blob.filename);
        }
        Store::Unkeyed(mut log) => {
            if cr.is_some() {
                warn!("--cr is ignored by the unkeyed document log");
            }
            log.append(text)?;
            println!("Imported {} as #{}", blob.filename, log.len());
        }
    }
    Ok(())
}

fn cmd_export(
    config: &AppConfig,
    key: &str,
    format: Option<ExportFormat>,
    out: Option<&Path>,
) -> Result<()> {
    let store = Store::open(config)?;
    let document = store
        .find(key)
        .ok_or_else(|| eyre!("no stored document under '{key}'"))?;

    let format = format
        .or_else(|| out.and_then(ExportFormat::from_path))
        .unwrap_or_default();
    let path = output_path(out, &config.paths.export_dir, format);

    let rendered = export_to_file(document, format, &path)?;
    if rendered.degraded {
        eprintln!("⚠ Formatted rendering failed; exported as plain text layout.");
    }
    println!("Exported {key} to {}", path.display());
    Ok(())
}

fn cmd_template(config: &AppConfig) -> Result<()> {
    let template = Template::load(&config.paths.template)?;
    let sections = template.sections();
    if sections.is_empty() {
        eprintln!(
            "⚠ No sections could be read from {}; the markup may not be well-formed.",
            template.path().display()
        );
        return Ok(());
    }

    println!("{}", template.path().display());
    for section in sections {
        println!("{}{}", "  ".repeat(section.depth + 1), section.heading());
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
