//! Export of synthesized documents.
//!
//! Generated Markdown goes through a few cleanup passes, then a
//! [`DocumentRenderer`] for the requested [`ExportFormat`]. If the structured
//! renderer fails, the export degrades to a plain unformatted layout instead of
//! aborting.

mod cleanup;
mod render;

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use sdsynth_shared::{Result, SynthError};

pub use cleanup::run_pipeline as clean_markdown;
pub use render::{
    DEFAULT_TITLE, DocumentRenderer, HtmlRenderer, MarkdownRenderer, TextRenderer,
    document_title, plain_layout, renderer_for,
};

/// Base name of exported files when no path is given.
pub const DEFAULT_EXPORT_STEM: &str = "Synthesized_Solution_Document";

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

/// Downloadable file formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    #[default]
    Html,
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }

    /// Infer the format from a file extension (`.html`, `.htm`, `.md`, `.txt`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        ext.parse().ok()
    }

    /// `Synthesized_Solution_Document.<ext>`.
    pub fn default_file_name(&self) -> String {
        format!("{DEFAULT_EXPORT_STEM}.{}", self.extension())
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = SynthError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" | "htm" => Ok(Self::Html),
            "md" | "markdown" => Ok(Self::Markdown),
            "txt" | "text" => Ok(Self::Text),
            other => Err(SynthError::Export(format!(
                "unknown export format '{other}' (expected html, md or txt)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Output of one export.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub format: ExportFormat,
    pub content: String,
    /// True when the structured renderer failed and the plain layout was used.
    pub degraded: bool,
}

/// Render with the default renderer for `format`.
pub fn render(markdown: &str, format: ExportFormat) -> RenderedDocument {
    render_with(renderer_for(format).as_ref(), markdown)
}

/// Clean the document and render it, falling back to [`plain_layout`] on failure.
#[instrument(skip_all, fields(format = %renderer.format(), bytes = markdown.len()))]
pub fn render_with(renderer: &dyn DocumentRenderer, markdown: &str) -> RenderedDocument {
    let format = renderer.format();
    let cleaned = cleanup::run_pipeline(markdown);

    match renderer.render(&cleaned) {
        Ok(content) => {
            debug!(bytes = content.len(), "rendered");
            RenderedDocument {
                format,
                content,
                degraded: false,
            }
        }
        Err(e) => {
            warn!(error = %e, "structured rendering failed, using plain layout");
            RenderedDocument {
                format,
                content: plain_layout(&cleaned, format),
                degraded: true,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Resolve the output path: an explicit path wins, otherwise the default file
/// name inside `export_dir`.
pub fn output_path(explicit: Option<&Path>, export_dir: &Path, format: ExportFormat) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => export_dir.join(format.default_file_name()),
    }
}

/// Render and write to `path` (temp file, then rename).
pub fn export_to_file(markdown: &str, format: ExportFormat, path: &Path) -> Result<RenderedDocument> {
    let rendered = render(markdown, format);
    write_atomic(path, &rendered.content)?;
    info!(path = %path.display(), format = %format, degraded = rendered.degraded, "document exported");
    Ok(rendered)
}

fn write_atomic(target: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SynthError::io(parent, e))?;
    }

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SynthError::Export(format!("invalid export path {}", target.display())))?;
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| SynthError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| SynthError::io(target, e))
}
