//! Solution document template: structured markup naming the required sections.

use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use sdsynth_shared::{Result, SynthError};

/// The raw template markup, sent verbatim to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    path: PathBuf,
    markup: String,
}

/// One element of the template outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSection {
    /// Nesting depth, 0 for the root element.
    pub depth: usize,
    /// Element name without namespace prefix.
    pub name: String,
    /// Value of a `title` or `name` attribute, if any.
    pub title: Option<String>,
}

impl TemplateSection {
    /// Heading shown to users: the title attribute, else the element name.
    pub fn heading(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

impl Template {
    /// Read the template fresh from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let markup = match std::fs::read_to_string(path) {
            Ok(markup) => markup,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SynthError::Template(format!(
                    "template file '{}' not found",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(SynthError::Template(format!(
                    "error reading template file '{}': {e}",
                    path.display()
                )));
            }
        };

        if markup.trim().is_empty() {
            return Err(SynthError::Template(format!(
                "template file '{}' is empty",
                path.display()
            )));
        }

        debug!(path = %path.display(), bytes = markup.len(), "template loaded");
        Ok(Self {
            path: path.to_path_buf(),
            markup,
        })
    }

    /// Build a template from markup already in memory.
    pub fn from_markup(markup: impl Into<String>) -> Self {
        Self {
            path: PathBuf::new(),
            markup: markup.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Element outline of the markup. Malformed markup yields an empty list
    /// and a warning; generation still uses the raw text.
    pub fn sections(&self) -> Vec<TemplateSection> {
        match outline(&self.markup) {
            Ok(sections) => sections,
            Err(message) => {
                warn!(path = %self.path.display(), %message, "template markup is not well-formed");
                Vec::new()
            }
        }
    }
}

fn outline(markup: &str) -> std::result::Result<Vec<TemplateSection>, String> {
    let mut reader = Reader::from_str(markup);
    let mut sections = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                sections.push(section(&e, depth)?);
                depth += 1;
            }
            Ok(Event::Empty(e)) => sections.push(section(&e, depth)?),
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "error at position {}: {e}",
                    reader.error_position()
                ));
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(format!("{depth} element(s) left unclosed"));
    }
    Ok(sections)
}

fn section(element: &BytesStart<'_>, depth: usize) -> std::result::Result<TemplateSection, String> {
    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();

    let mut title = None;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| format!("bad attribute on <{name}>: {e}"))?;
        let key = attr.key.local_name();
        if matches!(key.as_ref(), b"title" | b"name") {
            let value = attr
                .unescape_value()
                .map_err(|e| format!("bad attribute value on <{name}>: {e}"))?;
            // `title` wins over `name` when both are present.
            if title.is_none() || key.as_ref() == b"title" {
                title = Some(value.into_owned());
            }
        }
    }

    Ok(TemplateSection { depth, name, title })
}
