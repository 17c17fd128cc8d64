use std::path::{Path, PathBuf};

use tracing::info;

use sdsynth_shared::{Result, SynthError, head_chars};

use crate::{read_if_exists, write_atomic};

/// Label shown for documents whose first line is blank.
pub const UNTITLED_LABEL: &str = "Untitled document";

const LABEL_CHARS: usize = 70;

/// Append-only document list persisted as a JSON array of strings.
/// Documents are addressed by position only.
#[derive(Debug, Default)]
pub struct DocumentLog {
    path: Option<PathBuf>,
    documents: Vec<String>,
}

/// One listed document with its display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry<'a> {
    /// Zero-based append position.
    pub index: usize,
    pub label: String,
    pub document: &'a str,
}

impl DocumentLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let documents = match read_if_exists(&path)? {
            Some(content) if !content.trim().is_empty() => serde_json::from_str::<Vec<String>>(
                &content,
            )
            .map_err(|e| {
                SynthError::Storage(format!(
                    "document log {} is not a JSON array of documents: {e}",
                    path.display()
                ))
            })?,
            _ => Vec::new(),
        };

        info!(path = %path.display(), documents = documents.len(), "document log loaded");
        Ok(Self {
            path: Some(path),
            documents,
        })
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Append and persist. There are no keys, so this never conflicts.
    pub fn append(&mut self, document: &str) -> Result<()> {
        self.documents.push(document.to_string());
        if let Err(e) = self.persist() {
            self.documents.pop();
            return Err(e);
        }
        info!(position = self.documents.len() - 1, "document appended");
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.documents.get(index).map(String::as_str)
    }

    /// Documents in reverse append order with their derived labels.
    pub fn list(&self) -> Vec<LogEntry<'_>> {
        self.documents
            .iter()
            .enumerate()
            .rev()
            .map(|(index, document)| LogEntry {
                index,
                label: derive_label(document),
                document,
            })
            .collect()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.documents)
            .map_err(|e| SynthError::Storage(format!("failed to serialize document log: {e}")))?;
        write_atomic(path, &json)
    }
}

/// First 70 characters of the first line, or [`UNTITLED_LABEL`].
pub fn derive_label(document: &str) -> String {
    let first_line = document.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        UNTITLED_LABEL.to_string()
    } else {
        head_chars(first_line, LABEL_CHARS).to_string()
    }
}
