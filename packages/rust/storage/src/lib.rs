//! JSON-file knowledge base for synthesized documents.
//!
//! Two models are provided:
//! - [`KnowledgeBase`]: documents keyed by change-request identifier, with
//!   auto-numbering and conflict detection. Implements [`DocumentStore`].
//! - [`DocumentLog`]: an append-only list of documents with derived titles.
//!
//! Both are read fully into memory on open and rewritten wholesale on every
//! successful insertion. Concurrent writers are not coordinated; the last
//! writer wins.

mod document_log;
mod knowledge_base;

use std::path::Path;

use sdsynth_shared::{CrKey, Result, SynthError};

pub use document_log::{DocumentLog, LogEntry, UNTITLED_LABEL, derive_label};
pub use knowledge_base::KnowledgeBase;

/// Keyed store interface used by the orchestrator.
pub trait DocumentStore {
    /// `CR` + zero-padded `(max numeric suffix + 1)`, or `CR000001` when no
    /// key matches the numbered format.
    fn next_key(&self) -> CrKey;

    /// Insert a new record and persist. Fails with [`SynthError::Conflict`]
    /// when the key is already present, leaving the stored value untouched.
    fn insert(&mut self, key: &CrKey, document: &str) -> Result<()>;

    fn lookup(&self, key: &str) -> Option<&str>;

    /// `(key, document)` pairs, most recently inserted first.
    fn list(&self) -> Vec<(&str, &str)>;
}

/// Write `contents` next to `target` and rename it into place.
pub(crate) fn write_atomic(target: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SynthError::io(parent, e))?;
    }

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SynthError::Storage(format!("invalid store path {}", target.display())))?;
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| SynthError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| SynthError::io(target, e))?;
    Ok(())
}

/// Read a store file, treating a missing file as absent.
pub(crate) fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SynthError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("kb.json");

        write_atomic(&target, "{}").unwrap();
        write_atomic(&target, "{\"a\": 1}").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"a\": 1}");
        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn read_if_exists_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_if_exists(&dir.path().join("absent.json")).unwrap().is_none());
    }
}
