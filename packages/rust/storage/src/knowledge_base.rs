use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info};

use sdsynth_shared::{CrKey, Result, SynthError, numeric_suffix};

use crate::{DocumentStore, read_if_exists, write_atomic};

/// Keyed knowledge base persisted as a pretty-printed JSON object
/// `{ "CR000001": "<document>", ... }` in insertion order.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    path: Option<PathBuf>,
    records: IndexMap<String, String>,
}

impl KnowledgeBase {
    /// Load the knowledge base at `path`. A missing file is an empty store;
    /// a file that is not a JSON object of strings is a storage error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match read_if_exists(&path)? {
            Some(content) if !content.trim().is_empty() => {
                serde_json::from_str::<IndexMap<String, String>>(&content).map_err(|e| {
                    SynthError::Storage(format!(
                        "knowledge base {} is not a JSON object of documents: {e}",
                        path.display()
                    ))
                })?
            }
            _ => IndexMap::new(),
        };

        info!(path = %path.display(), records = records.len(), "knowledge base loaded");
        Ok(Self {
            path: Some(path),
            records,
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Insert under a freshly computed key. Never conflicts.
    pub fn insert_with_next_key(&mut self, document: &str) -> Result<CrKey> {
        let key = self.next_key();
        self.insert(&key, document)?;
        Ok(key)
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| SynthError::Storage(format!("failed to serialize knowledge base: {e}")))?;
        write_atomic(path, &json)?;
        debug!(path = %path.display(), records = self.records.len(), "knowledge base persisted");
        Ok(())
    }
}

impl DocumentStore for KnowledgeBase {
    fn next_key(&self) -> CrKey {
        let max = self
            .records
            .keys()
            .filter_map(|k| numeric_suffix(k))
            .max()
            .unwrap_or(0);
        CrKey::from_number(max + 1)
    }

    fn insert(&mut self, key: &CrKey, document: &str) -> Result<()> {
        if self.records.contains_key(key.as_str()) {
            return Err(SynthError::Conflict {
                key: key.to_string(),
            });
        }

        self.records.insert(key.to_string(), document.to_string());
        if let Err(e) = self.persist() {
            self.records.shift_remove(key.as_str());
            return Err(e);
        }

        info!(key = %key, bytes = document.len(), "document stored");
        Ok(())
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }

    fn list(&self) -> Vec<(&str, &str)> {
        self.records
            .iter()
            .rev()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> CrKey {
        CrKey::parse(raw).unwrap()
    }

    #[test]
    fn next_key_on_empty_store() {
        assert_eq!(KnowledgeBase::in_memory().next_key().as_str(), "CR000001");
    }

    #[test]
    fn next_key_skips_gaps_and_ignores_foreign_keys() {
        let mut kb = KnowledgeBase::in_memory();
        kb.insert(&key("CR000001"), "one").unwrap();
        kb.insert(&key("CR000003"), "three").unwrap();
        kb.insert(&key("legacy"), "old").unwrap();
        kb.insert(&key("CRX9"), "odd").unwrap();
        assert_eq!(kb.next_key().as_str(), "CR000004");
    }

    #[test]
    fn next_key_ignores_suffixes_without_successor() {
        let mut kb = KnowledgeBase::in_memory();
        kb.insert(&key("CR000007"), "seven").unwrap();
        kb.insert(&key("CR18446744073709551615"), "max").unwrap();
        kb.insert(&key("CR99999999999999999999999"), "huge").unwrap();
        assert_eq!(kb.next_key().as_str(), "CR000008");

        kb.insert(&key("CR18446744073709551614"), "near max").unwrap();
        assert_eq!(kb.next_key().as_str(), "CR18446744073709551615");
    }

    #[test]
    fn duplicate_insert_conflicts_and_keeps_first_value() {
        let mut kb = KnowledgeBase::in_memory();
        kb.insert(&key("CR000001"), "doc").unwrap();

        let err = kb.insert(&key("CR000001"), "doc2").unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(kb.lookup("CR000001"), Some("doc"));
    }

    #[test]
    fn lookup_after_insert() {
        let mut kb = KnowledgeBase::in_memory();
        kb.insert(&key("CR-ALPHA"), "# Title\nBody").unwrap();
        assert_eq!(kb.lookup("CR-ALPHA"), Some("# Title\nBody"));
        assert_eq!(kb.lookup("CR000099"), None);
    }

    #[test]
    fn list_is_reverse_insertion_order() {
        let mut kb = KnowledgeBase::in_memory();
        kb.insert(&key("CR000002"), "b").unwrap();
        kb.insert(&key("CR000001"), "a").unwrap();
        kb.insert_with_next_key("c").unwrap();

        let keys: Vec<&str> = kb.list().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["CR000003", "CR000001", "CR000002"]);
    }

    #[test]
    fn persists_and_reloads_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge_base.json");

        let mut kb = KnowledgeBase::open(&path).unwrap();
        assert!(kb.is_empty());
        kb.insert(&key("CR000005"), "five").unwrap();
        let auto = kb.insert_with_next_key("six").unwrap();
        assert_eq!(auto.as_str(), "CR000006");

        let reloaded = KnowledgeBase::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.lookup("CR000006"), Some("six"));
        assert_eq!(reloaded.list()[0].0, "CR000006");
    }

    #[test]
    fn opens_files_written_as_plain_json_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge_base.json");
        std::fs::write(
            &path,
            "{\n    \"CR000001\": \"first\",\n    \"CR000002\": \"second\"\n}",
        )
        .unwrap();

        let kb = KnowledgeBase::open(&path).unwrap();
        assert_eq!(kb.next_key().as_str(), "CR000003");
        assert_eq!(kb.lookup("CR000002"), Some("second"));
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge_base.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = KnowledgeBase::open(&path).unwrap_err();
        assert!(matches!(err, SynthError::Storage(_)));
    }

    #[test]
    fn failed_persist_rolls_back_insert() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("kb.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), "x").unwrap();

        let mut kb = KnowledgeBase {
            path: Some(path),
            records: IndexMap::new(),
        };
        assert!(kb.insert(&key("CR000001"), "doc").is_err());
        assert!(kb.is_empty());
    }
}
