//! Per-session document records
//!
//! Records are kept in insertion order, position `i` matching vector `i` of
//! the session index. Each session's records are one pretty-printed JSON
//! array in `<data_dir>/<name>.metadata.json`; the index sits next to it in
//! `<data_dir>/<name>.index`.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::persist::StagedWrite;
use crate::{Error, Result};

const INDEX_EXT: &str = ".index";
const METADATA_EXT: &str = ".metadata.json";

/// A stored document: short content digest plus the original text
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DocumentRecord {
    /// First 12 hex chars of the SHA-256 of `text`
    pub id: String,
    pub text: String,
}

impl DocumentRecord {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: record_id(&text),
            text,
        }
    }
}

/// Deterministic identifier for a document text.
///
/// Identical texts share an id; nothing deduplicates on it.
pub fn record_id(text: &str) -> String {
    let mut id = hex::encode(Sha256::digest(text.as_bytes()));
    id.truncate(12);
    id
}

/// Locations of the two artifacts of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

/// JSON-backed store of document records, one file per session.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File locations for `session_id`.
    ///
    /// Ids made only of ASCII alphanumerics, `-`, `_` and `.` (not starting
    /// with `.`) are used verbatim, so UUID sessions map to `<uuid>.index`.
    /// Any other id is replaced by `sid-` and a digest prefix.
    pub fn paths(&self, session_id: &str) -> Result<SessionPaths> {
        let name = file_stem(session_id)?;
        Ok(SessionPaths {
            index: self.root.join(format!("{name}{INDEX_EXT}")),
            metadata: self.root.join(format!("{name}{METADATA_EXT}")),
        })
    }

    /// Load the records of a session; empty when nothing was persisted yet.
    pub fn load(&self, session_id: &str) -> Result<Vec<DocumentRecord>> {
        let path = self.paths(session_id)?.metadata;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::persistence(&path, e)),
        };
        serde_json::from_str(&content).map_err(|e| Error::persistence(&path, e))
    }

    /// Append records to the persisted sequence.
    ///
    /// Callers pairing records with index vectors must add the vectors in the
    /// same commit; [`SessionManager`](crate::session::SessionManager) does so.
    pub fn append(&self, session_id: &str, new_records: &[DocumentRecord]) -> Result<()> {
        if new_records.is_empty() {
            return Ok(());
        }
        let mut records = self.load(session_id)?;
        records.extend_from_slice(new_records);
        self.save(session_id, &records)
    }

    /// Overwrite the persisted records of a session.
    pub fn save(&self, session_id: &str, records: &[DocumentRecord]) -> Result<()> {
        self.stage(session_id, records)?.commit()
    }

    /// Write the records to a temp file without replacing the current file.
    pub fn stage(&self, session_id: &str, records: &[DocumentRecord]) -> Result<StagedWrite> {
        let path = self.paths(session_id)?.metadata;
        StagedWrite::new(&path, |w| {
            serde_json::to_writer_pretty(&mut *w, records)?;
            w.write_all(b"\n")
        })
    }

    /// File names of every session with persisted state, sorted.
    pub fn sessions(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::persistence(&self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::persistence(&self.root, e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let stem = file_name
                .strip_suffix(METADATA_EXT)
                .or_else(|| file_name.strip_suffix(INDEX_EXT));
            if let Some(stem) = stem {
                names.push(stem.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

fn file_stem(session_id: &str) -> Result<String> {
    if session_id.is_empty() {
        return Err(Error::InvalidInput("session id must not be empty".to_string()));
    }
    let plain = !session_id.starts_with('.')
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if plain {
        return Ok(session_id.to_string());
    }
    let digest = hex::encode(Sha256::digest(session_id.as_bytes()));
    Ok(format!("sid-{}", &digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_stable_prefix() {
        let id = record_id("hello");
        assert_eq!(id.len(), 12);
        // sha256("hello") = 2cf24dba5fb0a30e...
        assert_eq!(id, "2cf24dba5fb0");
        assert_eq!(DocumentRecord::new("hello").id, id);
        assert_ne!(record_id("hello!"), id);
    }

    #[test]
    fn test_paths_for_uuid_session() {
        let store = DocumentStore::new("/data");
        let paths = store.paths("4f6c1c1e-8a6b-4c9e-9d4f-1a2b3c4d5e6f").unwrap();
        assert_eq!(
            paths.index,
            PathBuf::from("/data/4f6c1c1e-8a6b-4c9e-9d4f-1a2b3c4d5e6f.index")
        );
        assert_eq!(
            paths.metadata,
            PathBuf::from("/data/4f6c1c1e-8a6b-4c9e-9d4f-1a2b3c4d5e6f.metadata.json")
        );
    }

    #[test]
    fn test_paths_hash_unsafe_ids() {
        let store = DocumentStore::new("/data");
        let a = store.paths("../escape").unwrap();
        let b = store.paths("../escape").unwrap();
        let c = store.paths("with space").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.index.parent(), Some(Path::new("/data")));
        let name = a.index.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sid-"));
        assert!(store.paths(".hidden").unwrap().index.to_str().unwrap().contains("sid-"));
    }

    #[test]
    fn test_empty_session_id_rejected() {
        let store = DocumentStore::new("/data");
        assert!(matches!(store.paths(""), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        assert!(store.load("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("rag"));

        store
            .append("s1", &[DocumentRecord::new("one"), DocumentRecord::new("two")])
            .unwrap();
        store.append("s1", &[DocumentRecord::new("three")]).unwrap();
        store.append("s1", &[]).unwrap();

        let texts: Vec<String> = store.load("s1").unwrap().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(store.load("s2").unwrap().is_empty());
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        store.save("s1", &[DocumentRecord::new("café")]).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("s1.metadata.json")).unwrap();
        assert!(raw.contains("café"));

        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["text"], "café");
        assert_eq!(value[0]["id"], record_id("café"));
    }

    #[test]
    fn test_reads_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("old.metadata.json"),
            r#"[{"id": "abc123def456", "text": "from before"}]"#,
        )
        .unwrap();

        let records = DocumentStore::new(dir.path()).load("old").unwrap();
        assert_eq!(records[0].id, "abc123def456");
        assert_eq!(records[0].text, "from before");
    }

    #[test]
    fn test_corrupt_metadata_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("s1.metadata.json"), "{ not json").unwrap();

        let store = DocumentStore::new(dir.path());
        assert!(matches!(store.load("s1"), Err(Error::Persistence(_))));
    }

    #[test]
    fn test_sessions_lists_stems() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        assert!(store.sessions().unwrap().is_empty());

        store.save("beta", &[DocumentRecord::new("b")]).unwrap();
        store.save("alpha", &[DocumentRecord::new("a")]).unwrap();
        std::fs::write(dir.path().join("alpha.index"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        assert_eq!(store.sessions().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_sessions_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("absent"));
        assert!(store.sessions().unwrap().is_empty());
    }
}
