//! Session-scoped retrieval
//!
//! Combines an embedder, one flat index per session and the document store
//! into the two operations the chat application calls: add documents to a
//! session and retrieve context for a query.
//!
//! # Usage
//!
//! ```ignore
//! use ragchat_lib::session::SessionManager;
//!
//! let manager = SessionManager::new(embedder, "/home/me/.ollama_chat/rag");
//! manager.add_documents(&session_id, &["apple pie recipe", "stock market news"])?;
//! let context = manager.retrieve(&session_id, "baking recipe", 4)?;
//! ```
//!
//! # Consistency
//!
//! Vector `i` of a session index belongs to record `i` of its document store.
//! Every mutation stages both files and renames them in turn; if the second
//! rename fails the index is rolled back. Loading a session whose artifacts
//! disagree fails with [`Error::Consistency`].
//!
//! Calls on the same session are serialized by a per-session lock. Locks are
//! keyed by the session's files, so two ids mapping to the same files share
//! one lock and one cache entry. Nothing guards against a second process
//! writing the same data directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::docstore::{DocumentRecord, DocumentStore, SessionPaths};
use crate::embed::Embedder;
use crate::index::{FlatIndex, VectorIndex};
use crate::{Error, Result};

/// Tunables of a [`SessionManager`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// `k` used by [`SessionManager::retrieve_default`]
    pub top_k: usize,
    /// Placed between documents in a retrieved context
    pub separator: String,
    /// Keep loaded sessions in memory between calls
    pub cache_sessions: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            separator: "\n---\n".to_string(),
            cache_sessions: true,
        }
    }
}

impl From<&RagConfig> for SessionOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            top_k: config.top_k,
            separator: config.separator.clone(),
            cache_sessions: config.cache_sessions,
        }
    }
}

/// A document matched by a query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    /// Position of the document within its session
    pub position: usize,
    /// Similarity to the query, higher is closer
    pub score: f32,
    pub record: DocumentRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub documents: usize,
    /// `None` until the first document is added
    pub dimension: Option<usize>,
}

/// Loaded artifacts of one session
struct SessionState {
    index: Option<FlatIndex>,
    records: Vec<DocumentRecord>,
}

/// Lock for one session, holding its cached state when caching is enabled
type SessionSlot = Arc<Mutex<Option<SessionState>>>;

/// Per-session retrieval over a shared embedder.
pub struct SessionManager<E: Embedder> {
    embedder: E,
    store: DocumentStore,
    options: SessionOptions,
    /// Keyed by index path; only sessions in use or with cached state
    slots: Mutex<HashMap<PathBuf, SessionSlot>>,
}

impl<E: Embedder> SessionManager<E> {
    /// Create a manager storing sessions under `data_dir` with default options.
    #[must_use]
    pub fn new(embedder: E, data_dir: impl Into<PathBuf>) -> Self {
        Self::with_options(embedder, data_dir, SessionOptions::default())
    }

    #[must_use]
    pub fn with_options(embedder: E, data_dir: impl Into<PathBuf>, options: SessionOptions) -> Self {
        Self {
            embedder,
            store: DocumentStore::new(data_dir),
            options,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Create a manager from the data directory and options of `config`.
    #[must_use]
    pub fn from_config(embedder: E, config: &RagConfig) -> Self {
        Self::with_options(embedder, config.data_dir.clone(), SessionOptions::from(config))
    }

    /// Embed `texts` and append them to the session, creating it if needed.
    ///
    /// All texts are embedded in one batch before any state is touched, so an
    /// embedding failure writes nothing. Returns the number of documents
    /// added; empty input is a no-op.
    pub fn add_documents<S: AsRef<str>>(&self, session_id: &str, texts: &[S]) -> Result<usize> {
        if texts.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = texts.iter().map(AsRef::as_ref).collect();
        let embeddings = self.embedder.encode(&texts)?;
        if embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "embedder returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }
        let dimension = embeddings[0].len();

        self.with_session(session_id, |state, paths| {
            let (mut index, previous_len) = match state.index.take() {
                Some(index) => {
                    let len = index.len();
                    (index, Some(len))
                }
                None => {
                    info!(session = session_id, dimension, "creating session index");
                    (FlatIndex::new(dimension)?, None)
                }
            };

            index.add(&embeddings)?;
            state
                .records
                .extend(texts.iter().map(|t| DocumentRecord::new(*t)));

            self.commit(session_id, paths, &index, &state.records, previous_len)?;
            info!(
                session = session_id,
                added = texts.len(),
                total = index.len(),
                "documents committed"
            );
            state.index = Some(index);
            Ok(texts.len())
        })
    }

    /// Retrieve the `k` documents closest to `query`, best first, joined
    /// with the configured separator.
    ///
    /// A session without documents yields an empty string without calling
    /// the embedder.
    pub fn retrieve(&self, session_id: &str, query: &str, k: usize) -> Result<String> {
        let texts: Vec<String> = self
            .search(session_id, query, k)?
            .into_iter()
            .map(|doc| doc.record.text)
            .collect();
        Ok(texts.join(&self.options.separator))
    }

    /// [`retrieve`](Self::retrieve) with the configured `top_k`.
    pub fn retrieve_default(&self, session_id: &str, query: &str) -> Result<String> {
        self.retrieve(session_id, query, self.options.top_k)
    }

    /// Like [`retrieve`](Self::retrieve), returning scored records.
    pub fn search(&self, session_id: &str, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        self.with_session(session_id, |state, _| {
            let Some(index) = state.index.as_ref().filter(|index| !index.is_empty()) else {
                debug!(session = session_id, "no documents in session");
                return Ok(Vec::new());
            };
            if k == 0 {
                return Ok(Vec::new());
            }

            let query_embedding = self.embedder.encode_one(query)?;
            let hits = index.search(&query_embedding, k)?;

            let mut results = Vec::with_capacity(hits.len());
            for hit in hits {
                let Some(record) = state.records.get(hit.position) else {
                    warn!(session = session_id, position = hit.position, "hit has no document record, skipping");
                    continue;
                };
                results.push(RetrievedDocument {
                    position: hit.position,
                    score: hit.score,
                    record: record.clone(),
                });
            }
            debug!(session = session_id, k, found = results.len(), "retrieved");
            Ok(results)
        })
    }

    /// Document count and index dimension of a session.
    pub fn stats(&self, session_id: &str) -> Result<SessionStats> {
        self.with_session(session_id, |state, _| {
            Ok(SessionStats {
                documents: state.records.len(),
                dimension: state.index.as_ref().map(VectorIndex::dimension),
            })
        })
    }

    /// File names of all sessions with stored retrieval state.
    pub fn sessions(&self) -> Result<Vec<String>> {
        self.store.sessions()
    }

    /// Returns a reference to the embedder.
    #[must_use]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Returns a reference to the document store.
    #[must_use]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    fn slot(&self, paths: &SessionPaths) -> SessionSlot {
        // the map only holds handles, so a poisoned lock is still usable
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(paths.index.clone()).or_default().clone()
    }

    /// Forget the slot of a session that caches nothing and has no other
    /// user.
    fn release(&self, paths: &SessionPaths, slot: SessionSlot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // new handles are only handed out under the map lock
        if Arc::strong_count(&slot) != 2 {
            return;
        }
        let idle = matches!(slot.try_lock().as_deref(), Ok(None));
        if idle {
            slots.remove(&paths.index);
        }
    }

    /// Run `f` on the session state while holding the session lock.
    ///
    /// State comes from the cache or from disk. It is cached again only when
    /// `f` succeeds and the session has an index; after a failure the next
    /// call reloads from disk.
    fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionState, &SessionPaths) -> Result<R>,
    ) -> Result<R> {
        let paths = self.store.paths(session_id)?;
        let slot = self.slot(&paths);
        let result = self.run_locked(session_id, &paths, &slot, f);
        self.release(&paths, slot);
        result
    }

    fn run_locked<R>(
        &self,
        session_id: &str,
        paths: &SessionPaths,
        slot: &SessionSlot,
        f: impl FnOnce(&mut SessionState, &SessionPaths) -> Result<R>,
    ) -> Result<R> {
        let mut cached = match slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(session = session_id, "session lock poisoned, reloading from disk");
                slot.clear_poison();
                let mut guard = poisoned.into_inner();
                *guard = None;
                guard
            }
        };

        let mut state = match cached.take() {
            Some(state) => state,
            None => self.load_state(session_id, paths)?,
        };
        let result = f(&mut state, paths);
        if result.is_ok() && self.options.cache_sessions && state.index.is_some() {
            *cached = Some(state);
        }
        result
    }

    fn load_state(&self, session_id: &str, paths: &SessionPaths) -> Result<SessionState> {
        let index = match FlatIndex::load(&paths.index) {
            Ok(index) => Some(index),
            Err(Error::IndexNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let records = self.store.load(session_id)?;

        let vectors = index.as_ref().map_or(0, VectorIndex::len);
        if vectors != records.len() {
            return Err(Error::Consistency(format!(
                "session {session_id}: index holds {vectors} vectors but metadata holds {} records",
                records.len()
            )));
        }
        debug!(session = session_id, documents = records.len(), "session loaded");
        Ok(SessionState { index, records })
    }

    /// Persist index and records as one unit.
    ///
    /// Both files are staged first, so a failed write leaves the old pair in
    /// place. If the metadata rename fails after the index rename went
    /// through, the index is restored to `previous_len` vectors (or removed
    /// for a new session).
    fn commit(
        &self,
        session_id: &str,
        paths: &SessionPaths,
        index: &FlatIndex,
        records: &[DocumentRecord],
        previous_len: Option<usize>,
    ) -> Result<()> {
        let index_write = index.stage(&paths.index)?;
        let metadata_write = self.store.stage(session_id, records)?;

        index_write.commit()?;
        let Err(err) = metadata_write.commit() else {
            return Ok(());
        };

        warn!(session = session_id, error = %err, "metadata commit failed, restoring index");
        match restore_index(paths, index, previous_len) {
            Ok(()) => Err(err),
            Err(restore_err) => Err(Error::Consistency(format!(
                "session {session_id}: metadata write failed ({err}) and the index could not be restored ({restore_err})"
            ))),
        }
    }
}

fn restore_index(paths: &SessionPaths, index: &FlatIndex, previous_len: Option<usize>) -> Result<()> {
    match previous_len {
        Some(len) => {
            let mut previous = index.clone();
            previous.truncate(len);
            previous.save(&paths.index)
        }
        None => std::fs::remove_file(&paths.index).map_err(|e| Error::persistence(&paths.index, e)),
    }
}
