//! ragchat - session-scoped retrieval for a terminal chat assistant
//!
//! # Architecture
//!
//! ```text
//! Texts -> Embedder -> FlatIndex (<session>.index)
//!                  \-> DocumentStore (<session>.metadata.json)
//!                                       |
//! Query -> Embedder -> Search <---------+
//!                        |
//!                     Context
//! ```
//!
//! Each session owns one index and one metadata file; vector `i` of the
//! index belongs to record `i` of the metadata.
//!
//! # Example
//!
//! ```ignore
//! use ragchat_lib::{config::RagConfig, embed, session::SessionManager};
//!
//! let config = RagConfig::load()?;
//! let embedder = embed::from_config(&config.embedder)?;
//! let manager = SessionManager::from_config(embedder, &config);
//!
//! // Ingest
//! manager.add_documents(&session_id, &[file_contents])?;
//!
//! // Ground a question
//! let context = manager.retrieve(&session_id, "What did the file say?", 4)?;
//! ```

pub mod config;
pub mod docstore;
pub mod embed;
pub mod error;
pub mod index;
pub mod persist;
pub mod prompt;
pub mod session;

pub use error::{Error, Result};
