// src/storage/mod.rs
//! Persistence and content storage.
//!
//! Record stores are trait objects so the HTTP layer never depends on a concrete
//! backend. The in-memory implementations serialize every read-check-write
//! behind one lock per store, which is what makes the multi-signature append
//! race-free.

pub mod access_log_store;
pub mod document_store;
pub mod ipfs_client;
#[cfg(test)]
pub mod mock_content;
pub mod share_store;
pub mod user_store;

use crate::models::document::TransitionError;
use std::sync::Arc;
use thiserror::Error;

use access_log_store::{AccessLogStore, InMemoryAccessLogStore};
use document_store::{DocumentStore, InMemoryDocumentStore};
use share_store::{InMemoryShareStore, ShareStore};
use user_store::{InMemoryUserStore, UserStore};

/// Errors raised by the record stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A unique constraint was violated
    #[error("{0}")]
    Duplicate(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// The record stores the API server runs on.
#[derive(Clone)]
pub struct Stores {
    pub documents: Arc<dyn DocumentStore>,
    pub users: Arc<dyn UserStore>,
    pub shares: Arc<dyn ShareStore>,
    pub access_logs: Arc<dyn AccessLogStore>,
}

impl Stores {
    /// Process-local stores. Records are lost on restart.
    pub fn in_memory() -> Self {
        Stores {
            documents: Arc::new(InMemoryDocumentStore::new()),
            users: Arc::new(InMemoryUserStore::new()),
            shares: Arc::new(InMemoryShareStore::new()),
            access_logs: Arc::new(InMemoryAccessLogStore::new()),
        }
    }
}
