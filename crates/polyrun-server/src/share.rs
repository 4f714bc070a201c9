//! Snippet sharing.
//!
//! Persistence is pluggable through [`SnippetStore`]; the server ships with
//! an in-memory store that lives as long as the process and keeps only the
//! most recent snippets.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::protocol::Snippet;

/// Length of a share id.
pub const SHARE_ID_LEN: usize = 8;

/// Snippets kept by [`InMemorySnippetStore::new`].
pub const DEFAULT_MAX_SNIPPETS: usize = 10_000;

/// Storage for shared snippets.
pub trait SnippetStore: Send + Sync {
    /// Store a snippet and return its share id.
    fn save(&self, snippet: Snippet) -> ServerResult<String>;

    /// Look a snippet up by share id.
    fn load(&self, share_id: &str) -> ServerResult<Option<Snippet>>;
}

/// Process-local [`SnippetStore`]. Once full, saving evicts the oldest
/// snippet.
#[derive(Debug)]
pub struct InMemorySnippetStore {
    inner: RwLock<Entries>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Entries {
    snippets: HashMap<String, Snippet>,
    order: VecDeque<String>,
}

impl Default for InMemorySnippetStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SNIPPETS)
    }
}

impl InMemorySnippetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding at most `capacity` snippets (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    /// Number of snippets currently held.
    pub fn len(&self) -> usize {
        self.inner.read().map_or(0, |entries| entries.snippets.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnippetStore for InMemorySnippetStore {
    fn save(&self, snippet: Snippet) -> ServerResult<String> {
        let mut entries = self
            .inner
            .write()
            .map_err(|_| ServerError::Store("snippet store lock poisoned".to_string()))?;

        while entries.order.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.snippets.remove(&oldest);
            tracing::debug!("Evicted shared snippet {}", oldest);
        }

        let mut share_id = new_share_id();
        while entries.snippets.contains_key(&share_id) {
            share_id = new_share_id();
        }
        entries.snippets.insert(share_id.clone(), snippet);
        entries.order.push_back(share_id.clone());
        Ok(share_id)
    }

    fn load(&self, share_id: &str) -> ServerResult<Option<Snippet>> {
        let entries = self
            .inner
            .read()
            .map_err(|_| ServerError::Store("snippet store lock poisoned".to_string()))?;
        Ok(entries.snippets.get(share_id).cloned())
    }
}

/// Random lowercase alphanumeric id.
fn new_share_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(SHARE_ID_LEN);
    id
}

/// Whether `id` has the shape of a share id.
pub fn is_valid_share_id(id: &str) -> bool {
    id.len() == SHARE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
}
