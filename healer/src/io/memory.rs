//! Contract with the external knowledge store.
//!
//! The healer writes one record per terminal outcome and may read prior
//! solutions before the first attempt. Storage and indexing belong to the
//! store; this module only defines the narrow interface and the detached
//! write used on the result path.

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A problem/solution pair to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub problem: String,
    pub solution: String,
    pub distro: String,
    pub success_rate: f32,
}

/// A similarity search against stored knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeQuery {
    pub query: String,
    pub limit: usize,
    pub distro: Option<String>,
    pub min_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeHit {
    pub problem: String,
    pub solution: String,
    pub score: f32,
    pub success_rate: f32,
}

/// Knowledge store used to persist healing outcomes.
pub trait MemoryStore: Send + Sync {
    /// Persist a record and return its id.
    fn commit_knowledge(&self, record: &KnowledgeRecord) -> Result<String>;

    fn search_knowledge(&self, query: &KnowledgeQuery) -> Result<Vec<KnowledgeHit>>;
}

/// Store that remembers nothing. Used when no store is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMemory;

impl MemoryStore for NoopMemory {
    fn commit_knowledge(&self, _record: &KnowledgeRecord) -> Result<String> {
        Ok(String::new())
    }

    fn search_knowledge(&self, _query: &KnowledgeQuery) -> Result<Vec<KnowledgeHit>> {
        Ok(Vec::new())
    }
}

/// Commit `record` on a detached thread.
///
/// The caller never waits for the write; a failure is logged and dropped.
pub fn spawn_commit(store: Arc<dyn MemoryStore>, record: KnowledgeRecord) {
    let spawned = thread::Builder::new()
        .name("healer-memory-commit".to_string())
        .spawn(move || match store.commit_knowledge(&record) {
            Ok(id) => debug!(id = %id, problem = %record.problem, "knowledge committed"),
            Err(err) => warn!(
                error = %format!("{err:#}"),
                problem = %record.problem,
                "failed to commit knowledge"
            ),
        });
    if let Err(err) = spawned {
        warn!(error = %err, "failed to spawn knowledge commit thread");
    }
}
