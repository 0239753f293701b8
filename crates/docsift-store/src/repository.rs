//! Repository contract shared by the store implementations.

use chrono::{DateTime, Utc};
use docsift_core::{PipelineResult, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pipeline result as persisted, with its storage identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub result: PipelineResult,
}

impl StoredResult {
    pub fn new(result: PipelineResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            result,
        }
    }
}

/// Persistence for finished pipeline results.
///
/// `list` and `find_by_hash` return the newest records first.
pub trait ResultRepository: Send + Sync {
    fn save(&self, result: &PipelineResult) -> Result<StoredResult>;
    fn get(&self, id: &Uuid) -> Result<Option<StoredResult>>;
    /// Most recent result stored for this content hash.
    fn find_by_hash(&self, content_hash: &str) -> Result<Option<StoredResult>>;
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<StoredResult>>;
    fn count(&self) -> Result<usize>;
    fn delete(&self, id: &Uuid) -> Result<bool>;
}
