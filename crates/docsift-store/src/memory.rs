//! In-process result store.

use docsift_core::{PipelineResult, Result};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::repository::{ResultRepository, StoredResult};

/// Results kept in insertion order behind a read-write lock.
#[derive(Default)]
pub struct InMemoryResultStore {
    records: RwLock<Vec<StoredResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultRepository for InMemoryResultStore {
    fn save(&self, result: &PipelineResult) -> Result<StoredResult> {
        let stored = StoredResult::new(result.clone());
        self.records.write().push(stored.clone());
        Ok(stored)
    }

    fn get(&self, id: &Uuid) -> Result<Option<StoredResult>> {
        Ok(self.records.read().iter().find(|r| &r.id == id).cloned())
    }

    fn find_by_hash(&self, content_hash: &str) -> Result<Option<StoredResult>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .find(|r| r.result.content_hash == content_hash)
            .cloned())
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<StoredResult>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }

    fn delete(&self, id: &Uuid) -> Result<bool> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| &r.id != id);
        Ok(records.len() < before)
    }
}
