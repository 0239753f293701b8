//! Hot-swappable compiled rules.

use std::sync::Arc;

use docsift_analyze::Ruleset;
use parking_lot::RwLock;
use tracing::info;

/// Shared pointer to the active ruleset. Readers take a snapshot `Arc`
/// and keep using it even if a swap happens mid-run.
pub struct RulesetHandle {
    current: RwLock<Arc<Ruleset>>,
}

impl RulesetHandle {
    pub fn new(ruleset: Ruleset) -> Self {
        Self {
            current: RwLock::new(Arc::new(ruleset)),
        }
    }

    pub fn current(&self) -> Arc<Ruleset> {
        self.current.read().clone()
    }

    /// Install `ruleset`, returning the one it replaced.
    pub fn swap(&self, ruleset: Ruleset) -> Arc<Ruleset> {
        let next = Arc::new(ruleset);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        info!(
            "Ruleset swapped: v{} -> v{}",
            previous.version(),
            self.current.read().version()
        );
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsift_core::Catalog;

    #[test]
    fn test_snapshot_survives_swap() {
        let handle = RulesetHandle::new(Ruleset::builtin().unwrap());
        let snapshot = handle.current();

        let mut catalog = Catalog::builtin().unwrap();
        catalog.version = "2024.2".into();
        let previous = handle.swap(Ruleset::compile(catalog).unwrap());

        assert_eq!(snapshot.version(), "2024.1");
        assert_eq!(previous.version(), "2024.1");
        assert_eq!(handle.current().version(), "2024.2");
    }
}
