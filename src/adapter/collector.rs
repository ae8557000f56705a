//! In-memory collector
//!
//! Holds the collectables produced per assignment until `collect` releases them through
//! the collect hooks their structures were registered with.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{Level, event};
use uuid::Uuid;

use crate::{
    domain::{assignment::Assignment, constant::collector},
    port::collector::{Collectable, Collector},
    structure::registry::StructureRegistry
};

pub struct InMemoryCollector {
    registry: Arc<StructureRegistry>,
    held:     Mutex<HashMap<Uuid, Vec<Collectable>>>
}

impl InMemoryCollector {
    pub fn new(registry: Arc<StructureRegistry>) -> Self {
        Self { registry, held: Mutex::new(HashMap::new()) }
    }

    /// Number of collectables held for an assignment
    pub fn held(&self, assignment: Uuid) -> usize {
        self.held.lock().get(&assignment).map_or(0, Vec::len)
    }

    pub fn assignments(&self) -> Vec<Uuid> {
        self.held.lock().keys().copied().collect()
    }

    /// Release everything held for an assignment; returns how many values were released
    ///
    /// Release failures are logged and the value is forgotten either way.
    pub async fn collect(&self, assignment: Uuid) -> usize {
        let collectables = self.held.lock().remove(&assignment).unwrap_or_default();
        let mut released = 0;

        for collectable in collectables {
            let collect = match self.registry.get_collector_for_identifier(&collectable.identifier) {
                Ok(Some(collect)) => collect,
                Ok(None) => continue,
                Err(e) => {
                    event!(Level::WARN, event = collector::COLLECTABLE_RELEASE_FAILED,
                           assignment = %assignment, identifier = %collectable.identifier, error = %e);
                    continue;
                }
            };

            match collect(collectable.value).await {
                Ok(()) => {
                    released += 1;
                    event!(Level::DEBUG, event = collector::COLLECTABLE_RELEASED,
                           assignment = %assignment, identifier = %collectable.identifier);
                }
                Err(e) => {
                    let error = format!("{:#}", e);
                    event!(Level::WARN, event = collector::COLLECTABLE_RELEASE_FAILED,
                           assignment = %assignment, identifier = %collectable.identifier, error = %error);
                }
            }
        }

        released
    }
}

#[async_trait]
impl Collector for InMemoryCollector {
    async fn register(&self, assignment: &Assignment, collectables: Vec<Collectable>) {
        if collectables.is_empty() {
            return;
        }

        event!(Level::DEBUG, event = collector::COLLECTABLES_REGISTERED,
               assignment = %assignment.id, count = %collectables.len());
        self.held.lock().entry(assignment.id).or_default().extend(collectables);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use once_cell::sync::Lazy;

    use super::*;
    use crate::{
        port::collector::Native,
        structure::registration::{GlobalStructure, RegisterOptions, Structure, StructureCandidate}
    };

    static DELETED: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(0));

    #[derive(Debug)]
    struct Table {
        id: String
    }

    #[async_trait]
    impl GlobalStructure for Table {
        const IDENTIFIER: &'static str = "@test/table";

        async fn expand(reference: String) -> anyhow::Result<Self> {
            Ok(Table { id: reference })
        }

        async fn shrink(&self) -> anyhow::Result<String> {
            Ok(self.id.clone())
        }

        async fn collect(&self) -> anyhow::Result<()> {
            if self.id == "locked" {
                anyhow::bail!("table {} is locked", self.id);
            }
            DELETED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Structure for Table {
        fn candidate() -> StructureCandidate {
            StructureCandidate::global::<Table>()
        }
    }

    fn collectable(id: &str) -> Collectable {
        Collectable { identifier: "@test/table".to_string(), value: Arc::new(Table { id: id.to_string() }) as Native }
    }

    #[tokio::test]
    async fn test_collect_releases_and_forgets() {
        let registry = Arc::new(StructureRegistry::new());
        registry.register_as_structure::<Table>(RegisterOptions::new()).unwrap();
        let collector = InMemoryCollector::new(registry);
        let assignment = Assignment::new("tables", vec![]);

        collector.register(&assignment, vec![collectable("a"), collectable("locked")]).await;
        collector.register(&assignment, vec![collectable("b")]).await;
        collector.register(&assignment, vec![]).await;
        assert_eq!(collector.held(assignment.id), 3);
        assert_eq!(collector.assignments(), vec![assignment.id]);

        let before = DELETED.load(Ordering::SeqCst);
        assert_eq!(collector.collect(assignment.id).await, 2);
        assert_eq!(DELETED.load(Ordering::SeqCst) - before, 2);

        assert_eq!(collector.held(assignment.id), 0);
        assert_eq!(collector.collect(assignment.id).await, 0);
    }
}
