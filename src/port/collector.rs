use std::{any::Any, fmt, sync::Arc};

use async_trait::async_trait;

use crate::domain::assignment::Assignment;

/// Native value as handed around by the executor
pub type Native = Arc<dyn Any + Send + Sync>;

/// A produced value that may hold resources needing eventual release
#[derive(Clone)]
pub struct Collectable {
    /// Structure identifier the value was shrunk with
    pub identifier: String,
    pub value:      Native
}

impl fmt::Debug for Collectable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collectable").field("identifier", &self.identifier).finish_non_exhaustive()
    }
}

/// Tracks values produced for assignments so they can be released later
///
/// Called before the status carrying those values is reported.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn register(&self, assignment: &Assignment, collectables: Vec<Collectable>);
}
