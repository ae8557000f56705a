use async_trait::async_trait;

use crate::domain::assignment::StatusUpdate;

/// Delivers status updates to whoever dispatched an assignment
///
/// Fire-and-forget from the executor's point of view: implementations must accept
/// repeated calls and must not fail for expected status values. Delivery problems are
/// the transport's own business to log or retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Report a status change for one assignment
    async fn change(&self, update: StatusUpdate);
}
