//! Per-assignment handle passed explicitly to actor bodies

use std::sync::Arc;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::{
    domain::{
        assignment::{Assignment, AssignmentStatus, Passport, StatusUpdate},
        error::ActorError
    },
    executor::reporter::StatusReporter
};

/// Scoped view of the assignment currently being executed
///
/// One context is built per assignment and handed to the body as a parameter, so concurrent
/// assignments of the same actor never see each other's state. Dropping the context is
/// the scope exit.
#[derive(Clone)]
pub struct AssignmentContext {
    reporter:     Arc<StatusReporter>,
    cancellation: CancellationToken
}

impl AssignmentContext {
    pub fn new(reporter: Arc<StatusReporter>, cancellation: CancellationToken) -> Self {
        Self { reporter, cancellation }
    }

    pub fn assignment(&self) -> &Assignment {
        self.reporter.assignment()
    }

    pub fn passport(&self) -> &Passport {
        self.reporter.passport()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the assignment is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// `Err(ActorError::Cancelled)` once the assignment is cancelled
    pub fn check_cancelled(&self) -> Result<(), ActorError> {
        if self.is_cancelled() {
            return Err(ActorError::Cancelled);
        }
        Ok(())
    }

    /// Report progress; ignored once the assignment reached a terminal state
    pub async fn progress(&self, percent: u8, message: impl Into<String>) {
        let update = StatusUpdate::new(self.assignment(), self.passport(), AssignmentStatus::Progress)
            .with_progress(percent)
            .with_message(message);
        self.reporter.report(update).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::transport::RecordingTransport;

    #[tokio::test]
    async fn test_progress_and_cancellation() {
        let transport = Arc::new(RecordingTransport::new());
        let assignment = Arc::new(Assignment::new("train", vec![]));
        let reporter = Arc::new(StatusReporter::new(assignment.clone(), Passport::new("agent", "train"), transport.clone()));
        let token = CancellationToken::new();
        let context = AssignmentContext::new(reporter, token.clone());

        assert_eq!(context.assignment().id, assignment.id);
        context.progress(40, "epoch 2").await;
        assert!(context.check_cancelled().is_ok());

        token.cancel();
        assert!(context.is_cancelled());
        assert!(matches!(context.check_cancelled(), Err(ActorError::Cancelled)));
        context.cancelled().await;

        let updates = transport.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].progress, Some(40));
        assert_eq!(updates[0].message.as_deref(), Some("epoch 2"));
    }
}
