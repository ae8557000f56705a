//! Transport Implementations
//!
//! - RecordingTransport: keeps every update in memory, for tests and local runs
//! - ChannelTransport: forwards updates to an mpsc receiver owned by the dispatcher

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{Level, event};
use uuid::Uuid;

use crate::{
    domain::{
        assignment::{AssignmentStatus, StatusUpdate},
        constant::lifecycle
    },
    port::transport::Transport
};

/// Records status updates in arrival order
#[derive(Default)]
pub struct RecordingTransport {
    updates: Mutex<Vec<StatusUpdate>>
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().clone()
    }

    pub fn statuses(&self) -> Vec<AssignmentStatus> {
        self.updates.lock().iter().map(|update| update.status).collect()
    }

    pub fn for_assignment(&self, assignment: Uuid) -> Vec<StatusUpdate> {
        self.updates.lock().iter().filter(|update| update.assignment == assignment).cloned().collect()
    }

    pub fn clear(&self) {
        self.updates.lock().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn change(&self, update: StatusUpdate) {
        self.updates.lock().push(update);
    }
}

/// Forwards status updates through an unbounded channel
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<StatusUpdate>
}

impl ChannelTransport {
    pub fn new(sender: mpsc::UnboundedSender<StatusUpdate>) -> Self {
        Self { sender }
    }

    /// Transport plus the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn change(&self, update: StatusUpdate) {
        let (assignment, status) = (update.assignment, update.status);
        if self.sender.send(update).is_err() {
            event!(Level::DEBUG, event = lifecycle::STATUS_UNDELIVERED, assignment = %assignment, status = %status);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::assignment::{Assignment, Passport};

    #[tokio::test]
    async fn test_recording_transport_filters_by_assignment() {
        let transport = RecordingTransport::new();
        let passport = Passport::new("agent", "square");
        let first = Assignment::new("square", vec![json!(1)]);
        let second = Assignment::new("square", vec![json!(2)]);

        transport.change(StatusUpdate::new(&first, &passport, AssignmentStatus::Assigned)).await;
        transport.change(StatusUpdate::new(&second, &passport, AssignmentStatus::Assigned)).await;
        transport.change(StatusUpdate::new(&first, &passport, AssignmentStatus::Returned)).await;

        let statuses: Vec<_> = transport.for_assignment(first.id).into_iter().map(|u| u.status).collect();
        assert_eq!(statuses, vec![AssignmentStatus::Assigned, AssignmentStatus::Returned]);

        transport.clear();
        assert!(transport.updates().is_empty());
    }

    #[tokio::test]
    async fn test_channel_transport_survives_closed_receiver() {
        let (transport, mut receiver) = ChannelTransport::channel();
        let assignment = Assignment::new("square", vec![]);
        let passport = Passport::new("agent", "square");

        transport.change(StatusUpdate::new(&assignment, &passport, AssignmentStatus::Assigned)).await;
        assert_eq!(receiver.recv().await.map(|u| u.status), Some(AssignmentStatus::Assigned));

        drop(receiver);
        transport.change(StatusUpdate::new(&assignment, &passport, AssignmentStatus::Done)).await;
    }
}
