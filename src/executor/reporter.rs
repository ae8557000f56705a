//! Single gatekeeper for the status updates of one assignment

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{Level, event};

use crate::{
    domain::{
        assignment::{Assignment, AssignmentStatus, Passport, StatusUpdate},
        constant::lifecycle
    },
    port::transport::Transport
};

/// Serializes the status updates of one assignment and enforces a single terminal state
///
/// The lock is held across `Transport::change` so updates reach the transport in the order
/// they were reported. Once a terminal status was delivered every later update is dropped.
pub struct StatusReporter {
    assignment: Arc<Assignment>,
    passport:   Passport,
    transport:  Arc<dyn Transport>,
    terminal:   Mutex<Option<AssignmentStatus>>
}

impl StatusReporter {
    pub fn new(assignment: Arc<Assignment>, passport: Passport, transport: Arc<dyn Transport>) -> Self {
        Self { assignment, passport, transport, terminal: Mutex::new(None) }
    }

    pub fn assignment(&self) -> &Arc<Assignment> {
        &self.assignment
    }

    pub fn passport(&self) -> &Passport {
        &self.passport
    }

    /// Terminal status reported so far, if any
    pub async fn terminal(&self) -> Option<AssignmentStatus> {
        *self.terminal.lock().await
    }

    /// Send an update; returns false when it was dropped
    pub async fn report(&self, update: StatusUpdate) -> bool {
        let mut terminal = self.terminal.lock().await;

        if let Some(reached) = *terminal {
            event!(Level::WARN, event = lifecycle::STATUS_DROPPED,
                   assignment = %self.assignment.id, status = %update.status, terminal = %reached);
            return false;
        }

        let status = update.status;
        self.transport.change(update).await;

        // Only a delivered update closes the lifecycle
        if status.is_terminal() {
            *terminal = Some(status);
        }
        true
    }

    pub async fn status(&self, status: AssignmentStatus) -> bool {
        self.report(StatusUpdate::new(&self.assignment, &self.passport, status)).await
    }

    pub async fn status_with_message(&self, status: AssignmentStatus, message: impl Into<String>) -> bool {
        self.report(StatusUpdate::new(&self.assignment, &self.passport, status).with_message(message)).await
    }

    pub async fn status_with_returns(&self, status: AssignmentStatus, returns: Vec<Value>) -> bool {
        self.report(StatusUpdate::new(&self.assignment, &self.passport, status).with_returns(returns)).await
    }
}
