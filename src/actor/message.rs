//! Typed messages for the agent actor

use ractor::RpcReplyPort;
use uuid::Uuid;

use crate::domain::{assignment::Assignment, error::AssignmentError};

/// Messages for the Agent actor
#[derive(Debug)]
pub enum AgentMessage {
    /// Start processing an assignment; the reply tells whether it was accepted
    Assign { assignment: Assignment, reply: Option<RpcReplyPort<Result<(), AssignmentError>>> },
    /// Cancel an assignment in flight
    Cancel { assignment_id: Uuid },
    /// An assignment reached its terminal status (sent by the agent's own tasks)
    Finished { assignment_id: Uuid, result: Result<(), AssignmentError> },
    /// Number of assignments in flight
    ActiveAssignments { reply: RpcReplyPort<usize> },
    /// Cancel everything in flight and stop
    Shutdown
}
