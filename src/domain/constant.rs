//! Domain Events - Structured events for internal monitoring and debugging

/// Structure Registry Events
pub mod registry {
    pub const STRUCTURE_REGISTERED: &str = "structure.registered";
    pub const STRUCTURE_OVERWRITTEN: &str = "structure.overwritten";
    pub const STRUCTURE_AUTO_REGISTERED: &str = "structure.auto_registered";
    pub const STRUCTURE_REJECTED: &str = "structure.rejected";
    pub const LOOKUP_MISSED: &str = "lookup.missed";
}

/// Assignment Lifecycle Events
pub mod lifecycle {
    pub const ASSIGNMENT_RECEIVED: &str = "assignment.received";
    pub const ASSIGNMENT_ASSIGNED: &str = "assignment.assigned";
    pub const ASSIGNMENT_YIELDED: &str = "assignment.yielded";
    pub const ASSIGNMENT_RETURNED: &str = "assignment.returned";
    pub const ASSIGNMENT_DONE: &str = "assignment.done";
    pub const ASSIGNMENT_FAILED: &str = "assignment.failed";
    pub const ASSIGNMENT_CRASHED: &str = "assignment.crashed";
    pub const ASSIGNMENT_CANCELLED: &str = "assignment.cancelled";
    pub const STATUS_DROPPED: &str = "status.dropped";
    pub const STATUS_UNDELIVERED: &str = "status.undelivered";
}

/// Execution Backend Events
pub mod backend {
    pub const SLOT_WAITING: &str = "slot.waiting";
    pub const WORKER_STARTED: &str = "worker.started";
    pub const WORKER_FINISHED: &str = "worker.finished";
    pub const WORKER_KILLED: &str = "worker.killed";
    pub const WORKER_PROTOCOL_ERROR: &str = "worker.protocol_error";
}

/// Agent Actor Events
pub mod agent {
    pub const AGENT_STARTED: &str = "agent.started";
    pub const AGENT_STOPPED: &str = "agent.stopped";
    pub const ASSIGNMENT_ACCEPTED: &str = "assignment.accepted";
    pub const ASSIGNMENT_REJECTED: &str = "assignment.rejected";
    pub const ASSIGNMENT_FINISHED: &str = "assignment.finished";
    pub const ASSIGNMENT_FAULTED: &str = "assignment.faulted";
    pub const CANCEL_REQUESTED: &str = "cancel.requested";
    pub const REPLY_DROPPED: &str = "reply.dropped";
}

/// Collector Events
pub mod collector {
    pub const COLLECTABLES_REGISTERED: &str = "collectables.registered";
    pub const COLLECTABLE_RELEASED: &str = "collectable.released";
    pub const COLLECTABLE_RELEASE_FAILED: &str = "collectable.release_failed";
}
