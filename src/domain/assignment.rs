//! Assignments and the status updates reported for them

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::definition::Definition;

/// One incoming request to execute an actor with specific arguments
///
/// Immutable once received; owned by the strategy processing it until a terminal
/// status has been reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Unique assignment identifier
    pub id:        Uuid,
    /// Name of the actor whose definition the arguments target
    pub actor:     String,
    /// Wire-encoded arguments, in port order
    pub args:      Vec<Value>,
    /// Optional caller-side reference echoed back by transports
    pub reference: Option<String>,
    /// Assignment that spawned this one, if any
    pub parent:    Option<Uuid>
}

impl Assignment {
    pub fn new(actor: impl Into<String>, args: Vec<Value>) -> Self {
        Self { id: Uuid::new_v4(), actor: actor.into(), args, reference: None, parent: None }
    }

    /// Build an assignment from keyword arguments, ordered by the definition's ports
    ///
    /// Keys the definition does not know are ignored; missing keys become `null`.
    pub fn from_kwargs(actor: impl Into<String>, definition: &Definition, kwargs: &Map<String, Value>) -> Self {
        let args = definition.args.iter().map(|port| kwargs.get(&port.key).cloned().unwrap_or(Value::Null)).collect();
        Self::new(actor, args)
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Lifecycle status of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentStatus {
    /// Arguments expanded, body about to run
    Assigned,
    /// Body reported progress
    Progress,
    /// Streaming body produced a value
    Yield,
    /// Single-return body returned
    Returned,
    /// Streaming body was exhausted
    Done,
    /// Retryable failure
    Error,
    /// Non-retryable failure
    Critical,
    /// Cancelled before reaching another terminal state
    Cancelled
}

impl AssignmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssignmentStatus::Returned
                | AssignmentStatus::Done
                | AssignmentStatus::Error
                | AssignmentStatus::Critical
                | AssignmentStatus::Cancelled
        )
    }
}

impl Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssignmentStatus::Assigned => "ASSIGNED",
            AssignmentStatus::Progress => "PROGRESS",
            AssignmentStatus::Yield => "YIELD",
            AssignmentStatus::Returned => "RETURNED",
            AssignmentStatus::Done => "DONE",
            AssignmentStatus::Error => "ERROR",
            AssignmentStatus::Critical => "CRITICAL",
            AssignmentStatus::Cancelled => "CANCELLED"
        };
        write!(f, "{}", name)
    }
}

/// Identity of the actor instance reporting a status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Passport {
    /// Agent hosting the actor
    pub agent:       String,
    /// Actor name
    pub actor:       String,
    /// Identifies this particular actor instance
    pub instance_id: Uuid
}

impl Passport {
    pub fn new(agent: impl Into<String>, actor: impl Into<String>) -> Self {
        Self { agent: agent.into(), actor: actor.into(), instance_id: Uuid::new_v4() }
    }
}

/// One status change delivered to a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub assignment: Uuid,
    pub reference:  Option<String>,
    pub passport:   Passport,
    pub status:     AssignmentStatus,
    pub message:    Option<String>,
    /// Shrunk return values for `YIELD` / `RETURNED`
    pub returns:    Option<Vec<Value>>,
    /// Percentage for `PROGRESS`
    pub progress:   Option<u8>,
    pub timestamp:  DateTime<Utc>
}

impl StatusUpdate {
    pub fn new(assignment: &Assignment, passport: &Passport, status: AssignmentStatus) -> Self {
        Self {
            assignment: assignment.id,
            reference: assignment.reference.clone(),
            passport: passport.clone(),
            status,
            message: None,
            returns: None,
            progress: None,
            timestamp: Utc::now()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_returns(mut self, returns: Vec<Value>) -> Self {
        self.returns = Some(returns);
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::definition::{Port, PortKind, Scope};

    fn port(key: &str) -> Port {
        Port {
            key:           key.to_string(),
            kind:          PortKind::Int,
            identifier:    "int".to_string(),
            scope:         Scope::Local,
            nullable:      true,
            default:       None,
            label:         None,
            description:   None,
            assign_widget: None,
            return_widget: None
        }
    }

    #[test]
    fn test_from_kwargs_orders_by_port() {
        let definition = Definition::function("add", vec![port("a"), port("b"), port("c")], vec![]);
        let kwargs = json!({"c": 3, "a": 1, "unknown": 9});

        let assignment = Assignment::from_kwargs("add", &definition, kwargs.as_object().unwrap());

        assert_eq!(assignment.actor, "add");
        assert_eq!(assignment.args, vec![json!(1), Value::Null, json!(3)]);
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = [
            AssignmentStatus::Assigned,
            AssignmentStatus::Progress,
            AssignmentStatus::Yield,
            AssignmentStatus::Returned,
            AssignmentStatus::Done,
            AssignmentStatus::Error,
            AssignmentStatus::Critical,
            AssignmentStatus::Cancelled
        ]
        .into_iter()
        .filter(AssignmentStatus::is_terminal)
        .collect();

        assert_eq!(terminal.len(), 5);
        assert!(!terminal.contains(&AssignmentStatus::Yield));
    }

    #[test]
    fn test_status_update_carries_assignment_identity() {
        let assignment = Assignment::new("square", vec![json!(2)]).with_reference("ref-1");
        let passport = Passport::new("agent", "square");

        let update = StatusUpdate::new(&assignment, &passport, AssignmentStatus::Progress).with_progress(150);

        assert_eq!(update.assignment, assignment.id);
        assert_eq!(update.reference.as_deref(), Some("ref-1"));
        assert_eq!(update.progress, Some(100));
        assert_eq!(serde_json::to_value(update.status).unwrap(), json!("PROGRESS"));
    }
}
