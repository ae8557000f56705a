use thiserror::Error;
use uuid::Uuid;

/// Misconfiguration of the structure registry
///
/// Raised synchronously while wiring types, never swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    /// No hook claimed the type, or the claiming hook failed while applying
    #[error("{0}")]
    Definition(String),

    /// Identifier or type already registered and overwriting is disabled
    #[error("{0}")]
    Overwrite(String),

    /// Lookup miss with auto-registration disabled, or a default converter failed
    #[error("{0}")]
    Registry(String)
}

/// Expanding or shrinking a value against its registered structure failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SerializationError {
    pub message: String
}

impl SerializationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::new(err.to_string())
    }
}

/// Failures raised from inside an actor body
#[derive(Error, Debug)]
pub enum ActorError {
    /// The body's own precondition failed
    #[error("{0}")]
    Assertion(String),

    /// A value could not be converted to or from its wire form
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The body failed in a way the dispatcher may retry
    #[error("{0}")]
    Retryable(String),

    /// The body observed cancellation and gave up
    #[error("assignment was cancelled")]
    Cancelled,

    /// The body panicked
    #[error("actor panicked: {0}")]
    Panic(String),

    /// Anything else
    #[error(transparent)]
    Other(#[from] anyhow::Error)
}

impl ActorError {
    pub fn assertion(message: impl Into<String>) -> Self {
        ActorError::Assertion(message.into())
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        ActorError::Retryable(message.into())
    }
}

/// Returned by `on_assign` when a failure must be observed by the caller
///
/// Single-return actors report and swallow their failures; streaming actors re-raise
/// serialization and assertion faults after reporting them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("{0}")]
    Serialization(String),

    #[error("{0}")]
    Assertion(String),

    #[error("assignment {0} was cancelled")]
    Cancelled(Uuid),

    #[error("no actor registered as {0}")]
    UnknownActor(String),

    #[error("assignment {0} is already running")]
    AlreadyRunning(Uuid)
}

/// Common error type for wiring and running the executor
#[derive(Error, Debug, Clone)]
pub enum ExecutorError {
    /// Structure registry misconfiguration
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// An assignment was refused or failed in a way its caller must observe
    #[error(transparent)]
    Assignment(#[from] AssignmentError),

    /// The agent could not be reached
    #[error("{0}")]
    Messaging(String),

    /// Actor definition does not fit the strategy it was given
    #[error("{0}")]
    Definition(String),

    /// The agent actor could not be spawned
    #[error("{0}")]
    Spawn(String)
}

/// Convert from ractor::SpawnErr
impl From<ractor::SpawnErr> for ExecutorError {
    fn from(err: ractor::SpawnErr) -> Self {
        ExecutorError::Spawn(err.to_string())
    }
}
