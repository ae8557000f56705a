//! Actors and the agent that hosts them
//!
//! An `Actor` binds a definition to an execution strategy. The `Agent` is a Ractor actor
//! routing assignments to its actors by name and tracking what is in flight.

pub mod agent;
pub mod instance;
pub mod message;

pub use agent::{Agent, AgentArguments, AgentState};
pub use instance::Actor;
pub use message::AgentMessage;
