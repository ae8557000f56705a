//! # actorun
//!
//! An actor-based executor for remote assignments.
//!
//! This crate provides:
//! - A structure registry converting wire values to native objects and back
//! - Execution strategies running actor bodies inline, on a blocking pool or in worker processes
//! - A status lifecycle reported through a pluggable transport
//! - A Ractor agent hosting actors and routing assignments to them

pub mod actor;
pub mod adapter;
pub mod config;
pub mod domain;
pub mod executor;
pub mod port;
pub mod structure;

pub use actor::{Actor, Agent, AgentArguments, AgentMessage};
pub use config::{ExecutorConfig, load_config, load_default_config};
pub use domain::{
    assignment::{Assignment, AssignmentStatus, Passport, StatusUpdate},
    definition::{Definition, DefinitionKind, Port},
    error::{ActorError, AssignmentError, ExecutorError}
};
pub use executor::{AssignmentContext, Inline, Subprocess, Threaded};
pub use structure::{Args, Returns, StructureRegistry};
