//! Execution strategies
//!
//! A `Strategy` owns the assignment lifecycle; a `Runner` decides where the body runs.
//! Backends: `Inline` (caller's runtime), `Threaded` (blocking pool) and `Subprocess`
//! (worker processes), each in a single-return and a streaming variant.

pub mod context;
pub mod inline;
pub mod reporter;
pub mod runner;
pub mod strategy;
pub mod subprocess;
pub mod threaded;

pub use context::AssignmentContext;
pub use inline::Inline;
pub use runner::{Invocation, Output, OutputStream, RunMode, Runner};
pub use strategy::Strategy;
pub use subprocess::{ProcessPool, Subprocess, WorkerCommand};
pub use threaded::{ThreadPool, Threaded};
