//! Core domain types shared by the registry, the executor and the agent

pub mod assignment;
pub mod constant;
pub mod definition;
pub mod error;
