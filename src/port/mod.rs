//! Collaborator interfaces the executor reports to

pub mod collector;
pub mod transport;
