//! In-process implementations of the collaborator ports

pub mod collector;
pub mod transport;

pub use collector::InMemoryCollector;
pub use transport::{ChannelTransport, RecordingTransport};
