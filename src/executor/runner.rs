//! The seam between the lifecycle strategy and where an actor body physically runs

use std::any::Any;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    domain::error::ActorError,
    executor::context::AssignmentContext,
    structure::convert::{Args, Returns}
};

/// Whether the body returns once or streams values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Invoke,
    Stream
}

/// One result produced by a body
pub enum Output {
    /// Native values, shrunk by the strategy
    Native(Returns),
    /// Wire values from another process; expanded and re-shrunk by the strategy
    Wire(Vec<Value>)
}

pub type OutputStream = BoxStream<'static, Result<Output, ActorError>>;

/// Everything a runner needs to execute one assignment
pub struct Invocation {
    pub context:   AssignmentContext,
    /// Expanded arguments, in port order
    pub args:      Args,
    /// Arguments in boundary form; only filled for runners crossing a process boundary
    pub wire_args: Vec<Value>
}

impl Invocation {
    pub fn new(context: AssignmentContext, args: Args, wire_args: Vec<Value>) -> Self {
        Self { context, args, wire_args }
    }
}

/// Executes an actor body on some backend
///
/// `Invoke` runners produce a stream with exactly one item; `Stream` runners produce one
/// item per yielded value. Dropping the stream abandons the body as far as the backend allows.
#[async_trait]
pub trait Runner: Send + Sync {
    fn mode(&self) -> RunMode;

    /// Backend name used in logs
    fn backend(&self) -> &'static str;

    /// Whether arguments must be handed over in wire form
    fn crosses_process_boundary(&self) -> bool {
        false
    }

    async fn run(&self, invocation: Invocation) -> Result<OutputStream, ActorError>;
}

/// Stream the items a worker hands over through a channel
pub(crate) fn receiver_stream<T: Send + 'static>(mut rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed()
}

/// Human-readable payload of a caught panic
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "panic payload is not a string".to_string()
}
