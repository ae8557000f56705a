//! Bodies run in a separate worker process speaking JSON lines
//!
//! The worker receives one request line on stdin:
//!
//! ```text
//! {"assignment": {...}, "args": [...], "stream": false}
//! ```
//!
//! and answers with reply lines on stdout, each tagged by `kind`:
//! `yield` / `return` (with `returns`), `assertion` / `error` / `retry` (with `message`)
//! and `done`. Cancellation kills the worker.

use std::{path::PathBuf, process::Stdio, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdout, Command},
    sync::{OwnedSemaphorePermit, Semaphore, mpsc}
};
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};
use uuid::Uuid;

use crate::{
    config::ExecutorConfig,
    domain::{assignment::Assignment, constant::backend, error::{ActorError, SerializationError}},
    executor::runner::{Invocation, Output, OutputStream, RunMode, Runner, receiver_stream}
};

/// Shared, bounded number of concurrently running worker processes
#[derive(Clone)]
pub struct ProcessPool {
    slots: Arc<Semaphore>,
    size:  usize
}

impl ProcessPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self { slots: Arc::new(Semaphore::new(size)), size }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.process_pool_size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, ActorError> {
        if self.slots.available_permits() == 0 {
            event!(Level::DEBUG, event = backend::SLOT_WAITING, backend = "subprocess", size = %self.size);
        }
        self.slots.clone().acquire_owned().await.map_err(|e| ActorError::Other(anyhow::anyhow!(e)))
    }
}

/// How to start a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program:     String,
    pub args:        Vec<String>,
    pub envs:        Vec<(String, String)>,
    pub current_dir: Option<PathBuf>
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), envs: Vec::new(), current_dir: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn spawn(&self) -> std::io::Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command.spawn()
    }
}

#[derive(Serialize)]
struct WorkerRequest<'a> {
    assignment: &'a Assignment,
    args:       &'a [Value],
    stream:     bool
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum WorkerReply {
    Yield { returns: Vec<Value> },
    Return { returns: Vec<Value> },
    Assertion { message: String },
    Error { message: String },
    Retry { message: String },
    Done
}

/// What a reply means for the stream: an item to forward, and whether it was the last one
fn translate(reply: WorkerReply, mode: RunMode) -> (Option<Result<Output, ActorError>>, bool) {
    match (reply, mode) {
        (WorkerReply::Return { returns }, RunMode::Invoke) => (Some(Ok(Output::Wire(returns))), true),
        (WorkerReply::Yield { returns }, RunMode::Stream) => (Some(Ok(Output::Wire(returns))), false),
        (WorkerReply::Done, RunMode::Stream) => (None, true),
        (WorkerReply::Assertion { message }, _) => (Some(Err(ActorError::Assertion(message))), true),
        (WorkerReply::Retry { message }, _) => (Some(Err(ActorError::Retryable(message))), true),
        (WorkerReply::Error { message }, _) => (Some(Err(ActorError::Other(anyhow::anyhow!(message)))), true),
        (reply, mode) => {
            let message = format!("worker sent {:?} to a {:?} invocation", reply, mode);
            (Some(Err(ActorError::Other(anyhow::anyhow!(message)))), true)
        }
    }
}

/// Runs bodies in worker processes from a shared pool
///
/// Arguments cross the boundary in wire form; returned wire values are expanded and
/// re-shrunk by the caller.
pub struct Subprocess {
    pool:    ProcessPool,
    command: WorkerCommand,
    mode:    RunMode
}

impl Subprocess {
    pub fn function(pool: ProcessPool, command: WorkerCommand) -> Self {
        Self { pool, command, mode: RunMode::Invoke }
    }

    pub fn generator(pool: ProcessPool, command: WorkerCommand) -> Self {
        Self { pool, command, mode: RunMode::Stream }
    }
}

type Sender = mpsc::Sender<Result<Output, ActorError>>;

async fn stop(mut child: Child, assignment: Uuid) {
    if let Err(e) = child.kill().await {
        event!(Level::WARN, event = backend::WORKER_KILLED, assignment = %assignment, error = %e);
        return;
    }
    event!(Level::DEBUG, event = backend::WORKER_KILLED, assignment = %assignment);
}

/// Forward the worker's replies until a terminal one, its exit, or cancellation
async fn pump(
    mut child: Child,
    stdout: ChildStdout,
    tx: Sender,
    token: CancellationToken,
    mode: RunMode,
    assignment: Uuid,
    _permit: OwnedSemaphorePermit
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => {
                stop(child, assignment).await;
                let _ = tx.send(Err(ActorError::Cancelled)).await;
                return;
            }
            _ = tx.closed() => {
                stop(child, assignment).await;
                return;
            }
            line = lines.next_line() => line
        };

        let line = match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => line,
            Ok(None) => {
                let status = child.wait().await.map(|status| status.to_string()).unwrap_or_else(|e| e.to_string());
                event!(Level::WARN, event = backend::WORKER_PROTOCOL_ERROR, assignment = %assignment, status = %status);
                let _ = tx
                    .send(Err(ActorError::Other(anyhow::anyhow!("worker exited without a result ({})", status))))
                    .await;
                return;
            }
            Err(e) => {
                stop(child, assignment).await;
                let _ = tx.send(Err(ActorError::Other(anyhow::anyhow!("reading worker output: {}", e)))).await;
                return;
            }
        };

        let reply = match serde_json::from_str::<WorkerReply>(&line) {
            Ok(reply) => reply,
            Err(e) => {
                event!(Level::WARN, event = backend::WORKER_PROTOCOL_ERROR, assignment = %assignment, line = %line);
                stop(child, assignment).await;
                let _ = tx.send(Err(ActorError::Other(anyhow::anyhow!("unreadable worker reply: {}", e)))).await;
                return;
            }
        };

        let (item, last) = translate(reply, mode);
        if let Some(item) = item
            && tx.send(item).await.is_err()
        {
            stop(child, assignment).await;
            return;
        }
        if last {
            break;
        }
    }

    match child.wait().await {
        Ok(status) => event!(Level::DEBUG, event = backend::WORKER_FINISHED, assignment = %assignment, status = %status),
        Err(e) => event!(Level::WARN, event = backend::WORKER_FINISHED, assignment = %assignment, error = %e)
    }
}

#[async_trait]
impl Runner for Subprocess {
    fn mode(&self) -> RunMode {
        self.mode
    }

    fn backend(&self) -> &'static str {
        "subprocess"
    }

    fn crosses_process_boundary(&self) -> bool {
        true
    }

    async fn run(&self, invocation: Invocation) -> Result<OutputStream, ActorError> {
        let Invocation { context, wire_args, .. } = invocation;
        let assignment = context.assignment();

        let request = serde_json::to_string(&WorkerRequest {
            assignment,
            args: &wire_args,
            stream: self.mode == RunMode::Stream
        })
        .map_err(SerializationError::from)?;

        let permit = self.pool.acquire().await?;
        let mut child = self
            .command
            .spawn()
            .map_err(|e| ActorError::Other(anyhow::anyhow!("could not start worker {}: {}", self.command.program, e)))?;

        event!(Level::DEBUG, event = backend::WORKER_STARTED, backend = "subprocess",
               assignment = %assignment.id, pid = ?child.id());

        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ActorError::Other(anyhow::anyhow!("worker {} has no stdio pipes", self.command.program)));
        };

        stdin.write_all(request.as_bytes()).await.map_err(|e| ActorError::Other(e.into()))?;
        stdin.write_all(b"\n").await.map_err(|e| ActorError::Other(e.into()))?;
        drop(stdin);

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(pump(child, stdout, tx, context.cancellation_token(), self.mode, assignment.id, permit));

        Ok(receiver_stream(rx))
    }
}
