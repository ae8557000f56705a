//! Blocking bodies offloaded to a bounded pool of blocking threads

use std::{panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{Level, event};

use crate::{
    config::ExecutorConfig,
    domain::{constant::backend, error::ActorError},
    executor::{
        context::AssignmentContext,
        runner::{Invocation, Output, OutputStream, RunMode, Runner, panic_message, receiver_stream}
    },
    structure::convert::{Args, Returns}
};

/// Shared, bounded set of slots for blocking work
///
/// A saturated pool makes new work wait for a free slot; nothing is dropped.
#[derive(Clone)]
pub struct ThreadPool {
    slots: Arc<Semaphore>,
    size:  usize
}

impl ThreadPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self { slots: Arc::new(Semaphore::new(size)), size }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.thread_pool_size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub(crate) async fn acquire(&self) -> Result<OwnedSemaphorePermit, ActorError> {
        if self.slots.available_permits() == 0 {
            event!(Level::DEBUG, event = backend::SLOT_WAITING, backend = "threaded", size = %self.size);
        }
        self.slots.clone().acquire_owned().await.map_err(|e| ActorError::Other(anyhow::anyhow!(e)))
    }
}

type BlockingFunction = Arc<dyn Fn(AssignmentContext, Args) -> Result<Returns, ActorError> + Send + Sync>;
type BlockingIterator = Box<dyn Iterator<Item = Result<Returns, ActorError>> + Send>;
type BlockingGenerator = Arc<dyn Fn(AssignmentContext, Args) -> BlockingIterator + Send + Sync>;

enum Body {
    Function(BlockingFunction),
    Generator(BlockingGenerator)
}

/// Runs blocking bodies on the pool
///
/// Single-return bodies cannot be interrupted once started. Streaming bodies are checked
/// for cancellation between iterations.
pub struct Threaded {
    pool: ThreadPool,
    body: Body
}

impl Threaded {
    pub fn function<F>(pool: ThreadPool, function: F) -> Self
    where
        F: Fn(AssignmentContext, Args) -> Result<Returns, ActorError> + Send + Sync + 'static
    {
        Self { pool, body: Body::Function(Arc::new(function)) }
    }

    pub fn generator<F, I>(pool: ThreadPool, generator: F) -> Self
    where
        F: Fn(AssignmentContext, Args) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Result<Returns, ActorError>>,
        I::IntoIter: Send + 'static
    {
        let generator: BlockingGenerator =
            Arc::new(move |context, args| Box::new(generator(context, args).into_iter()) as BlockingIterator);
        Self { pool, body: Body::Generator(generator) }
    }
}

fn drain(generator: BlockingGenerator, context: AssignmentContext, args: Args, tx: &mpsc::Sender<Result<Output, ActorError>>) {
    let token = context.cancellation_token();
    for item in generator(context, args) {
        if token.is_cancelled() {
            let _ = tx.blocking_send(Err(ActorError::Cancelled));
            return;
        }
        let failed = item.is_err();
        if tx.blocking_send(item.map(Output::Native)).is_err() || failed {
            return;
        }
    }
}

#[async_trait]
impl Runner for Threaded {
    fn mode(&self) -> RunMode {
        match self.body {
            Body::Function(_) => RunMode::Invoke,
            Body::Generator(_) => RunMode::Stream
        }
    }

    fn backend(&self) -> &'static str {
        "threaded"
    }

    async fn run(&self, invocation: Invocation) -> Result<OutputStream, ActorError> {
        let Invocation { context, args, .. } = invocation;
        let permit = self.pool.acquire().await?;
        let assignment = context.assignment().id;

        match &self.body {
            Body::Function(function) => {
                let function = function.clone();
                event!(Level::DEBUG, event = backend::WORKER_STARTED, backend = "threaded", assignment = %assignment);

                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    function(context, args)
                });

                let output = match handle.await {
                    Ok(returns) => returns.map(Output::Native),
                    Err(e) if e.is_panic() => Err(ActorError::Panic(panic_message(e.into_panic()))),
                    Err(e) => Err(ActorError::Other(anyhow::anyhow!(e)))
                };

                event!(Level::DEBUG, event = backend::WORKER_FINISHED, backend = "threaded", assignment = %assignment);
                Ok(stream::once(async move { output }).boxed())
            }
            Body::Generator(generator) => {
                let generator = generator.clone();
                let (tx, rx) = mpsc::channel(1);
                event!(Level::DEBUG, event = backend::WORKER_STARTED, backend = "threaded", assignment = %assignment);

                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let drained = std::panic::catch_unwind(AssertUnwindSafe(|| drain(generator, context, args, &tx)));
                    if let Err(payload) = drained {
                        let _ = tx.blocking_send(Err(ActorError::Panic(panic_message(payload))));
                    }
                    event!(Level::DEBUG, event = backend::WORKER_FINISHED, backend = "threaded", assignment = %assignment);
                });

                Ok(receiver_stream(rx))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration
    };

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        adapter::transport::RecordingTransport,
        domain::assignment::{Assignment, Passport},
        executor::reporter::StatusReporter
    };

    fn context(token: CancellationToken) -> AssignmentContext {
        let reporter = StatusReporter::new(
            Arc::new(Assignment::new("test", vec![])),
            Passport::new("agent", "test"),
            Arc::new(RecordingTransport::new())
        );
        AssignmentContext::new(Arc::new(reporter), token)
    }

    fn invocation(token: CancellationToken) -> Invocation {
        Invocation::new(context(token), Args::default(), vec![])
    }

    #[tokio::test]
    async fn test_function_runs_off_the_runtime() {
        let runner = Threaded::function(ThreadPool::new(2), |_context, _args| {
            std::thread::sleep(Duration::from_millis(10));
            Ok(Returns::one(7i64))
        });

        let mut items = runner.run(invocation(CancellationToken::new())).await.unwrap();
        assert!(matches!(items.next().await, Some(Ok(Output::Native(_)))));
        assert!(items.next().await.is_none());
    }

    #[tokio::test]
    async fn test_saturated_pool_waits_for_a_slot() {
        let pool = ThreadPool::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let runner = {
            let running = running.clone();
            let peak = peak.clone();
            Arc::new(Threaded::function(pool.clone(), move |_context, _args| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(Returns::none())
            }))
        };

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let runner = runner.clone();
                tokio::spawn(async move {
                    let mut items = runner.run(invocation(CancellationToken::new())).await.unwrap();
                    items.next().await
                })
            })
            .collect();

        for task in tasks {
            assert!(matches!(task.await.unwrap(), Some(Ok(_))));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_generator_stops_between_iterations_when_cancelled() {
        let produced = Arc::new(AtomicUsize::new(0));
        let runner = {
            let produced = produced.clone();
            Threaded::generator(ThreadPool::new(1), move |_context, _args| {
                let produced = produced.clone();
                (0..1000i64).map(move |i| {
                    produced.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    Ok::<_, ActorError>(Returns::one(i))
                })
            })
        };

        let token = CancellationToken::new();
        let mut items = runner.run(invocation(token.clone())).await.unwrap();
        assert!(matches!(items.next().await, Some(Ok(_))));

        token.cancel();
        let mut last = None;
        while let Some(item) = items.next().await {
            last = Some(item);
        }

        assert!(matches!(last, Some(Err(ActorError::Cancelled))));
        assert!(produced.load(Ordering::SeqCst) < 1000);
    }

    #[tokio::test]
    async fn test_panicking_generator() {
        let runner = Threaded::generator(ThreadPool::new(1), |_context, _args| {
            (0..3i64).map(|i| {
                if i == 1 {
                    panic!("sensor offline");
                }
                Ok::<_, ActorError>(Returns::one(i))
            })
        });

        let items: Vec<_> = runner.run(invocation(CancellationToken::new())).await.unwrap().collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(ActorError::Panic(ref message)) if message == "sensor offline"));
    }
}
