//! Async bodies run on the caller's runtime

use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures::{
    FutureExt, Stream, StreamExt,
    future::BoxFuture,
    stream::{self, BoxStream}
};

use crate::{
    domain::error::ActorError,
    executor::{
        context::AssignmentContext,
        runner::{Invocation, Output, OutputStream, RunMode, Runner, panic_message}
    },
    structure::convert::{Args, Returns}
};

type AsyncFunction = Arc<dyn Fn(AssignmentContext, Args) -> BoxFuture<'static, Result<Returns, ActorError>> + Send + Sync>;
type AsyncGenerator =
    Arc<dyn Fn(AssignmentContext, Args) -> BoxStream<'static, Result<Returns, ActorError>> + Send + Sync>;

enum Body {
    Function(AsyncFunction),
    Generator(AsyncGenerator)
}

/// Runs cooperative bodies directly; cancellation lands at the body's next `.await`
pub struct Inline {
    body: Body
}

impl Inline {
    /// A body returning once
    pub fn function<F, Fut>(function: F) -> Self
    where
        F: Fn(AssignmentContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Returns, ActorError>> + Send + 'static
    {
        Self { body: Body::Function(Arc::new(move |context, args| function(context, args).boxed())) }
    }

    /// A body streaming values
    pub fn generator<F, S>(generator: F) -> Self
    where
        F: Fn(AssignmentContext, Args) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Returns, ActorError>> + Send + 'static
    {
        Self { body: Body::Generator(Arc::new(move |context, args| generator(context, args).boxed())) }
    }
}

fn into_output(result: Result<Result<Returns, ActorError>, Box<dyn std::any::Any + Send>>) -> Result<Output, ActorError> {
    match result {
        Ok(returns) => returns.map(Output::Native),
        Err(payload) => Err(ActorError::Panic(panic_message(payload)))
    }
}

#[async_trait]
impl Runner for Inline {
    fn mode(&self) -> RunMode {
        match self.body {
            Body::Function(_) => RunMode::Invoke,
            Body::Generator(_) => RunMode::Stream
        }
    }

    fn backend(&self) -> &'static str {
        "inline"
    }

    async fn run(&self, invocation: Invocation) -> Result<OutputStream, ActorError> {
        let Invocation { context, args, .. } = invocation;

        match &self.body {
            Body::Function(function) => {
                let function = function.clone();
                let result = AssertUnwindSafe(async move { function(context, args).await }).catch_unwind().await;
                let output = into_output(result);
                Ok(stream::once(async move { output }).boxed())
            }
            Body::Generator(generator) => {
                let generator = generator.clone();
                let values = std::panic::catch_unwind(AssertUnwindSafe(|| generator(context, args)))
                    .map_err(|payload| ActorError::Panic(panic_message(payload)))?;
                Ok(AssertUnwindSafe(values).catch_unwind().map(into_output).boxed())
            }
        }
    }
}
