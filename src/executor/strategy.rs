//! Assignment lifecycle
//!
//! One `Strategy` drives every assignment of an actor through
//! `ASSIGNED → YIELD* → terminal`, independent of where the body runs. Arguments are
//! expanded and results shrunk here, on the caller's runtime, so collectables are always
//! registered from a context that can reach the collector.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};

use crate::{
    domain::{
        assignment::{Assignment, AssignmentStatus, Passport},
        constant::lifecycle,
        definition::{Definition, DefinitionKind},
        error::{ActorError, AssignmentError, ExecutorError, SerializationError}
    },
    executor::{
        context::AssignmentContext,
        reporter::StatusReporter,
        runner::{Invocation, Output, RunMode, Runner}
    },
    port::{collector::Collector, transport::Transport},
    structure::{
        convert::{Shrunk, boundary_args, expand_inputs, expand_outputs, shrink_outputs},
        registry::StructureRegistry
    }
};

/// Lifecycle driver shared by all backends
pub struct Strategy {
    definition: Arc<Definition>,
    registry:   Arc<StructureRegistry>,
    runner:     Arc<dyn Runner>
}

impl Strategy {
    /// Fails when a function definition is paired with a streaming runner or vice versa
    pub fn new(
        definition: Arc<Definition>,
        registry: Arc<StructureRegistry>,
        runner: Arc<dyn Runner>
    ) -> Result<Self, ExecutorError> {
        match (definition.kind, runner.mode()) {
            (DefinitionKind::Function, RunMode::Invoke) | (DefinitionKind::Generator, RunMode::Stream) => {
                Ok(Self { definition, registry, runner })
            }
            (kind, mode) => Err(ExecutorError::Definition(format!(
                "{} is a {:?} definition but its {} runner is in {:?} mode",
                definition.name,
                kind,
                runner.backend(),
                mode
            )))
        }
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    pub fn registry(&self) -> &Arc<StructureRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &'static str {
        self.runner.backend()
    }

    /// Drive one assignment to its terminal status
    ///
    /// Resolves once the terminal status was reported. Failures are reported and swallowed
    /// for single-return actors; streaming actors re-raise serialization and assertion
    /// faults after reporting them. Cancellation is always re-raised.
    pub async fn on_assign(
        &self,
        assignment: Assignment,
        passport: &Passport,
        collector: Arc<dyn Collector>,
        transport: Arc<dyn Transport>,
        cancellation: CancellationToken
    ) -> Result<(), AssignmentError> {
        let assignment = Arc::new(assignment);
        event!(Level::DEBUG, event = lifecycle::ASSIGNMENT_RECEIVED,
               assignment = %assignment.id, actor = %self.definition, backend = %self.runner.backend());

        let reporter = Arc::new(StatusReporter::new(assignment.clone(), passport.clone(), transport));

        // Fires for the body too once on_assign returns, whatever the outcome
        let token = cancellation.child_token();
        let _scope = token.clone().drop_guard();
        let context = AssignmentContext::new(reporter.clone(), token.clone());

        let outcome = self.drive(context, &reporter, collector.as_ref(), &token).await;

        self.finish(&reporter, outcome).await
    }

    /// Cancellation only interrupts work on the body and its values; status and collector
    /// calls always run to completion once started.
    async fn drive(
        &self,
        context: AssignmentContext,
        reporter: &StatusReporter,
        collector: &dyn Collector,
        token: &CancellationToken
    ) -> Result<(), ActorError> {
        let assignment = reporter.assignment().clone();

        let args = or_cancelled(token, expand_inputs(&self.definition, &assignment.args, &self.registry)).await??;
        let wire_args = if self.runner.crosses_process_boundary() {
            or_cancelled(token, boundary_args(&self.definition, &assignment.args, &args, &self.registry)).await??
        } else {
            Vec::new()
        };

        reporter.status(AssignmentStatus::Assigned).await;
        event!(Level::DEBUG, event = lifecycle::ASSIGNMENT_ASSIGNED, assignment = %assignment.id);

        let mut outputs = or_cancelled(token, self.runner.run(Invocation::new(context, args, wire_args))).await??;

        match self.runner.mode() {
            RunMode::Invoke => {
                let output = or_cancelled(token, outputs.next()).await?.ok_or_else(|| {
                    ActorError::Other(anyhow::anyhow!("{} finished without returning", self.definition))
                })??;
                let shrunk = or_cancelled(token, self.shrink(output)).await??;

                collector.register(&assignment, shrunk.collectables).await;
                reporter.status_with_returns(AssignmentStatus::Returned, shrunk.values).await;
                event!(Level::DEBUG, event = lifecycle::ASSIGNMENT_RETURNED, assignment = %assignment.id);
            }
            RunMode::Stream => {
                let mut yielded = 0usize;
                while let Some(output) = or_cancelled(token, outputs.next()).await? {
                    let shrunk = or_cancelled(token, self.shrink(output?)).await??;

                    collector.register(&assignment, shrunk.collectables).await;
                    reporter.status_with_returns(AssignmentStatus::Yield, shrunk.values).await;
                    yielded += 1;
                    event!(Level::TRACE, event = lifecycle::ASSIGNMENT_YIELDED, assignment = %assignment.id, count = %yielded);
                }

                reporter.status(AssignmentStatus::Done).await;
                event!(Level::DEBUG, event = lifecycle::ASSIGNMENT_DONE, assignment = %assignment.id, yielded = %yielded);
            }
        }

        Ok(())
    }

    async fn shrink(&self, output: Output) -> Result<Shrunk, SerializationError> {
        let returns = match output {
            Output::Native(returns) => returns,
            Output::Wire(values) => expand_outputs(&self.definition, values, &self.registry).await?
        };
        shrink_outputs(&self.definition, returns, &self.registry).await
    }

    /// Map the outcome onto the terminal status and the caller-visible result
    async fn finish(&self, reporter: &StatusReporter, outcome: Result<(), ActorError>) -> Result<(), AssignmentError> {
        let id = reporter.assignment().id;
        let streaming = self.runner.mode() == RunMode::Stream;

        match outcome {
            Ok(()) => Ok(()),
            Err(ActorError::Serialization(e)) => {
                event!(Level::WARN, event = lifecycle::ASSIGNMENT_FAILED, assignment = %id, error = %e);
                reporter.status_with_message(AssignmentStatus::Critical, e.message.clone()).await;
                if streaming { Err(AssignmentError::Serialization(e.message)) } else { Ok(()) }
            }
            Err(ActorError::Assertion(message)) => {
                event!(Level::WARN, event = lifecycle::ASSIGNMENT_FAILED, assignment = %id, error = %message);
                reporter.status_with_message(AssignmentStatus::Critical, message.clone()).await;
                if streaming { Err(AssignmentError::Assertion(message)) } else { Ok(()) }
            }
            Err(ActorError::Retryable(message)) => {
                event!(Level::WARN, event = lifecycle::ASSIGNMENT_FAILED, assignment = %id, error = %message);
                reporter.status_with_message(AssignmentStatus::Error, message).await;
                Ok(())
            }
            Err(ActorError::Cancelled) => {
                event!(Level::INFO, event = lifecycle::ASSIGNMENT_CANCELLED, assignment = %id);
                reporter.status(AssignmentStatus::Cancelled).await;
                Err(AssignmentError::Cancelled(id))
            }
            Err(e) => {
                event!(Level::ERROR, event = lifecycle::ASSIGNMENT_CRASHED, assignment = %id, error = ?e);
                reporter.status_with_message(AssignmentStatus::Critical, format!("{:#}", e)).await;
                Ok(())
            }
        }
    }
}

/// Run `work` unless the assignment is cancelled first
async fn or_cancelled<F: Future>(token: &CancellationToken, work: F) -> Result<F::Output, ActorError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ActorError::Cancelled),
        output = work => Ok(output)
    }
}
