//! Actor - a named definition bound to one execution strategy

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    domain::{
        assignment::{Assignment, Passport},
        definition::Definition,
        error::{AssignmentError, ExecutorError}
    },
    executor::{runner::Runner, strategy::Strategy},
    port::{collector::Collector, transport::Transport},
    structure::registry::StructureRegistry
};

/// The unit a dispatcher hands assignments to
pub struct Actor {
    passport: Passport,
    strategy: Strategy
}

impl Actor {
    /// Bind a definition to a runner; fails when their kinds disagree
    pub fn new(
        definition: Definition,
        registry: Arc<StructureRegistry>,
        runner: Arc<dyn Runner>
    ) -> Result<Self, ExecutorError> {
        let passport = Passport::new("actorun", definition.name.clone());
        let strategy = Strategy::new(Arc::new(definition), registry, runner)?;
        Ok(Self { passport, strategy })
    }

    /// Report under another agent's name
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.passport.agent = agent.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.strategy.definition().name
    }

    pub fn definition(&self) -> &Definition {
        self.strategy.definition()
    }

    pub fn passport(&self) -> &Passport {
        &self.passport
    }

    pub fn backend(&self) -> &'static str {
        self.strategy.backend()
    }

    /// Process one assignment; resolves once its terminal status was reported
    pub async fn on_assign(
        &self,
        assignment: Assignment,
        collector: Arc<dyn Collector>,
        transport: Arc<dyn Transport>
    ) -> Result<(), AssignmentError> {
        self.on_assign_with_cancellation(assignment, collector, transport, CancellationToken::new()).await
    }

    /// Like `on_assign`, cancelled when `cancellation` fires
    pub async fn on_assign_with_cancellation(
        &self,
        assignment: Assignment,
        collector: Arc<dyn Collector>,
        transport: Arc<dyn Transport>,
        cancellation: CancellationToken
    ) -> Result<(), AssignmentError> {
        self.strategy.on_assign(assignment, &self.passport, collector, transport, cancellation).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        adapter::{collector::InMemoryCollector, transport::RecordingTransport},
        domain::{assignment::AssignmentStatus, error::ActorError},
        executor::inline::Inline,
        structure::{
            convert::{Args, Returns},
            registry::PortOptions
        }
    };

    #[tokio::test]
    async fn test_actor_keeps_serving_after_a_failure() {
        let registry = Arc::new(StructureRegistry::new());
        let x = registry.get_port_for_cls::<i64>("x", PortOptions::new()).unwrap();
        let y = registry.get_port_for_cls::<i64>("y", PortOptions::new()).unwrap();
        let runner = Inline::function(|_context, args: Args| async move {
            let x = *args.get::<i64>(0)?;
            if x < 0 {
                return Err(ActorError::assertion("x must not be negative"));
            }
            Ok::<_, ActorError>(Returns::one(x * 2))
        });

        let actor = Actor::new(Definition::function("double", vec![x], vec![y]), registry.clone(), Arc::new(runner))
            .unwrap()
            .with_agent("lab");
        let transport = Arc::new(RecordingTransport::new());
        let collector = Arc::new(InMemoryCollector::new(registry));

        let failing = Assignment::new("double", vec![json!(-1)]);
        let passing = Assignment::new("double", vec![json!(21)]);
        actor.on_assign(failing.clone(), collector.clone(), transport.clone()).await.unwrap();
        actor.on_assign(passing.clone(), collector, transport.clone()).await.unwrap();

        let failed: Vec<_> = transport.for_assignment(failing.id).into_iter().map(|u| u.status).collect();
        let passed = transport.for_assignment(passing.id);

        assert_eq!(failed, vec![AssignmentStatus::Assigned, AssignmentStatus::Critical]);
        assert_eq!(passed[1].returns, Some(vec![json!(42)]));
        assert_eq!(passed[1].passport.agent, "lab");
        assert_eq!(actor.name(), "double");
        assert_eq!(actor.backend(), "inline");
    }
}
