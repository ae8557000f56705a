//! Agent Actor - hosts named actors and routes assignments to them
//!
//! The Agent owns the collector and transport shared by its actors:
//! - Spawns one task per accepted assignment
//! - Tracks a cancellation token per assignment in flight
//! - Answers unknown actor names with a CRITICAL status
//! - Cancels everything in flight when it stops

use std::{collections::HashMap, sync::Arc, time::Duration};

use ractor::{ActorProcessingErr, ActorRef, rpc::CallResult};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};
use uuid::Uuid;

use crate::{
    actor::{instance::Actor, message::AgentMessage},
    config::ExecutorConfig,
    domain::{
        assignment::{Assignment, AssignmentStatus, Passport, StatusUpdate},
        constant::agent,
        error::{AssignmentError, ExecutorError}
    },
    port::{collector::Collector, transport::Transport}
};

/// Everything an agent is started with
pub struct AgentArguments {
    name:      String,
    collector: Arc<dyn Collector>,
    transport: Arc<dyn Transport>,
    actors:    Vec<Actor>
}

impl AgentArguments {
    pub fn new(name: impl Into<String>, collector: Arc<dyn Collector>, transport: Arc<dyn Transport>) -> Self {
        Self { name: name.into(), collector, transport, actors: Vec::new() }
    }

    pub fn from_config(config: &ExecutorConfig, collector: Arc<dyn Collector>, transport: Arc<dyn Transport>) -> Self {
        Self::new(config.agent_name.clone(), collector, transport)
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actors.push(actor);
        self
    }
}

/// Agent Actor State
pub struct AgentState {
    name:           String,
    collector:      Arc<dyn Collector>,
    transport:      Arc<dyn Transport>,
    /// Hosted actors by name
    actors:         HashMap<String, Arc<Actor>>,
    /// Assignments in flight (assignment_id -> cancellation)
    running:        HashMap<Uuid, CancellationToken>,
    /// Parent of every assignment token
    shutdown:       CancellationToken,
    total_accepted: u64,
    total_faulted:  u64
}

/// Agent Actor
pub struct Agent;

#[async_trait::async_trait]
impl ractor::Actor for Agent {
    type Arguments = AgentArguments;
    type Msg = AgentMessage;
    type State = AgentState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        let AgentArguments { name, collector, transport, actors } = args;

        let mut hosted = HashMap::new();
        for actor in actors {
            let actor = actor.with_agent(name.clone());
            if hosted.contains_key(actor.name()) {
                return Err(ActorProcessingErr::from(format!("actor {} is hosted twice", actor.name())));
            }
            hosted.insert(actor.name().to_string(), Arc::new(actor));
        }

        event!(Level::DEBUG, event = agent::AGENT_STARTED, agent = %name, actors = %hosted.len());

        Ok(AgentState {
            name,
            collector,
            transport,
            actors: hosted,
            running: HashMap::new(),
            shutdown: CancellationToken::new(),
            total_accepted: 0,
            total_faulted: 0
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            AgentMessage::Assign { assignment, reply } => {
                let result = self.handle_assign(myself, assignment, state).await;
                if let Some(reply) = reply
                    && let Err(e) = reply.send(result)
                {
                    event!(Level::DEBUG, event = agent::REPLY_DROPPED, agent = %state.name, error = ?e);
                }
                Ok(())
            }
            AgentMessage::Cancel { assignment_id } => {
                self.handle_cancel(assignment_id, state);
                Ok(())
            }
            AgentMessage::Finished { assignment_id, result } => {
                self.handle_finished(assignment_id, result, state);
                Ok(())
            }
            AgentMessage::ActiveAssignments { reply } => {
                if let Err(e) = reply.send(state.running.len()) {
                    event!(Level::DEBUG, event = agent::REPLY_DROPPED, agent = %state.name, error = ?e);
                }
                Ok(())
            }
            AgentMessage::Shutdown => {
                state.shutdown.cancel();
                myself.stop(Some("shutdown".to_string()));
                Ok(())
            }
        }
    }

    async fn post_stop(&self, _myself: ActorRef<Self::Msg>, state: &mut Self::State) -> Result<(), ActorProcessingErr> {
        state.shutdown.cancel();
        event!(Level::DEBUG, event = agent::AGENT_STOPPED, agent = %state.name,
               in_flight = %state.running.len(), accepted = %state.total_accepted, faulted = %state.total_faulted);
        Ok(())
    }
}

impl Agent {
    /// Spawn an agent hosting the given actors
    pub async fn spawn(args: AgentArguments) -> Result<(ActorRef<AgentMessage>, JoinHandle<()>), ExecutorError> {
        Ok(ractor::Actor::spawn(None, Agent, args).await?)
    }

    /// Hand an assignment to a running agent and wait until it was accepted
    pub async fn submit(
        agent: &ActorRef<AgentMessage>,
        assignment: Assignment,
        timeout: Duration
    ) -> Result<(), ExecutorError> {
        match agent.call(|reply| AgentMessage::Assign { assignment, reply: Some(reply) }, Some(timeout)).await {
            Ok(CallResult::Success(result)) => Ok(result?),
            Ok(CallResult::Timeout) => Err(ExecutorError::Messaging(format!("agent did not answer within {:?}", timeout))),
            Ok(CallResult::SenderError) => Err(ExecutorError::Messaging("agent dropped the reply".to_string())),
            Err(e) => Err(ExecutorError::Messaging(format!("{:?}", e)))
        }
    }

    async fn handle_assign(
        &self,
        myself: ActorRef<AgentMessage>,
        assignment: Assignment,
        state: &mut AgentState
    ) -> Result<(), AssignmentError> {
        // A redelivery must not start a second lifecycle for the same id
        if state.running.contains_key(&assignment.id) {
            event!(Level::WARN, event = agent::ASSIGNMENT_REJECTED,
                   agent = %state.name, assignment = %assignment.id, message = "already_running");
            return Err(AssignmentError::AlreadyRunning(assignment.id));
        }

        let Some(actor) = state.actors.get(&assignment.actor).cloned() else {
            event!(Level::WARN, event = agent::ASSIGNMENT_REJECTED,
                   agent = %state.name, assignment = %assignment.id, actor = %assignment.actor);

            let passport = Passport::new(state.name.clone(), assignment.actor.clone());
            let update = StatusUpdate::new(&assignment, &passport, AssignmentStatus::Critical)
                .with_message(format!("no actor registered as {}", assignment.actor));
            state.transport.change(update).await;

            return Err(AssignmentError::UnknownActor(assignment.actor));
        };

        let assignment_id = assignment.id;
        let token = state.shutdown.child_token();
        state.running.insert(assignment_id, token.clone());
        state.total_accepted += 1;

        event!(Level::DEBUG, event = agent::ASSIGNMENT_ACCEPTED,
               agent = %state.name, assignment = %assignment_id, actor = %actor.name(),
               in_flight = %state.running.len());

        let collector = state.collector.clone();
        let transport = state.transport.clone();
        tokio::spawn(async move {
            let result = actor.on_assign_with_cancellation(assignment, collector, transport, token).await;
            if let Err(e) = myself.cast(AgentMessage::Finished { assignment_id, result }) {
                event!(Level::DEBUG, event = agent::ASSIGNMENT_FINISHED, assignment = %assignment_id, error = ?e);
            }
        });

        Ok(())
    }

    fn handle_cancel(&self, assignment_id: Uuid, state: &mut AgentState) {
        match state.running.get(&assignment_id) {
            Some(token) => {
                event!(Level::DEBUG, event = agent::CANCEL_REQUESTED, agent = %state.name, assignment = %assignment_id);
                token.cancel();
            }
            None => {
                event!(Level::DEBUG, event = agent::CANCEL_REQUESTED, agent = %state.name,
                       assignment = %assignment_id, message = "not_in_flight");
            }
        }
    }

    fn handle_finished(&self, assignment_id: Uuid, result: Result<(), AssignmentError>, state: &mut AgentState) {
        state.running.remove(&assignment_id);

        match result {
            Ok(()) | Err(AssignmentError::Cancelled(_)) => {
                event!(Level::DEBUG, event = agent::ASSIGNMENT_FINISHED,
                       agent = %state.name, assignment = %assignment_id, in_flight = %state.running.len());
            }
            Err(e) => {
                state.total_faulted += 1;
                event!(Level::WARN, event = agent::ASSIGNMENT_FAULTED,
                       agent = %state.name, assignment = %assignment_id, error = %e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use serde_json::json;

    use super::*;
    use crate::{
        adapter::{collector::InMemoryCollector, transport::RecordingTransport},
        domain::{definition::Definition, error::ActorError},
        executor::inline::Inline,
        structure::{
            convert::{Args, Returns},
            registry::{PortOptions, StructureRegistry}
        }
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn actors(registry: &Arc<StructureRegistry>) -> (Actor, Actor) {
        let x = registry.get_port_for_cls::<i64>("x", PortOptions::new()).unwrap();
        let y = registry.get_port_for_cls::<i64>("y", PortOptions::new()).unwrap();

        let square = Inline::function(|_context, args: Args| async move {
            let x = *args.get::<i64>(0)?;
            Ok::<_, ActorError>(Returns::one(x * x))
        });
        let ticker = Inline::generator(|_context, _args| {
            stream::unfold(0i64, |i| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Some((Ok::<_, ActorError>(Returns::one(i)), i + 1))
            })
        });

        (
            Actor::new(Definition::function("square", vec![x], vec![y.clone()]), registry.clone(), Arc::new(square)).unwrap(),
            Actor::new(Definition::generator("ticker", vec![], vec![y]), registry.clone(), Arc::new(ticker)).unwrap()
        )
    }

    async fn wait_for_idle(agent: &ActorRef<AgentMessage>) {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                let active = agent.call(|reply| AgentMessage::ActiveAssignments { reply }, Some(TIMEOUT)).await.unwrap();
                if let CallResult::Success(0) = active {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn spawn() -> (ActorRef<AgentMessage>, JoinHandle<()>, Arc<RecordingTransport>) {
        let registry = Arc::new(StructureRegistry::new());
        let transport = Arc::new(RecordingTransport::new());
        let (square, ticker) = actors(&registry);
        let args = AgentArguments::new("test", Arc::new(InMemoryCollector::new(registry)), transport.clone())
            .with_actor(square)
            .with_actor(ticker);

        let (agent, handle) = Agent::spawn(args).await.unwrap();
        (agent, handle, transport)
    }

    #[tokio::test]
    async fn test_agent_routes_assignments_by_actor_name() {
        let (agent, handle, transport) = spawn().await;

        let assignment = Assignment::new("square", vec![json!(3)]);
        Agent::submit(&agent, assignment.clone(), TIMEOUT).await.unwrap();
        wait_for_idle(&agent).await;

        let updates = transport.for_assignment(assignment.id);
        assert_eq!(updates.last().and_then(|u| u.returns.clone()), Some(vec![json!(9)]));
        assert_eq!(updates[0].passport.agent, "test");

        agent.stop(None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_actor_is_rejected_with_critical() {
        let (agent, handle, transport) = spawn().await;

        let assignment = Assignment::new("cube", vec![json!(3)]);
        let err = Agent::submit(&agent, assignment.clone(), TIMEOUT).await.unwrap_err();

        assert!(matches!(err, ExecutorError::Assignment(AssignmentError::UnknownActor(ref name)) if name == "cube"));
        let statuses: Vec<_> = transport.for_assignment(assignment.id).into_iter().map(|u| u.status).collect();
        assert_eq!(statuses, vec![AssignmentStatus::Critical]);

        agent.stop(None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_redelivered_assignment_is_refused_while_running() {
        let (agent, handle, transport) = spawn().await;

        let assignment = Assignment::new("ticker", vec![]);
        Agent::submit(&agent, assignment.clone(), TIMEOUT).await.unwrap();
        let err = Agent::submit(&agent, assignment.clone(), TIMEOUT).await.unwrap_err();

        assert!(matches!(err, ExecutorError::Assignment(AssignmentError::AlreadyRunning(id)) if id == assignment.id));

        // The first run is still tracked and can be cancelled
        tokio::time::sleep(Duration::from_millis(30)).await;
        agent.cast(AgentMessage::Cancel { assignment_id: assignment.id }).unwrap();
        wait_for_idle(&agent).await;

        let statuses: Vec<_> = transport.for_assignment(assignment.id).into_iter().map(|u| u.status).collect();
        assert_eq!(statuses.iter().filter(|s| **s == AssignmentStatus::Assigned).count(), 1);
        assert_eq!(statuses.last(), Some(&AssignmentStatus::Cancelled));

        agent.stop(None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_a_stream() {
        let (agent, handle, transport) = spawn().await;

        let assignment = Assignment::new("ticker", vec![]);
        Agent::submit(&agent, assignment.clone(), TIMEOUT).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        agent.cast(AgentMessage::Cancel { assignment_id: assignment.id }).unwrap();
        wait_for_idle(&agent).await;

        let statuses: Vec<_> = transport.for_assignment(assignment.id).into_iter().map(|u| u.status).collect();
        assert_eq!(statuses.first(), Some(&AssignmentStatus::Assigned));
        assert_eq!(statuses.last(), Some(&AssignmentStatus::Cancelled));
        assert!(statuses.contains(&AssignmentStatus::Yield));

        agent.stop(None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything_in_flight() {
        let (agent, handle, transport) = spawn().await;

        let first = Assignment::new("ticker", vec![]);
        let second = Assignment::new("ticker", vec![]);
        Agent::submit(&agent, first.clone(), TIMEOUT).await.unwrap();
        Agent::submit(&agent, second.clone(), TIMEOUT).await.unwrap();

        agent.cast(AgentMessage::Shutdown).unwrap();
        handle.await.unwrap();

        for assignment in [first, second] {
            tokio::time::timeout(TIMEOUT, async {
                while transport.for_assignment(assignment.id).last().map(|u| u.status) != Some(AssignmentStatus::Cancelled) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();
        }
    }
}
