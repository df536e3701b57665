//! Game engine: one instance per game, one worker per engine
//!
//! All inputs enter through a queue consumed by a single worker task, which
//! is the only place the world is mutated. Agent turns run in spawned tasks
//! and come back through the same queue tagged with a request id, so a
//! result that arrives after the game has moved on is dropped.

use crate::bus::{EventBus, EventKind, GameEvent, HandlerResult, SubscriptionId};
use crate::config::EngineConfig;
use crate::scheduler::{Scheduler, SubmitOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use whodunit_agent::{AgentTurn, Orchestrator};
use whodunit_channel::{
    retry, AgentChannel, DefaultInitializer, HttpChannel, HttpInitializer, HttpOracle, MemoryChannel,
    NarrativeOracle, SilentOracle, WorldInitializer,
};
use whodunit_core::generate::default_world;
use whodunit_core::{Action, ParticipantId, WorldCandidate, WorldState};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] whodunit_core::Error),
    #[error("game engine has stopped")]
    Closed,
    #[error("initialization failed: {0}")]
    Init(String),
}

enum EngineMessage {
    Submit {
        action: Action,
        reply: oneshot::Sender<Result<SubmitOutcome, EngineError>>,
    },
    AgentTurnReady {
        request_id: u64,
        participant: ParticipantId,
        turn: AgentTurn,
    },
    Shutdown,
}

/// An engine with its collaborators, not yet running.
pub struct GameEngine {
    config: EngineConfig,
    channel: Arc<dyn AgentChannel>,
    initializer: Arc<dyn WorldInitializer>,
    oracle: Arc<dyn NarrativeOracle>,
}

impl GameEngine {
    /// Engine with the default world and no oracle.
    pub fn new(config: EngineConfig, channel: Arc<dyn AgentChannel>) -> Self {
        Self {
            config,
            channel,
            initializer: Arc::new(DefaultInitializer),
            oracle: Arc::new(SilentOracle),
        }
    }

    /// Wire collaborators from the configured endpoints. Without a channel
    /// url the in-memory ledger with offline agents is used.
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let init = |e: whodunit_channel::ChannelError| EngineError::Init(e.to_string());
        let poll_timeout = Duration::from_millis(config.agent.poll_timeout_ms);

        let channel: Arc<dyn AgentChannel> = match &config.channel.url {
            Some(url) => Arc::new(HttpChannel::new(url.clone(), poll_timeout).map_err(init)?),
            None => Arc::new(MemoryChannel::default()),
        };
        let mut engine = Self::new(config.clone(), channel);
        if let Some(url) = &config.oracle.url {
            engine.oracle = Arc::new(HttpOracle::new(url.clone(), config.oracle_timeout()).map_err(init)?);
        }
        if let Some(url) = &config.initializer.url {
            engine.initializer =
                Arc::new(HttpInitializer::new(url.clone(), config.oracle_timeout()).map_err(init)?);
        }
        Ok(engine)
    }

    pub fn with_initializer(mut self, initializer: Arc<dyn WorldInitializer>) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn NarrativeOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ask the initializer for a world and fill its gaps from the default
    /// generator. A failing initializer is not fatal; an invalid result is.
    async fn initial_world(&self) -> Result<WorldState, EngineError> {
        let defaults = default_world(&self.config.world)?;
        let cancel = CancellationToken::new();
        let candidate = match retry(&self.config.retry, "initialize", &cancel, || {
            self.initializer.initialize(&self.config.world)
        })
        .await
        {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(initializer = self.initializer.name(), error = %e, "initializer failed, using the default world");
                WorldCandidate::default()
            }
        };
        Ok(candidate.backfill(defaults)?)
    }

    /// Build the world, open the first turn and spawn the worker.
    pub async fn start(self) -> Result<GameHandle, EngineError> {
        let world = self.initial_world().await?;
        info!(
            initializer = self.initializer.name(),
            oracle = self.oracle.name(),
            channel = self.channel.name(),
            participants = world.participants.len(),
            rows = world.rows(),
            columns = world.columns(),
            "starting game"
        );

        let mut scheduler = Scheduler::new(world, self.config.world.seed);
        scheduler.start();
        let bus = Arc::new(EventBus::new(scheduler.state().clone()));
        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();

        let worker = Worker {
            rx,
            tx: tx.clone(),
            scheduler,
            bus: bus.clone(),
            orchestrator: Arc::new(Orchestrator::new(self.channel.clone(), self.config.orchestrator())),
            oracle: self.oracle.clone(),
            turn_delay: self.config.turn_delay(),
            oracle_timeout: self.config.oracle_timeout(),
            cancel: cancel.clone(),
            agent_cancel: None,
            next_request: 0,
            pending: None,
        };
        worker.announce_start();
        let task = tokio::spawn(worker.run());

        Ok(GameHandle {
            tx,
            bus,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }
}

/// Caller side of a running game. Cheap to clone.
#[derive(Clone)]
pub struct GameHandle {
    tx: mpsc::Sender<EngineMessage>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl GameHandle {
    /// Queue an action and wait for the worker's verdict.
    pub async fn submit(&self, action: Action) -> Result<SubmitOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMessage::Submit { action, reply })
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    /// Last committed world.
    pub fn snapshot(&self) -> Arc<WorldState> {
        self.bus.snapshot()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&GameEvent, &WorldState) -> HandlerResult + Send + Sync + 'static,
    {
        self.bus.subscribe(topic, handler)
    }

    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(topic, id)
    }

    pub fn watch(&self) -> broadcast::Receiver<GameEvent> {
        self.bus.watch()
    }

    /// Wait until the committed world satisfies `pred`, or `timeout` passes.
    pub async fn wait_until<F>(&self, pred: F, timeout: Duration) -> Option<Arc<WorldState>>
    where
        F: Fn(&WorldState) -> bool,
    {
        let mut events = self.watch();
        let wait = async {
            loop {
                let snapshot = self.snapshot();
                if pred(snapshot.as_ref()) {
                    return Some(snapshot);
                }
                match events.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        let snapshot = self.snapshot();
                        return pred(snapshot.as_ref()).then_some(snapshot);
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Stop the worker and cancel any agent turn in flight.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineMessage::Shutdown).await;
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!(error = %e, "game worker ended abnormally");
            }
        }
    }
}

struct Worker {
    rx: mpsc::Receiver<EngineMessage>,
    tx: mpsc::Sender<EngineMessage>,
    scheduler: Scheduler,
    bus: Arc<EventBus>,
    orchestrator: Arc<Orchestrator>,
    oracle: Arc<dyn NarrativeOracle>,
    turn_delay: Duration,
    oracle_timeout: Duration,
    cancel: CancellationToken,
    /// Cancels the agent turn in flight
    agent_cancel: Option<CancellationToken>,
    next_request: u64,
    /// Agent request whose result is still wanted
    pending: Option<u64>,
}

impl Worker {
    fn announce_start(&self) {
        let state = self.scheduler.state();
        self.bus.publish(EventKind::GameStarted {
            participants: state.participants.iter().map(|p| p.id.clone()).collect(),
            first: state.current_turn.clone(),
        });
        self.bus.update_game_state(state.clone());
    }

    async fn run(mut self) {
        info!("game worker started");
        self.trigger_agent();
        loop {
            let msg = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("game worker cancelled");
                    break;
                }
                msg = self.rx.recv() => match msg {
                    Some(m) => m,
                    None => {
                        info!("game queue closed, shutting down");
                        break;
                    }
                },
            };

            match msg {
                EngineMessage::Submit { action, reply } => {
                    let outcome = self.handle_submit(action).await;
                    let _ = reply.send(outcome);
                }
                EngineMessage::AgentTurnReady {
                    request_id,
                    participant,
                    turn,
                } => {
                    self.handle_agent_turn(request_id, participant, turn).await;
                }
                EngineMessage::Shutdown => {
                    info!("game worker received Shutdown");
                    break;
                }
            }
        }
        if let Some(cancel) = self.agent_cancel.take() {
            cancel.cancel();
        }
        info!("game worker stopped");
    }

    async fn handle_submit(&mut self, action: Action) -> Result<SubmitOutcome, EngineError> {
        let outcome = self.scheduler.submit(&action)?;
        self.settle(&action, &outcome).await;
        Ok(outcome)
    }

    /// Publish what `action` did and carry the game forward from there.
    async fn settle(&mut self, action: &Action, outcome: &SubmitOutcome) {
        let applied = match outcome {
            SubmitOutcome::Rejected(reason) => {
                self.bus.publish(EventKind::ActionRejected {
                    actor: action.actor_id.clone(),
                    reason: *reason,
                });
                return;
            }
            SubmitOutcome::Applied(applied) => applied,
        };

        self.bus.commit(self.scheduler.state().clone());
        self.bus.publish(EventKind::ActionApplied {
            actor: action.actor_id.clone(),
            kind: action.kind(),
            narrative: applied.narrative.clone(),
            effects: applied.effects.clone(),
        });

        if applied.concluded {
            self.conclude();
            return;
        }
        if !action.is_chat() {
            self.consult_oracle(action).await;
        }
        if applied.turn_complete {
            self.advance();
        }
    }

    async fn consult_oracle(&mut self, action: &Action) {
        let Some(actor) = self.scheduler.state().participant_by_id(&action.actor_id).cloned() else {
            return;
        };
        let reply = {
            let state = self.scheduler.state();
            let call = tokio::time::timeout(self.oracle_timeout, self.oracle.narrate(&actor, action, state));
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                res = call => res,
            }
        };
        let reply = match reply {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(oracle = self.oracle.name(), error = %e, "oracle failed, no commentary");
                return;
            }
            Err(_) => {
                warn!(oracle = self.oracle.name(), timeout = ?self.oracle_timeout, "oracle timed out, no commentary");
                return;
            }
        };
        if !reply.success {
            debug!(message = %reply.message, "oracle reported no success");
        }

        let commands = reply.into_commands(&actor.id);
        if commands.is_empty() {
            return;
        }
        for (command, resolution) in self.scheduler.apply_commands(&commands) {
            self.bus.commit(resolution.state);
            self.bus.publish(EventKind::OracleApplied {
                command,
                narrative: resolution.narrative,
                effects: resolution.effects,
            });
        }
    }

    fn advance(&mut self) {
        let Some(handoff) = self.scheduler.end_turn() else {
            return;
        };
        self.bus.commit(self.scheduler.state().clone());
        self.bus.publish(EventKind::TurnAdvanced {
            from: handoff.from,
            to: handoff.to,
            turn_count: handoff.turn_count,
            forfeited: handoff.forfeited,
        });
        self.bus.update_game_state(self.scheduler.state().clone());
        self.trigger_agent();
    }

    fn conclude(&mut self) {
        self.pending = None;
        if let Some(cancel) = self.agent_cancel.take() {
            cancel.cancel();
        }
        let state = self.scheduler.state().clone();
        self.bus.publish(EventKind::GameConcluded {
            winner: state.winner.clone(),
        });
        self.bus.update_game_state(state);
    }

    /// If the turn now belongs to an AI participant, fetch its turn in the
    /// background. The worker keeps serving the queue meanwhile.
    fn trigger_agent(&mut self) {
        if self.scheduler.is_concluded() {
            return;
        }
        let state = self.scheduler.state();
        let Some(me) = state.current_participant().filter(|p| p.is_ai()).cloned() else {
            return;
        };
        let world = state.clone();

        self.next_request += 1;
        let request_id = self.next_request;
        self.pending = Some(request_id);
        let cancel = self.cancel.child_token();
        if let Some(previous) = self.agent_cancel.replace(cancel.clone()) {
            previous.cancel();
        }

        let orchestrator = self.orchestrator.clone();
        let tx = self.tx.clone();
        let delay = self.turn_delay;
        debug!(participant = %me.id, request_id, "agent turn requested");
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let turn = orchestrator.next_turn(&me, &world, &cancel).await;
            if cancel.is_cancelled() {
                return;
            }
            let _ = tx
                .send(EngineMessage::AgentTurnReady {
                    request_id,
                    participant: me.id,
                    turn,
                })
                .await;
        });
    }

    async fn handle_agent_turn(&mut self, request_id: u64, participant: ParticipantId, turn: AgentTurn) {
        if self.pending != Some(request_id) || self.scheduler.current() != &participant {
            debug!(participant = %participant, request_id, "stale agent turn dropped");
            return;
        }
        self.pending = None;
        self.agent_cancel = None;

        for notice in &turn.notices {
            self.scheduler.notice(notice.clone());
            self.bus.commit(self.scheduler.state().clone());
            self.bus.publish(EventKind::Notice { text: notice.clone() });
        }

        self.play(&turn.chat).await;
        if self.scheduler.is_concluded() || self.scheduler.current() != &participant {
            return;
        }

        if !turn.forfeits() {
            self.play(&turn.action).await;
            return;
        }

        // repeat the words only if they differ from what was just said
        let last_words = (turn.action != turn.chat).then_some(&turn.action);
        match self.scheduler.forfeit(&participant, last_words) {
            Ok(SubmitOutcome::Applied(applied)) => {
                self.bus.commit(self.scheduler.state().clone());
                self.bus.publish(EventKind::ActionApplied {
                    actor: participant.clone(),
                    kind: turn.action.kind(),
                    narrative: applied.narrative,
                    effects: applied.effects,
                });
                self.advance();
            }
            Ok(SubmitOutcome::Rejected(reason)) => {
                debug!(participant = %participant, %reason, "forfeit rejected");
            }
            Err(e) => error!(participant = %participant, error = %e, "forfeit failed"),
        }
    }

    async fn play(&mut self, action: &Action) {
        match self.scheduler.submit(action) {
            Ok(outcome) => self.settle(action, &outcome).await,
            Err(e) => error!(actor = %action.actor_id, error = %e, "agent action failed"),
        }
    }
}
