//! Event bus: fan-out of committed game events to subscribers
//!
//! Topics are registration bookkeeping only. Every handler receives every
//! event together with the latest committed world snapshot. A handler that
//! returns an error or panics is logged and skipped; delivery to the others
//! continues.

use crate::scheduler::Rejection;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};
use uuid::Uuid;
use whodunit_core::{ActionKind, ParticipantId, Phase, SideEffect, WorldState};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;
pub type Handler = Arc<dyn Fn(&GameEvent, &WorldState) -> HandlerResult + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    GameStarted {
        participants: Vec<ParticipantId>,
        first: ParticipantId,
    },
    ActionApplied {
        actor: ParticipantId,
        kind: ActionKind,
        narrative: String,
        effects: Vec<SideEffect>,
    },
    ActionRejected {
        actor: ParticipantId,
        reason: Rejection,
    },
    /// Referee commentary or world edits from the oracle
    OracleApplied {
        command: String,
        narrative: String,
        effects: Vec<SideEffect>,
    },
    /// System message, e.g. an agent that could not be reached
    Notice {
        text: String,
    },
    TurnAdvanced {
        from: ParticipantId,
        to: ParticipantId,
        turn_count: u64,
        forfeited: bool,
    },
    GameConcluded {
        winner: Option<ParticipantId>,
    },
    StateUpdated {
        phase: Phase,
        turn_count: u64,
    },
}

impl EventKind {
    pub fn topic(&self) -> &'static str {
        match self {
            EventKind::GameStarted { .. } | EventKind::GameConcluded { .. } => "game",
            EventKind::ActionApplied { .. } | EventKind::ActionRejected { .. } => "action",
            EventKind::OracleApplied { .. } => "oracle",
            EventKind::Notice { .. } => "notice",
            EventKind::TurnAdvanced { .. } => "turn",
            EventKind::StateUpdated { .. } => "state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Publication order, starting at 1
    pub seq: u64,
    pub id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl GameEvent {
    pub fn summary(&self) -> String {
        match &self.kind {
            EventKind::GameStarted { first, .. } => format!("game started, {} moves first", first),
            EventKind::ActionApplied { narrative, .. } => narrative.clone(),
            EventKind::ActionRejected { actor, reason } => format!("{} rejected: {}", actor, reason),
            EventKind::OracleApplied { narrative, .. } => narrative.clone(),
            EventKind::Notice { text } => text.clone(),
            EventKind::TurnAdvanced { to, turn_count, .. } => format!("turn {}: {} to play", turn_count, to),
            EventKind::GameConcluded { winner: Some(w) } => format!("game over, {} wins", w),
            EventKind::GameConcluded { winner: None } => "game over".to_string(),
            EventKind::StateUpdated { .. } => "Game state updated".to_string(),
        }
    }
}

pub struct EventBus {
    handlers: DashMap<String, Vec<(SubscriptionId, Handler)>>,
    next_id: AtomicU64,
    seq: AtomicU64,
    snapshot: watch::Sender<Arc<WorldState>>,
    stream: broadcast::Sender<GameEvent>,
}

impl EventBus {
    pub fn new(initial: WorldState) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(initial));
        let (stream, _) = broadcast::channel(1024);
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
            seq: AtomicU64::new(0),
            snapshot,
            stream,
        }
    }

    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&GameEvent, &WorldState) -> HandlerResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(topic, id = id.0, "subscribed");
        id
    }

    /// Remove one registration. Returns false if it was not registered under `topic`.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let removed = match self.handlers.get_mut(topic) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|(sub, _)| *sub != id);
                before != list.len()
            }
            None => false,
        };
        self.handlers.remove_if(topic, |_, list| list.is_empty());
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.iter().map(|e| e.value().len()).sum()
    }

    /// Async consumers get the same events as handlers, in order.
    pub fn watch(&self) -> broadcast::Receiver<GameEvent> {
        self.stream.subscribe()
    }

    pub fn snapshot(&self) -> Arc<WorldState> {
        self.snapshot.borrow().clone()
    }

    /// Replace the committed snapshot and announce it.
    pub fn update_game_state(&self, state: WorldState) -> GameEvent {
        let kind = EventKind::StateUpdated {
            phase: state.phase,
            turn_count: state.turn_count,
        };
        self.commit(state);
        self.publish(kind)
    }

    /// Replace the snapshot without announcing it. The caller publishes the
    /// event that caused the change right after.
    pub(crate) fn commit(&self, state: WorldState) {
        self.snapshot.send_replace(Arc::new(state));
    }

    /// Deliver `kind` to every handler under every topic, exactly once each.
    pub fn publish(&self, kind: EventKind) -> GameEvent {
        let event = GameEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            id: Uuid::new_v4(),
            at: Utc::now(),
            kind,
        };
        let snapshot = self.snapshot();

        // collect first so a handler may subscribe without deadlocking the map
        let targets: Vec<(String, SubscriptionId, Handler)> = self
            .handlers
            .iter()
            .flat_map(|entry| {
                let topic = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(|(id, h)| (topic.clone(), *id, h.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (topic, id, handler) in targets {
            match catch_unwind(AssertUnwindSafe(|| handler(&event, snapshot.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(topic = %topic, id = id.0, seq = event.seq, error = %e, "event handler failed");
                }
                Err(_) => {
                    warn!(topic = %topic, id = id.0, seq = event.seq, "event handler panicked");
                }
            }
        }

        let _ = self.stream.send(event.clone());
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use whodunit_core::generate::default_world;
    use whodunit_core::WorldConfig;

    fn bus() -> EventBus {
        EventBus::new(default_world(&WorldConfig::default()).unwrap())
    }

    fn notice(text: &str) -> EventKind {
        EventKind::Notice { text: text.into() }
    }

    #[test]
    fn every_topic_sees_every_event() {
        let bus = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for topic in ["turn", "chat"] {
            let seen = seen.clone();
            bus.subscribe(topic, move |e, _| {
                seen.lock().unwrap().push((topic, e.seq));
                Ok(())
            });
        }
        bus.publish(notice("a"));
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![("chat", 1), ("turn", 1)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = bus();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let id = bus.subscribe("x", move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.publish(notice("a"));
        assert!(bus.unsubscribe("x", id));
        assert!(!bus.unsubscribe("x", id));
        bus.publish(notice("b"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn state_update_replaces_snapshot() {
        let bus = bus();
        let mut next = (*bus.snapshot()).clone();
        next.turn_count = 9;
        let event = bus.update_game_state(next);
        assert_eq!(bus.snapshot().turn_count, 9);
        assert_eq!(event.summary(), "Game state updated");
        assert_eq!(event.kind.topic(), "state");
    }
}
