//! Per-participant channel sessions, opened lazily

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use whodunit_channel::SessionId;
use whodunit_core::ParticipantId;

pub struct ParticipantSessions {
    sessions: DashMap<ParticipantId, Arc<AgentSession>>,
}

impl Default for ParticipantSessions {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticipantSessions {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, participant: &ParticipantId) -> Arc<AgentSession> {
        self.sessions
            .entry(participant.clone())
            .or_insert_with(|| Arc::new(AgentSession::new(participant.clone())))
            .clone()
    }

    pub fn get(&self, participant: &ParticipantId) -> Option<Arc<AgentSession>> {
        self.sessions.get(participant).map(|s| s.clone())
    }

    pub fn list(&self) -> Vec<ParticipantId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn remove(&self, participant: &ParticipantId) -> Option<Arc<AgentSession>> {
        self.sessions.remove(participant).map(|(_, s)| s)
    }
}

/// Channel session for one AI participant. `None` means not initialized.
pub struct AgentSession {
    pub participant: ParticipantId,
    session: RwLock<Option<SessionId>>,
    opened: RwLock<u32>,
}

impl AgentSession {
    pub fn new(participant: ParticipantId) -> Self {
        Self {
            participant,
            session: RwLock::new(None),
            opened: RwLock::new(0),
        }
    }

    pub async fn id(&self) -> Option<SessionId> {
        self.session.read().await.clone()
    }

    pub async fn is_initialized(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn set(&self, id: SessionId) {
        info!(participant = %self.participant, session = %id, "agent session opened");
        *self.session.write().await = Some(id);
        *self.opened.write().await += 1;
    }

    /// Forget the current session; the next round trip opens a fresh one.
    pub async fn reset(&self) {
        if let Some(old) = self.session.write().await.take() {
            info!(participant = %self.participant, session = %old, "agent session reset");
        }
    }

    /// How many sessions have been opened for this participant.
    pub async fn opened(&self) -> u32 {
        *self.opened.read().await
    }
}
