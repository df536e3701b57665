//! In-process agent channel
//!
//! Keeps every session ledger in memory and answers user messages through a
//! [`Responder`]. Used for offline play and as the test double for the
//! orchestrator: replies can be delayed, withheld, or replaced by injected
//! transient failures.

use crate::channel::{AgentChannel, ChannelError, ChannelMessage, ChannelResult, MessageRole, SessionId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;
use whodunit_core::ParticipantId;

type ReplyFn = dyn Fn(&ParticipantId, &[ChannelMessage]) -> Option<String> + Send + Sync;

enum Behavior {
    Constant(String),
    Sequence {
        replies: Mutex<Vec<String>>,
        fallback: String,
    },
    Scripted,
    Silent,
    Custom(Box<ReplyFn>),
}

/// Produces the assistant side of a conversation.
pub struct Responder {
    behavior: Behavior,
}

impl Responder {
    /// Always reply with `text`.
    pub fn constant(text: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Constant(text.into()),
        }
    }

    /// Reply with each entry in order, then a fixed filler.
    pub fn sequence(replies: Vec<String>) -> Self {
        Self {
            behavior: Behavior::Sequence {
                replies: Mutex::new(replies),
                fallback: "I have nothing more to add.".to_string(),
            },
        }
    }

    /// Offline investigator: chats and cycles through world actions.
    pub fn scripted() -> Self {
        Self {
            behavior: Behavior::Scripted,
        }
    }

    /// Never reply.
    pub fn silent() -> Self {
        Self {
            behavior: Behavior::Silent,
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ParticipantId, &[ChannelMessage]) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            behavior: Behavior::Custom(Box::new(f)),
        }
    }

    async fn reply(&self, agent: &ParticipantId, history: &[ChannelMessage]) -> Option<String> {
        match &self.behavior {
            Behavior::Constant(text) => Some(text.clone()),
            Behavior::Sequence { replies, fallback } => {
                let mut replies = replies.lock().await;
                if replies.is_empty() {
                    Some(fallback.clone())
                } else {
                    Some(replies.remove(0))
                }
            }
            Behavior::Scripted => Some(scripted_reply(agent, history)),
            Behavior::Silent => None,
            Behavior::Custom(f) => f(agent, history),
        }
    }
}

const SCRIPTED_LINES: [&str; 5] = [
    "I heard footsteps upstairs just before the lights went out.",
    "Has anyone checked the library? Something about it bothers me.",
    "I was nowhere near the body, I promise you that.",
    "That candlestick looked out of place to me.",
    "Let's compare notes before anyone accuses anybody.",
];

const SCRIPTED_ACTIONS: [&str; 6] = [
    r#"{"actionType":"search","actionDetails":{}}"#,
    r#"{"actionType":"move","actionDetails":{"direction":"east"}}"#,
    r#"{"actionType":"search","actionDetails":{}}"#,
    r#"{"actionType":"move","actionDetails":{"direction":"south"}}"#,
    r#"{"actionType":"move","actionDetails":{"direction":"west"}}"#,
    r#"{"actionType":"move","actionDetails":{"direction":"north"}}"#,
];

fn scripted_reply(agent: &ParticipantId, history: &[ChannelMessage]) -> String {
    let turn = history.iter().filter(|m| m.role == MessageRole::User).count();
    let wants_action = history
        .last()
        .map(|m| m.content.contains("actionType"))
        .unwrap_or(false);
    // offset by agent so the roster does not move in lockstep
    let offset = agent.as_str().len();
    if wants_action {
        SCRIPTED_ACTIONS[(turn + offset) % SCRIPTED_ACTIONS.len()].to_string()
    } else {
        SCRIPTED_LINES[(turn + offset) % SCRIPTED_LINES.len()].to_string()
    }
}

struct Ledger {
    agent: ParticipantId,
    messages: Vec<ChannelMessage>,
    max_turns: u32,
    user_turns: u32,
}

impl Ledger {
    fn finished(&self) -> bool {
        self.user_turns >= self.max_turns
            && self.messages.last().map(|m| m.role) != Some(MessageRole::User)
    }
}

pub struct MemoryChannel {
    sessions: Arc<DashMap<SessionId, Ledger>>,
    responder: Responder,
    reply_delay: Duration,
    pending_failures: AtomicU32,
    calls: AtomicUsize,
}

impl MemoryChannel {
    pub fn new(responder: Responder) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            responder,
            reply_delay: Duration::ZERO,
            pending_failures: AtomicU32::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Deliver replies after `delay` instead of immediately.
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// The next `n` operations fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Total operations attempted, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Every message exchanged in `session` so far.
    pub fn transcript(&self, session: &SessionId) -> Vec<ChannelMessage> {
        self.sessions
            .get(session)
            .map(|l| l.messages.clone())
            .unwrap_or_default()
    }

    fn enter(&self, op: &str) -> ChannelResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            debug!(op, "injected channel failure");
            return Err(ChannelError::RequestFailed(format!("{}: injected failure", op)));
        }
        Ok(())
    }

    async fn respond(&self, session: &SessionId) {
        let Some((agent, history)) = self
            .sessions
            .get(session)
            .map(|l| (l.agent.clone(), l.messages.clone()))
        else {
            return;
        };
        let Some(reply) = self.responder.reply(&agent, &history).await else {
            return;
        };

        if self.reply_delay.is_zero() {
            if let Some(mut ledger) = self.sessions.get_mut(session) {
                ledger.messages.push(ChannelMessage::assistant(reply));
            }
            return;
        }

        let sessions = Arc::clone(&self.sessions);
        let session = session.clone();
        let delay = self.reply_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(mut ledger) = sessions.get_mut(&session) {
                ledger.messages.push(ChannelMessage::assistant(reply));
            }
        });
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new(Responder::scripted())
    }
}

#[async_trait::async_trait]
impl AgentChannel for MemoryChannel {
    fn name(&self) -> &str {
        "memory"
    }

    async fn start_session(
        &self,
        agent: &ParticipantId,
        initial: &str,
        max_turns: u32,
    ) -> ChannelResult<SessionId> {
        self.enter("start_session")?;
        let id = SessionId::new(format!("{}-{}", agent, Uuid::new_v4()));
        self.sessions.insert(
            id.clone(),
            Ledger {
                agent: agent.clone(),
                messages: vec![ChannelMessage::user(initial)],
                max_turns,
                user_turns: 1,
            },
        );
        debug!(session = %id, agent = %agent, "session started");
        self.respond(&id).await;
        Ok(id)
    }

    async fn append_message(&self, session: &SessionId, message: &str) -> ChannelResult<()> {
        self.enter("append_message")?;
        {
            let mut ledger = self
                .sessions
                .get_mut(session)
                .ok_or_else(|| ChannelError::SessionNotFound(session.to_string()))?;
            if ledger.user_turns >= ledger.max_turns {
                return Err(ChannelError::SessionFinished(session.to_string()));
            }
            ledger.messages.push(ChannelMessage::user(message));
            ledger.user_turns += 1;
        }
        self.respond(session).await;
        Ok(())
    }

    async fn fetch_history(&self, session: &SessionId) -> ChannelResult<Vec<ChannelMessage>> {
        self.enter("fetch_history")?;
        self.sessions
            .get(session)
            .map(|l| l.messages.clone())
            .ok_or_else(|| ChannelError::SessionNotFound(session.to_string()))
    }

    async fn is_session_finished(&self, session: &SessionId) -> ChannelResult<bool> {
        self.enter("is_session_finished")?;
        self.sessions
            .get(session)
            .map(|l| l.finished())
            .ok_or_else(|| ChannelError::SessionNotFound(session.to_string()))
    }
}
