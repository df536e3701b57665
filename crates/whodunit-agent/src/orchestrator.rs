//! Agent orchestrator: fetch an AI participant's chat and world action
//!
//! Each turn is two dependent round trips over the participant's channel
//! session (chat first, then action). Every channel operation goes through
//! the retry policy on its own; a round trip that still fails degrades to a
//! fallback chat plus a notice instead of surfacing an error.

use crate::parse::{parse_action, parse_chat, ParseTier};
use crate::prompt;
use crate::session::ParticipantSessions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use whodunit_channel::{
    await_reply, retry, AgentChannel, ChannelError, ChannelResult, MessageRole, PollConfig,
    RetryPolicy, SessionId,
};
use whodunit_core::{Action, Participant, WorldState};

pub const FALLBACK_CHAT: &str = "I'm having trouble responding";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    pub poll: PollConfig,
    /// User messages a channel session accepts before it is replaced
    pub max_session_turns: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll: PollConfig::default(),
            max_session_turns: 5,
        }
    }
}

/// Both halves of an AI participant's turn.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub chat: Action,
    pub action: Action,
    /// How the action reply was understood; `None` when it never arrived
    pub tier: Option<ParseTier>,
    /// System notices for degraded round trips
    pub notices: Vec<String>,
}

impl AgentTurn {
    /// The world-action half produced no world action.
    pub fn forfeits(&self) -> bool {
        self.action.is_chat()
    }
}

pub struct Orchestrator {
    channel: Arc<dyn AgentChannel>,
    sessions: ParticipantSessions,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(channel: Arc<dyn AgentChannel>, config: OrchestratorConfig) -> Self {
        Self {
            channel,
            sessions: ParticipantSessions::new(),
            config,
        }
    }

    pub fn sessions(&self) -> &ParticipantSessions {
        &self.sessions
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Obtain `me`'s chat and world action for the current turn. Never fails.
    pub async fn next_turn(
        &self,
        me: &Participant,
        world: &WorldState,
        cancel: &CancellationToken,
    ) -> AgentTurn {
        info!(participant = %me.id, turn = world.turn_count, "requesting agent turn");
        let mut notices = Vec::new();

        let chat = match self.converse(me, world, prompt::chat_request(me, world), cancel).await {
            Ok(reply) => parse_chat(&me.id, &reply),
            Err(e) => {
                notices.push(self.degrade(me, "chat", &e));
                Action::chat(me.id.clone(), FALLBACK_CHAT)
            }
        };

        let (action, tier) = match self
            .converse(me, world, prompt::action_request(me, world), cancel)
            .await
        {
            Ok(reply) => {
                let parsed = parse_action(&me.id, &reply);
                debug!(participant = %me.id, tier = ?parsed.tier, kind = %parsed.action.kind(), "action parsed");
                (parsed.action, Some(parsed.tier))
            }
            Err(e) => {
                notices.push(self.degrade(me, "action", &e));
                (Action::chat(me.id.clone(), FALLBACK_CHAT), None)
            }
        };

        AgentTurn {
            chat,
            action,
            tier,
            notices,
        }
    }

    fn degrade(&self, me: &Participant, half: &str, err: &ChannelError) -> String {
        warn!(participant = %me.id, half, error = %err, "agent round trip failed, using fallback");
        let reason = match err {
            ChannelError::Exhausted { attempts, .. } => format!("no answer after {} attempts", attempts),
            ChannelError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        };
        format!("{} is having trouble responding ({})", me.name, reason)
    }

    /// One round trip: make sure a live session exists, send, wait for the reply.
    async fn converse(
        &self,
        me: &Participant,
        world: &WorldState,
        message: String,
        cancel: &CancellationToken,
    ) -> ChannelResult<String> {
        let session = self.ensure_session(me, world, cancel).await?;
        match self.exchange(&session, &message, cancel).await {
            Err(ChannelError::SessionFinished(_)) | Err(ChannelError::SessionNotFound(_)) => {
                // expired between the check and the append
                self.sessions.get_or_create(&me.id).reset().await;
                let session = self.ensure_session(me, world, cancel).await?;
                self.exchange(&session, &message, cancel).await
            }
            other => other,
        }
    }

    async fn ensure_session(
        &self,
        me: &Participant,
        world: &WorldState,
        cancel: &CancellationToken,
    ) -> ChannelResult<SessionId> {
        let policy = &self.config.retry;
        let slot = self.sessions.get_or_create(&me.id);

        if let Some(id) = slot.id().await {
            let finished = retry(policy, "is_session_finished", cancel, || {
                self.channel.is_session_finished(&id)
            })
            .await;
            match finished {
                Ok(false) => return Ok(id),
                Ok(true) | Err(ChannelError::SessionNotFound(_)) => {
                    info!(participant = %me.id, session = %id, "session expired, opening a new one");
                    slot.reset().await;
                }
                Err(e) => return Err(e),
            }
        }

        let intro = prompt::introduction(me, world);
        let max_turns = self.config.max_session_turns;
        let id = retry(policy, "start_session", cancel, || {
            self.channel.start_session(&me.id, &intro, max_turns)
        })
        .await?;
        slot.set(id.clone()).await;
        Ok(id)
    }

    async fn exchange(
        &self,
        session: &SessionId,
        message: &str,
        cancel: &CancellationToken,
    ) -> ChannelResult<String> {
        let policy = &self.config.retry;
        let poll = self.config.poll;
        let channel = self.channel.as_ref();

        let history = retry(policy, "fetch_history", cancel, || channel.fetch_history(session)).await?;
        let mut len = history.len();

        // never talk over an unanswered message
        if history.last().map(|m| m.role) == Some(MessageRole::User) {
            debug!(session = %session, "reply pending, waiting before sending");
            retry(policy, "await_pending", cancel, || {
                await_reply(channel, session, len, poll, cancel)
            })
            .await?;
            len = retry(policy, "fetch_history", cancel, || channel.fetch_history(session))
                .await?
                .len();
        }

        retry(policy, "append_message", cancel, || channel.append_message(session, message)).await?;
        retry(policy, "await_reply", cancel, || {
            await_reply(channel, session, len + 1, poll, cancel)
        })
        .await
    }
}
