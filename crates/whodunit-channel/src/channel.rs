//! Agent channel trait: an append-only conversation ledger per AI participant

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use whodunit_core::ParticipantId;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error types
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("unexpected status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session finished: {0}")]
    SessionFinished(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ChannelError>,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ChannelError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ChannelError::RequestFailed(_) | ChannelError::Timeout(_) | ChannelError::Network(_) => true,
            ChannelError::Status { code, .. } => *code == 429 || *code >= 500,
            ChannelError::InvalidResponse(_) => true,
            ChannelError::Cancelled
            | ChannelError::SessionNotFound(_)
            | ChannelError::SessionFinished(_)
            | ChannelError::Exhausted { .. } => false,
        }
    }
}

/// Opaque session handle issued by a channel
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChannelMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Agent channel trait
#[async_trait::async_trait]
pub trait AgentChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Open a session for `agent` seeded with `initial`. The session accepts
    /// at most `max_turns` user messages before reporting finished.
    async fn start_session(
        &self,
        agent: &ParticipantId,
        initial: &str,
        max_turns: u32,
    ) -> ChannelResult<SessionId>;

    async fn append_message(&self, session: &SessionId, message: &str) -> ChannelResult<()>;

    async fn fetch_history(&self, session: &SessionId) -> ChannelResult<Vec<ChannelMessage>>;

    async fn is_session_finished(&self, session: &SessionId) -> ChannelResult<bool>;
}

/// Bounds for waiting on an assistant reply.
#[derive(Clone, Copy, Debug)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(30_000),
        }
    }
}

/// Wait until the ledger holds more than `after` messages and the last one
/// is from the assistant. Fails with `Timeout` past the deadline and with
/// `Cancelled` when `cancel` fires.
pub async fn await_reply(
    channel: &dyn AgentChannel,
    session: &SessionId,
    after: usize,
    poll: PollConfig,
    cancel: &CancellationToken,
) -> ChannelResult<String> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ChannelError::Cancelled),
        res = tokio::time::timeout(poll.timeout, poll_until_reply(channel, session, after, poll.interval)) => match res {
            Ok(reply) => reply,
            Err(_) => Err(ChannelError::Timeout(poll.timeout)),
        },
    }
}

async fn poll_until_reply(
    channel: &dyn AgentChannel,
    session: &SessionId,
    after: usize,
    interval: Duration,
) -> ChannelResult<String> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let history = channel.fetch_history(session).await?;
        if history.len() > after {
            if let Some(last) = history.last().filter(|m| m.role == MessageRole::Assistant) {
                return Ok(last.content.clone());
            }
        }
        debug!(session = %session, len = history.len(), "no reply yet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ChannelError::RequestFailed("reset".into()).is_transient());
        assert!(ChannelError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ChannelError::Status { code: 503, body: String::new() }.is_transient());
        assert!(!ChannelError::Status { code: 404, body: String::new() }.is_transient());
        assert!(!ChannelError::Cancelled.is_transient());
        assert!(!ChannelError::SessionFinished("s".into()).is_transient());
    }
}
