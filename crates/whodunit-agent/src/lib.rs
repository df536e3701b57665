//! Whodunit Agent - Orchestration of AI participants over agent channels

pub mod orchestrator;
pub mod parse;
pub mod prompt;
pub mod session;

pub use orchestrator::{AgentTurn, Orchestrator, OrchestratorConfig, FALLBACK_CHAT};
pub use parse::{parse_action, parse_chat, ParseTier, Parsed};
pub use session::{AgentSession, ParticipantSessions};
