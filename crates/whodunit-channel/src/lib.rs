//! Whodunit Channel - External collaborators: agent channels, the narrative
//! oracle, world initializers, plus retry and JSON salvage

pub mod channel;
pub mod http;
pub mod initializer;
pub mod memory;
pub mod oracle;
pub mod retry;
pub mod sanitize;

pub use channel::{
    await_reply, AgentChannel, ChannelError, ChannelMessage, ChannelResult, MessageRole, PollConfig,
    SessionId,
};
pub use http::{HttpChannel, HttpInitializer, HttpOracle};
pub use initializer::{DefaultInitializer, StaticInitializer, WorldInitializer};
pub use memory::{MemoryChannel, Responder};
pub use oracle::{NarrativeOracle, SilentOracle};
pub use retry::{retry, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
