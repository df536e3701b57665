//! Narrative oracle: the referee that describes and embellishes outcomes

use crate::channel::ChannelResult;
use crate::sanitize::parse_lenient;
use tracing::warn;
use whodunit_core::{Action, OracleReply, Participant, WorldState};

#[async_trait::async_trait]
pub trait NarrativeOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Describe `action` by `actor` against the committed `state`.
    async fn narrate(
        &self,
        actor: &Participant,
        action: &Action,
        state: &WorldState,
    ) -> ChannelResult<OracleReply>;
}

/// Oracle that never adds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentOracle;

#[async_trait::async_trait]
impl NarrativeOracle for SilentOracle {
    fn name(&self) -> &str {
        "silent"
    }

    async fn narrate(
        &self,
        _actor: &Participant,
        _action: &Action,
        _state: &WorldState,
    ) -> ChannelResult<OracleReply> {
        Ok(OracleReply::fallback())
    }
}

/// Salvage an oracle body. Anything unparseable becomes the fallback reply.
pub fn parse_oracle_reply(raw: &str) -> OracleReply {
    match parse_lenient::<OracleReply>(raw) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "unparseable oracle reply, using fallback");
            OracleReply::fallback()
        }
    }
}
