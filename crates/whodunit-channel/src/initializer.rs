//! World initializers: external sources of a starting world

use crate::channel::ChannelResult;
use crate::sanitize::parse_lenient;
use tracing::warn;
use whodunit_core::{WorldCandidate, WorldConfig};

#[async_trait::async_trait]
pub trait WorldInitializer: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a starting world, possibly incomplete. The engine backfills
    /// and validates whatever comes back.
    async fn initialize(&self, config: &WorldConfig) -> ChannelResult<WorldCandidate>;
}

/// Leaves everything to the default generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultInitializer;

#[async_trait::async_trait]
impl WorldInitializer for DefaultInitializer {
    fn name(&self) -> &str {
        "default"
    }

    async fn initialize(&self, _config: &WorldConfig) -> ChannelResult<WorldCandidate> {
        Ok(WorldCandidate::default())
    }
}

/// Hands out a fixed candidate.
#[derive(Debug, Clone)]
pub struct StaticInitializer(pub WorldCandidate);

#[async_trait::async_trait]
impl WorldInitializer for StaticInitializer {
    fn name(&self) -> &str {
        "static"
    }

    async fn initialize(&self, _config: &WorldConfig) -> ChannelResult<WorldCandidate> {
        Ok(self.0.clone())
    }
}

/// Salvage an initializer body; unparseable input becomes an empty candidate.
pub fn parse_candidate(raw: &str) -> WorldCandidate {
    match parse_lenient::<WorldCandidate>(raw) {
        Ok(candidate) => candidate,
        Err(e) => {
            warn!(error = %e, "unparseable initializer reply, using defaults");
            WorldCandidate::default()
        }
    }
}
