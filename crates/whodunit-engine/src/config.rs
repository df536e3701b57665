//! Engine configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists or it cannot be parsed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use whodunit_agent::OrchestratorConfig;
use whodunit_channel::{PollConfig, RetryPolicy};
use whodunit_core::WorldConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default world generation.
    pub world: WorldConfig,
    /// Retry policy for every agent channel operation.
    pub retry: RetryPolicy,
    /// Agent polling and pacing.
    pub agent: AgentConfig,
    /// Narrative oracle endpoint.
    pub oracle: OracleConfig,
    /// World initializer endpoint.
    pub initializer: EndpointConfig,
    /// Agent channel endpoint. Without one the in-memory ledger is used.
    pub channel: EndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// How often the ledger is checked for an assistant reply.
    pub poll_interval_ms: u64,
    /// Upper bound on a single wait for a reply.
    pub poll_timeout_ms: u64,
    /// User messages one channel session accepts before it is replaced.
    pub max_session_turns: u32,
    /// Pause before an AI participant is asked for its turn.
    pub turn_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            poll_timeout_ms: 30_000,
            max_session_turns: 5,
            turn_delay_ms: 500,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 15_000,
        }
    }
}

pub const CONFIG_ENV: &str = "WHODUNIT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "whodunit.toml";

/// The opening message spends one turn of every session.
const MIN_SESSION_TURNS: u32 = 2;

impl EngineConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::info!(path = %path.display(), reason = %e, "no whodunit config, using defaults");
                return Self::default();
            }
        };
        match toml::from_str::<Self>(&text) {
            Ok(config) => {
                tracing::info!(
                    path = %path.display(),
                    rows = config.world.rows,
                    columns = config.world.columns,
                    seed = config.world.seed,
                    "whodunit config loaded"
                );
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "whodunit config unreadable, using defaults");
                Self::default()
            }
        }
    }

    /// Path given on the command line, else `WHODUNIT_CONFIG`, else
    /// `whodunit.toml` in the working directory.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: self.retry.clone(),
            poll: PollConfig {
                interval: Duration::from_millis(self.agent.poll_interval_ms.max(1)),
                timeout: Duration::from_millis(self.agent.poll_timeout_ms),
            },
            max_session_turns: self.agent.max_session_turns.max(MIN_SESSION_TURNS),
        }
    }

    pub fn turn_delay(&self) -> Duration {
        Duration::from_millis(self.agent.turn_delay_ms)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.world.rows, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.agent.poll_timeout_ms, 30_000);
        assert_eq!(config.oracle.timeout_ms, 15_000);
        assert!(config.channel.url.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[world]\nrows = 4\nseed = 7\n\n[channel]\nurl = \"http://localhost:9000\"").unwrap();

        let config = EngineConfig::load(file.path());
        assert_eq!(config.world.rows, 4);
        assert_eq!(config.world.columns, 10);
        assert_eq!(config.world.seed, 7);
        assert_eq!(config.channel.url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.agent.max_session_turns, 5);
    }

    #[test]
    fn missing_or_broken_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("nope.toml"));
        assert_eq!(config.world.seed, 42);

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[world\nrows = ").unwrap();
        assert_eq!(EngineConfig::load(&broken).world.seed, 42);
    }

    #[test]
    fn explicit_path_wins() {
        let path = EngineConfig::resolve_path(Some(Path::new("/tmp/mansion.toml")));
        assert_eq!(path, PathBuf::from("/tmp/mansion.toml"));
    }

    #[test]
    fn rendered_toml_loads_back() {
        let mut config = EngineConfig::default();
        config.agent.turn_delay_ms = 0;
        config.oracle.url = Some("http://oracle".into());
        let text = config.to_toml();
        assert!(text.contains("[agent]"));

        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.agent.turn_delay_ms, 0);
        assert_eq!(parsed.oracle.url.as_deref(), Some("http://oracle"));
    }

    #[test]
    fn orchestrator_settings_follow_agent_section() {
        let mut config = EngineConfig::default();
        config.agent.poll_interval_ms = 0;
        config.agent.max_session_turns = 0;
        let orch = config.orchestrator();
        assert_eq!(orch.poll.interval, Duration::from_millis(1));
        assert_eq!(orch.max_session_turns, 2);

        config.agent.max_session_turns = 1;
        assert_eq!(config.orchestrator().max_session_turns, 2);
        config.agent.max_session_turns = 7;
        assert_eq!(config.orchestrator().max_session_turns, 7);
    }
}
