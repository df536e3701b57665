//! HTTP adapters for the agent ledger, the oracle and the initializer

use crate::channel::{AgentChannel, ChannelError, ChannelMessage, ChannelResult, SessionId};
use crate::initializer::{parse_candidate, WorldInitializer};
use crate::oracle::{parse_oracle_reply, NarrativeOracle};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use whodunit_core::{Action, OracleReply, Participant, ParticipantId, WorldCandidate, WorldConfig, WorldState};

fn client(timeout: Duration) -> ChannelResult<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Map a non-success status onto the channel taxonomy.
async fn check(response: Response, session: Option<&SessionId>) -> ChannelResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify(status.as_u16(), session, body))
}

fn classify(code: u16, session: Option<&SessionId>, body: String) -> ChannelError {
    match (code, session) {
        // expiry is routine, the orchestrator reopens the session
        (404, Some(id)) => {
            debug!(status = code, session = %id, "session not found");
            ChannelError::SessionNotFound(id.to_string())
        }
        (409 | 410, Some(id)) => {
            debug!(status = code, session = %id, "session finished");
            ChannelError::SessionFinished(id.to_string())
        }
        _ => {
            warn!(status = code, session = ?session.map(|s| s.as_str()), body = %body, "channel request failed");
            ChannelError::Status { code, body }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    agent: &'a str,
    message: &'a str,
    max_turns: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    session_id: SessionId,
}

#[derive(Serialize)]
struct AppendRequest<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct FinishedResponse {
    finished: bool,
}

/// Agent ledger over a small REST surface:
/// `POST /sessions`, `POST|GET /sessions/{id}/messages`, `GET /sessions/{id}/finished`.
pub struct HttpChannel {
    client: Client,
    base_url: String,
}

impl HttpChannel {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ChannelResult<Self> {
        Ok(Self {
            client: client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait::async_trait]
impl AgentChannel for HttpChannel {
    fn name(&self) -> &str {
        "http"
    }

    async fn start_session(
        &self,
        agent: &ParticipantId,
        initial: &str,
        max_turns: u32,
    ) -> ChannelResult<SessionId> {
        let body = StartRequest {
            agent: agent.as_str(),
            message: initial,
            max_turns,
        };
        debug!(agent = %agent, "starting remote session");
        let response = self.client.post(self.url("/sessions")).json(&body).send().await?;
        let started: StartResponse = check(response, None)
            .await?
            .json()
            .await
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;
        Ok(started.session_id)
    }

    async fn append_message(&self, session: &SessionId, message: &str) -> ChannelResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/sessions/{}/messages", session)))
            .json(&AppendRequest { content: message })
            .send()
            .await?;
        check(response, Some(session)).await?;
        Ok(())
    }

    async fn fetch_history(&self, session: &SessionId) -> ChannelResult<Vec<ChannelMessage>> {
        let response = self
            .client
            .get(self.url(&format!("/sessions/{}/messages", session)))
            .send()
            .await?;
        check(response, Some(session))
            .await?
            .json()
            .await
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))
    }

    async fn is_session_finished(&self, session: &SessionId) -> ChannelResult<bool> {
        let response = self
            .client
            .get(self.url(&format!("/sessions/{}/finished", session)))
            .send()
            .await?;
        let body: FinishedResponse = check(response, Some(session))
            .await?
            .json()
            .await
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;
        Ok(body.finished)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OracleRequest<'a> {
    player_name: &'a str,
    action: &'a Action,
    game_state: &'a WorldState,
}

/// Oracle reached with a single POST; the body is salvaged leniently.
pub struct HttpOracle {
    client: Client,
    url: String,
}

impl HttpOracle {
    pub fn new(url: impl Into<String>, timeout: Duration) -> ChannelResult<Self> {
        Ok(Self {
            client: client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl NarrativeOracle for HttpOracle {
    fn name(&self) -> &str {
        "http"
    }

    async fn narrate(
        &self,
        actor: &Participant,
        action: &Action,
        state: &WorldState,
    ) -> ChannelResult<OracleReply> {
        let body = OracleRequest {
            player_name: &actor.name,
            action,
            game_state: state,
        };
        let response = self.client.post(&self.url).json(&body).send().await?;
        let text = check(response, None).await?.text().await?;
        Ok(parse_oracle_reply(&text))
    }
}

/// Initializer reached with a single POST carrying the world config.
pub struct HttpInitializer {
    client: Client,
    url: String,
}

impl HttpInitializer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> ChannelResult<Self> {
        Ok(Self {
            client: client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl WorldInitializer for HttpInitializer {
    fn name(&self) -> &str {
        "http"
    }

    async fn initialize(&self, config: &WorldConfig) -> ChannelResult<WorldCandidate> {
        let response = self.client.post(&self.url).json(config).send().await?;
        let text = check(response, None).await?.text().await?;
        Ok(parse_candidate(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    struct Levels(Arc<Mutex<Vec<Level>>>);

    impl<S: Subscriber> Layer<S> for Levels {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    fn levels_of(f: impl FnOnce()) -> Vec<Level> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Levels(seen.clone()));
        tracing::subscriber::with_default(subscriber, f);
        let levels = seen.lock().unwrap().clone();
        levels
    }

    #[test]
    fn expiry_codes_map_to_session_errors_quietly() {
        let id = SessionId::new("blue-fish-1");
        let levels = levels_of(|| {
            assert!(matches!(classify(404, Some(&id), String::new()), ChannelError::SessionNotFound(_)));
            assert!(matches!(classify(409, Some(&id), String::new()), ChannelError::SessionFinished(_)));
            assert!(matches!(classify(410, Some(&id), String::new()), ChannelError::SessionFinished(_)));
        });
        assert_eq!(levels, vec![Level::DEBUG; 3]);
    }

    #[test]
    fn other_failures_keep_status_and_body() {
        let levels = levels_of(|| {
            match classify(404, None, "no such route".into()) {
                ChannelError::Status { code, body } => {
                    assert_eq!(code, 404);
                    assert_eq!(body, "no such route");
                }
                other => panic!("unexpected {:?}", other),
            }
            assert!(classify(503, Some(&SessionId::new("s")), String::new()).is_transient());
        });
        assert_eq!(levels, vec![Level::WARN; 2]);
    }
}
