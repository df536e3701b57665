//! Tests for whodunit-agent: lazy sessions, round trips, retry fallback, parsing tiers

use std::sync::Arc;
use std::time::Duration;
use whodunit_agent::*;
use whodunit_channel::{
    CancellationToken, ChannelMessage, MemoryChannel, MessageRole, PollConfig, Responder, RetryPolicy,
};
use whodunit_core::generate::default_world;
use whodunit_core::{ActionDetails, ActionKind, Participant, WorldConfig, WorldState};

fn world() -> WorldState {
    default_world(&WorldConfig {
        rows: 3,
        columns: 3,
        ..Default::default()
    })
    .unwrap()
}

fn ai(world: &WorldState) -> Participant {
    world.participants[1].clone()
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryPolicy::immediate(3),
        poll: PollConfig {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(100),
        },
        max_session_turns: 5,
    }
}

fn orchestrator(channel: Arc<MemoryChannel>, config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::new(channel, config)
}

fn search_json() -> String {
    r#"{"actionType":"search","actionDetails":{}}"#.to_string()
}

// ===========================================================================
// Happy path
// ===========================================================================

#[tokio::test]
async fn turn_yields_chat_then_action() {
    let channel = Arc::new(MemoryChannel::new(Responder::sequence(vec![
        "Understood.".into(),
        "I was in the kitchen all evening.".into(),
        search_json(),
    ])));
    let orch = orchestrator(channel.clone(), config());
    let world = world();
    let me = ai(&world);

    let turn = orch.next_turn(&me, &world, &CancellationToken::new()).await;
    assert_eq!(turn.chat.details, ActionDetails::Chat {
        message: "I was in the kitchen all evening.".into()
    });
    assert_eq!(turn.action.kind(), ActionKind::Search);
    assert_eq!(turn.tier, Some(ParseTier::Strict));
    assert!(turn.notices.is_empty());
    assert!(!turn.forfeits());
}

#[tokio::test]
async fn session_is_created_once_and_reused() {
    let channel = Arc::new(MemoryChannel::new(Responder::scripted()));
    let orch = orchestrator(channel.clone(), config());
    let world = world();
    let me = ai(&world);
    let cancel = CancellationToken::new();

    assert!(orch.sessions().get(&me.id).is_none());
    orch.next_turn(&me, &world, &cancel).await;
    let slot = orch.sessions().get(&me.id).unwrap();
    assert!(slot.is_initialized().await);
    let first = slot.id().await;

    orch.next_turn(&me, &world, &cancel).await;
    assert_eq!(slot.id().await, first);
    assert_eq!(channel.session_count(), 1);
    assert_eq!(slot.opened().await, 1);
}

#[tokio::test]
async fn exhausted_session_is_replaced() {
    let channel = Arc::new(MemoryChannel::new(Responder::scripted()));
    let orch = orchestrator(
        channel.clone(),
        OrchestratorConfig {
            max_session_turns: 3,
            ..config()
        },
    );
    let world = world();
    let me = ai(&world);
    let cancel = CancellationToken::new();

    // intro + chat + action fills the three-message session
    let t1 = orch.next_turn(&me, &world, &cancel).await;
    let t2 = orch.next_turn(&me, &world, &cancel).await;
    assert!(t1.notices.is_empty());
    assert!(t2.notices.is_empty());
    assert_eq!(channel.session_count(), 2);
    assert_eq!(orch.sessions().get(&me.id).unwrap().opened().await, 2);
}

// ===========================================================================
// Failure handling
// ===========================================================================

#[tokio::test]
async fn transient_failures_are_retried() {
    let channel = Arc::new(MemoryChannel::new(Responder::scripted()));
    channel.fail_next(2);
    let orch = orchestrator(channel.clone(), config());
    let world = world();

    let turn = orch.next_turn(&ai(&world), &world, &CancellationToken::new()).await;
    assert!(turn.notices.is_empty());
    assert_ne!(turn.chat, whodunit_core::Action::chat(ai(&world).id, FALLBACK_CHAT));
}

#[tokio::test]
async fn exhausted_retries_degrade_to_fallback_chat() {
    let channel = Arc::new(MemoryChannel::new(Responder::scripted()));
    channel.fail_next(u32::MAX);
    let orch = orchestrator(channel.clone(), config());
    let world = world();
    let me = ai(&world);

    let turn = orch.next_turn(&me, &world, &CancellationToken::new()).await;
    assert_eq!(turn.chat.details, ActionDetails::Chat {
        message: FALLBACK_CHAT.into()
    });
    assert!(turn.forfeits());
    assert_eq!(turn.tier, None);
    assert_eq!(turn.notices.len(), 2);
    assert!(turn.notices[0].contains("no answer after 3 attempts"));
    // start_session attempted max_attempts times for each half
    assert_eq!(channel.calls(), 6);
    assert!(!orch.sessions().get(&me.id).unwrap().is_initialized().await);
}

#[tokio::test]
async fn silent_agent_times_out_into_fallback() {
    let channel = Arc::new(MemoryChannel::new(Responder::silent()));
    let orch = orchestrator(channel.clone(), config());
    let world = world();

    let turn = orch.next_turn(&ai(&world), &world, &CancellationToken::new()).await;
    assert_eq!(turn.notices.len(), 2);
    assert!(turn.forfeits());
}

#[tokio::test]
async fn cancelled_turn_degrades_without_waiting() {
    let channel = Arc::new(MemoryChannel::new(Responder::silent()));
    let orch = orchestrator(
        channel.clone(),
        OrchestratorConfig {
            poll: PollConfig {
                interval: Duration::from_millis(5),
                timeout: Duration::from_secs(60),
            },
            ..config()
        },
    );
    let world = world();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let turn = tokio::time::timeout(
        Duration::from_secs(5),
        orch.next_turn(&ai(&world), &world, &cancel),
    )
    .await
    .unwrap();
    assert!(turn.notices.iter().all(|n| n.contains("cancelled")));
}

// ===========================================================================
// Ledger discipline
// ===========================================================================

#[tokio::test]
async fn waits_for_pending_reply_before_sending() {
    let channel = Arc::new(
        MemoryChannel::new(Responder::scripted()).with_reply_delay(Duration::from_millis(20)),
    );
    let orch = orchestrator(channel.clone(), config());
    let world = world();
    let me = ai(&world);

    let turn = orch.next_turn(&me, &world, &CancellationToken::new()).await;
    assert!(turn.notices.is_empty());

    let id = orch.sessions().get(&me.id).unwrap().id().await.unwrap();
    let roles: Vec<MessageRole> = channel.transcript(&id).iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User,
            MessageRole::Assistant,
        ]
    );
}

#[tokio::test]
async fn prose_action_reply_is_heuristic_and_nonsense_forfeits() {
    let channel = Arc::new(MemoryChannel::new(Responder::sequence(vec![
        "Hello.".into(),
        "Nice weather.".into(),
        "I'll head north, I think.".into(),
        "Still nice weather.".into(),
        "Honestly I have no idea.".into(),
    ])));
    let orch = orchestrator(channel.clone(), config());
    let world = world();
    let me = ai(&world);
    let cancel = CancellationToken::new();

    let t1 = orch.next_turn(&me, &world, &cancel).await;
    assert_eq!(t1.tier, Some(ParseTier::Heuristic));
    assert_eq!(t1.action.kind(), ActionKind::Move);

    let t2 = orch.next_turn(&me, &world, &cancel).await;
    assert_eq!(t2.tier, Some(ParseTier::Raw));
    assert!(t2.forfeits());
    assert!(t2.notices.is_empty());
}

#[test]
fn chat_messages_are_plain_values() {
    // ChannelMessage is the ledger's unit; keep it trivially comparable
    assert_eq!(ChannelMessage::user("a"), ChannelMessage::user("a"));
}
