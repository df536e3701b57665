//! Turn scheduler: who may act, and when a turn is over
//!
//! A turn has two slots, one chat and one world action, filled in either
//! order by the participant holding the turn. Once both are filled the turn
//! waits in [`Stage::Advancing`] until [`Scheduler::end_turn`] hands it to the
//! next participant. A correct accusation concludes the game at once.
//!
//! The scheduler owns the world exclusively. It performs no I/O; the engine
//! worker drives it and publishes what it returns.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use whodunit_core::resolver::{self, Resolution};
use whodunit_core::{Action, Command, ParticipantId, Phase, Result, SideEffect, WorldState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Not started yet
    Idle,
    /// The chat slot is open (the action slot may or may not be)
    AwaitingChat,
    /// Only the world-action slot is open
    AwaitingAction,
    /// Both slots filled, handoff pending
    Advancing,
    Concluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    NotStarted,
    NotYourTurn,
    GameOver,
    /// The slot this action would fill is already used this turn
    SlotTaken,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rejection::NotStarted => "the game has not started",
            Rejection::NotYourTurn => "it is not your turn",
            Rejection::GameOver => "the game is over",
            Rejection::SlotTaken => "you already did that this turn",
        })
    }
}

/// A committed action.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub narrative: String,
    pub effects: Vec<SideEffect>,
    /// Both slots are now filled; call [`Scheduler::end_turn`]
    pub turn_complete: bool,
    pub concluded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Applied(Applied),
    Rejected(Rejection),
}

impl SubmitOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SubmitOutcome::Applied(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            SubmitOutcome::Rejected(r) => Some(*r),
            SubmitOutcome::Applied(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handoff {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub turn_count: u64,
    pub forfeited: bool,
    pub narrative: String,
}

pub struct Scheduler {
    state: WorldState,
    rng: ChaCha8Rng,
    stage: Stage,
    chat_done: bool,
    action_done: bool,
    forfeited: bool,
}

impl Scheduler {
    pub fn new(state: WorldState, seed: u64) -> Self {
        Self {
            state,
            rng: ChaCha8Rng::seed_from_u64(seed),
            stage: Stage::Idle,
            chat_done: false,
            action_done: false,
            forfeited: false,
        }
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn current(&self) -> &ParticipantId {
        &self.state.current_turn
    }

    pub fn is_concluded(&self) -> bool {
        self.stage == Stage::Concluded
    }

    /// Leave setup, introduce everyone, open the first turn. Returns the
    /// narration; calling it twice does nothing.
    pub fn start(&mut self) -> Vec<String> {
        if self.stage != Stage::Idle {
            return Vec::new();
        }
        let mut lines = Vec::new();
        let victim = match self.state.solution.victim.trim() {
            "" => "The host",
            v => v,
        };
        lines.push(format!(
            "Welcome to the mansion. {} has been found dead, and the murderer is one of the guests.",
            victim
        ));
        for p in &self.state.participants {
            lines.push(format!("Introducing {}, the {} investigator.", p.name, p.role));
        }
        let first = self
            .state
            .current_participant()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| self.state.current_turn.to_string());
        lines.push(format!("{} takes the first turn.", first));
        for line in &lines {
            self.state.narrate(line.clone());
        }

        self.state.phase = Phase::from_progress(self.state.discovered_clues(), self.state.clues.len())
            .max(Phase::Investigation)
            .min(Phase::Accusation);
        self.open_turn();
        info!(first = %self.state.current_turn, phase = %self.state.phase, "game started");
        lines
    }

    fn open_turn(&mut self) {
        self.chat_done = false;
        self.action_done = false;
        self.forfeited = false;
        self.stage = Stage::AwaitingChat;
    }

    fn check(&self, actor: &ParticipantId) -> Option<Rejection> {
        match self.stage {
            Stage::Idle => Some(Rejection::NotStarted),
            Stage::Concluded => Some(Rejection::GameOver),
            _ if actor != &self.state.current_turn => Some(Rejection::NotYourTurn),
            _ => None,
        }
    }

    /// Apply one half of the current turn. Rejections leave the world untouched.
    pub fn submit(&mut self, action: &Action) -> Result<SubmitOutcome> {
        if let Some(rejection) = self.check(&action.actor_id) {
            debug!(actor = %action.actor_id, %rejection, "action rejected");
            return Ok(SubmitOutcome::Rejected(rejection));
        }
        let chat = action.is_chat();
        if (chat && self.chat_done) || (!chat && self.action_done) {
            return Ok(SubmitOutcome::Rejected(Rejection::SlotTaken));
        }

        let resolution = resolver::apply(&self.state, action, &mut self.rng)?;
        if chat {
            self.chat_done = true;
        } else {
            self.action_done = true;
        }
        Ok(SubmitOutcome::Applied(self.commit(resolution)))
    }

    /// Close the current turn for `actor` without a world action.
    /// `last_words` is narrated even if the chat slot was already used.
    pub fn forfeit(&mut self, actor: &ParticipantId, last_words: Option<&Action>) -> Result<SubmitOutcome> {
        if let Some(rejection) = self.check(actor) {
            return Ok(SubmitOutcome::Rejected(rejection));
        }
        if self.action_done {
            return Ok(SubmitOutcome::Rejected(Rejection::SlotTaken));
        }

        let mut narrative = Vec::new();
        let mut effects = Vec::new();
        if let Some(words) = last_words.filter(|a| a.is_chat() && &a.actor_id == actor) {
            let resolution = resolver::apply(&self.state, words, &mut self.rng)?;
            narrative.push(resolution.narrative);
            effects = resolution.effects;
            self.state = resolution.state;
        }
        let name = self.name_of(actor);
        let line = format!("{} hesitates and loses the turn", name);
        self.state.narrate(line.clone());
        narrative.push(line);

        self.chat_done = true;
        self.action_done = true;
        self.forfeited = true;
        self.stage = Stage::Advancing;
        info!(participant = %actor, turn = self.state.turn_count, "turn forfeited");
        Ok(SubmitOutcome::Applied(Applied {
            narrative: narrative.join("\n"),
            effects,
            turn_complete: true,
            concluded: false,
        }))
    }

    fn commit(&mut self, resolution: Resolution) -> Applied {
        let concluded = resolution.concluded();
        self.state = resolution.state;
        self.stage = if concluded {
            info!(winner = ?self.state.winner, turn = self.state.turn_count, "game concluded");
            Stage::Concluded
        } else if self.chat_done && self.action_done {
            Stage::Advancing
        } else if self.chat_done {
            Stage::AwaitingAction
        } else {
            Stage::AwaitingChat
        };
        Applied {
            narrative: resolution.narrative,
            effects: resolution.effects,
            turn_complete: self.stage == Stage::Advancing,
            concluded,
        }
    }

    /// Apply referee commands between the action and the handoff.
    /// Ignored once the game is over.
    pub fn apply_commands(&mut self, commands: &[Command]) -> Vec<(String, Resolution)> {
        let mut out = Vec::new();
        for command in commands {
            if self.is_concluded() {
                break;
            }
            let resolution = resolver::apply_command(&self.state, command);
            self.state = resolution.state.clone();
            out.push((command.name().to_string(), resolution));
        }
        out
    }

    /// Narrate a system notice without touching the turn.
    pub fn notice(&mut self, text: impl Into<String>) {
        self.state.narrate(text);
    }

    /// Hand the turn to the next participant in rotation once both slots
    /// are filled. Returns `None` when the turn is not complete.
    pub fn end_turn(&mut self) -> Option<Handoff> {
        if self.stage != Stage::Advancing {
            return None;
        }
        let from = self.state.current_turn.clone();
        let next = self.state.next_in_rotation(&from)?;
        let (to, to_name) = (next.id.clone(), next.name.clone());

        self.state.current_turn = to.clone();
        self.state.turn_count += 1;
        let narrative = format!("Turn {}: it is now {}'s turn.", self.state.turn_count, to_name);
        self.state.narrate(narrative.clone());

        let forfeited = self.forfeited;
        self.open_turn();
        debug!(from = %from, to = %to, turn = self.state.turn_count, "turn advanced");
        Some(Handoff {
            from,
            to,
            turn_count: self.state.turn_count,
            forfeited,
            narrative,
        })
    }

    fn name_of(&self, id: &ParticipantId) -> String {
        self.state
            .participant_by_id(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whodunit_core::generate::default_world;
    use whodunit_core::{Direction, WorldConfig};

    fn started() -> Scheduler {
        let world = default_world(&WorldConfig {
            rows: 3,
            columns: 3,
            ai_participants: 2,
            ..Default::default()
        })
        .unwrap();
        let mut s = Scheduler::new(world, 1);
        s.start();
        s
    }

    #[test]
    fn idle_until_started() {
        let world = default_world(&WorldConfig::default()).unwrap();
        let mut s = Scheduler::new(world, 1);
        assert_eq!(s.stage(), Stage::Idle);
        let outcome = s.submit(&Action::chat("user", "hi")).unwrap();
        assert_eq!(outcome.rejection(), Some(Rejection::NotStarted));
        assert_eq!(s.state().phase, Phase::Setup);
    }

    #[test]
    fn start_introduces_everyone_once() {
        let mut s = started();
        assert_eq!(s.state().phase, Phase::Investigation);
        assert_eq!(s.stage(), Stage::AwaitingChat);
        let log: Vec<&str> = s.state().event_log.iter().collect();
        assert!(log.contains(&"Introducing Detective, the human investigator."));
        assert!(log.contains(&"Introducing Blue Fish, the ai investigator."));
        assert_eq!(log.last(), Some(&"Detective takes the first turn."));
        assert!(s.start().is_empty());
    }

    #[test]
    fn action_first_then_chat_completes_turn() {
        let mut s = started();
        let outcome = s.submit(&Action::walk("user", Direction::East)).unwrap();
        assert!(outcome.is_applied());
        assert_eq!(s.stage(), Stage::AwaitingChat);
        assert!(s.end_turn().is_none());

        let outcome = s.submit(&Action::chat("user", "onwards")).unwrap();
        assert_eq!(s.stage(), Stage::Advancing);
        match outcome {
            SubmitOutcome::Applied(a) => assert!(a.turn_complete),
            other => panic!("unexpected {:?}", other),
        }
        let handoff = s.end_turn().unwrap();
        assert_eq!(handoff.to.as_str(), "blue-fish");
        assert_eq!(handoff.turn_count, 1);
        assert_eq!(s.stage(), Stage::AwaitingChat);
    }

    #[test]
    fn forfeit_closes_the_turn() {
        let mut s = started();
        s.submit(&Action::chat("user", "hmm")).unwrap();
        let outcome = s
            .forfeit(&"user".into(), Some(&Action::chat("user", "never mind")))
            .unwrap();
        assert!(outcome.is_applied());
        assert_eq!(s.state().event_log.last(), Some("Detective hesitates and loses the turn"));
        let handoff = s.end_turn().unwrap();
        assert!(handoff.forfeited);
        assert_eq!(s.state().turn_count, 1);
    }
}
