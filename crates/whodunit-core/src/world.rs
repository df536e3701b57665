//! World model: the single source of truth for a game

use crate::error::{Error, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::warn;

pub const DEFAULT_EVENT_LOG_CAP: usize = 50;

/// Parameters for the deterministic default world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub rows: usize,
    pub columns: usize,
    pub seed: u64,
    pub event_log_cap: usize,
    /// Number of AI participants (capped by the built-in roster)
    pub ai_participants: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            rows: 10,
            columns: 10,
            seed: 42,
            event_log_cap: DEFAULT_EVENT_LOG_CAP,
            ai_participants: 4,
        }
    }
}

/// Bounded narration log. The oldest entries are evicted past `cap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    entries: VecDeque<String>,
    cap: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_cap(DEFAULT_EVENT_LOG_CAP)
    }
}

impl EventLog {
    pub fn with_cap(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &str> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
    pub grid: Vec<Vec<RoomId>>,
    pub rooms: Vec<Room>,
    /// Order defines turn rotation
    pub participants: Vec<Participant>,
    pub current_turn: ParticipantId,
    pub phase: Phase,
    pub turn_count: u64,
    pub clues: Vec<Clue>,
    pub solution: Solution,
    pub event_log: EventLog,
    /// Set by the accusation that concluded the game
    #[serde(default)]
    pub winner: Option<ParticipantId>,
}

impl WorldState {
    /// Build and validate a world. The first participant holds the first turn.
    pub fn new(
        grid: Vec<Vec<RoomId>>,
        rooms: Vec<Room>,
        participants: Vec<Participant>,
        clues: Vec<Clue>,
        solution: Solution,
    ) -> Result<Self> {
        let current_turn = participants
            .first()
            .map(|p| p.id.clone())
            .ok_or_else(|| Error::malformed("no participants"))?;
        let state = Self {
            grid,
            rooms,
            participants,
            current_turn,
            phase: Phase::Setup,
            turn_count: 0,
            clues,
            solution,
            event_log: EventLog::default(),
            winner: None,
        };
        state.validate()?;
        Ok(state)
    }

    pub fn with_event_log_cap(mut self, cap: usize) -> Self {
        let mut log = EventLog::with_cap(cap);
        for entry in self.event_log.iter() {
            log.push(entry);
        }
        self.event_log = log;
        self
    }

    /// Check every construction invariant.
    pub fn validate(&self) -> Result<()> {
        let rows = self.grid.len();
        if rows == 0 {
            return Err(Error::malformed("grid has no rows"));
        }
        let columns = self.grid[0].len();
        if columns == 0 {
            return Err(Error::malformed("grid has no columns"));
        }
        if self.grid.iter().any(|row| row.len() != columns) {
            return Err(Error::malformed("grid rows have differing lengths"));
        }

        let mut room_ids = HashSet::new();
        for room in &self.rooms {
            if !room_ids.insert(&room.id) {
                return Err(Error::malformed(format!("duplicate room id '{}'", room.id)));
            }
        }
        for (r, row) in self.grid.iter().enumerate() {
            for (c, id) in row.iter().enumerate() {
                if !room_ids.contains(id) {
                    return Err(Error::malformed(format!(
                        "grid cell ({}, {}) references unknown room '{}'",
                        r, c, id
                    )));
                }
            }
        }

        if self.participants.is_empty() {
            return Err(Error::malformed("no participants"));
        }
        let mut participant_ids = HashSet::new();
        for p in &self.participants {
            if !participant_ids.insert(&p.id) {
                return Err(Error::malformed(format!("duplicate participant id '{}'", p.id)));
            }
            if p.position.row >= rows || p.position.col >= columns {
                return Err(Error::malformed(format!(
                    "participant '{}' at {} is outside the {}x{} grid",
                    p.id, p.position, rows, columns
                )));
            }
        }
        if !participant_ids.contains(&self.current_turn) {
            return Err(Error::malformed(format!(
                "current turn '{}' is not a participant",
                self.current_turn
            )));
        }

        if !participant_ids.contains(&self.solution.culprit) {
            return Err(Error::malformed(format!(
                "solution culprit '{}' is not a participant",
                self.solution.culprit
            )));
        }
        if self.solution.weapon.trim().is_empty() {
            return Err(Error::malformed("solution weapon is empty"));
        }
        if !room_ids.contains(&self.solution.location) {
            return Err(Error::malformed(format!(
                "solution location '{}' is not a room",
                self.solution.location
            )));
        }

        let mut clue_ids = HashSet::new();
        for clue in &self.clues {
            if !clue_ids.insert(&clue.id) {
                return Err(Error::malformed(format!("duplicate clue id '{}'", clue.id)));
            }
            if !room_ids.contains(&clue.location) {
                return Err(Error::malformed(format!(
                    "clue '{}' is hidden in unknown room '{}'",
                    clue.id, clue.location
                )));
            }
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.grid.len()
    }

    pub fn columns(&self) -> usize {
        self.grid.first().map(Vec::len).unwrap_or(0)
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.row < self.rows() && pos.col < self.columns()
    }

    pub fn clamp(&self, pos: Position) -> Position {
        Position {
            row: pos.row.min(self.rows().saturating_sub(1)),
            col: pos.col.min(self.columns().saturating_sub(1)),
        }
    }

    pub fn room_id_at(&self, pos: Position) -> Option<&RoomId> {
        self.grid.get(pos.row).and_then(|row| row.get(pos.col))
    }

    pub fn room_at(&self, pos: Position) -> Option<&Room> {
        self.room_id_at(pos).and_then(|id| self.room(id))
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| &r.id == id)
    }

    pub(crate) fn room_mut(&mut self, id: &RoomId) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|r| &r.id == id)
    }

    /// First grid cell holding `id`.
    pub fn position_of(&self, id: &RoomId) -> Option<Position> {
        self.grid.iter().enumerate().find_map(|(r, row)| {
            row.iter()
                .position(|cell| cell == id)
                .map(|c| Position::new(r, c))
        })
    }

    pub fn participant_by_id(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub(crate) fn participant_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| &p.id == id)
    }

    pub fn current_participant(&self) -> Option<&Participant> {
        self.participant_by_id(&self.current_turn)
    }

    /// The participant after `id` in rotation order, wrapping around.
    pub fn next_in_rotation(&self, id: &ParticipantId) -> Option<&Participant> {
        let idx = self.participants.iter().position(|p| &p.id == id)?;
        self.participants.get((idx + 1) % self.participants.len())
    }

    /// Participants other than `id` standing on the same cell.
    pub fn co_located(&self, id: &ParticipantId) -> Vec<&Participant> {
        let Some(me) = self.participant_by_id(id) else {
            return Vec::new();
        };
        self.participants
            .iter()
            .filter(|p| &p.id != id && p.position == me.position)
            .collect()
    }

    pub fn clue(&self, id: &ClueId) -> Option<&Clue> {
        self.clues.iter().find(|c| &c.id == id)
    }

    pub fn discovered_clues(&self) -> usize {
        self.clues.iter().filter(|c| c.discovered).count()
    }

    pub fn discovery_ratio(&self) -> f64 {
        if self.clues.is_empty() {
            return 0.0;
        }
        self.discovered_clues() as f64 / self.clues.len() as f64
    }

    pub fn discovered_rooms(&self) -> usize {
        self.rooms.iter().filter(|r| r.discovered).count()
    }

    pub fn is_concluded(&self) -> bool {
        self.phase.is_terminal()
    }

    /// 10 per known clue, 5 per discovered room, 100 for solving the case.
    pub fn score(&self, id: &ParticipantId) -> u32 {
        let Some(p) = self.participant_by_id(id) else {
            return 0;
        };
        let clues = p.known_clues.len() as u32 * 10;
        let rooms = self.discovered_rooms() as u32 * 5;
        let bonus = if self.winner.as_ref() == Some(id) { 100 } else { 0 };
        clues + rooms + bonus
    }

    pub fn narrate(&mut self, entry: impl Into<String>) {
        self.event_log.push(entry);
    }

    /// Move the phase forward to whatever the discovery ratio implies.
    /// Returns the new phase if it changed.
    pub(crate) fn refresh_phase(&mut self) -> Option<Phase> {
        if matches!(self.phase, Phase::Setup | Phase::Conclusion) {
            return None;
        }
        let derived = Phase::from_progress(self.discovered_clues(), self.clues.len());
        if derived > self.phase {
            self.phase = derived;
            Some(derived)
        } else {
            None
        }
    }

    /// Compact JSON for prompts and oracle calls.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A possibly incomplete world from an external initializer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldCandidate {
    pub grid: Option<Vec<Vec<RoomId>>>,
    pub rooms: Option<Vec<Room>>,
    pub participants: Option<Vec<Participant>>,
    pub current_turn: Option<ParticipantId>,
    pub clues: Option<Vec<Clue>>,
    pub solution: Option<Solution>,
}

impl WorldCandidate {
    /// Fill every missing piece from `defaults`, then validate.
    pub fn backfill(self, defaults: WorldState) -> Result<WorldState> {
        let cap = defaults.event_log.cap();

        let (grid, rooms) = match (self.grid, self.rooms) {
            (Some(grid), Some(rooms)) if !grid.is_empty() && !rooms.is_empty() => (grid, rooms),
            _ => {
                warn!("initializer omitted grid or rooms, using default layout");
                (defaults.grid.clone(), defaults.rooms.clone())
            }
        };
        let rows = grid.len();
        let columns = grid.first().map(Vec::len).unwrap_or(0);
        let room_ids: HashSet<&RoomId> = rooms.iter().map(|r| &r.id).collect();

        let mut participants = match self.participants {
            Some(list) if !list.is_empty() => list,
            _ => defaults.participants.clone(),
        };
        if !participants.iter().any(|p| p.role == ParticipantRole::Human) {
            if let Some(human) = defaults
                .participants
                .iter()
                .find(|p| p.role == ParticipantRole::Human)
                .filter(|h| participants.iter().all(|p| p.id != h.id))
            {
                warn!(id = %human.id, "initializer world has no human participant, adding default");
                participants.insert(0, human.clone());
            }
        }
        for p in &mut participants {
            if rows > 0 && columns > 0 && (p.position.row >= rows || p.position.col >= columns) {
                warn!(id = %p.id, position = %p.position, "clamping out-of-bounds start position");
                p.position = Position::new(
                    p.position.row.min(rows - 1),
                    p.position.col.min(columns - 1),
                );
            }
        }

        let clues = match self.clues {
            Some(list) => list,
            None => defaults
                .clues
                .iter()
                .filter(|c| room_ids.contains(&c.location))
                .cloned()
                .collect(),
        };

        let solution = match self.solution {
            Some(s) => s,
            None => {
                let mut s = defaults.solution.clone();
                if !participants.iter().any(|p| p.id == s.culprit) {
                    if let Some(p) = participants
                        .iter()
                        .find(|p| p.is_ai())
                        .or_else(|| participants.last())
                    {
                        s.culprit = p.id.clone();
                    }
                }
                if !room_ids.contains(&s.location) {
                    if let Some(r) = rooms.first() {
                        s.location = r.id.clone();
                    }
                }
                s
            }
        };

        let mut state = WorldState::new(grid, rooms, participants, clues, solution)?
            .with_event_log_cap(cap);
        if let Some(turn) = self.current_turn {
            if state.participant_by_id(&turn).is_some() {
                state.current_turn = turn;
            } else {
                warn!(id = %turn, "initializer current turn is unknown, keeping first participant");
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> WorldState {
        let grid = vec![vec![RoomId::from("r0")]];
        let rooms = vec![Room::new("r0", "Foyer")];
        let participants = vec![Participant::new(
            "user",
            "You",
            ParticipantRole::Human,
            Position::new(0, 0),
        )];
        let solution = Solution {
            culprit: "user".into(),
            weapon: "Rope".into(),
            location: "r0".into(),
            victim: String::new(),
            motive: String::new(),
        };
        WorldState::new(grid, rooms, participants, vec![], solution).unwrap()
    }

    #[test]
    fn event_log_evicts_oldest() {
        let mut log = EventLog::with_cap(3);
        for i in 0..5 {
            log.push(format!("e{}", i));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.iter().collect::<Vec<_>>(), vec!["e2", "e3", "e4"]);
        assert_eq!(log.recent(2).collect::<Vec<_>>(), vec!["e3", "e4"]);
    }

    #[test]
    fn rejects_empty_grid() {
        let mut state = tiny();
        state.grid.clear();
        assert!(matches!(state.validate(), Err(Error::MalformedWorldState(_))));
    }

    #[test]
    fn rejects_out_of_bounds_participant() {
        let mut state = tiny();
        state.participants[0].position = Position::new(0, 1);
        assert!(state.validate().is_err());
    }

    #[test]
    fn clamp_keeps_positions_inside() {
        let state = tiny();
        assert_eq!(state.clamp(Position::new(7, 9)), Position::new(0, 0));
    }
}
