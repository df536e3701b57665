//! Referee protocol: oracle replies and the commands they expand into

use crate::types::*;
use serde::{Deserialize, Serialize};

/// Explicit referee instruction, applied by [`crate::resolver::apply_command`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Mark a clue discovered, optionally crediting a participant.
    #[serde(rename_all = "camelCase")]
    RevealClue {
        clue_id: ClueId,
        #[serde(default)]
        to: Option<ParticipantId>,
    },
    #[serde(rename_all = "camelCase")]
    DiscoverRoom { room_id: RoomId },
    /// Drop a new item into a room (the current participant's room when `room_id` is absent).
    #[serde(rename_all = "camelCase")]
    PlaceItem {
        #[serde(default)]
        room_id: Option<RoomId>,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    Relocate {
        participant_id: ParticipantId,
        position: Position,
    },
    TriggerEvent { description: String },
    AdvancePhase,
    Narrate { text: String },
    #[serde(rename_all = "camelCase")]
    RespondToParticipant {
        participant_id: ParticipantId,
        message: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::RevealClue { .. } => "reveal_clue",
            Command::DiscoverRoom { .. } => "discover_room",
            Command::PlaceItem { .. } => "place_item",
            Command::Relocate { .. } => "relocate",
            Command::TriggerEvent { .. } => "trigger_event",
            Command::AdvancePhase => "advance_phase",
            Command::Narrate { .. } => "narrate",
            Command::RespondToParticipant { .. } => "respond_to_participant",
        }
    }
}

/// Oracle coordinates: `x` is the column, `y` the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: usize,
    pub y: usize,
}

impl From<GridPoint> for Position {
    fn from(p: GridPoint) -> Self {
        Position::new(p.y, p.x)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateChanges {
    pub player_position: Option<GridPoint>,
    pub room_discovered: Option<RoomId>,
    pub item_found: Option<String>,
    pub clue_revealed: Option<ClueId>,
}

impl StateChanges {
    pub fn is_empty(&self) -> bool {
        self.player_position.is_none()
            && self.room_discovered.is_none()
            && self.item_found.is_none()
            && self.clue_revealed.is_none()
    }
}

/// Narrative oracle response. Every field is optional on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OracleReply {
    pub success: bool,
    pub message: String,
    pub state_changes: StateChanges,
    pub narrative_description: String,
    pub commands: Vec<Command>,
}

impl OracleReply {
    /// Payload used when the oracle is unreachable or unintelligible:
    /// no deltas, no narration.
    pub fn fallback() -> Self {
        Self {
            success: false,
            message: "oracle unavailable".to_string(),
            ..Default::default()
        }
    }

    /// Expand deltas into commands on behalf of `actor`. Narration comes
    /// first, explicit commands last.
    pub fn into_commands(self, actor: &ParticipantId) -> Vec<Command> {
        let mut out = Vec::new();
        let narrative = self.narrative_description.trim();
        if !narrative.is_empty() {
            out.push(Command::Narrate {
                text: narrative.to_string(),
            });
        }
        let changes = self.state_changes;
        if let Some(point) = changes.player_position {
            out.push(Command::Relocate {
                participant_id: actor.clone(),
                position: point.into(),
            });
        }
        if let Some(room_id) = changes.room_discovered {
            out.push(Command::DiscoverRoom { room_id });
        }
        if let Some(name) = changes.item_found.filter(|n| !n.trim().is_empty()) {
            out.push(Command::PlaceItem { room_id: None, name });
        }
        if let Some(clue_id) = changes.clue_revealed {
            out.push(Command::RevealClue {
                clue_id,
                to: Some(actor.clone()),
            });
        }
        out.extend(self.commands);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_deltas_expand_in_order() {
        let reply: OracleReply = serde_json::from_str(
            r#"{"narrativeDescription":"The floor creaks.",
                "stateChanges":{"playerPosition":{"x":2,"y":1},"clueRevealed":"clue3"}}"#,
        )
        .unwrap();
        let commands = reply.into_commands(&"user".into());
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[0], Command::Narrate { .. }));
        assert_eq!(
            commands[1],
            Command::Relocate {
                participant_id: "user".into(),
                position: Position::new(1, 2),
            }
        );
        assert!(matches!(&commands[2], Command::RevealClue { to: Some(p), .. } if p.as_str() == "user"));
    }

    #[test]
    fn fallback_expands_to_nothing() {
        assert!(OracleReply::fallback().into_commands(&"user".into()).is_empty());
    }

    #[test]
    fn command_wire_tag() {
        let cmd: Command = serde_json::from_str(r#"{"command":"advance_phase"}"#).unwrap();
        assert_eq!(cmd, Command::AdvancePhase);
    }
}
