//! Core types for Whodunit

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

id_type!(
    /// Participant identifier (e.g. `user`, `blue-fish`)
    ParticipantId
);
id_type!(
    /// Room identifier (e.g. `room11`)
    RoomId
);
id_type!(ClueId);
id_type!(ItemId);

/// Grid coordinate. Row 0 is the northern edge, column 0 the western edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Step one cell in `direction`, clamped to a `rows` x `columns` grid.
    pub fn step(self, direction: Direction, rows: usize, columns: usize) -> Self {
        let (dr, dc) = direction.offset();
        let clamp = |value: usize, delta: isize, len: usize| -> usize {
            let max = len.saturating_sub(1) as isize;
            (value as isize + delta).clamp(0, max) as usize
        };
        Self {
            row: clamp(self.row, dr, rows),
            col: clamp(self.col, dc, columns),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Compass direction for `move`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Unit vector as `(row delta, column delta)`.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::North => (-1, 0),
            Direction::South => (1, 0),
            Direction::East => (0, 1),
            Direction::West => (0, -1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" | "n" | "up" => Ok(Direction::North),
            "south" | "s" | "down" => Ok(Direction::South),
            "east" | "e" | "right" => Ok(Direction::East),
            "west" | "w" | "left" => Ok(Direction::West),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who controls a participant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Human,
    Ai,
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantRole::Human => f.write_str("human"),
            ParticipantRole::Ai => f.write_str("ai"),
        }
    }
}

/// Coarse game progress. Ordered: later phases compare greater.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    Investigation,
    Middle,
    Final,
    Accusation,
    Conclusion,
}

impl Phase {
    /// Phase implied by the fraction of discovered clues. Never yields
    /// `Setup` or `Conclusion`; those are entered explicitly.
    pub fn from_progress(discovered: usize, total: usize) -> Phase {
        if total == 0 {
            return Phase::Investigation;
        }
        let ratio = discovered as f64 / total as f64;
        if ratio < 0.3 {
            Phase::Investigation
        } else if ratio < 0.7 {
            Phase::Middle
        } else if ratio < 1.0 {
            Phase::Final
        } else {
            Phase::Accusation
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Conclusion
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Setup => "setup",
            Phase::Investigation => "investigation",
            Phase::Middle => "middle",
            Phase::Final => "final",
            Phase::Accusation => "accusation",
            Phase::Conclusion => "conclusion",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClueCategory {
    Weapon,
    Culprit,
    Motive,
    Alibi,
}

impl ClueCategory {
    pub const ALL: [ClueCategory; 4] = [
        ClueCategory::Weapon,
        ClueCategory::Culprit,
        ClueCategory::Motive,
        ClueCategory::Alibi,
    ];
}

impl fmt::Display for ClueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClueCategory::Weapon => "weapon",
            ClueCategory::Culprit => "culprit",
            ClueCategory::Motive => "motive",
            ClueCategory::Alibi => "alibi",
        };
        f.write_str(s)
    }
}

/// A portable (or fixed) object inside a room or an inventory
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub is_clue: bool,
    #[serde(default = "default_true")]
    pub can_pick_up: bool,
}

fn default_true() -> bool {
    true
}

impl Item {
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            is_clue: false,
            can_pick_up: true,
        }
    }

    pub fn fixed(mut self) -> Self {
        self.can_pick_up = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub connections: Vec<RoomId>,
    #[serde(default)]
    pub discovered: bool,
}

impl Room {
    pub fn new(id: impl Into<RoomId>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            description: format!("A {} in the mansion.", name.to_lowercase()),
            name,
            items: Vec::new(),
            connections: Vec::new(),
            discovered: false,
        }
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|i| &i.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: ParticipantRole,
    pub position: Position,
    #[serde(default)]
    pub inventory: Vec<Item>,
    #[serde(default)]
    pub known_clues: Vec<ClueId>,
}

impl Participant {
    pub fn new(
        id: impl Into<ParticipantId>,
        name: impl Into<String>,
        role: ParticipantRole,
        position: Position,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            position,
            inventory: Vec::new(),
            known_clues: Vec::new(),
        }
    }

    pub fn is_ai(&self) -> bool {
        self.role == ParticipantRole::Ai
    }

    /// Advisory: enough evidence gathered to make an informed accusation.
    pub fn can_accuse(&self) -> bool {
        self.known_clues.len() >= 3
    }

    pub fn holds(&self, id: &ItemId) -> Option<&Item> {
        self.inventory.iter().find(|i| &i.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clue {
    pub id: ClueId,
    pub description: String,
    /// Room the clue is hidden in
    pub location: RoomId,
    #[serde(default)]
    pub discovered: bool,
    pub category: ClueCategory,
}

/// The immutable answer an accusation is checked against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub culprit: ParticipantId,
    pub weapon: String,
    pub location: RoomId,
    #[serde(default)]
    pub victim: String,
    #[serde(default)]
    pub motive: String,
}

impl Solution {
    pub fn matches(&self, suspect: &ParticipantId, weapon: &str, location: &RoomId) -> bool {
        &self.culprit == suspect
            && self.weapon.eq_ignore_ascii_case(weapon.trim())
            && &self.location == location
    }
}

/// Discriminant of [`ActionDetails`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Move,
    Search,
    Examine,
    Accuse,
    Chat,
    UseItem,
    Pickup,
    Drop,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Move => "move",
            ActionKind::Search => "search",
            ActionKind::Examine => "examine",
            ActionKind::Accuse => "accuse",
            ActionKind::Chat => "chat",
            ActionKind::UseItem => "use_item",
            ActionKind::Pickup => "pickup",
            ActionKind::Drop => "drop",
        }
    }

    /// Map an arbitrary verb to the nearest known kind. Unrecognized verbs
    /// become `Chat`.
    pub fn coerce(raw: &str) -> ActionKind {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "move" | "go" | "walk" | "travel" | "run" => ActionKind::Move,
            "search" | "investigate" | "look_around" | "explore" => ActionKind::Search,
            "examine" | "inspect" | "look" | "study" | "check" => ActionKind::Examine,
            "accuse" | "accusation" | "blame" => ActionKind::Accuse,
            "use_item" | "use" | "useitem" | "apply" => ActionKind::UseItem,
            "pickup" | "pick_up" | "take" | "grab" | "collect" => ActionKind::Pickup,
            "drop" | "put_down" | "leave" | "discard" => ActionKind::Drop,
            _ => ActionKind::Chat,
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move" => Ok(ActionKind::Move),
            "search" => Ok(ActionKind::Search),
            "examine" => Ok(ActionKind::Examine),
            "accuse" => Ok(ActionKind::Accuse),
            "chat" => Ok(ActionKind::Chat),
            "use_item" => Ok(ActionKind::UseItem),
            "pickup" => Ok(ActionKind::Pickup),
            "drop" => Ok(ActionKind::Drop),
            other => Err(format!("unknown action type '{}'", other)),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant payload of an action, tagged by `type` on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDetails {
    Move {
        direction: Direction,
    },
    Search,
    #[serde(rename_all = "camelCase")]
    Examine {
        target_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Accuse {
        suspect_id: ParticipantId,
        weapon: String,
        location_id: RoomId,
    },
    Chat {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    UseItem {
        item_id: ItemId,
    },
    #[serde(rename_all = "camelCase")]
    Pickup {
        item_id: ItemId,
    },
    #[serde(rename_all = "camelCase")]
    Drop {
        item_id: ItemId,
    },
}

impl ActionDetails {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionDetails::Move { .. } => ActionKind::Move,
            ActionDetails::Search => ActionKind::Search,
            ActionDetails::Examine { .. } => ActionKind::Examine,
            ActionDetails::Accuse { .. } => ActionKind::Accuse,
            ActionDetails::Chat { .. } => ActionKind::Chat,
            ActionDetails::UseItem { .. } => ActionKind::UseItem,
            ActionDetails::Pickup { .. } => ActionKind::Pickup,
            ActionDetails::Drop { .. } => ActionKind::Drop,
        }
    }
}

/// A structured request to change world state or communicate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub actor_id: ParticipantId,
    #[serde(flatten)]
    pub details: ActionDetails,
}

impl Action {
    pub fn new(actor_id: impl Into<ParticipantId>, details: ActionDetails) -> Self {
        Self {
            actor_id: actor_id.into(),
            details,
        }
    }

    pub fn chat(actor_id: impl Into<ParticipantId>, message: impl Into<String>) -> Self {
        Self::new(
            actor_id,
            ActionDetails::Chat {
                message: message.into(),
            },
        )
    }

    pub fn walk(actor_id: impl Into<ParticipantId>, direction: Direction) -> Self {
        Self::new(actor_id, ActionDetails::Move { direction })
    }

    pub fn search(actor_id: impl Into<ParticipantId>) -> Self {
        Self::new(actor_id, ActionDetails::Search)
    }

    pub fn accuse(
        actor_id: impl Into<ParticipantId>,
        suspect_id: impl Into<ParticipantId>,
        weapon: impl Into<String>,
        location_id: impl Into<RoomId>,
    ) -> Self {
        Self::new(
            actor_id,
            ActionDetails::Accuse {
                suspect_id: suspect_id.into(),
                weapon: weapon.into(),
                location_id: location_id.into(),
            },
        )
    }

    pub fn kind(&self) -> ActionKind {
        self.details.kind()
    }

    pub fn is_chat(&self) -> bool {
        self.kind() == ActionKind::Chat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_clamps_at_edges() {
        let origin = Position::new(0, 0);
        assert_eq!(origin.step(Direction::North, 2, 2), origin);
        assert_eq!(origin.step(Direction::West, 2, 2), origin);
        assert_eq!(origin.step(Direction::South, 2, 2), Position::new(1, 0));
        assert_eq!(Position::new(1, 1).step(Direction::East, 2, 2), Position::new(1, 1));
    }

    #[test]
    fn phase_thresholds() {
        assert_eq!(Phase::from_progress(0, 10), Phase::Investigation);
        assert_eq!(Phase::from_progress(3, 10), Phase::Middle);
        assert_eq!(Phase::from_progress(7, 10), Phase::Final);
        assert_eq!(Phase::from_progress(10, 10), Phase::Accusation);
        assert_eq!(Phase::from_progress(0, 0), Phase::Investigation);
    }

    #[test]
    fn coerce_maps_synonyms_and_defaults_to_chat() {
        assert_eq!(ActionKind::coerce("Go"), ActionKind::Move);
        assert_eq!(ActionKind::coerce("pick up"), ActionKind::Pickup);
        assert_eq!(ActionKind::coerce("use-item"), ActionKind::UseItem);
        assert_eq!(ActionKind::coerce("dance"), ActionKind::Chat);
    }

    #[test]
    fn action_wire_shape_is_flat() {
        let action = Action::walk("user", Direction::North);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "move");
        assert_eq!(json["actorId"], "user");
        assert_eq!(json["direction"], "north");
        let back: Action = serde_json::from_value(json).unwrap();
        assert_eq!(back, action);
    }
}
