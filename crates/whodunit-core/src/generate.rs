//! Deterministic default world generator

use crate::error::Result;
use crate::types::*;
use crate::world::{WorldConfig, WorldState};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const ROOM_NAMES: [&str; 10] = [
    "Foyer",
    "Living Room",
    "Dining Room",
    "Kitchen",
    "Library",
    "Study",
    "Master Bedroom",
    "Guest Bedroom",
    "Bathroom",
    "Attic",
];

/// Built-in AI roster: (id, display name)
pub const AI_ROSTER: [(&str, &str); 4] = [
    ("blue-fish", "Blue Fish"),
    ("orange-crab", "Orange Crab"),
    ("green-turtle", "Green Turtle"),
    ("red-donkey", "Red Donkey"),
];

pub const HUMAN_ID: &str = "user";
pub const VICTIM: &str = "Mr. Boddy";
pub const WEAPON: &str = "Candlestick";
pub const MOTIVE: &str = "Revenge";

const MAX_CLUES: usize = 8;

// (name, description, can be picked up)
const ITEM_TABLE: [(&str, &str, bool); 9] = [
    ("Magnifying Glass", "A brass magnifying glass, slightly scratched.", true),
    ("Old Letter", "A yellowed letter sealed with red wax.", true),
    ("Pocket Watch", "A silver watch stopped at a quarter past nine.", true),
    ("Grandfather Clock", "A towering clock that ticks a little too loudly.", false),
    ("Umbrella", "A black umbrella, still damp.", true),
    ("Portrait", "An oil portrait whose eyes seem to follow you.", false),
    ("Key Ring", "Three keys on a tarnished ring.", true),
    ("Bookcase", "Floor to ceiling shelves of dusty volumes.", false),
    ("Rope", "A coil of rough hemp rope.", true),
];

fn room_name(index: usize) -> String {
    let base = ROOM_NAMES[index % ROOM_NAMES.len()];
    let lap = index / ROOM_NAMES.len();
    if lap == 0 {
        base.to_string()
    } else {
        format!("{} {}", base, lap + 1)
    }
}

fn room_description(name: &str) -> String {
    format!("The {} of the old mansion. Something here feels out of place.", name)
}

/// Same config, same world.
pub fn default_world(config: &WorldConfig) -> Result<WorldState> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let rows = config.rows.max(1);
    let columns = config.columns.max(1);

    let mut grid = Vec::with_capacity(rows);
    let mut rooms = Vec::with_capacity(rows * columns);
    for r in 0..rows {
        let mut row = Vec::with_capacity(columns);
        for c in 0..columns {
            let index = r * columns + c;
            let id = RoomId::new(format!("room{}", index));
            let name = room_name(index);
            let mut room = Room::new(id.clone(), name.clone());
            room.description = room_description(&name);
            room.connections = neighbours(r, c, rows, columns);

            let count = rng.gen_range(0..=3);
            for (k, (item_name, desc, portable)) in
                ITEM_TABLE.choose_multiple(&mut rng, count).enumerate()
            {
                let mut item = Item::new(format!("item{}_{}", index, k), *item_name, *desc);
                item.can_pick_up = *portable;
                room.items.push(item);
            }

            rooms.push(room);
            row.push(id);
        }
        grid.push(row);
    }

    let mut participants = vec![Participant::new(
        HUMAN_ID,
        "Detective",
        ParticipantRole::Human,
        Position::new(0, 0),
    )];
    for (id, name) in AI_ROSTER.iter().take(config.ai_participants) {
        let pos = Position::new(rng.gen_range(0..rows), rng.gen_range(0..columns));
        participants.push(Participant::new(*id, *name, ParticipantRole::Ai, pos));
    }

    let culprit = participants
        .iter()
        .filter(|p| p.is_ai())
        .collect::<Vec<_>>()
        .choose(&mut rng)
        .map(|p| p.id.clone())
        .unwrap_or_else(|| ParticipantId::from(HUMAN_ID));
    let location = rooms[rng.gen_range(0..rooms.len())].id.clone();

    if let Some(room) = rooms.iter_mut().find(|r| r.id == location) {
        let mut weapon = Item::new(
            format!("weapon_{}", location),
            WEAPON,
            "A heavy brass candlestick with a dented base.",
        );
        weapon.is_clue = true;
        room.items.push(weapon);
    }

    let culprit_name = participants
        .iter()
        .find(|p| p.id == culprit)
        .map(|p| p.name.clone())
        .unwrap_or_default();
    let location_name = rooms
        .iter()
        .find(|r| r.id == location)
        .map(|r| r.name.clone())
        .unwrap_or_default();

    let clue_count = MAX_CLUES.min(rooms.len());
    let clues = (0..clue_count)
        .map(|i| {
            let category = ClueCategory::ALL[i % ClueCategory::ALL.len()];
            let description = match category {
                ClueCategory::Weapon => format!("Drips of candle wax trail toward the {}.", location_name),
                ClueCategory::Culprit => format!("A scrap of fabric in {}'s colours is caught on a nail.", culprit_name),
                ClueCategory::Motive => format!("A torn note mentions {} and the word '{}'.", VICTIM, MOTIVE.to_lowercase()),
                ClueCategory::Alibi => "A guest book entry puts someone in the garden at nine.".to_string(),
            };
            Clue {
                id: ClueId::new(format!("clue{}", i)),
                description,
                location: rooms[i].id.clone(),
                discovered: false,
                category,
            }
        })
        .collect();

    let solution = Solution {
        culprit,
        weapon: WEAPON.to_string(),
        location,
        victim: VICTIM.to_string(),
        motive: MOTIVE.to_string(),
    };

    Ok(WorldState::new(grid, rooms, participants, clues, solution)?
        .with_event_log_cap(config.event_log_cap))
}

fn neighbours(r: usize, c: usize, rows: usize, columns: usize) -> Vec<RoomId> {
    let mut out = Vec::with_capacity(4);
    let id = |r: usize, c: usize| RoomId::new(format!("room{}", r * columns + c));
    if r > 0 {
        out.push(id(r - 1, c));
    }
    if r + 1 < rows {
        out.push(id(r + 1, c));
    }
    if c > 0 {
        out.push(id(r, c - 1));
    }
    if c + 1 < columns {
        out.push(id(r, c + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_world() {
        let config = WorldConfig::default();
        let a = default_world(&config).unwrap();
        let b = default_world(&config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn room_ids_follow_grid_order() {
        let config = WorldConfig {
            rows: 3,
            columns: 4,
            ..Default::default()
        };
        let world = default_world(&config).unwrap();
        assert_eq!(world.grid[2][1].as_str(), "room9");
        assert_eq!(world.room(&"room9".into()).unwrap().name, "Bathroom");
        assert_eq!(world.room(&"room0".into()).unwrap().connections.len(), 2);
    }

    #[test]
    fn culprit_is_ai_when_roster_present() {
        let world = default_world(&WorldConfig::default()).unwrap();
        let culprit = world.participant_by_id(&world.solution.culprit).unwrap();
        assert!(culprit.is_ai());
        assert_eq!(world.participants.len(), 5);
        assert_eq!(world.current_turn.as_str(), HUMAN_ID);
    }
}
