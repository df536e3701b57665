//! Messages sent to agent sessions

use std::fmt::Write;
use whodunit_core::{Participant, WorldState};

const RECENT_EVENTS: usize = 5;

/// First message of a session: who the agent is and what game it is in.
pub fn introduction(me: &Participant, world: &WorldState) -> String {
    let others: Vec<&str> = world
        .participants
        .iter()
        .filter(|p| p.id != me.id)
        .map(|p| p.name.as_str())
        .collect();
    format!(
        "You are {name} (id \"{id}\"), an investigator in a murder mystery set in an old mansion. \
         {victim} has been found dead. Your fellow guests are: {others}. \
         Each turn you will first be asked to say something to the others, then to choose one action. \
         The murderer is among the guests; gather clues before you accuse anyone.",
        name = me.name,
        id = me.id,
        victim = if world.solution.victim.is_empty() { "The host" } else { world.solution.victim.as_str() },
        others = others.join(", "),
    )
}

/// Compact situational summary shared by both prompts.
pub fn summary(me: &Participant, world: &WorldState) -> String {
    let mut out = String::new();
    let room = world.room_at(me.position);
    let room_name = room.map(|r| r.name.as_str()).unwrap_or("an unknown room");
    let room_id = room.map(|r| r.id.as_str()).unwrap_or("?");
    let _ = writeln!(
        out,
        "Turn {} | phase: {} | you are in the {} ({}) at row {}, column {} of a {}x{} grid.",
        world.turn_count,
        world.phase,
        room_name,
        room_id,
        me.position.row,
        me.position.col,
        world.rows(),
        world.columns()
    );

    if let Some(room) = room {
        if !room.items.is_empty() {
            let items: Vec<String> = room
                .items
                .iter()
                .map(|i| format!("{} [{}]", i.name, i.id))
                .collect();
            let _ = writeln!(out, "Items here: {}", items.join(", "));
        }
    }
    let here: Vec<String> = world
        .co_located(&me.id)
        .iter()
        .map(|p| format!("{} [{}]", p.name, p.id))
        .collect();
    if !here.is_empty() {
        let _ = writeln!(out, "Also here: {}", here.join(", "));
    }
    if !me.inventory.is_empty() {
        let carried: Vec<&str> = me.inventory.iter().map(|i| i.name.as_str()).collect();
        let _ = writeln!(out, "You carry: {}", carried.join(", "));
    }

    let clues: Vec<&str> = me
        .known_clues
        .iter()
        .filter_map(|id| world.clue(id))
        .map(|c| c.description.as_str())
        .collect();
    if clues.is_empty() {
        let _ = writeln!(out, "You have not found any clues yet.");
    } else {
        let _ = writeln!(out, "Clues you know:");
        for clue in clues {
            let _ = writeln!(out, "- {}", clue);
        }
    }
    if me.can_accuse() {
        let _ = writeln!(out, "You have enough evidence to consider an accusation.");
    }

    let suspects: Vec<String> = world
        .participants
        .iter()
        .map(|p| format!("{} [{}]", p.name, p.id))
        .collect();
    let _ = writeln!(out, "Suspects: {}", suspects.join(", "));

    if !world.event_log.is_empty() {
        let _ = writeln!(out, "Recent events:");
        for event in world.event_log.recent(RECENT_EVENTS) {
            let _ = writeln!(out, "- {}", event);
        }
    }
    out
}

pub fn chat_request(me: &Participant, world: &WorldState) -> String {
    format!(
        "{}\nIt is your turn. Say one or two sentences to the other investigators. \
         Reply with plain text only.",
        summary(me, world)
    )
}

pub fn action_request(me: &Participant, world: &WorldState) -> String {
    format!(
        "{}\nNow choose one action. Respond with JSON only, in the form \
         {{\"actionType\": \"<type>\", \"actionDetails\": {{...}}}} where <type> is one of:\n\
         - move: {{\"direction\": \"north|south|east|west\"}}\n\
         - search: {{}}\n\
         - examine: {{\"targetId\": \"<item or participant id>\"}}\n\
         - pickup / drop / use_item: {{\"itemId\": \"<item id>\"}}\n\
         - accuse: {{\"suspectId\": \"<participant id>\", \"weapon\": \"<weapon>\", \"locationId\": \"<room id>\"}}",
        summary(me, world)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use whodunit_core::generate::default_world;
    use whodunit_core::WorldConfig;

    #[test]
    fn action_request_mentions_schema_keys() {
        let world = default_world(&WorldConfig::default()).unwrap();
        let me = &world.participants[1];
        let prompt = action_request(me, &world);
        assert!(prompt.contains("actionType"));
        assert!(prompt.contains("actionDetails"));
        assert!(prompt.contains(me.id.as_str()));
    }

    #[test]
    fn chat_request_is_plain() {
        let world = default_world(&WorldConfig::default()).unwrap();
        let prompt = chat_request(&world.participants[1], &world);
        assert!(!prompt.contains("actionType"));
        assert!(prompt.contains("You have not found any clues yet."));
    }
}
