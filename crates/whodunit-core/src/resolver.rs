//! Pure state transitions
//!
//! [`apply`] resolves a participant action and [`apply_command`] resolves a
//! referee command. Both take the committed state by reference and return a
//! proposed next state; nothing here performs I/O or mutates its input.

use crate::error::{Error, Result};
use crate::protocol::Command;
use crate::types::*;
use crate::world::WorldState;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Observable consequence of a transition, in the order it happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    Moved {
        participant: ParticipantId,
        from: Position,
        to: Position,
    },
    RoomDiscovered {
        room: RoomId,
    },
    ClueDiscovered {
        clue: ClueId,
        by: Option<ParticipantId>,
    },
    ItemPickedUp {
        participant: ParticipantId,
        item: ItemId,
    },
    ItemDropped {
        participant: ParticipantId,
        item: ItemId,
    },
    ItemPlaced {
        room: RoomId,
        item: ItemId,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    GameConcluded {
        winner: ParticipantId,
    },
}

/// Proposed next state plus what happened.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub state: WorldState,
    pub narrative: String,
    pub effects: Vec<SideEffect>,
}

impl Resolution {
    pub fn concluded(&self) -> bool {
        self.state.is_concluded()
    }
}

struct Transition {
    state: WorldState,
    lines: Vec<String>,
    effects: Vec<SideEffect>,
}

impl Transition {
    fn new(state: &WorldState) -> Self {
        Self {
            state: state.clone(),
            lines: Vec::new(),
            effects: Vec::new(),
        }
    }

    fn say(&mut self, line: impl Into<String>) {
        let line = line.into();
        self.state.narrate(line.clone());
        self.lines.push(line);
    }

    fn discover_room(&mut self, id: &RoomId) {
        if let Some(room) = self.state.room_mut(id) {
            if !room.discovered {
                room.discovered = true;
                self.effects.push(SideEffect::RoomDiscovered { room: id.clone() });
            }
        }
    }

    fn refresh_phase(&mut self) {
        let before = self.state.phase;
        if let Some(after) = self.state.refresh_phase() {
            self.effects.push(SideEffect::PhaseChanged { from: before, to: after });
            self.say(format!("The game has entered a new phase: {}", after));
        }
    }

    fn finish(self) -> Resolution {
        Resolution {
            state: self.state,
            narrative: self.lines.join("\n"),
            effects: self.effects,
        }
    }
}

fn same_key(id: &str, name: &str, key: &str) -> bool {
    let key = key.trim();
    id == key || name.eq_ignore_ascii_case(key)
}

/// Resolve `action` against `state`. Gameplay mistakes are narrated; only
/// an unknown actor is an error.
pub fn apply<R: Rng + ?Sized>(state: &WorldState, action: &Action, rng: &mut R) -> Result<Resolution> {
    let actor = state
        .participant_by_id(&action.actor_id)
        .ok_or_else(|| Error::unknown_participant(&action.actor_id))?;
    let actor_id = actor.id.clone();
    let name = actor.name.clone();
    let here = actor.position;

    let mut t = Transition::new(state);
    debug!(actor = %actor_id, kind = %action.kind(), "resolving action");

    match &action.details {
        ActionDetails::Move { direction } => {
            let to = here.step(*direction, state.rows(), state.columns());
            let room = state.room_at(to).ok_or_else(|| Error::malformed("grid cell without room"))?;
            let (room_id, room_name) = (room.id.clone(), room.name.clone());
            if to == here {
                t.say(format!("{} cannot go {} from the {}", name, direction, room_name));
            } else {
                if let Some(p) = t.state.participant_mut(&actor_id) {
                    p.position = to;
                }
                t.effects.push(SideEffect::Moved {
                    participant: actor_id.clone(),
                    from: here,
                    to,
                });
                t.say(format!("{} moved to {}", name, room_name));
            }
            t.discover_room(&room_id);
        }

        ActionDetails::Search => {
            let room = state.room_at(here).ok_or_else(|| Error::malformed("grid cell without room"))?;
            let candidates: Vec<&Clue> = state
                .clues
                .iter()
                .filter(|c| !c.discovered && c.location == room.id)
                .collect();
            match candidates.choose(rng) {
                Some(clue) => {
                    let clue_id = clue.id.clone();
                    let description = clue.description.clone();
                    if let Some(c) = t.state.clues.iter_mut().find(|c| c.id == clue_id) {
                        c.discovered = true;
                    }
                    if let Some(p) = t.state.participant_mut(&actor_id) {
                        if !p.known_clues.contains(&clue_id) {
                            p.known_clues.push(clue_id.clone());
                        }
                    }
                    t.effects.push(SideEffect::ClueDiscovered {
                        clue: clue_id,
                        by: Some(actor_id.clone()),
                    });
                    t.say(format!("{} discovered a clue: {}", name, description));
                    t.refresh_phase();
                }
                None => {
                    t.say(format!("{} searched {} but found nothing of interest", name, room.name));
                }
            }
        }

        ActionDetails::Examine { target_id } => {
            let room = state.room_at(here);
            let in_room = room.and_then(|r| {
                r.items
                    .iter()
                    .find(|i| same_key(i.id.as_str(), &i.name, target_id))
            });
            let carried = actor
                .inventory
                .iter()
                .find(|i| same_key(i.id.as_str(), &i.name, target_id));
            let other = state
                .co_located(&actor_id)
                .into_iter()
                .find(|p| same_key(p.id.as_str(), &p.name, target_id));

            match (in_room.or(carried), other) {
                (Some(item), _) => {
                    t.say(format!("{} examined {}: {}", name, item.name, item.description))
                }
                (None, Some(p)) => t.say(format!("{} examined {}", name, p.name)),
                (None, None) => t.say(format!("{} found nothing to examine", name)),
            }
        }

        ActionDetails::Pickup { item_id } => {
            let room_id = state
                .room_id_at(here)
                .cloned()
                .ok_or_else(|| Error::malformed("grid cell without room"))?;
            let taken = t.state.room_mut(&room_id).and_then(|room| {
                let idx = room
                    .items
                    .iter()
                    .position(|i| same_key(i.id.as_str(), &i.name, item_id.as_str()) && i.can_pick_up)?;
                Some(room.items.remove(idx))
            });
            match taken {
                Some(item) => {
                    let line = format!("{} picked up {}", name, item.name);
                    t.effects.push(SideEffect::ItemPickedUp {
                        participant: actor_id.clone(),
                        item: item.id.clone(),
                    });
                    if let Some(p) = t.state.participant_mut(&actor_id) {
                        p.inventory.push(item);
                    }
                    t.say(line);
                }
                None => t.say(format!("{} couldn't pick up the item", name)),
            }
        }

        ActionDetails::Drop { item_id } => {
            let room_id = state
                .room_id_at(here)
                .cloned()
                .ok_or_else(|| Error::malformed("grid cell without room"))?;
            let dropped = t.state.participant_mut(&actor_id).and_then(|p| {
                let idx = p
                    .inventory
                    .iter()
                    .position(|i| same_key(i.id.as_str(), &i.name, item_id.as_str()))?;
                Some(p.inventory.remove(idx))
            });
            match dropped {
                Some(item) => {
                    let line = format!("{} dropped {}", name, item.name);
                    t.effects.push(SideEffect::ItemDropped {
                        participant: actor_id.clone(),
                        item: item.id.clone(),
                    });
                    if let Some(room) = t.state.room_mut(&room_id) {
                        room.items.push(item);
                    }
                    t.say(line);
                }
                None => t.say(format!("{} tried to drop an item they don't have", name)),
            }
        }

        ActionDetails::UseItem { item_id } => {
            match actor
                .inventory
                .iter()
                .find(|i| same_key(i.id.as_str(), &i.name, item_id.as_str()))
            {
                Some(item) => t.say(format!("{} used {}", name, item.name)),
                None => t.say(format!("{} tried to use an item they don't have", name)),
            }
        }

        ActionDetails::Accuse {
            suspect_id,
            weapon,
            location_id,
        } => {
            if state.solution.matches(suspect_id, weapon, location_id) {
                let before = t.state.phase;
                t.state.phase = Phase::Conclusion;
                t.state.winner = Some(actor_id.clone());
                t.effects.push(SideEffect::PhaseChanged {
                    from: before,
                    to: Phase::Conclusion,
                });
                t.effects.push(SideEffect::GameConcluded {
                    winner: actor_id.clone(),
                });
                t.say(format!("{} correctly solved the murder! Game Over!", name));
            } else {
                t.say(format!("{} made an incorrect accusation", name));
            }
        }

        ActionDetails::Chat { message } => {
            t.say(format!("{}: {}", name, message.trim()));
        }
    }

    Ok(t.finish())
}

/// Resolve a referee command. References to unknown rooms, clues or
/// participants are logged and skipped.
pub fn apply_command(state: &WorldState, command: &Command) -> Resolution {
    let mut t = Transition::new(state);

    match command {
        Command::RevealClue { clue_id, to } => {
            let Some(clue) = state.clue(clue_id) else {
                warn!(clue = %clue_id, "reveal_clue for unknown clue");
                return t.finish();
            };
            let credited = to.as_ref().filter(|id| state.participant_by_id(id).is_some());
            if let Some(id) = credited {
                if let Some(p) = t.state.participant_mut(id) {
                    if !p.known_clues.contains(clue_id) {
                        p.known_clues.push(clue_id.clone());
                    }
                }
            }
            if !clue.discovered {
                if let Some(c) = t.state.clues.iter_mut().find(|c| &c.id == clue_id) {
                    c.discovered = true;
                }
                t.effects.push(SideEffect::ClueDiscovered {
                    clue: clue_id.clone(),
                    by: credited.cloned(),
                });
                t.say(format!("A new clue has been revealed: {}", clue.description));
                t.refresh_phase();
            }
        }

        Command::DiscoverRoom { room_id } => match state.room(room_id) {
            Some(room) if !room.discovered => {
                let line = format!("The {} has been discovered", room.name);
                t.discover_room(room_id);
                t.say(line);
            }
            Some(_) => {}
            None => warn!(room = %room_id, "discover_room for unknown room"),
        },

        Command::PlaceItem { room_id, name } => {
            let target = match room_id {
                Some(id) => state.room(id).map(|r| r.id.clone()),
                None => state
                    .current_participant()
                    .and_then(|p| state.room_id_at(p.position))
                    .cloned(),
            };
            let Some(target) = target else {
                warn!(item = %name, "place_item without a valid room");
                return t.finish();
            };
            if let Some(room) = t.state.room_mut(&target) {
                let item = Item::new(
                    format!("found_{}_{}", target, room.items.len()),
                    name.clone(),
                    format!("A {} that was not here before.", name.to_lowercase()),
                );
                let (item_id, room_name) = (item.id.clone(), room.name.clone());
                room.items.push(item);
                t.effects.push(SideEffect::ItemPlaced {
                    room: target.clone(),
                    item: item_id,
                });
                t.say(format!("Something turns up in the {}: {}", room_name, name));
            }
        }

        Command::Relocate {
            participant_id,
            position,
        } => {
            let Some(p) = state.participant_by_id(participant_id) else {
                warn!(participant = %participant_id, "relocate for unknown participant");
                return t.finish();
            };
            let to = state.clamp(*position);
            if to != p.position {
                let (from, name) = (p.position, p.name.clone());
                if let Some(p) = t.state.participant_mut(participant_id) {
                    p.position = to;
                }
                t.effects.push(SideEffect::Moved {
                    participant: participant_id.clone(),
                    from,
                    to,
                });
                if let Some(room) = state.room_at(to) {
                    let (id, room_name) = (room.id.clone(), room.name.clone());
                    t.say(format!("{} is now in the {}", name, room_name));
                    t.discover_room(&id);
                }
            }
        }

        Command::TriggerEvent { description } => {
            t.say(format!("Event occurred: {}", description));
        }

        Command::AdvancePhase => {
            let next = match state.phase {
                Phase::Setup => Some(Phase::Investigation),
                Phase::Investigation => Some(Phase::Middle),
                Phase::Middle => Some(Phase::Final),
                Phase::Final => Some(Phase::Accusation),
                Phase::Accusation | Phase::Conclusion => None,
            };
            if let Some(next) = next {
                t.state.phase = next;
                t.effects.push(SideEffect::PhaseChanged {
                    from: state.phase,
                    to: next,
                });
                t.say(format!("The game has entered a new phase: {}", next));
            }
        }

        Command::Narrate { text } => {
            if !text.trim().is_empty() {
                t.say(text.trim().to_string());
            }
        }

        Command::RespondToParticipant {
            participant_id,
            message,
        } => match state.participant_by_id(participant_id) {
            Some(p) => t.say(format!("To {}: {}", p.name, message)),
            None => warn!(participant = %participant_id, "respond_to_participant for unknown participant"),
        },
    }

    t.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::default_world;
    use crate::world::WorldConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn input_state_is_untouched() {
        let world = default_world(&WorldConfig::default()).unwrap();
        let before = world.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let res = apply(&world, &Action::walk("user", Direction::South), &mut rng).unwrap();
        assert_eq!(world, before);
        assert_ne!(res.state, before);
    }

    #[test]
    fn unknown_actor_is_hard_error() {
        let world = default_world(&WorldConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = apply(&world, &Action::search("nobody"), &mut rng).unwrap_err();
        assert!(matches!(err, Error::UnknownParticipant(_)));
    }

    #[test]
    fn advance_phase_never_concludes() {
        let mut world = default_world(&WorldConfig::default()).unwrap();
        world.phase = Phase::Accusation;
        let res = apply_command(&world, &Command::AdvancePhase);
        assert_eq!(res.state.phase, Phase::Accusation);
        assert!(res.effects.is_empty());
    }

    #[test]
    fn relocate_is_clamped() {
        let world = default_world(&WorldConfig {
            rows: 2,
            columns: 2,
            ..Default::default()
        })
        .unwrap();
        let res = apply_command(
            &world,
            &Command::Relocate {
                participant_id: "user".into(),
                position: Position::new(9, 9),
            },
        );
        let user = res.state.participant_by_id(&"user".into()).unwrap();
        assert_eq!(user.position, Position::new(1, 1));
    }
}
