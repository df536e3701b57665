//! Whole-game properties: random play against the scheduler and the
//! resolver, seeded so every run is the same run

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use whodunit_core::generate::default_world;
use whodunit_core::resolver;
use whodunit_core::*;
use whodunit_engine::{Rejection, Scheduler, Stage, SubmitOutcome};

fn world(seed: u64) -> WorldState {
    default_world(&WorldConfig {
        rows: 4,
        columns: 3,
        seed,
        ai_participants: 3,
        ..Default::default()
    })
    .unwrap()
}

/// Any action the current participant could plausibly try, sensible or not.
fn random_action(rng: &mut ChaCha8Rng, world: &WorldState) -> Action {
    let me = world.current_turn.clone();
    let here = world
        .participant_by_id(&me)
        .and_then(|p| world.room_at(p.position))
        .map(|r| r.items.iter().map(|i| i.id.clone()).collect::<Vec<_>>())
        .unwrap_or_default();
    let item = here
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| ItemId::from("nothing"));
    let dirs = [Direction::North, Direction::South, Direction::East, Direction::West];

    match rng.gen_range(0..9) {
        0 | 1 => Action::walk(me, dirs[rng.gen_range(0..4)]),
        2 => Action::search(me),
        3 => Action::new(me, ActionDetails::Pickup { item_id: item }),
        4 => Action::new(me, ActionDetails::Drop { item_id: item }),
        5 => Action::new(me, ActionDetails::Examine { target_id: item.to_string() }),
        6 => {
            let suspect = world.participants[rng.gen_range(0..world.participants.len())].id.clone();
            let room = world.rooms[rng.gen_range(0..world.rooms.len())].id.clone();
            Action::accuse(me, suspect, "Rope", room)
        }
        _ => Action::chat(me, "Hmm."),
    }
}

// ===========================================================================
// Random play
// ===========================================================================

#[test]
fn random_play_keeps_the_world_consistent() {
    for seed in 0..8 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut scheduler = Scheduler::new(world(seed), seed);
        scheduler.start();

        let mut completed = 0u64;
        for _ in 0..400 {
            let before = scheduler.state().clone();
            let action = random_action(&mut rng, &before);
            let outcome = scheduler.submit(&action).unwrap();
            if let SubmitOutcome::Applied(applied) = &outcome {
                if applied.turn_complete {
                    assert!(scheduler.end_turn().is_some());
                    completed += 1;
                }
            }
            let after = scheduler.state();

            assert!(after.participant_by_id(&after.current_turn).is_some());
            assert!(after.turn_count >= before.turn_count);
            assert_eq!(after.turn_count, completed);
            assert!(after.phase >= before.phase);
            assert!(after.event_log.len() <= after.event_log.cap());
            for p in &after.participants {
                assert!(p.position.row < after.rows() && p.position.col < after.columns());
            }
            for (old, new) in before.clues.iter().zip(&after.clues) {
                assert!(!old.discovered || new.discovered, "clue {} was hidden again", old.id);
            }
            if let SubmitOutcome::Rejected(r) = outcome {
                assert_eq!(r, Rejection::SlotTaken);
                assert_eq!(&before, after);
            }
        }
        // the wrong weapon never wins
        assert_ne!(scheduler.stage(), Stage::Concluded);
    }
}

#[test]
fn items_are_conserved_by_pickup_and_drop() {
    let count = |w: &WorldState| -> usize {
        w.rooms.iter().map(|r| r.items.len()).sum::<usize>()
            + w.participants.iter().map(|p| p.inventory.len()).sum::<usize>()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut scheduler = Scheduler::new(world(3), 3);
    scheduler.start();
    let total = count(scheduler.state());

    for _ in 0..300 {
        let action = random_action(&mut rng, scheduler.state());
        if let SubmitOutcome::Applied(a) = scheduler.submit(&action).unwrap() {
            if a.turn_complete {
                scheduler.end_turn();
            }
        }
        assert_eq!(count(scheduler.state()), total);
    }
}

// ===========================================================================
// Resolver properties
// ===========================================================================

#[test]
fn searching_an_exhausted_room_changes_nothing_but_the_log() {
    let mut world = world(5);
    world.phase = Phase::Investigation;
    let me = world.participants[0].clone();
    let room = world.room_id_at(me.position).cloned().unwrap();
    for clue in world.clues.iter_mut().filter(|c| c.location == room) {
        clue.discovered = true;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let next = resolver::apply(&world, &Action::search(me.id.clone()), &mut rng).unwrap();
    assert_eq!(next.state.clues, world.clues);
    assert_eq!(next.state.participants, world.participants);
    assert!(next.narrative.contains("found nothing of interest"));
    assert!(next.effects.is_empty());
}

#[test]
fn the_solution_wins_from_anywhere() {
    let world = world(11);
    let solution = world.solution.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    for p in &world.participants {
        let mut w = world.clone();
        w.phase = Phase::Investigation;
        w.current_turn = p.id.clone();
        let action = Action::accuse(
            p.id.clone(),
            solution.culprit.clone(),
            solution.weapon.to_uppercase(),
            solution.location.clone(),
        );
        let res = resolver::apply(&w, &action, &mut rng).unwrap();
        assert_eq!(res.state.phase, Phase::Conclusion);
        assert_eq!(res.state.winner.as_ref(), Some(&p.id));
    }
}

#[test]
fn world_json_uses_wire_names() {
    let world = world(1);
    let json: serde_json::Value = serde_json::from_str(&world.to_json().unwrap()).unwrap();
    assert!(json.get("currentTurn").is_some());
    assert!(json.get("turnCount").is_some());
    assert_eq!(json["phase"], "setup");
    assert!(json["participants"][0].get("knownClues").is_some());
}
