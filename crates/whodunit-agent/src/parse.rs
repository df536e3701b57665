//! Tiered parsing of agent replies into actions
//!
//! 1. strict: the reply (after JSON salvage) is `{"actionType", "actionDetails"}`
//! 2. heuristic: key/value or verb patterns pulled out of free text
//! 3. raw: the whole reply becomes a chat line

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;
use whodunit_channel::sanitize::parse_lenient;
use whodunit_core::{Action, ActionDetails, ActionKind, Direction, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    Strict,
    Heuristic,
    Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub action: Action,
    pub tier: ParseTier,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentReply {
    #[serde(alias = "type", alias = "action")]
    action_type: String,
    #[serde(default, alias = "details")]
    action_details: Value,
}

/// Parse a world-action reply. Never fails.
pub fn parse_action(actor: &ParticipantId, raw: &str) -> Parsed {
    if let Some(action) = strict(actor, raw) {
        return Parsed {
            action,
            tier: ParseTier::Strict,
        };
    }
    if let Some(action) = heuristic(actor, raw) {
        debug!(actor = %actor, kind = %action.kind(), "heuristic parse");
        return Parsed {
            action,
            tier: ParseTier::Heuristic,
        };
    }
    debug!(actor = %actor, "raw text wrapped as chat");
    Parsed {
        action: Action::chat(actor.clone(), chat_text(raw)),
        tier: ParseTier::Raw,
    }
}

/// Parse a chat reply: structured chat if the agent sent one, the text otherwise.
pub fn parse_chat(actor: &ParticipantId, raw: &str) -> Action {
    match strict(actor, raw) {
        Some(action) if action.is_chat() => action,
        _ => Action::chat(actor.clone(), chat_text(raw)),
    }
}

fn chat_text(raw: &str) -> String {
    let text = raw.trim().trim_matches('"').trim();
    if text.is_empty() {
        "...".to_string()
    } else {
        text.to_string()
    }
}

fn strict(actor: &ParticipantId, raw: &str) -> Option<Action> {
    if !raw.contains('{') {
        return None;
    }
    let reply: AgentReply = parse_lenient(raw).ok()?;
    if reply.action_type.trim().is_empty() {
        return None;
    }
    let kind = ActionKind::coerce(&reply.action_type);
    let details = match build(kind, &reply.action_details) {
        Some(details) => details,
        // an unknown verb with no usable message still says something
        None if kind == ActionKind::Chat => ActionDetails::Chat {
            message: format!("({})", reply.action_type.trim()),
        },
        None => return None,
    };
    Some(Action::new(actor.clone(), details))
}

fn field<'a>(details: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| details.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn build(kind: ActionKind, details: &Value) -> Option<ActionDetails> {
    let item = || field(details, &["itemId", "item", "name", "target", "targetId"]);
    Some(match kind {
        ActionKind::Move => ActionDetails::Move {
            direction: Direction::from_str(field(details, &["direction", "dir"])?).ok()?,
        },
        ActionKind::Search => ActionDetails::Search,
        ActionKind::Examine => ActionDetails::Examine {
            target_id: field(details, &["targetId", "target", "itemId", "item", "name"])?.to_string(),
        },
        ActionKind::Accuse => ActionDetails::Accuse {
            suspect_id: field(details, &["suspectId", "suspect", "culprit"])?.into(),
            weapon: field(details, &["weaponId", "weapon"])?.to_string(),
            location_id: field(details, &["locationId", "location", "room", "roomId"])?.into(),
        },
        ActionKind::Chat => ActionDetails::Chat {
            message: field(details, &["message", "text", "content"])?.to_string(),
        },
        ActionKind::UseItem => ActionDetails::UseItem {
            item_id: item()?.into(),
        },
        ActionKind::Pickup => ActionDetails::Pickup {
            item_id: item()?.into(),
        },
        ActionKind::Drop => ActionDetails::Drop {
            item_id: item()?.into(),
        },
    })
}

struct Patterns {
    json_type: Regex,
    json_direction: Regex,
    accuse: Regex,
    movement: Regex,
    pickup: Regex,
    drop: Regex,
    use_item: Regex,
    examine: Regex,
    search: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                json_type: Regex::new(r#""(?:actionType|type)"\s*:\s*"([^"]+)""#).ok()?,
                json_direction: Regex::new(r#""direction"\s*:\s*"([^"]+)""#).ok()?,
                accuse: Regex::new(
                    r"(?i)\baccuse\s+([\w-]+)\s+with\s+(?:the\s+|a\s+)?([\w-]+)\s+in\s+(?:the\s+)?([\w-]+)",
                )
                .ok()?,
                movement: Regex::new(r"(?i)\b(?:move|go|walk|head)\s+(?:to\s+the\s+)?(north|south|east|west)\b").ok()?,
                pickup: Regex::new(r"(?i)\b(?:pick\s+up|take|grab)\s+(?:the\s+)?([\w-]+)").ok()?,
                drop: Regex::new(r"(?i)\bdrop\s+(?:the\s+)?([\w-]+)").ok()?,
                use_item: Regex::new(r"(?i)\buse\s+(?:the\s+)?([\w-]+)").ok()?,
                examine: Regex::new(r"(?i)\b(?:examine|inspect)\s+(?:the\s+)?([\w-]+)").ok()?,
                search: Regex::new(r"(?i)\b(?:search|investigate)\b").ok()?,
            })
        })
        .as_ref()
}

/// Words that follow "take", "use" and friends in ordinary speech but never
/// name an item or a person.
const FILLER: &[&str] = &[
    "a", "an", "the", "my", "our", "your", "his", "her", "their", "its", "it", "this", "that",
    "these", "those", "some", "any", "me", "us", "them", "him", "you", "what", "all", "care",
    "time", "turn", "note", "stock", "heart", "caution", "advantage", "place", "part",
];

fn heuristic(actor: &ParticipantId, raw: &str) -> Option<Action> {
    let p = patterns()?;
    let capture = |re: &Regex, n: usize| -> Option<String> {
        re.captures(raw)
            .and_then(|c| c.get(n))
            .map(|m| m.as_str().to_string())
    };
    // an item or target id, unless the verb was just part of a phrase
    let object = |re: &Regex| -> Option<String> {
        capture(re, 1).filter(|w| !FILLER.contains(&w.to_lowercase().as_str()))
    };

    // half-broken JSON: pull the keys out directly
    if let Some(verb) = capture(&p.json_type, 1) {
        let kind = ActionKind::coerce(&verb);
        if kind == ActionKind::Search {
            return Some(Action::search(actor.clone()));
        }
        if kind == ActionKind::Move {
            if let Some(dir) = capture(&p.json_direction, 1).and_then(|d| d.parse().ok()) {
                return Some(Action::walk(actor.clone(), dir));
            }
        }
    }

    if let Some(c) = p.accuse.captures(raw) {
        return Some(Action::accuse(actor.clone(), &c[1], &c[2], &c[3]));
    }
    if let Some(dir) = capture(&p.movement, 1).and_then(|d| d.parse().ok()) {
        return Some(Action::walk(actor.clone(), dir));
    }
    if let Some(item) = object(&p.pickup) {
        return Some(Action::new(actor.clone(), ActionDetails::Pickup { item_id: item.into() }));
    }
    if let Some(item) = object(&p.drop) {
        return Some(Action::new(actor.clone(), ActionDetails::Drop { item_id: item.into() }));
    }
    if let Some(item) = object(&p.use_item) {
        return Some(Action::new(actor.clone(), ActionDetails::UseItem { item_id: item.into() }));
    }
    if let Some(target) = object(&p.examine) {
        return Some(Action::new(actor.clone(), ActionDetails::Examine { target_id: target }));
    }
    if p.search.is_match(raw) {
        return Some(Action::search(actor.clone()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> ParticipantId {
        "blue-fish".into()
    }

    #[test]
    fn strict_move() {
        let parsed = parse_action(&me(), r#"{"actionType":"move","actionDetails":{"direction":"North"}}"#);
        assert_eq!(parsed.tier, ParseTier::Strict);
        assert_eq!(parsed.action, Action::walk("blue-fish", Direction::North));
    }

    #[test]
    fn strict_survives_fences_and_commas() {
        let parsed = parse_action(
            &me(),
            "```json\n{\"actionType\": \"search\", \"actionDetails\": {},}\n```",
        );
        assert_eq!(parsed.tier, ParseTier::Strict);
        assert_eq!(parsed.action.kind(), ActionKind::Search);
    }

    #[test]
    fn synonym_type_is_coerced() {
        let parsed = parse_action(&me(), r#"{"actionType":"grab","actionDetails":{"item":"rope"}}"#);
        assert_eq!(
            parsed.action.details,
            ActionDetails::Pickup { item_id: "rope".into() }
        );
    }

    #[test]
    fn unknown_type_becomes_chat() {
        let parsed = parse_action(
            &me(),
            r#"{"actionType":"dance","actionDetails":{"message":"Shall we?"}}"#,
        );
        assert_eq!(parsed.tier, ParseTier::Strict);
        assert_eq!(parsed.action, Action::chat("blue-fish", "Shall we?"));
    }

    #[test]
    fn heuristic_from_prose() {
        let parsed = parse_action(&me(), "I think I'll go east to check the kitchen.");
        assert_eq!(parsed.tier, ParseTier::Heuristic);
        assert_eq!(parsed.action, Action::walk("blue-fish", Direction::East));

        let parsed = parse_action(&me(), "I accuse red-donkey with the candlestick in room11!");
        assert_eq!(parsed.action, Action::accuse("blue-fish", "red-donkey", "candlestick", "room11"));
    }

    #[test]
    fn heuristic_from_broken_json() {
        let parsed = parse_action(&me(), r#"{"actionType": "move", "actionDetails": {"direction": "south""#);
        assert_eq!(parsed.tier, ParseTier::Heuristic);
        assert_eq!(parsed.action, Action::walk("blue-fish", Direction::South));
    }

    #[test]
    fn figures_of_speech_stay_chat() {
        for text in [
            "Let me take a moment to think about what we know.",
            "We should use our heads before anyone gets hurt.",
            "I'd like to take a look around this room.",
            "Don't drop your guard, any of you.",
            "Take care, everyone.",
        ] {
            let parsed = parse_action(&me(), text);
            assert_eq!(parsed.tier, ParseTier::Raw, "{}", text);
            assert!(parsed.action.is_chat(), "{}", text);
        }
    }

    #[test]
    fn item_verbs_still_read_ids() {
        let parsed = parse_action(&me(), "I'll take the rope, just in case.");
        assert_eq!(parsed.action.details, ActionDetails::Pickup { item_id: "rope".into() });

        let parsed = parse_action(&me(), "Time to use candlestick-1.");
        assert_eq!(parsed.action.details, ActionDetails::UseItem { item_id: "candlestick-1".into() });
    }

    #[test]
    fn raw_text_becomes_chat() {
        let parsed = parse_action(&me(), "Hmm, nothing comes to mind.");
        assert_eq!(parsed.tier, ParseTier::Raw);
        assert_eq!(parsed.action, Action::chat("blue-fish", "Hmm, nothing comes to mind."));
    }

    #[test]
    fn chat_reply_is_taken_verbatim() {
        assert_eq!(
            parse_chat(&me(), "  \"I was in the study all night.\" "),
            Action::chat("blue-fish", "I was in the study all night.")
        );
    }
}
