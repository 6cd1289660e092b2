use regex::{NoExpand, Regex};

use super::DecisionContext;
use crate::game::player::Player;

/// Prompt fragments that mark leaked instructions rather than table talk.
const BLOCKED_MARKERS: [&str; 7] = [
    "you are an ai mafia player",
    "output schema",
    "alive players:",
    "dead players:",
    "transcript:",
    "return only valid json",
    "internal_analysis",
];

const ACCUSATION_MARKERS: [&str; 6] = [
    "is mafia",
    "definitely mafia",
    "liar",
    "vote out",
    "must be mafia",
    "guilty",
];

const EVIDENCE_WORDS: [&str; 9] = [
    "because",
    "since",
    "claimed",
    "said",
    "voted",
    "contradiction",
    "inconsistent",
    "timeline",
    "defended",
];

/// Rewrites third-person self mentions to first person and swaps other
/// players' raw ids for their display names.
pub fn rewrite_self_reference(text: &str, player: &Player, players: &[Player]) -> String {
    let mut out = text.to_string();
    if out.is_empty() {
        return out;
    }
    if !player.display_name.is_empty() {
        if let Ok(re) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&player.display_name))) {
            out = re.replace_all(&out, "I").into_owned();
        }
        if let Ok(re) = Regex::new(r"(?i)\bI is\b") {
            out = re.replace_all(&out, "I am").into_owned();
        }
    }
    for other in players {
        if other.id == player.id {
            continue;
        }
        if let Ok(re) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&other.id))) {
            out = re
                .replace_all(&out, NoExpand(other.display_name.as_str()))
                .into_owned();
        }
    }
    out
}

/// Salvages a speakable line from a raw model reply. Anything that still
/// looks like JSON or echoes prompt scaffolding is dropped entirely.
pub fn clean_raw_dialogue(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    if text.is_empty() {
        return String::new();
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            text = message.to_string();
        }
    }
    let mut slice = text.as_str();
    if let Some(rest) = slice.strip_prefix("```") {
        slice = rest
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_start();
    }
    if let Some(rest) = slice.strip_suffix("```") {
        slice = rest.trim_end();
    }
    if slice.starts_with('{') || slice.starts_with('[') {
        return String::new();
    }
    let collapsed = slice.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return String::new();
    }
    let lower = collapsed.to_lowercase();
    if BLOCKED_MARKERS.iter().any(|m| lower.contains(m)) {
        return String::new();
    }
    collapsed
}

/// First living player (other than the speaker) mentioned by id or name.
pub fn extract_player_id_from_text(text: &str, alive: &[&Player], self_id: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let lower = text.to_lowercase();
    for p in alive {
        if p.id == self_id {
            continue;
        }
        if lower.contains(&p.id.to_lowercase()) {
            return p.id.clone();
        }
        let name = p.display_name.to_lowercase();
        if !name.is_empty() && lower.contains(&name) {
            return p.id.clone();
        }
    }
    String::new()
}

pub fn is_hard_accusation(text: &str) -> bool {
    let t = text.to_lowercase();
    if t.is_empty() {
        return false;
    }
    ACCUSATION_MARKERS.iter().any(|m| t.contains(m))
}

/// True when the speaker's memory or the line itself both mentions the
/// target and carries at least one evidence word. Hard accusations without
/// this backing get softened by the repair pass.
pub fn has_evidence_for_target(ctx: &DecisionContext, target_id: &str, local_text: &str) -> bool {
    if target_id.is_empty() {
        return false;
    }
    let name = ctx.pretty_name(target_id).to_lowercase();
    let corpus = format!(
        "{}\n{}\n{}\n{}",
        local_text, ctx.memory.day_memory, ctx.memory.recent_transcript, ctx.memory.summary
    )
    .to_lowercase();
    let mentions_target =
        corpus.contains(&target_id.to_lowercase()) || (!name.is_empty() && corpus.contains(&name));
    if !mentions_target {
        return false;
    }
    EVIDENCE_WORDS.iter().any(|w| corpus.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::memory::CompressedMemory;
    use crate::types::Role;

    fn roster() -> Vec<Player> {
        vec![
            Player::new("p1", "Alex", Role::Villager),
            Player::new("p2", "Blair", Role::Mafia),
            Player::new("p3", "Casey", Role::Doctor),
        ]
    }

    #[test]
    fn own_name_becomes_first_person() {
        let players = roster();
        let out = rewrite_self_reference("Blair is suspicious of p3.", &players[1], &players);
        assert_eq!(out, "I am suspicious of Casey.");
    }

    #[test]
    fn other_ids_become_display_names() {
        let players = roster();
        let out = rewrite_self_reference("I trust p2 more than P3.", &players[0], &players);
        assert_eq!(out, "I trust Blair more than Casey.");
    }

    #[test]
    fn clean_raw_drops_json_and_prompt_echo() {
        assert_eq!(clean_raw_dialogue(r#"{"action":"Kill","target":"p2"}"#), "");
        assert_eq!(clean_raw_dialogue("```json\n{\"vote\":\"p1\"}\n```"), "");
        assert_eq!(
            clean_raw_dialogue("Alive players: [\"Alex(p1)\"] and I vote now"),
            ""
        );
        assert_eq!(clean_raw_dialogue("   \n\t  "), "");
    }

    #[test]
    fn clean_raw_unwraps_message_field_and_collapses_whitespace() {
        let raw = r#"{"message":"I   think Blair\nis lying"}"#;
        assert_eq!(clean_raw_dialogue(raw), "I think Blair is lying");
        assert_eq!(clean_raw_dialogue("  plain   \n take  "), "plain take");
    }

    #[test]
    fn extracts_first_mentioned_living_player() {
        let players = roster();
        let alive: Vec<&Player> = players.iter().collect();
        assert_eq!(
            extract_player_id_from_text("I really doubt CASEY today", &alive, "p1"),
            "p3"
        );
        assert_eq!(
            extract_player_id_from_text("we should wait", &alive, "p1"),
            ""
        );
        // Self mentions never count.
        assert_eq!(
            extract_player_id_from_text("Alex is fine", &alive, "p1"),
            ""
        );
    }

    #[test]
    fn hard_accusations_are_flagged() {
        assert!(is_hard_accusation("Blair is MAFIA, vote out now"));
        assert!(is_hard_accusation("he must be mafia"));
        assert!(!is_hard_accusation("I am unsure about Blair"));
        assert!(!is_hard_accusation(""));
    }

    #[test]
    fn evidence_gate_requires_mention_and_evidence_word() {
        let players = roster();
        let mut memory = CompressedMemory::default();
        memory.day_memory = "[Day 1][Alex] Blair claimed Doctor yesterday".to_string();
        let ctx = DecisionContext {
            players: &players,
            memory,
        };
        assert!(has_evidence_for_target(&ctx, "p2", ""));
        assert!(!has_evidence_for_target(&ctx, "p3", ""));
        assert!(has_evidence_for_target(
            &ctx,
            "p3",
            "Casey voted strangely"
        ));
        assert!(!has_evidence_for_target(&ctx, "", "anything"));
    }
}
