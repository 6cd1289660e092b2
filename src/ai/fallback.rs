use serde_json::{Value, json};

use super::DecisionContext;
use super::dialogue::{clean_raw_dialogue, extract_player_id_from_text};
use crate::game::player::Player;
use crate::types::{Phase, Role};

/// FNV-style fold over the UTF-8 bytes. Every deterministic choice in the
/// pipeline (stub targets, suspicion scores, personalities) derives from it,
/// so identical inputs always replay identically.
pub fn hash_string(input: &str) -> u32 {
    let mut h: u32 = 2166136261;
    for &b in input.as_bytes() {
        h ^= u32::from(b);
        h = h
            .wrapping_add(h << 1)
            .wrapping_add(h << 4)
            .wrapping_add(h << 7)
            .wrapping_add(h << 8)
            .wrapping_add(h << 24);
    }
    h
}

/// Stable target pick among living players other than the chooser.
pub fn pick_target(self_id: &str, alive: &[&Player]) -> String {
    let candidates: Vec<&&Player> = alive.iter().filter(|p| p.id != self_id).collect();
    if candidates.is_empty() {
        return String::new();
    }
    let ids: Vec<&str> = candidates.iter().map(|p| p.id.as_str()).collect();
    let idx = hash_string(&format!("{}|{}", self_id, ids.join(","))) as usize % candidates.len();
    candidates[idx].id.clone()
}

/// Synthetic private analysis used whenever the model did not supply one.
/// Suspicions land in 10..=90 and confidence in 50..=90.
pub fn make_internal_analysis(self_id: &str, alive: &[&Player], most_suspicious: &str) -> Value {
    let mut suspicions = serde_json::Map::new();
    for p in alive {
        let score = (hash_string(&format!("{}:{}", self_id, p.id)) % 81) + 10;
        suspicions.insert(p.id.clone(), json!(score));
    }
    let flip_candidates: Vec<&str> = alive
        .iter()
        .map(|p| p.id.as_str())
        .filter(|id| *id != self_id)
        .take(3)
        .collect();
    json!({
        "most_suspicious": most_suspicious,
        "suspicions": suspicions,
        "contradictions": [],
        "flipCandidates": flip_candidates,
        "confidence": (hash_string(self_id) % 41) + 50,
        "monologue": "I am tracking who is driving votes versus who is hedging. \
            I need to compare claims against timing and vote history before committing. \
            My current suspect has pressure but I still need contradiction-level evidence. \
            I will choose actions that improve information while protecting my role objective."
    })
}

/// Offline decision used when the model tier is disabled.
pub fn stub_decision(player: &Player, phase: Phase, ctx: &DecisionContext) -> Value {
    match phase {
        Phase::Night => night_stub(player, ctx),
        Phase::Discussion => discussion_stub(player, ctx),
        Phase::Voting => vote_stub(player, ctx),
        Phase::Results => json!({ "dialogue": "..." }),
    }
}

fn night_stub(player: &Player, ctx: &DecisionContext) -> Value {
    let alive = ctx.alive();
    let target = pick_target(&player.id, &alive);
    let analysis = make_internal_analysis(&player.id, &alive, &target);
    match player.role {
        Role::Mafia => json!({
            "action": "Kill",
            "target": target,
            "dialogue": "Let's remove uncertainty tonight.",
            "internal_analysis": analysis
        }),
        Role::Doctor => json!({
            "action": "Save",
            "target": target,
            "dialogue": "",
            "internal_analysis": analysis
        }),
        Role::Detective => json!({
            "action": "Investigate",
            "target": target,
            "dialogue": "",
            "investigationResult": "Unknown",
            "internal_analysis": analysis
        }),
        Role::Villager | Role::Jester => json!({
            "action": "DoNothing",
            "target": "",
            "dialogue": "",
            "internal_analysis": analysis
        }),
    }
}

fn discussion_stub(player: &Player, ctx: &DecisionContext) -> Value {
    let alive = ctx.alive();
    let target = pick_target(&player.id, &alive);
    let analysis = make_internal_analysis(&player.id, &alive, &target);
    json!({
        "shouldSpeak": true,
        "dialogue": format!("I currently suspect {}.", ctx.pretty_name(&target)),
        "strategy_notes": "Deterministic fallback strategy.",
        "internal_analysis": analysis
    })
}

fn vote_stub(player: &Player, ctx: &DecisionContext) -> Value {
    let alive = ctx.alive();
    let target = pick_target(&player.id, &alive);
    let analysis = make_internal_analysis(&player.id, &alive, &target);
    json!({
        "vote": target,
        "reasoning": format!("Voting {} by consistency pressure.", ctx.pretty_name(&target)),
        "internal_analysis": analysis
    })
}

/// Last-resort decision after the whole model chain failed. Salvages any
/// speakable text and target mention from the raw reply before falling back
/// to deterministic picks.
pub fn make_fallback_decision(
    player: &Player,
    phase: Phase,
    ctx: &DecisionContext,
    reason: &str,
    raw: &str,
) -> Value {
    let alive = ctx.alive();
    let target = pick_target(&player.id, &alive);
    let mut analysis = make_internal_analysis(&player.id, &alive, &target);
    if let Some(obj) = analysis.as_object_mut() {
        obj.insert(
            "error".into(),
            json!(if reason.is_empty() { "fallback" } else { reason }),
        );
        obj.insert(
            "raw_excerpt".into(),
            json!(raw.chars().take(220).collect::<String>()),
        );
        obj.insert("source".into(), json!("fallback_or_salvage"));
        obj.insert(
            "monologue".into(),
            json!(build_monologue(player, ctx, &target)),
        );
    }

    let cleaned = clean_raw_dialogue(raw);
    let mut extracted = extract_player_id_from_text(&cleaned, &alive, &player.id);
    if extracted.is_empty() {
        extracted = target.clone();
    }

    match phase {
        Phase::Night => match player.role {
            Role::Mafia => json!({
                "action": "Kill",
                "target": extracted,
                "dialogue": if cleaned.is_empty() {
                    "I will act under cover of darkness.".to_string()
                } else {
                    cleaned
                },
                "internal_analysis": analysis
            }),
            Role::Doctor => json!({
                "action": "Save",
                "target": extracted,
                "dialogue": "",
                "internal_analysis": analysis
            }),
            Role::Detective => json!({
                "action": "Investigate",
                "target": extracted,
                "dialogue": "",
                "investigationResult": "Unknown",
                "internal_analysis": analysis
            }),
            Role::Villager | Role::Jester => json!({
                "action": "DoNothing",
                "target": "",
                "dialogue": "",
                "internal_analysis": analysis
            }),
        },
        Phase::Voting => json!({
            "vote": extracted,
            "reasoning": if cleaned.is_empty() {
                format!(
                    "I vote {} based on pressure and contradictions.",
                    ctx.pretty_name(&extracted)
                )
            } else {
                cleaned
            },
            "internal_analysis": analysis
        }),
        Phase::Discussion | Phase::Results => {
            let line = match player.role {
                Role::Mafia => format!(
                    "I want to review {}'s claims before we conclude anything.",
                    ctx.pretty_name(&target)
                ),
                Role::Doctor => "Let's compare claims calmly before we rush a vote.".to_string(),
                Role::Detective => {
                    "I want concrete accusations with reasons, not guesses.".to_string()
                }
                Role::Jester => "If you suspect me, say it clearly and I'll respond.".to_string(),
                Role::Villager => format!(
                    "I want clearer evidence about {} before committing to an accusation.",
                    ctx.pretty_name(&target)
                ),
            };
            json!({
                "shouldSpeak": true,
                "dialogue": if cleaned.is_empty() { line } else { cleaned },
                "strategy_notes": "fallback-generated discussion line",
                "internal_analysis": analysis
            })
        }
    }
}

/// Five-line private monologue conditioned on what the current day has
/// actually shown (vote momentum, role claims).
pub fn build_monologue(player: &Player, ctx: &DecisionContext, action_ref: &str) -> String {
    let alive = ctx.alive();
    let mut target_id = extract_player_id_from_text(action_ref, &alive, &player.id);
    if target_id.is_empty() {
        target_id = pick_target(&player.id, &alive);
    }
    let t_name = ctx.pretty_name(&target_id).to_string();
    let day_lower = ctx.memory.day_memory.to_lowercase();
    let has_vote_ref = ["vote", "eject", "lynch"].iter().any(|w| day_lower.contains(w));
    let has_claim_ref = ["claim", "role", "doctor", "detective", "mafia"]
        .iter()
        .any(|w| day_lower.contains(w));

    let line1 = format!(
        "I am weighing {} against the wider table pressure and my role objective as {}.",
        t_name,
        player.role.as_str()
    );
    let line2 = if has_claim_ref {
        "I see role-claim dynamics in recent dialogue, so I am checking consistency before making a hard push."
    } else {
        "I do not yet have enough hard claims, so I am prioritizing information gain over reckless certainty."
    };
    let line3 = if has_vote_ref {
        "Vote momentum is a key signal; I am tracking who is steering it versus who is opportunistically following."
    } else {
        "Without clear vote momentum, I should pressure for specific accusations and contradictions."
    };
    let line4 = "I will avoid random accusations and anchor decisions to transcript evidence, contradictions, and survivability.";
    let line5 = "If this read weakens, I should pivot quickly to the next strongest candidate rather than tunnel.";
    format!("{line1} {line2} {line3} {line4} {line5}")
}
