use serde_json::json;

use super::DecisionContext;
use super::fallback::hash_string;
use crate::game::player::Player;
use crate::types::{Phase, Role};

/// Stage A output shape, quoted verbatim in prompts and repair re-prompts.
pub const ANALYSIS_SCHEMA: &str = "{ \"suspicions\": { \"<playerId>\": 0-100 }, \"contradictions\":[{\"playerId\":\"<id>\",\"lines\":[\"...\"]}], \"most_suspicious\":\"<playerId>\", \"flipCandidates\":[\"<id>\"], \"confidence\":0-100, \"plan\":\"<short>\", \"monologue\":\"<multi-sentence private reasoning>\" }";

/// How much memory the prompt carries. Later chain attempts shrink the
/// context so smaller fallback models still get a usable prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextTier {
    Full,
    Medium,
    Minimal,
}

impl ContextTier {
    pub fn for_attempt(attempt: usize) -> Self {
        match attempt {
            0 => ContextTier::Full,
            1 => ContextTier::Medium,
            _ => ContextTier::Minimal,
        }
    }
}

/// Deterministic persona traits derived from the player id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Personality {
    pub aggression: u32,
    pub subtlety: u32,
    pub risk_tolerance: u32,
}

pub fn personality_for(player_id: &str) -> Personality {
    let seed = hash_string(if player_id.is_empty() { "p" } else { player_id });
    Personality {
        aggression: 25 + seed % 71,
        subtlety: 20 + (seed >> 4) % 71,
        risk_tolerance: 20 + (seed >> 8) % 71,
    }
}

pub fn objective_for(role: Role, phase: Phase) -> &'static str {
    match phase {
        Phase::Night => match role {
            Role::Mafia => "Eliminate a town-aligned threat while avoiding detection.",
            Role::Doctor => "Protect a likely Mafia target and keep town power roles alive.",
            Role::Detective => "Investigate highest-value suspect to improve tomorrow's vote.",
            _ => "Survive the night.",
        },
        Phase::Voting => match role {
            Role::Mafia => "Redirect votes away from Mafia and secure a town elimination.",
            Role::Jester => "Attract votes to yourself without obvious trolling.",
            _ => "Eliminate the most likely Mafia based on claims and contradictions.",
        },
        _ => match role {
            Role::Mafia => "Shape discussion to frame town targets and avoid your own exposure.",
            Role::Jester => "Create controlled chaos and appear suspicious enough to attract votes.",
            _ => "Build consensus using specific contradictions and evidence.",
        },
    }
}

/// Output schema quoted to the model for this role and phase.
pub fn schema_for(role: Role, phase: Phase) -> &'static str {
    match (phase, role) {
        (Phase::Night, Role::Mafia) => {
            "{ \"action\":\"Kill|DoNothing\", \"target\":\"<playerName or playerId>\", \"dialogue\":\"<text>\", \"internal_analysis\":{\"most_suspicious\":\"<id>\",\"suspicions\":{\"<id>\":0-100},\"confidence\":0-100} }"
        }
        (Phase::Night, Role::Doctor) => {
            "{ \"action\":\"Save|DoNothing\", \"target\":\"<playerName or playerId>\", \"dialogue\":\"\", \"internal_analysis\":{\"most_suspicious\":\"<id>\",\"suspicions\":{\"<id>\":0-100},\"confidence\":0-100} }"
        }
        (Phase::Night, Role::Detective) => {
            "{ \"action\":\"Investigate|DoNothing\", \"target\":\"<playerName or playerId>\", \"dialogue\":\"\", \"investigationResult\":\"Town|Mafia|Unknown\", \"internal_analysis\":{\"most_suspicious\":\"<id>\",\"suspicions\":{\"<id>\":0-100},\"confidence\":0-100} }"
        }
        (Phase::Voting, _) => {
            "{ \"vote\":\"<playerName or playerId>\", \"reasoning\":\"<text>\", \"internal_analysis\":{\"most_suspicious\":\"<id>\",\"suspicions\":{\"<id>\":0-100},\"confidence\":0-100} }"
        }
        _ => {
            "{ \"shouldSpeak\": true|false, \"dialogue\":\"<text>\", \"strategy_notes\":\"<text>\", \"internal_analysis\":{\"most_suspicious\":\"<id>\",\"suspicions\":{\"<id>\":0-100},\"confidence\":0-100} }"
        }
    }
}

/// Assembles the shared base prompt for both pipeline stages.
pub fn build_prompt(
    player: &Player,
    phase: Phase,
    ctx: &DecisionContext,
    schema: &str,
    tier: ContextTier,
) -> String {
    let alive: Vec<String> = ctx
        .alive()
        .iter()
        .map(|p| format!("{}({})", p.display_name, p.id))
        .collect();
    let dead: Vec<String> = ctx
        .dead()
        .iter()
        .map(|p| format!("{}({})", p.display_name, p.id))
        .collect();
    let objective = objective_for(player.role, phase);
    let personality = personality_for(&player.id);

    let mut summary = placeholder(&ctx.memory.summary, "<none>");
    let mut day_memory = placeholder(&ctx.memory.day_memory, "<none yet>");
    let mut recent = placeholder(&ctx.memory.recent_transcript, "<empty>");
    match tier {
        ContextTier::Full => {}
        ContextTier::Medium => {
            summary = tail_chars(summary, 1800);
            day_memory = tail_chars(day_memory, 1400);
            recent = tail_chars(recent, 1600);
        }
        ContextTier::Minimal => {
            summary = tail_chars(summary, 900);
            day_memory = tail_chars(day_memory, 500);
            recent = tail_chars(recent, 700);
        }
    }

    let lines = [
        "You are playing a competitive Mafia game. Use strategic, coherent logic.".to_string(),
        format!("Identity: You are {} ({}).", player.display_name, player.id),
        "Speak as yourself in FIRST PERSON (I/me/my). Never refer to yourself in third person by your own name.".to_string(),
        format!("Your role: {}", player.role.as_str()),
        format!("Current phase: {}", phase.as_str()),
        format!("Objective: {objective}"),
        format!(
            "PERSONALITY: aggression={}, subtlety={}, riskTolerance={}",
            personality.aggression, personality.subtlety, personality.risk_tolerance
        ),
        format!("Alive players: {}", json!(alive)),
        format!("Dead players: {}", json!(dead)),
        String::new(),
        "COMPRESSED OLDER MEMORY:".to_string(),
        summary.to_string(),
        String::new(),
        "CURRENT DAY MEMORY (verbatim):".to_string(),
        day_memory.to_string(),
        String::new(),
        "YOUR NIGHT ACTION MEMORY:".to_string(),
        placeholder(&ctx.memory.personal_night, "<none>").to_string(),
        String::new(),
        "RECENT VERBATIM TRANSCRIPT:".to_string(),
        recent.to_string(),
        String::new(),
        "Decision rules:".to_string(),
        "1) Prefer actions with concrete evidence from transcript and role constraints.".to_string(),
        "2) Avoid generic statements; include one specific suspicion or defense.".to_string(),
        "3) Do not self-target for kill/save/investigate/vote.".to_string(),
        "4) Use player DISPLAY NAMES in dialogue/reasoning (Alpha, Delta, etc.).".to_string(),
        "5) Act to win for your role every phase: night actions must be purposeful, day talk must influence votes.".to_string(),
        "6) Never output placeholders like 'nothing to add' unless fully justified by state contradictions.".to_string(),
        "7) Mention at least one specific player name in discussion or vote reasoning.".to_string(),
        "8) In discussion phase, if you truly want to pass, set shouldSpeak=false and keep dialogue empty.".to_string(),
        "9) Do not accuse any player as Mafia without evidence. If evidence is weak, ask questions instead of hard accusations.".to_string(),
        "10) internal_analysis.monologue must be detailed (4-8 sentences), strategic, and evidence-based.".to_string(),
        "11) Discussion dialogue should be substantive: 3-6 sentences unless tactical silence is chosen.".to_string(),
        String::new(),
        "Required output schema:".to_string(),
        schema.to_string(),
        String::new(),
        "Return only valid JSON matching the schema. No markdown, no commentary, no extra text.".to_string(),
        "If private reasoning is included, place it under \"internal_analysis\".".to_string(),
    ];
    lines.join("\n")
}

fn placeholder<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

/// Last `n` characters of `s`, on char boundaries.
fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((byte, _)) => &s[byte..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::memory::CompressedMemory;

    fn ctx_with_memory(players: &[Player], memory: CompressedMemory) -> DecisionContext<'_> {
        DecisionContext { players, memory }
    }

    #[test]
    fn personality_is_deterministic_and_bounded() {
        let a = personality_for("p1");
        let b = personality_for("p1");
        assert_eq!(a, b);
        assert!((25..=95).contains(&a.aggression));
        assert!((20..=90).contains(&a.subtlety));
        assert!((20..=90).contains(&a.risk_tolerance));
        assert_ne!(personality_for("p1"), personality_for("p2"));
    }

    #[test]
    fn tier_shrinks_with_attempt_index() {
        assert_eq!(ContextTier::for_attempt(0), ContextTier::Full);
        assert_eq!(ContextTier::for_attempt(1), ContextTier::Medium);
        assert_eq!(ContextTier::for_attempt(2), ContextTier::Minimal);
        assert_eq!(ContextTier::for_attempt(7), ContextTier::Minimal);
    }

    #[test]
    fn tail_chars_respects_char_boundaries() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("héllo", 4), "éllo");
    }

    #[test]
    fn prompt_contains_identity_rosters_and_schema() {
        let mut players = vec![
            Player::new("p1", "Alex", Role::Detective),
            Player::new("p2", "Blair", Role::Mafia),
        ];
        players[1].is_alive = false;
        let ctx = ctx_with_memory(&players, CompressedMemory::default());
        let schema = schema_for(Role::Detective, Phase::Night);
        let prompt = build_prompt(&players[0], Phase::Night, &ctx, schema, ContextTier::Full);
        assert!(prompt.contains("Identity: You are Alex (p1)."));
        assert!(prompt.contains("Your role: Detective"));
        assert!(prompt.contains("Alive players: [\"Alex(p1)\"]"));
        assert!(prompt.contains("Dead players: [\"Blair(p2)\"]"));
        assert!(prompt.contains("COMPRESSED OLDER MEMORY:\n<none>"));
        assert!(prompt.contains("YOUR NIGHT ACTION MEMORY:\n<none>"));
        assert!(prompt.contains("Required output schema:"));
        assert!(prompt.contains("Investigate|DoNothing"));
    }

    #[test]
    fn reduced_tiers_keep_only_memory_tails() {
        let players = vec![Player::new("p1", "Alex", Role::Villager)];
        let mut memory = CompressedMemory::default();
        memory.summary = format!("{}END", "x".repeat(3000));
        let ctx = ctx_with_memory(&players, memory);
        let schema = schema_for(Role::Villager, Phase::Discussion);
        let medium = build_prompt(&players[0], Phase::Discussion, &ctx, schema, ContextTier::Medium);
        let start = medium.find("COMPRESSED OLDER MEMORY:\n").unwrap();
        let block = &medium[start..medium[start..].find("\n\n").unwrap() + start];
        // 1800 chars of summary plus the header line.
        assert!(block.len() < 1900);
        assert!(block.ends_with("END"));
    }

    #[test]
    fn objectives_vary_by_role_and_phase() {
        assert_eq!(
            objective_for(Role::Mafia, Phase::Night),
            "Eliminate a town-aligned threat while avoiding detection."
        );
        assert_eq!(objective_for(Role::Villager, Phase::Night), "Survive the night.");
        assert_eq!(
            objective_for(Role::Jester, Phase::Voting),
            "Attract votes to yourself without obvious trolling."
        );
        assert!(objective_for(Role::Doctor, Phase::Discussion).starts_with("Build consensus"));
    }

    #[test]
    fn voting_schema_is_role_independent() {
        assert_eq!(
            schema_for(Role::Mafia, Phase::Voting),
            schema_for(Role::Villager, Phase::Voting)
        );
        assert!(schema_for(Role::Doctor, Phase::Night).contains("Save|DoNothing"));
        assert!(schema_for(Role::Jester, Phase::Night).contains("shouldSpeak"));
    }
}
