use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde_json::{Value, json};

use crate::ai::DecisionContext;
use crate::ai::director::{AiDirector, is_error_value};
use crate::ai::schema::{
    DiscussionAction, NightAction, VoteAction, safe_parse_json, to_discussion_action,
    to_night_action, to_vote_action,
};
use crate::game::audit::{AuditLogger, AuditRecord};
use crate::game::memory::MemoryCompactor;
use crate::game::player::Player;
use crate::game::snapshot::{self, AiDiagnostics, NightSummary, PlayerReport, SavePayload};
use crate::game::state::SessionState;
use crate::types::{AuditEventKind, EliminationCause, Phase, Role, Winner};

const STUB_PLAYER_NAMES: [&str; 6] = ["Alex", "Blair", "Casey", "Drew", "Emery", "Flynn"];
const MIN_PLAYER_COUNT: usize = 5;

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub master_mode: bool,
    pub separate_human_player: bool,
    pub human_display_name: String,
    pub player_count: usize,
    pub save_to_file_mode: bool,
    pub save_dir: String,
    pub always_write_logs_to_file: bool,
    pub max_speech_chars_per_round: usize,
    pub max_speech_chars_per_message: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            master_mode: false,
            separate_human_player: false,
            human_display_name: "You".to_string(),
            player_count: 6,
            save_to_file_mode: false,
            save_dir: "saved_games".to_string(),
            always_write_logs_to_file: true,
            max_speech_chars_per_round: 20_000,
            max_speech_chars_per_message: 20_000,
        }
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EliminationRecord {
    pub round: u32,
    pub phase: Phase,
    pub player_id: String,
    pub name: String,
    pub cause: EliminationCause,
}

#[derive(Debug, Clone)]
pub struct SuspicionRecord {
    pub round: u32,
    pub phase: Phase,
    pub player_id: String,
    pub most_suspicious: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone)]
struct PendingNight {
    action: String,
    target: String,
    dialogue: String,
}

/// Small explicit PRNG for the role shuffle; clock-seeded in play, fixed
/// seeds in tests.
struct SeededRng(u64);

impl SeededRng {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Self::new(nanos)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn pick(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound.max(1) as u64) as usize
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Drives one session: role assignment, the Night → Discussion → Voting →
/// Results loop, win checks, and the abort path. The engine is the only
/// mutator of session state; the decision pipeline just reads a snapshot.
pub struct GameEngine {
    pub master_mode: bool,
    pub players: Vec<Player>,
    pub state: SessionState,
    pub director: AiDirector,
    pub current_phase: Phase,
    pub winner: Option<Winner>,
    pub round: u32,
    pub human_player_id: String,
    pub separate_human_player: bool,
    pub human_display_name: String,
    pub player_count: usize,
    pub session_id: u32,
    pub elimination_order: Vec<EliminationRecord>,
    pub suspicion_timeline: Vec<SuspicionRecord>,
    pub save_to_file_mode: bool,
    pub save_dir: String,
    pub last_saved_path: String,
    pub abort_reason: String,
    max_speech_chars_per_round: usize,
    max_speech_chars_per_message: usize,
    spoken_chars_this_round: HashMap<String, usize>,
    pending_human_discussion: String,
    pending_human_vote: String,
    pending_human_night: Option<PendingNight>,
    player_model_by_id: HashMap<String, String>,
    player_model_pinned: HashSet<String>,
    compactor: MemoryCompactor,
    session_text_save_path: String,
    always_write_logs_to_file: bool,
    audit_log: Option<AuditLogger>,
}

impl GameEngine {
    pub fn new(options: EngineOptions, director: AiDirector) -> Self {
        Self {
            master_mode: options.master_mode,
            players: Vec::new(),
            state: SessionState::new(),
            director,
            current_phase: Phase::Night,
            winner: None,
            round: 1,
            human_player_id: String::new(),
            separate_human_player: options.separate_human_player,
            human_display_name: options.human_display_name,
            player_count: options.player_count.max(MIN_PLAYER_COUNT),
            session_id: 0,
            elimination_order: Vec::new(),
            suspicion_timeline: Vec::new(),
            save_to_file_mode: options.save_to_file_mode,
            save_dir: options.save_dir,
            last_saved_path: String::new(),
            abort_reason: String::new(),
            max_speech_chars_per_round: options.max_speech_chars_per_round,
            max_speech_chars_per_message: options.max_speech_chars_per_message,
            spoken_chars_this_round: HashMap::new(),
            pending_human_discussion: String::new(),
            pending_human_vote: String::new(),
            pending_human_night: None,
            player_model_by_id: HashMap::new(),
            player_model_pinned: HashSet::new(),
            compactor: MemoryCompactor::new(),
            session_text_save_path: String::new(),
            always_write_logs_to_file: options.always_write_logs_to_file,
            audit_log: None,
        }
    }

    // ── Setup ─────────────────────────────────────────────────────────────────

    pub async fn setup_game(
        &mut self,
        custom_names: Option<Vec<String>>,
        player_count_override: Option<usize>,
    ) {
        let target = player_count_override
            .unwrap_or(self.player_count)
            .max(MIN_PLAYER_COUNT);
        self.player_count = target;
        self.session_id += 1;

        let ai_count = if self.separate_human_player {
            (target - 1).max(4)
        } else {
            target
        };
        let names = match custom_names.filter(|n| n.len() >= ai_count) {
            Some(names) => names[..ai_count].to_vec(),
            None if self.director.config.use_llm => {
                self.director.config.preferred_player_names(ai_count)
            }
            None => stub_roster(ai_count),
        };

        self.players = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Player::new(format!("player_{i}"), name, Role::Villager))
            .collect();
        if self.separate_human_player {
            let mut human = Player::new("human_player", &self.human_display_name, Role::Villager);
            human.is_human = true;
            self.human_player_id = human.id.clone();
            self.players.push(human);
        }
        let mut rng = SeededRng::from_clock();
        self.assign_roles_with(&mut rng);
        for p in &mut self.players {
            p.reset_for_new_game();
        }

        self.state.clear_for_new_game();
        self.compactor.reset();
        self.director.clear_cache();
        self.current_phase = Phase::Night;
        self.winner = None;
        self.round = 1;
        self.spoken_chars_this_round.clear();
        self.elimination_order.clear();
        self.suspicion_timeline.clear();
        self.player_model_by_id.clear();
        self.player_model_pinned.clear();
        self.abort_reason.clear();
        self.append_system(&format!("Game started with {} players.", self.players.len()));
        self.append_system(&format!("Night {} begins.", self.round));
        self.state.game_log.push("Setup complete.".to_string());
        self.apply_default_model_to_all_players();

        if self.master_mode {
            self.log_roles();
        }
        self.session_text_save_path = PathBuf::from(&self.save_dir)
            .join(format!("session_{}.txt", self.session_id))
            .to_string_lossy()
            .into_owned();
        self.last_saved_path = self.session_text_save_path.clone();
        self.audit_log = self
            .persistence_enabled()
            .then(|| AuditLogger::new(PathBuf::from(&self.save_dir).as_path(), self.session_id));
        self.audit(
            AuditEventKind::GameStart,
            None,
            Some(&format!("players={}", self.players.len())),
        );
        self.persist_snapshot("game_start");
        self.prepare_night_actions().await;
    }

    fn assign_roles_with(&mut self, rng: &mut SeededRng) {
        let total = self.players.len();
        let mafia_count = (total / 3).max(1);
        let mut bag: Vec<Role> = Vec::with_capacity(total);
        bag.extend(std::iter::repeat(Role::Mafia).take(mafia_count));
        bag.extend([Role::Doctor, Role::Detective, Role::Jester]);
        while bag.len() > total {
            bag.pop();
        }
        while bag.len() < total {
            bag.push(Role::Villager);
        }

        // Fisher-Yates.
        for i in (1..bag.len()).rev() {
            let j = rng.pick(i + 1);
            bag.swap(i, j);
        }

        for (player, role) in self.players.iter_mut().zip(bag) {
            player.role = role;
        }

        // The separate human seat stays Villager for predictable manual play.
        if self.separate_human_player {
            if let Some(human) = self.players.iter_mut().find(|p| p.id == "human_player") {
                human.role = Role::Villager;
            }
        }
    }

    // ── Model assignment ──────────────────────────────────────────────────────

    pub fn set_default_model(&mut self, model: &str) -> bool {
        if !self.director.config.set_default_model(model) {
            return false;
        }
        self.apply_default_model_to_all_players();
        self.state.game_log.push(format!(
            "[MODEL] default -> {}",
            self.director.config.default_model
        ));
        true
    }

    pub fn set_player_model(&mut self, player_ref: &str, model: &str) -> bool {
        let id = self.normalize_target_id(player_ref, "");
        let model = model.trim();
        if id.is_empty() || model.is_empty() {
            return false;
        }
        self.player_model_by_id.insert(id.clone(), model.to_string());
        self.player_model_pinned.insert(id.clone());
        self.state.game_log.push(format!("[MODEL] {id} -> {model}"));
        true
    }

    pub fn get_player_model(&self, player_id: &str) -> String {
        self.player_model_by_id
            .get(player_id)
            .cloned()
            .unwrap_or_else(|| self.director.config.default_model.clone())
    }

    pub fn model_assignments(&self) -> Vec<(String, String)> {
        self.players
            .iter()
            .map(|p| (p.id.clone(), self.get_player_model(&p.id)))
            .collect()
    }

    fn apply_default_model_to_all_players(&mut self) {
        let default = self.director.config.default_model.clone();
        for p in &self.players {
            if p.is_human || self.player_model_pinned.contains(&p.id) {
                continue;
            }
            self.player_model_by_id.insert(p.id.clone(), default.clone());
        }
    }

    pub fn apply_llm_display_names(&mut self) {
        let ai_count = self.players.iter().filter(|p| !p.is_human).count();
        let names = self.director.config.preferred_player_names(ai_count);
        let mut names = names.into_iter();
        for p in self.players.iter_mut().filter(|p| !p.is_human) {
            if let Some(name) = names.next() {
                p.display_name = name;
            }
        }
    }

    // ── Human seat ────────────────────────────────────────────────────────────

    pub fn set_human_player(&mut self, player_ref: &str) -> bool {
        let id = self.normalize_target_id(player_ref, "");
        if id.is_empty() {
            return false;
        }
        self.human_player_id = id.clone();
        self.state
            .game_log
            .push(format!("[PLAYER_MODE] Human controls {id}"));
        true
    }

    pub fn clear_human_player(&mut self) {
        self.human_player_id.clear();
        self.pending_human_discussion.clear();
        self.pending_human_vote.clear();
        self.pending_human_night = None;
        self.state
            .game_log
            .push("[PLAYER_MODE] Human control disabled".to_string());
    }

    pub fn set_separate_human_mode(&mut self, on: bool, name: &str) {
        self.separate_human_player = on;
        self.human_display_name = if name.trim().is_empty() {
            "You".to_string()
        } else {
            name.trim().to_string()
        };
        if !on {
            self.clear_human_player();
        }
    }

    pub fn set_player_count(&mut self, count: usize) -> bool {
        if count < MIN_PLAYER_COUNT {
            return false;
        }
        self.player_count = count;
        true
    }

    pub fn set_save_mode(&mut self, on: bool, dir: &str) {
        self.save_to_file_mode = on;
        if !dir.trim().is_empty() {
            self.save_dir = dir.trim().to_string();
        }
    }

    pub fn submit_human_discussion(&mut self, text: &str) {
        self.pending_human_discussion = text.trim().to_string();
    }

    pub fn submit_human_vote(&mut self, target: &str) {
        self.pending_human_vote = target.trim().to_string();
    }

    pub fn submit_human_night(&mut self, action: &str, target: &str, dialogue: &str) {
        let action = action.trim();
        self.pending_human_night = Some(PendingNight {
            action: if action.is_empty() {
                "DoNothing".to_string()
            } else {
                action.to_string()
            },
            target: target.trim().to_string(),
            dialogue: dialogue.trim().to_string(),
        });
    }

    pub fn toggle_master_mode(&mut self, on: bool) {
        self.master_mode = on;
        self.state
            .game_log
            .push(format!("Master mode: {}", self.master_mode));
        if self.master_mode {
            self.log_roles();
        }
    }

    fn log_roles(&mut self) {
        let lines: Vec<String> = self
            .players
            .iter()
            .map(|p| {
                format!(
                    "[MASTER] {} role={} alive={}",
                    p.display_name,
                    p.role.as_str(),
                    p.is_alive
                )
            })
            .collect();
        self.state.game_log.extend(lines);
    }

    // ── Phase advancement ─────────────────────────────────────────────────────

    pub async fn next_phase(&mut self) {
        if self.winner.is_some() {
            return;
        }

        match self.current_phase {
            Phase::Night => {
                self.resolve_night_actions();
                self.current_phase = Phase::Discussion;
                self.start_discussion_phase().await;
            }
            Phase::Discussion => {
                self.current_phase = Phase::Voting;
                self.start_voting_phase().await;
            }
            Phase::Voting => {
                self.current_phase = Phase::Results;
                self.resolve_voting();
            }
            Phase::Results => {
                if self.winner.is_none() {
                    self.current_phase = Phase::Night;
                    self.round += 1;
                    self.spoken_chars_this_round.clear();
                    self.append_system(&format!("Night {} begins.", self.round));
                    self.prepare_night_actions().await;
                }
            }
        }

        self.state
            .game_log
            .push(format!("Phase -> {}", self.current_phase.as_str()));
        self.audit(AuditEventKind::PhaseAdvance, None, None);
        self.persist_snapshot(&format!(
            "phase_{}_r{}",
            self.current_phase.as_str().to_lowercase(),
            self.round
        ));
    }

    async fn start_discussion_phase(&mut self) {
        self.append_system(&format!("Discussion {} begins.", self.round));
        let order: Vec<String> = self
            .players
            .iter()
            .filter(|p| p.is_alive)
            .map(|p| p.id.clone())
            .collect();

        for pid in order {
            let Some(player) = self.players.iter().find(|p| p.id == pid).cloned() else {
                continue;
            };
            let decision = if pid == self.human_player_id {
                let pending = std::mem::take(&mut self.pending_human_discussion);
                let msg = if pending.is_empty() {
                    "(passes this turn)".to_string()
                } else {
                    pending
                };
                let submitted = DiscussionAction {
                    dialogue: msg,
                    should_speak: true,
                    strategy_notes: "human".to_string(),
                    internal_analysis: json!({ "source": "human" }),
                };
                serde_json::to_value(submitted).unwrap_or_else(|_| json!({}))
            } else {
                self.request_ai_decision(&player, Phase::Discussion).await
            };
            if is_error_value(&decision) {
                self.stop_game_due_to_ai(&format!(
                    "Discussion AI failed for {}",
                    player.display_name
                ));
                return;
            }
            self.capture_raw(&pid, &decision.to_string());
            let Some(action) = to_discussion_action(&decision) else {
                self.stop_game_due_to_ai(&format!(
                    "Invalid discussion JSON from {}",
                    player.display_name
                ));
                return;
            };
            if !action.should_speak || action.dialogue.trim().is_empty() {
                self.append_system(&format!("{} stays silent this turn.", player.display_name));
                continue;
            }
            let bounded = self.bound_speech(&pid, &action.dialogue);
            if let Some(speaker) = self.players.iter_mut().find(|p| p.id == pid) {
                speaker.last_dialogue = bounded.clone();
            }
            let day_tag = format!("Day {}", self.round);
            self.append_speech(&player.display_name, &bounded, &day_tag);
            if self.master_mode {
                self.state
                    .game_log
                    .push(format!("[MASTER][DISCUSSION] {pid} dialogue={bounded}"));
            }
        }
    }

    async fn start_voting_phase(&mut self) {
        self.append_system(&format!("Voting {} begins.", self.round));
        self.state.votes.clear();
        let order: Vec<String> = self
            .players
            .iter()
            .filter(|p| p.is_alive)
            .map(|p| p.id.clone())
            .collect();

        for pid in order {
            let Some(voter) = self.players.iter().find(|p| p.id == pid).cloned() else {
                continue;
            };
            let decision = if pid == self.human_player_id {
                let vote = std::mem::take(&mut self.pending_human_vote);
                let submitted = VoteAction {
                    vote,
                    reasoning: "human vote".to_string(),
                    internal_analysis: json!({ "source": "human" }),
                };
                serde_json::to_value(submitted).unwrap_or_else(|_| json!({}))
            } else {
                self.request_ai_decision(&voter, Phase::Voting).await
            };
            if is_error_value(&decision) {
                self.stop_game_due_to_ai(&format!("Voting AI failed for {}", voter.display_name));
                return;
            }
            self.capture_raw(&pid, &decision.to_string());
            let Some(action) = to_vote_action(&decision) else {
                self.stop_game_due_to_ai(&format!("Invalid vote JSON from {}", voter.display_name));
                return;
            };
            let mut target = self.normalize_target_id(&action.vote, &pid);
            if !self.is_alive_target(&target) || target == pid {
                target = self.pick_fallback_target(&pid);
                self.state
                    .game_log
                    .push(format!("[WARN] Invalid vote fixed for {pid} -> {target}"));
            }
            self.state.votes.insert(pid.clone(), target.clone());
            let voted_name = self.player_name_from_ref(&target);
            let line = format!(
                "votes for {}",
                if voted_name.is_empty() { "nobody" } else { &voted_name }
            );
            let day_tag = format!("Day {}", self.round);
            self.append_speech(&voter.display_name, &line, &day_tag);
            if self.master_mode {
                self.state
                    .game_log
                    .push(format!("[MASTER][VOTE] {pid} -> {target}"));
            }
        }
    }

    // ── Night collection ──────────────────────────────────────────────────────

    async fn prepare_night_actions(&mut self) {
        self.state.night_actions.clear();
        self.state.night_action_summary_by_player.clear();
        let order: Vec<String> = self
            .players
            .iter()
            .filter(|p| p.is_alive && p.role.has_night_action())
            .map(|p| p.id.clone())
            .collect();
        let mut mafia_proposals: Vec<(String, String)> = Vec::new();

        for pid in order {
            let Some(actor) = self.players.iter().find(|p| p.id == pid).cloned() else {
                continue;
            };
            let decision = if pid == self.human_player_id {
                let pending = self.pending_human_night.take().unwrap_or(PendingNight {
                    action: "DoNothing".to_string(),
                    target: String::new(),
                    dialogue: String::new(),
                });
                json!({
                    "action": pending.action,
                    "target": pending.target,
                    "dialogue": pending.dialogue,
                    "internal_analysis": { "source": "human" }
                })
            } else {
                self.request_ai_decision(&actor, Phase::Night).await
            };
            if is_error_value(&decision) {
                self.stop_game_due_to_ai(&format!("Night AI failed for {}", actor.display_name));
                return;
            }
            self.capture_raw(&pid, &decision.to_string());
            let Some(mut night) = to_night_action(&decision) else {
                self.stop_game_due_to_ai(&format!(
                    "Invalid night-action JSON from {}",
                    actor.display_name
                ));
                return;
            };

            // Normalize the model's target text (id or display name) into a
            // canonical player id before storing. DoNothing keeps its empty
            // target; everything else falls back to a deterministic pick.
            let exclude = if actor.role == Role::Doctor { "" } else { pid.as_str() };
            let mut target = self.normalize_target_id(&night.target, exclude);
            if target.is_empty() && night.action != "DoNothing" {
                target = self.pick_fallback_target(&pid);
            }
            night.target = target;
            let accepted_raw =
                serde_json::to_string(&night).unwrap_or_else(|_| decision.to_string());
            self.state.night_actions.insert(pid.clone(), accepted_raw);

            if actor.role == Role::Mafia && night.action == "Kill" {
                mafia_proposals.push((pid.clone(), night.target.clone()));
            }
            let reason = night_reason(&night);
            let why = if reason.is_empty() {
                String::new()
            } else {
                format!(" | why: {reason}")
            };
            let target_name = self.player_name_from_ref(&night.target);
            self.state.night_action_summary_by_player.insert(
                pid.clone(),
                format!(
                    "Round {}: {}({}){}",
                    self.round,
                    night.action,
                    if target_name.is_empty() { "none" } else { &target_name },
                    why
                ),
            );
            if self.master_mode {
                self.state
                    .game_log
                    .push(format!("[MASTER][NIGHT] {pid} action captured (private)"));
            }
        }

        if !mafia_proposals.is_empty() {
            let living: Vec<String> = mafia_proposals
                .iter()
                .map(|(_, target)| target.clone())
                .filter(|id| self.is_alive_target(id))
                .collect();
            let mut consensus = self.pick_consensus_target(&living);
            if consensus.is_empty() {
                consensus = self.pick_fallback_target("");
            }
            for (actor_id, _) in &mafia_proposals {
                let Some(raw) = self.state.night_actions.get(actor_id) else {
                    continue;
                };
                let Some(mut night) = safe_parse_json(raw).as_ref().and_then(to_night_action)
                else {
                    continue;
                };
                night.action = "Kill".to_string();
                night.target = consensus.clone();
                if let Ok(unified) = serde_json::to_string(&night) {
                    self.state.night_actions.insert(actor_id.clone(), unified);
                }
                let name = self.player_name_from_ref(&consensus);
                self.state.night_action_summary_by_player.insert(
                    actor_id.clone(),
                    format!(
                        "Round {}: Kill({}) | via mafia consensus",
                        self.round,
                        if name.is_empty() { "none" } else { &name }
                    ),
                );
            }
            self.state
                .game_log
                .push(format!("[NIGHT][MAFIA_CONSENSUS] target={consensus}"));
        }
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    fn resolve_night_actions(&mut self) {
        if self.state.night_actions.is_empty() {
            self.append_system("The night was quiet.");
            return;
        }

        let mut doctor_save = String::new();
        let mut mafia_targets: Vec<String> = Vec::new();

        // Seat order keeps the resolve log deterministic.
        let actors: Vec<(String, Role, bool)> = self
            .players
            .iter()
            .map(|p| (p.id.clone(), p.role, p.is_alive))
            .collect();
        for (pid, role, alive) in actors {
            if !alive {
                continue;
            }
            let Some(raw) = self.state.night_actions.get(&pid) else {
                continue;
            };
            let Some(action) = safe_parse_json(raw).as_ref().and_then(to_night_action) else {
                continue;
            };
            let exclude = if role == Role::Doctor { "" } else { pid.as_str() };
            let target_id = self.normalize_target_id(&action.target, exclude);
            if role == Role::Mafia && action.action == "Kill" {
                mafia_targets.push(target_id.clone());
            }
            if role == Role::Doctor && action.action == "Save" {
                doctor_save = target_id.clone();
            }
            if self.master_mode {
                self.state.game_log.push(format!(
                    "[MASTER][NIGHT_RESOLVE] {pid} action={} target={}",
                    action.action,
                    if target_id.is_empty() { "<none>" } else { &target_id }
                ));
            }
        }

        let living: Vec<String> = mafia_targets
            .into_iter()
            .filter(|id| self.is_alive_target(id))
            .collect();
        let mut mafia_target = self.pick_consensus_target(&living);
        if mafia_target.is_empty() {
            mafia_target = self.pick_fallback_target("");
        }

        match self.players.iter().position(|p| p.id == mafia_target) {
            None => self.append_system("No valid night target."),
            Some(_) if !doctor_save.is_empty() && doctor_save == mafia_target => {
                let name = self.player_name_from_ref(&mafia_target);
                self.append_system(&format!("{name} was attacked but survived."));
            }
            Some(idx) => {
                self.players[idx].is_alive = false;
                let victim_name = self.players[idx].display_name.clone();
                self.record_elimination(EliminationRecord {
                    round: self.round,
                    phase: self.current_phase,
                    player_id: self.players[idx].id.clone(),
                    name: victim_name.clone(),
                    cause: EliminationCause::Night,
                });
                self.append_system(&format!("{victim_name} was eliminated during the night."));
            }
        }
        self.state.night_actions.clear();
    }

    fn resolve_voting(&mut self) {
        if self.state.votes.is_empty() {
            self.append_system("No votes were cast.");
            self.check_win_conditions();
            return;
        }

        // First-vote order keeps the tally line stable.
        let mut tally: Vec<(String, usize)> = Vec::new();
        let voters: Vec<String> = self.players.iter().map(|p| p.id.clone()).collect();
        for voter_id in voters {
            let Some(target) = self.state.votes.get(&voter_id) else {
                continue;
            };
            if target.is_empty() {
                continue;
            }
            match tally.iter_mut().find(|(id, _)| id == target) {
                Some((_, count)) => *count += 1,
                None => tally.push((target.clone(), 1)),
            }
        }
        if !tally.is_empty() {
            let text = tally
                .iter()
                .map(|(id, count)| format!("{}:{}", self.player_name_from_ref(id), count))
                .collect::<Vec<_>>()
                .join(", ");
            self.append_system(&format!("Vote tally: {text}"));
        }

        let (eliminated_id, tied) = vote_result(&tally);
        if tied {
            self.append_system("Vote tied. Nobody is ejected.");
        } else {
            match self
                .players
                .iter()
                .position(|p| p.id == eliminated_id && p.is_alive)
            {
                Some(idx) => {
                    self.players[idx].is_alive = false;
                    let name = self.players[idx].display_name.clone();
                    let role = self.players[idx].role;
                    self.record_elimination(EliminationRecord {
                        round: self.round,
                        phase: self.current_phase,
                        player_id: eliminated_id.clone(),
                        name: name.clone(),
                        cause: EliminationCause::Vote,
                    });
                    self.append_system(&format!(
                        "{name} was voted out. Role revealed: {}.",
                        role.as_str()
                    ));
                    if role == Role::Jester {
                        self.set_winner(Winner::Jester);
                        self.append_system("Jester wins by being eliminated.");
                    }
                }
                None => self.append_system("Voting produced no valid elimination."),
            }
        }

        self.state.votes.clear();
        if self.winner.is_none() {
            self.check_win_conditions();
        }
    }

    fn check_win_conditions(&mut self) {
        let mut mafia_alive = 0usize;
        let mut town_alive = 0usize;
        for p in &self.players {
            if !p.is_alive {
                continue;
            }
            if p.role == Role::Mafia {
                mafia_alive += 1;
            } else {
                town_alive += 1;
            }
        }

        if mafia_alive == 0 {
            self.set_winner(Winner::Town);
            self.append_system("Town wins. All Mafia are eliminated.");
        } else if mafia_alive >= town_alive {
            self.set_winner(Winner::Mafia);
            self.append_system("Mafia wins by parity.");
        }
    }

    fn set_winner(&mut self, winner: Winner) {
        self.winner = Some(winner);
        self.audit(AuditEventKind::Winner, None, Some(winner.as_str()));
        if self.save_to_file_mode {
            let _ = self.save_game_to_file(&format!("winner_{}", winner.as_str()));
        }
    }

    pub fn stop_game_due_to_ai(&mut self, reason: &str) {
        self.abort_reason = if reason.is_empty() {
            "AI failure".to_string()
        } else {
            reason.to_string()
        };
        self.winner = Some(Winner::Aborted);
        self.state
            .game_log
            .push(format!("[FATAL] {}", self.abort_reason));
        let line = format!("Game stopped: {}", self.abort_reason);
        self.append_system(&line);
        let reason = self.abort_reason.clone();
        self.audit(AuditEventKind::Abort, None, Some(&reason));
        self.persist_snapshot("aborted_ai");
    }

    // ── Decision plumbing ─────────────────────────────────────────────────────

    async fn request_ai_decision(&mut self, player: &Player, phase: Phase) -> Value {
        let model = self.get_player_model(&player.id);
        let personal = self
            .state
            .night_action_summary_by_player
            .get(&player.id)
            .cloned()
            .unwrap_or_default();
        let memory = self
            .compactor
            .compress(&self.state.transcript, self.round, &personal);
        let ctx = DecisionContext {
            players: &self.players,
            memory,
        };
        self.director
            .request_decision(player, phase, &ctx, Some(model.as_str()))
            .await
    }

    pub fn capture_raw(&mut self, player_id: &str, raw: &str) {
        self.state
            .last_raw_json_by_player
            .insert(player_id.to_string(), raw.to_string());
        match safe_parse_json(raw) {
            Some(obj) => {
                if is_error_value(&obj) {
                    let msg = obj
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    self.state
                        .game_log
                        .push(format!("[AI_ERROR] {player_id}: {msg}"));
                }
                if let Some(analysis) = obj.get("internal_analysis").filter(|a| !a.is_null()) {
                    self.state
                        .last_internal_analysis_by_player
                        .insert(player_id.to_string(), analysis.to_string());
                    let record = SuspicionRecord {
                        round: self.round,
                        phase: self.current_phase,
                        player_id: player_id.to_string(),
                        most_suspicious: analysis
                            .get("most_suspicious")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                        confidence: analysis.get("confidence").and_then(Value::as_f64),
                    };
                    self.audit_suspicion(&record);
                    self.suspicion_timeline.push(record);
                }
            }
            None => {
                self.state
                    .game_log
                    .push(format!("[WARN] Malformed JSON from {player_id}"));
            }
        }

        let detail = self.describe_ai_for_player(player_id);
        self.audit(AuditEventKind::Decision, Some(player_id), Some(&detail));
        if self.master_mode {
            let line = if self.current_phase == Phase::Night {
                format!(
                    "[MASTER][AI] {player_id} model={} private_night_action",
                    self.get_player_model(player_id)
                )
            } else {
                format!(
                    "[MASTER][AI] {player_id} model={} {detail}",
                    self.get_player_model(player_id)
                )
            };
            self.state.game_log.push(line);
        }
    }

    pub fn describe_ai_for_player(&self, player_id: &str) -> String {
        let Some(raw) = self.state.last_raw_json_by_player.get(player_id) else {
            return "no-ai-output".to_string();
        };
        let Some(o) = safe_parse_json(raw) else {
            return "unparseable-ai-output".to_string();
        };
        if is_error_value(&o) {
            let msg = o.get("message").and_then(Value::as_str).unwrap_or("unknown");
            return format!("error={msg}");
        }
        if let Some(dialogue) = o.get("dialogue").and_then(Value::as_str) {
            return format!("dialogue=\"{}\"", clip(dialogue, 90));
        }
        if let Some(vote) = o.get("vote").and_then(Value::as_str) {
            let name = self.player_name_from_ref(vote);
            let reason = o.get("reasoning").and_then(Value::as_str).unwrap_or("");
            return format!(
                "vote={} reason=\"{}\"",
                if name.is_empty() { "none" } else { &name },
                clip(reason, 70)
            );
        }
        if let Some(action) = o.get("action").and_then(Value::as_str) {
            let target = o.get("target").and_then(Value::as_str).unwrap_or("");
            let name = self.player_name_from_ref(target);
            return format!(
                "action={action} target={}",
                if name.is_empty() { "none" } else { &name }
            );
        }
        "valid-ai-output".to_string()
    }

    // ── Target helpers ────────────────────────────────────────────────────────

    /// Resolves free-form target text (exact id, then case-insensitive id,
    /// then case-insensitive display name) to a living player id, skipping
    /// `exclude_id`. Empty string when nothing matches.
    pub fn normalize_target_id(&self, value: &str, exclude_id: &str) -> String {
        let raw = value.trim();
        if raw.is_empty() {
            return String::new();
        }

        if let Some(p) = self.players.iter().find(|p| p.id == raw) {
            if p.is_alive && p.id != exclude_id {
                return p.id.clone();
            }
        }

        let lower = raw.to_lowercase();
        for p in &self.players {
            if !p.is_alive || p.id == exclude_id {
                continue;
            }
            if p.id.to_lowercase() == lower || p.display_name.to_lowercase() == lower {
                return p.id.clone();
            }
        }
        String::new()
    }

    pub fn is_alive_target(&self, player_id: &str) -> bool {
        self.players
            .iter()
            .any(|p| p.id == player_id && p.is_alive)
    }

    pub fn pick_fallback_target(&self, exclude_id: &str) -> String {
        self.players
            .iter()
            .find(|p| p.is_alive && p.id != exclude_id)
            .map(|p| p.id.clone())
            .unwrap_or_default()
    }

    /// Plurality over the proposed ids; ties break to the lowest seat index
    /// so resolution is order-independent.
    pub fn pick_consensus_target(&self, target_ids: &[String]) -> String {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for id in target_ids.iter().filter(|id| !id.is_empty()) {
            match counts.iter_mut().find(|(seen, _)| seen == id) {
                Some((_, count)) => *count += 1,
                None => counts.push((id.clone(), 1)),
            }
        }

        let mut best_id = String::new();
        let mut best_count = 0usize;
        let mut best_index = usize::MAX;
        for (id, count) in counts {
            let idx = self
                .players
                .iter()
                .position(|p| p.id == id)
                .unwrap_or(usize::MAX);
            if count > best_count || (count == best_count && idx < best_index) {
                best_id = id;
                best_count = count;
                best_index = idx;
            }
        }
        best_id
    }

    pub fn player_name_from_ref(&self, value: &str) -> String {
        if value.is_empty() {
            return String::new();
        }
        if let Some(p) = self.players.iter().find(|p| p.id == value) {
            return p.display_name.clone();
        }
        let lower = value.to_lowercase();
        for p in &self.players {
            if p.display_name.to_lowercase() == lower {
                return p.display_name.clone();
            }
        }
        value.to_string()
    }

    // ── Transcript helpers ────────────────────────────────────────────────────

    fn append_speech(&mut self, speaker: &str, message: &str, phase_tag: &str) {
        let tag = if phase_tag.is_empty() {
            String::new()
        } else {
            format!("[{phase_tag}]")
        };
        self.state
            .append_transcript(format!("{tag}[{speaker}] {message}"));
    }

    fn append_system(&mut self, message: &str) {
        let phase_tag = if self.current_phase == Phase::Night {
            format!("Night {}", self.round)
        } else {
            format!("Day {}", self.round)
        };
        self.state
            .append_transcript(format!("[{phase_tag}][System] {message}"));
    }

    fn bound_speech(&mut self, player_id: &str, text: &str) -> String {
        let cleaned = clean_message(text);
        let safe = if cleaned.is_empty() {
            "...".to_string()
        } else {
            cleaned
        };
        let used = self
            .spoken_chars_this_round
            .get(player_id)
            .copied()
            .unwrap_or(0);
        let room = self
            .max_speech_chars_per_round
            .saturating_sub(used)
            .min(self.max_speech_chars_per_message)
            .max(1);
        let bounded = trim_at_word_boundary(&safe, room);
        if bounded.chars().count() < safe.chars().count() {
            self.state
                .game_log
                .push(format!("[WARN] Speech truncated for {player_id}"));
        }
        self.spoken_chars_this_round
            .insert(player_id.to_string(), used + bounded.chars().count());
        bounded
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    fn persistence_enabled(&self) -> bool {
        self.always_write_logs_to_file || self.save_to_file_mode
    }

    fn persist_snapshot(&mut self, tag: &str) {
        if !self.persistence_enabled() {
            return;
        }
        // Snapshot failures never interrupt the game loop.
        let _ = self.save_game_to_file(tag);
    }

    pub fn save_game_to_file(&mut self, tag: &str) -> Result<String> {
        let payload = self.build_save_payload();
        if self.session_text_save_path.is_empty() {
            self.session_text_save_path = PathBuf::from(&self.save_dir)
                .join(format!("session_{}.txt", self.session_id))
                .to_string_lossy()
                .into_owned();
        }
        let path = PathBuf::from(&self.session_text_save_path);
        snapshot::write_report(&path, &payload)?;
        self.last_saved_path = self.session_text_save_path.clone();
        self.state
            .game_log
            .push(format!("[SAVE] {} ({tag})", self.session_text_save_path));
        self.audit(AuditEventKind::Save, None, Some(tag));
        Ok(self.session_text_save_path.clone())
    }

    pub fn build_save_payload(&self) -> SavePayload {
        let players = self
            .players
            .iter()
            .map(|p| PlayerReport {
                id: p.id.clone(),
                name: p.display_name.clone(),
                role: p.role.as_str().to_string(),
                alive: p.is_alive,
                model: self.get_player_model(&p.id),
            })
            .collect();
        let night_actions = self
            .players
            .iter()
            .filter_map(|p| {
                self.state
                    .night_action_summary_by_player
                    .get(&p.id)
                    .map(|summary| NightSummary {
                        player_id: p.id.clone(),
                        summary: summary.clone(),
                    })
            })
            .collect();
        let diagnostics = self
            .players
            .iter()
            .map(|p| {
                let internal = self
                    .state
                    .last_internal_analysis_by_player
                    .get(&p.id)
                    .cloned()
                    .unwrap_or_default();
                AiDiagnostics {
                    player_id: p.id.clone(),
                    display_name: p.display_name.clone(),
                    raw_json: self
                        .state
                        .last_raw_json_by_player
                        .get(&p.id)
                        .cloned()
                        .unwrap_or_default(),
                    internal_monologue: snapshot::extract_monologue(&internal),
                    internal_analysis: internal,
                    night_summary: self
                        .state
                        .night_action_summary_by_player
                        .get(&p.id)
                        .cloned()
                        .unwrap_or_default(),
                }
            })
            .collect();

        SavePayload {
            session_id: self.session_id,
            round: self.round,
            phase: self.current_phase.as_str().to_string(),
            winner: self
                .winner
                .map(|w| w.as_str().to_string())
                .unwrap_or_default(),
            abort_reason: self.abort_reason.clone(),
            players,
            transcript: self.state.transcript.clone(),
            log: self.state.game_log.clone(),
            night_actions,
            diagnostics,
        }
    }

    fn audit(&self, event: AuditEventKind, player: Option<&str>, detail: Option<&str>) {
        if let Some(logger) = &self.audit_log {
            let _ = logger.write(AuditRecord {
                event,
                round: self.round,
                phase: self.current_phase,
                player,
                detail,
            });
        }
    }

    fn record_elimination(&mut self, record: EliminationRecord) {
        if let Some(logger) = &self.audit_log {
            let detail = format!("{} cause={}", record.name, record.cause.as_str());
            let _ = logger.write(AuditRecord {
                event: AuditEventKind::Elimination,
                round: record.round,
                phase: record.phase,
                player: Some(&record.player_id),
                detail: Some(&detail),
            });
        }
        self.elimination_order.push(record);
    }

    fn audit_suspicion(&self, record: &SuspicionRecord) {
        if let Some(logger) = &self.audit_log {
            let confidence = record
                .confidence
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string());
            let detail = format!(
                "most_suspicious={} confidence={confidence}",
                if record.most_suspicious.is_empty() {
                    "none"
                } else {
                    &record.most_suspicious
                }
            );
            let _ = logger.write(AuditRecord {
                event: AuditEventKind::Suspicion,
                round: record.round,
                phase: record.phase,
                player: Some(&record.player_id),
                detail: Some(&detail),
            });
        }
    }
}

// ── Free helpers ──────────────────────────────────────────────────────────────

fn stub_roster(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let base = STUB_PLAYER_NAMES[i % STUB_PLAYER_NAMES.len()];
            match i / STUB_PLAYER_NAMES.len() {
                0 => base.to_string(),
                cycle => format!("{base}{}", cycle + 1),
            }
        })
        .collect()
}

fn night_reason(night: &NightAction) -> String {
    if !night.reasoning.is_empty() {
        return night.reasoning.clone();
    }
    if let Some(plan) = night.internal_analysis.get("plan").and_then(Value::as_str) {
        if !plan.is_empty() {
            return plan.to_string();
        }
    }
    if let Some(confidence) = night
        .internal_analysis
        .get("confidence")
        .and_then(Value::as_f64)
    {
        return format!("confidence={confidence}");
    }
    String::new()
}

/// Plurality leader over an ordered tally; any tie among leaders blocks the
/// elimination.
fn vote_result(tally: &[(String, usize)]) -> (String, bool) {
    let mut top_votes = 0usize;
    let mut leaders: Vec<&str> = Vec::new();
    for (target, votes) in tally {
        if *votes > top_votes {
            top_votes = *votes;
            leaders.clear();
            leaders.push(target);
        } else if *votes == top_votes {
            leaders.push(target);
        }
    }

    match leaders.len() {
        0 => (String::new(), false),
        1 => (leaders[0].to_string(), false),
        _ => (String::new(), true),
    }
}

fn clean_message(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trim_at_word_boundary(text: &str, max_len: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return text.to_string();
    }
    let cut = &chars[..max_len.max(1)];
    let threshold = max_len * 6 / 10;
    match cut.iter().rposition(|c| *c == ' ') {
        Some(pos) if pos >= threshold => {
            format!("{}...", cut[..pos].iter().collect::<String>())
        }
        _ => format!("{}...", cut.iter().collect::<String>()),
    }
}

fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
