use std::collections::HashMap;

use serde_json::{Map, Value, json};

use super::DecisionContext;
use super::config::AiConfig;
use super::dialogue::{
    extract_player_id_from_text, has_evidence_for_target, is_hard_accusation,
    rewrite_self_reference,
};
use super::extract::parse_possible_json;
use super::fallback::{build_monologue, make_fallback_decision, pick_target, stub_decision};
use super::prompt::{ANALYSIS_SCHEMA, ContextTier, build_prompt, schema_for};
use super::provider::ChatBackend;
use crate::game::player::Player;
use crate::types::{Phase, Role};

/// Error payloads flow through the pipeline as plain JSON values.
pub fn is_error_value(value: &Value) -> bool {
    value
        .get("__error")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Runs the two-stage decision pipeline for every seat at the table.
///
/// Stage A asks the model for a private analysis, Stage B for the public
/// action; both go through bounded invalid-JSON re-prompts, and each model
/// in the chain gets one full two-stage attempt with a progressively
/// smaller prompt. Whatever comes back is repaired into a role-legal
/// decision or rejected, with a last-known-good cache and deterministic
/// fallback behind everything.
pub struct AiDirector {
    pub config: AiConfig,
    backend: Box<dyn ChatBackend>,
    last_good: HashMap<String, Value>,
}

impl AiDirector {
    pub fn new(config: AiConfig, backend: Box<dyn ChatBackend>) -> Self {
        Self {
            config,
            backend,
            last_good: HashMap::new(),
        }
    }

    /// Player ids are reused across games, so cached decisions must not
    /// outlive the session that produced them.
    pub fn clear_cache(&mut self) {
        self.last_good.clear();
    }

    pub async fn request_decision(
        &mut self,
        player: &Player,
        phase: Phase,
        ctx: &DecisionContext<'_>,
        model_override: Option<&str>,
    ) -> Value {
        let primary = model_override
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.default_model)
            .to_string();
        if !self.config.use_llm {
            return stub_decision(player, phase, ctx);
        }

        let schema = schema_for(player.role, phase);
        let chain = self.config.build_model_chain(&primary);
        let mut last_error = "unknown_error".to_string();
        let mut last_raw = String::new();

        for (attempt, model) in chain.iter().enumerate() {
            let tier = ContextTier::for_attempt(attempt);
            let base_prompt = build_prompt(player, phase, ctx, schema, tier);

            let analysis_prompt = format!(
                "{base_prompt}\n\nStage A: Internal analysis only.\nReturn exactly one JSON object with this schema:\n{ANALYSIS_SCHEMA}"
            );
            let analysis = self
                .request_json_with_retry(&analysis_prompt, ANALYSIS_SCHEMA, model)
                .await;
            if is_error_value(&analysis) {
                last_error = error_message(&analysis, "analysis_error");
                last_raw = raw_excerpt(&analysis);
                continue;
            }

            let final_prompt = format!(
                "{base_prompt}\n\nStage B: Final public action.\nInternal analysis JSON:\n{analysis}\nReturn only the final public JSON following the schema."
            );
            let final_obj = self
                .request_json_with_retry(&final_prompt, schema, model)
                .await;
            if is_error_value(&final_obj) {
                last_error = error_message(&final_obj, "json_error");
                last_raw = raw_excerpt(&final_obj);
                continue;
            }

            match self.repair_and_validate(player, phase, ctx, &final_obj, &analysis, model) {
                Some(repaired) => {
                    self.last_good
                        .insert(cache_key(&player.id, phase), repaired.clone());
                    return repaired;
                }
                None => {
                    last_error = "schema_validation_failed".to_string();
                    last_raw = final_obj.to_string();
                }
            }
        }

        // Chain exhausted: replay the last decision this seat validated.
        if let Some(cached) = self.last_good.get(&cache_key(&player.id, phase)) {
            let mut with_meta = cached.clone();
            let mut analysis = cached
                .get("internal_analysis")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            analysis.insert("source".to_string(), json!("cached_last_good"));
            analysis.insert("error".to_string(), json!(last_error));
            if let Some(obj) = with_meta.as_object_mut() {
                obj.insert("internal_analysis".to_string(), Value::Object(analysis));
            }
            return with_meta;
        }

        if self.config.strict_mode && self.config.use_llm {
            return json!({
                "__error": true,
                "fatal": true,
                "message": format!("AI decision failed: {last_error}"),
                "raw": last_raw
            });
        }
        make_fallback_decision(player, phase, ctx, &last_error, &last_raw)
    }

    /// One prompt, bounded re-prompting. Invalid JSON swaps in a stricter
    /// repair prompt for the next try; transport errors retry the same
    /// prompt and only surface after the budget is spent.
    async fn request_json_with_retry(&self, prompt: &str, schema: &str, model: &str) -> Value {
        let mut current_prompt = prompt.to_string();
        let mut last_raw = String::new();
        for i in 0..=self.config.max_retries {
            match self.backend.chat(&current_prompt, model).await {
                Ok(raw) => {
                    last_raw = raw;
                    if let Some(value) = parse_possible_json(&last_raw) {
                        return value;
                    }
                    if i < self.config.max_retries {
                        current_prompt = format!(
                            "Your previous output was invalid JSON. Return only valid JSON matching this schema: {schema}. Output must be a single JSON object and nothing else.\n\nOriginal prompt:\n{prompt}"
                        );
                    }
                }
                Err(err) => {
                    if i >= self.config.max_retries {
                        return json!({
                            "__error": true,
                            "message": format!("{err:#}"),
                            "raw": last_raw
                        });
                    }
                }
            }
        }
        json!({ "__error": true, "message": "invalid_json", "raw": last_raw })
    }

    /// Forces a syntactically valid reply into a role-legal decision, or
    /// rejects it so the next model gets a turn. Never returns a partially
    /// illegal object.
    fn repair_and_validate(
        &self,
        player: &Player,
        phase: Phase,
        ctx: &DecisionContext<'_>,
        final_obj: &Value,
        analysis: &Value,
        model: &str,
    ) -> Option<Value> {
        let mut o: Map<String, Value> = final_obj.as_object()?.clone();
        let alive = ctx.alive();
        let fallback_target = pick_target(&player.id, &alive);

        match phase {
            Phase::Night => {
                let mut action = o
                    .get("action")
                    .and_then(Value::as_str)
                    .filter(|a| !a.is_empty())?
                    .to_string();
                if player.role.has_night_action()
                    && !player.role.night_verbs().contains(&action.as_str())
                {
                    action = "DoNothing".to_string();
                }

                let requested = o.get("target").and_then(Value::as_str).unwrap_or("");
                let mut target = extract_player_id_from_text(requested, &alive, &player.id);
                if target.is_empty() {
                    target = fallback_target;
                }
                if action == "DoNothing" {
                    target = String::new();
                }

                let dialogue = o.get("dialogue").and_then(Value::as_str).unwrap_or("");
                let dialogue = rewrite_self_reference(dialogue, player, ctx.players);

                if player.role == Role::Detective {
                    let verdict = o
                        .get("investigationResult")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    if !["Town", "Mafia", "Unknown"].contains(&verdict) {
                        o.insert("investigationResult".to_string(), json!("Unknown"));
                    }
                } else {
                    o.remove("investigationResult");
                }

                o.insert("action".to_string(), json!(action));
                o.insert("target".to_string(), json!(target));
                o.insert("dialogue".to_string(), json!(dialogue));
            }
            Phase::Voting => {
                let requested = o.get("vote").and_then(Value::as_str).unwrap_or("");
                let mut target = extract_player_id_from_text(requested, &alive, &player.id);
                if target.is_empty() {
                    target = fallback_target;
                }

                let reasoning = o
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .unwrap_or("Strategic pressure vote.");
                let mut reasoning = rewrite_self_reference(reasoning, player, ctx.players);
                if !has_evidence_for_target(ctx, &target, &reasoning) {
                    reasoning = format!(
                        "I am voting {} based on current pressure, but evidence is limited and I want more claims reviewed.",
                        ctx.pretty_name(&target)
                    );
                }

                o.insert("vote".to_string(), json!(target));
                o.insert("reasoning".to_string(), json!(reasoning));
            }
            Phase::Discussion | Phase::Results => {
                let should_speak = o
                    .get("shouldSpeak")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let dialogue = o
                    .get("dialogue")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                if should_speak && dialogue.trim().is_empty() {
                    return None;
                }
                let mut dialogue = rewrite_self_reference(&dialogue, player, ctx.players);
                let accused = extract_player_id_from_text(&dialogue, &alive, &player.id);
                if !accused.is_empty()
                    && is_hard_accusation(&dialogue)
                    && !has_evidence_for_target(ctx, &accused, &dialogue)
                {
                    dialogue = format!(
                        "I need stronger evidence before accusing {}. What contradictions do we have?",
                        ctx.pretty_name(&accused)
                    );
                }
                let notes = o
                    .get("strategy_notes")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();

                o.insert("shouldSpeak".to_string(), json!(should_speak));
                o.insert("dialogue".to_string(), json!(dialogue));
                o.insert("strategy_notes".to_string(), json!(notes));
            }
        }

        let action_ref = o
            .get("target")
            .or_else(|| o.get("vote"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let has_analysis = o
            .get("internal_analysis")
            .map(Value::is_object)
            .unwrap_or(false);
        if !has_analysis {
            let attached = if analysis.is_object() && !is_error_value(analysis) {
                analysis.clone()
            } else {
                json!({})
            };
            o.insert("internal_analysis".to_string(), attached);
        }
        if let Some(ia) = o
            .get_mut("internal_analysis")
            .and_then(Value::as_object_mut)
        {
            ia.insert("model".to_string(), json!(model));
            let has_monologue = ia
                .get("monologue")
                .and_then(Value::as_str)
                .is_some_and(|m| !m.trim().is_empty());
            if !has_monologue {
                ia.insert(
                    "monologue".to_string(),
                    json!(build_monologue(player, ctx, &action_ref)),
                );
            }
        }

        Some(Value::Object(o))
    }
}

fn cache_key(player_id: &str, phase: Phase) -> String {
    format!("{}|{}", player_id, phase.as_str())
}

fn error_message(value: &Value, default: &str) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn raw_excerpt(value: &Value) -> String {
    value
        .get("raw")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::memory::CompressedMemory;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        replies: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
        models: Mutex<Vec<String>>,
    }

    impl Script {
        fn push_ok(&self, reply: &str) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Ok(reply.to_string()));
        }
        fn push_err(&self, msg: &str) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(msg.to_string()));
        }
        fn calls(&self) -> usize {
            self.models.lock().unwrap().len()
        }
    }

    struct ScriptHandle(Arc<Script>);

    impl ChatBackend for ScriptHandle {
        fn chat<'a>(
            &'a self,
            prompt: &'a str,
            model: &'a str,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
            self.0.prompts.lock().unwrap().push(prompt.to_string());
            self.0.models.lock().unwrap().push(model.to_string());
            let next = self.0.replies.lock().unwrap().pop_front();
            Box::pin(async move {
                match next {
                    Some(Ok(reply)) => Ok(reply),
                    Some(Err(msg)) => Err(anyhow!(msg)),
                    None => Err(anyhow!("script exhausted")),
                }
            })
        }
    }

    fn table() -> Vec<Player> {
        vec![
            Player::new("p1", "Alex", Role::Mafia),
            Player::new("p2", "Blair", Role::Doctor),
            Player::new("p3", "Casey", Role::Detective),
            Player::new("p4", "Drew", Role::Villager),
            Player::new("p5", "Emery", Role::Jester),
        ]
    }

    fn ctx(players: &[Player]) -> DecisionContext<'_> {
        DecisionContext {
            players,
            memory: CompressedMemory::default(),
        }
    }

    fn config(use_llm: bool, strict: bool, retries: u32, models: &[&str]) -> AiConfig {
        AiConfig {
            use_llm,
            default_model: "m1".to_string(),
            max_retries: retries,
            strict_mode: strict,
            available_models: models.iter().map(|m| m.to_string()).collect(),
            agent_names: vec!["Ada".to_string()],
        }
    }

    fn director_with(config: AiConfig) -> (AiDirector, Arc<Script>) {
        let script = Arc::new(Script::default());
        let director = AiDirector::new(config, Box::new(ScriptHandle(script.clone())));
        (director, script)
    }

    const ANALYSIS_REPLY: &str = r#"{"suspicions":{"p4":70},"most_suspicious":"p4","confidence":60,"plan":"pressure","monologue":"The timing of Drew's vote does not line up with his earlier claim. I will press there."}"#;

    #[tokio::test]
    async fn stub_mode_never_touches_the_backend() {
        let players = table();
        let (mut director, script) = director_with(config(false, true, 2, &[]));
        let decision = director
            .request_decision(&players[0], Phase::Night, &ctx(&players), None)
            .await;
        assert_eq!(decision["action"], "Kill");
        assert_eq!(script.calls(), 0);
    }

    #[tokio::test]
    async fn two_stage_flow_stamps_model_and_caches() {
        let players = table();
        let (mut director, script) = director_with(config(true, true, 0, &[]));
        script.push_ok(ANALYSIS_REPLY);
        script.push_ok(r#"{"vote":"Drew","reasoning":"Drew claimed Doctor but voted against the real claim."}"#);

        let decision = director
            .request_decision(&players[0], Phase::Voting, &ctx(&players), None)
            .await;
        assert_eq!(decision["vote"], "p4");
        assert_eq!(decision["internal_analysis"]["model"], "m1");
        assert_eq!(script.calls(), 2);

        let prompts = script.prompts.lock().unwrap();
        assert!(prompts[0].contains("Stage A: Internal analysis only."));
        assert!(prompts[1].contains("Stage B: Final public action."));
        assert!(prompts[1].contains("most_suspicious"));
    }

    #[tokio::test]
    async fn invalid_json_triggers_repair_prompt() {
        let players = table();
        let (mut director, script) = director_with(config(true, true, 1, &[]));
        script.push_ok("sorry, here you go:");
        script.push_ok(ANALYSIS_REPLY);
        script.push_ok(r#"{"shouldSpeak":false,"dialogue":""}"#);

        let decision = director
            .request_decision(&players[3], Phase::Discussion, &ctx(&players), None)
            .await;
        assert_eq!(decision["shouldSpeak"], false);
        assert_eq!(script.calls(), 3);

        let prompts = script.prompts.lock().unwrap();
        assert!(prompts[1].starts_with("Your previous output was invalid JSON."));
        assert!(prompts[1].contains("Original prompt:"));
    }

    #[tokio::test]
    async fn provider_error_advances_to_next_model() {
        let players = table();
        let (mut director, script) = director_with(config(true, true, 0, &["m2"]));
        script.push_err("m1 is down");
        script.push_ok(ANALYSIS_REPLY);
        script.push_ok(r#"{"action":"Investigate","target":"Drew","investigationResult":"Mafia"}"#);

        let decision = director
            .request_decision(&players[2], Phase::Night, &ctx(&players), None)
            .await;
        assert_eq!(decision["action"], "Investigate");
        assert_eq!(decision["target"], "p4");
        assert_eq!(decision["investigationResult"], "Mafia");
        assert_eq!(
            *script.models.lock().unwrap(),
            vec!["m1".to_string(), "m2".to_string(), "m2".to_string()]
        );
    }

    #[tokio::test]
    async fn exhaustion_replays_last_known_good() {
        let players = table();
        let (mut director, script) = director_with(config(true, true, 0, &[]));
        script.push_ok(ANALYSIS_REPLY);
        script.push_ok(r#"{"vote":"Drew","reasoning":"Drew voted against his own claim."}"#);
        let first = director
            .request_decision(&players[0], Phase::Voting, &ctx(&players), None)
            .await;
        assert_eq!(first["vote"], "p4");

        script.push_err("offline");
        let second = director
            .request_decision(&players[0], Phase::Voting, &ctx(&players), None)
            .await;
        assert_eq!(second["vote"], "p4");
        assert_eq!(second["internal_analysis"]["source"], "cached_last_good");
        assert!(
            second["internal_analysis"]["error"]
                .as_str()
                .unwrap()
                .contains("offline")
        );
    }

    #[tokio::test]
    async fn strict_mode_returns_fatal_error_without_cache() {
        let players = table();
        let (mut director, _script) = director_with(config(true, true, 0, &[]));
        // Script empty: every chat call fails as exhausted.
        let decision = director
            .request_decision(&players[0], Phase::Voting, &ctx(&players), None)
            .await;
        assert!(is_error_value(&decision));
        assert_eq!(decision["fatal"], true);
        assert!(
            decision["message"]
                .as_str()
                .unwrap()
                .starts_with("AI decision failed: ")
        );
    }

    #[tokio::test]
    async fn cleared_cache_falls_back_instead_of_replaying() {
        let players = table();
        let (mut director, script) = director_with(config(true, false, 0, &[]));
        script.push_ok(ANALYSIS_REPLY);
        script.push_ok(r#"{"vote":"Drew","reasoning":"Drew voted against his own claim."}"#);
        let first = director
            .request_decision(&players[0], Phase::Voting, &ctx(&players), None)
            .await;
        assert_eq!(first["vote"], "p4");

        director.clear_cache();
        script.push_err("offline");
        let second = director
            .request_decision(&players[0], Phase::Voting, &ctx(&players), None)
            .await;
        assert_eq!(
            second["internal_analysis"]["source"],
            "fallback_or_salvage"
        );
    }

    #[tokio::test]
    async fn soft_mode_synthesizes_a_fallback() {
        let players = table();
        let (mut director, _script) = director_with(config(true, false, 0, &[]));
        let decision = director
            .request_decision(&players[4], Phase::Discussion, &ctx(&players), None)
            .await;
        assert_eq!(decision["shouldSpeak"], true);
        assert_eq!(
            decision["internal_analysis"]["source"],
            "fallback_or_salvage"
        );
    }

    #[tokio::test]
    async fn model_override_becomes_chain_head() {
        let players = table();
        let (mut director, script) = director_with(config(true, true, 0, &["m1", "m9"]));
        script.push_ok(ANALYSIS_REPLY);
        script.push_ok(r#"{"vote":"p4","reasoning":"Drew claimed and voted inconsistently."}"#);
        director
            .request_decision(&players[0], Phase::Voting, &ctx(&players), Some("m9"))
            .await;
        assert_eq!(script.models.lock().unwrap()[0], "m9");
    }

    // Repair is synchronous; exercise it directly.

    fn repair(
        director: &AiDirector,
        player: &Player,
        phase: Phase,
        ctx: &DecisionContext<'_>,
        obj: Value,
    ) -> Option<Value> {
        director.repair_and_validate(player, phase, ctx, &obj, &json!({}), "m-test")
    }

    #[test]
    fn illegal_night_verb_downgrades_and_clears_target() {
        let players = table();
        let (director, _) = director_with(config(true, true, 0, &[]));
        let out = repair(
            &director,
            &players[0],
            Phase::Night,
            &ctx(&players),
            json!({"action": "Banish", "target": "p2"}),
        )
        .unwrap();
        assert_eq!(out["action"], "DoNothing");
        assert_eq!(out["target"], "");
    }

    #[test]
    fn night_target_resolves_display_names_and_never_self() {
        let players = table();
        let (director, _) = director_with(config(true, true, 0, &[]));
        let out = repair(
            &director,
            &players[0],
            Phase::Night,
            &ctx(&players),
            json!({"action": "Kill", "target": "maybe blair?"}),
        )
        .unwrap();
        assert_eq!(out["target"], "p2");

        let self_vote = repair(
            &director,
            &players[0],
            Phase::Voting,
            &ctx(&players),
            json!({"vote": "Alex", "reasoning": "because Alex said so"}),
        )
        .unwrap();
        assert_ne!(self_vote["vote"], "p1");
    }

    #[test]
    fn investigation_result_is_restricted_to_known_verdicts() {
        let players = table();
        let (director, _) = director_with(config(true, true, 0, &[]));
        let detective = repair(
            &director,
            &players[2],
            Phase::Night,
            &ctx(&players),
            json!({"action": "Investigate", "target": "p4", "investigationResult": "Werewolf"}),
        )
        .unwrap();
        assert_eq!(detective["investigationResult"], "Unknown");

        let mafia = repair(
            &director,
            &players[0],
            Phase::Night,
            &ctx(&players),
            json!({"action": "Kill", "target": "p4", "investigationResult": "Mafia"}),
        )
        .unwrap();
        assert!(mafia.get("investigationResult").is_none());
    }

    #[test]
    fn speaking_with_empty_dialogue_is_rejected() {
        let players = table();
        let (director, _) = director_with(config(true, true, 0, &[]));
        let rejected = repair(
            &director,
            &players[3],
            Phase::Discussion,
            &ctx(&players),
            json!({"shouldSpeak": true, "dialogue": "   "}),
        );
        assert!(rejected.is_none());
        assert!(repair(&director, &players[3], Phase::Night, &ctx(&players), json!("Kill")).is_none());
        assert!(
            repair(
                &director,
                &players[3],
                Phase::Night,
                &ctx(&players),
                json!({"action": ""})
            )
            .is_none()
        );
    }

    #[test]
    fn unbacked_accusation_is_softened() {
        let players = table();
        let (director, _) = director_with(config(true, true, 0, &[]));
        let out = repair(
            &director,
            &players[3],
            Phase::Discussion,
            &ctx(&players),
            json!({"shouldSpeak": true, "dialogue": "Emery is definitely mafia, vote out."}),
        )
        .unwrap();
        assert_eq!(
            out["dialogue"],
            "I need stronger evidence before accusing Emery. What contradictions do we have?"
        );
    }

    #[test]
    fn backed_accusation_survives_repair() {
        let players = table();
        let mut memory = CompressedMemory::default();
        memory.day_memory =
            "[Day 1][Drew] Emery claimed Detective but voted against the confirmed town".to_string();
        let ctx = DecisionContext {
            players: &players,
            memory,
        };
        let (director, _) = director_with(config(true, true, 0, &[]));
        let out = repair(
            &director,
            &players[3],
            Phase::Discussion,
            &ctx,
            json!({"shouldSpeak": true, "dialogue": "Emery is definitely mafia because his claim contradicts the vote record."}),
        )
        .unwrap();
        assert!(out["dialogue"].as_str().unwrap().contains("contradicts"));
    }

    #[test]
    fn vote_without_evidence_gets_cautious_reasoning() {
        let players = table();
        let (director, _) = director_with(config(true, true, 0, &[]));
        let out = repair(
            &director,
            &players[0],
            Phase::Voting,
            &ctx(&players),
            json!({"vote": "p4", "reasoning": "gut feeling"}),
        )
        .unwrap();
        assert_eq!(
            out["reasoning"],
            "I am voting Drew based on current pressure, but evidence is limited and I want more claims reviewed."
        );
    }

    #[test]
    fn missing_monologue_is_synthesized_and_model_stamped() {
        let players = table();
        let (director, _) = director_with(config(true, true, 0, &[]));
        let out = repair(
            &director,
            &players[0],
            Phase::Voting,
            &ctx(&players),
            json!({"vote": "p4", "reasoning": "Drew voted oddly because of pressure", "internal_analysis": {"confidence": 55}}),
        )
        .unwrap();
        assert_eq!(out["internal_analysis"]["model"], "m-test");
        assert_eq!(out["internal_analysis"]["confidence"], 55);
        let monologue = out["internal_analysis"]["monologue"].as_str().unwrap();
        assert!(monologue.contains("I am weighing"));
    }

    #[test]
    fn self_reference_is_rewritten_in_dialogue() {
        let players = table();
        let (director, _) = director_with(config(true, true, 0, &[]));
        let out = repair(
            &director,
            &players[1],
            Phase::Discussion,
            &ctx(&players),
            json!({"shouldSpeak": true, "dialogue": "Blair thinks p4 is acting oddly."}),
        )
        .unwrap();
        assert_eq!(out["dialogue"], "I thinks Drew is acting oddly.");
    }
}
