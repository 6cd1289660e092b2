use super::provider;

pub const DEFAULT_MODEL: &str = "mistral-small-latest";
const MAX_CHAIN_LEN: usize = 5;

const NAME_SUFFIXES: [&str; 10] = [
    "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Gamma", "Hotel", "India", "Juliet",
];

/// Pipeline tuning read once at startup. Mutable fields (`use_llm`,
/// `default_model`) can be flipped from the shell at runtime.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub use_llm: bool,
    pub default_model: String,
    pub max_retries: u32,
    pub strict_mode: bool,
    pub available_models: Vec<String>,
    pub agent_names: Vec<String>,
}

impl AiConfig {
    pub fn from_env() -> Self {
        let default_model =
            env_nonempty("MAFIA_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let available_models = match env_nonempty("MAFIA_MODELS") {
            Some(csv) => dedupe_preserving_order(split_csv(&csv)),
            None => provider::default_available_models(),
        };
        let agent_names = agent_names_for(&default_model);
        Self {
            use_llm: std::env::var("MAFIA_USE_LLM").is_ok_and(|v| v.trim() == "1"),
            default_model,
            max_retries: env_nonempty("MAFIA_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            strict_mode: std::env::var("MAFIA_STRICT_AI").map_or(true, |v| v.trim() != "0"),
            available_models,
            agent_names,
        }
    }

    /// Swaps the default model and rebuilds the derived agent names.
    /// Blank input is rejected.
    pub fn set_default_model(&mut self, model: &str) -> bool {
        let m = model.trim();
        if m.is_empty() {
            return false;
        }
        self.default_model = m.to_string();
        self.agent_names = agent_names_for(&self.default_model);
        true
    }

    /// Display names for `count` seats, cycling the configured list. Repeat
    /// cycles get a numeric suffix so names stay unique (targeting by
    /// display name breaks on duplicates).
    pub fn preferred_player_names(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let base = &self.agent_names[i % self.agent_names.len()];
                match i / self.agent_names.len() {
                    0 => base.clone(),
                    cycle => format!("{base}-{}", cycle + 1),
                }
            })
            .collect()
    }

    /// Requested model first, then the configured list, deduplicated and
    /// capped. Each entry is one full two-stage attempt.
    pub fn build_model_chain(&self, primary: &str) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        for m in std::iter::once(primary).chain(self.available_models.iter().map(String::as_str)) {
            let m = m.trim();
            if m.is_empty() || chain.iter().any(|seen| seen == m) {
                continue;
            }
            chain.push(m.to_string());
            if chain.len() == MAX_CHAIN_LEN {
                break;
            }
        }
        chain
    }
}

fn agent_names_for(default_model: &str) -> Vec<String> {
    if let Some(csv) = env_nonempty("MAFIA_AGENT_NAMES") {
        let names = split_csv(&csv);
        if !names.is_empty() {
            return names;
        }
    }
    NAME_SUFFIXES
        .iter()
        .map(|s| format!("{default_model}-{s}"))
        .collect()
}

pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn dedupe_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_models(models: &[&str]) -> AiConfig {
        AiConfig {
            use_llm: false,
            default_model: "m-default".to_string(),
            max_retries: 2,
            strict_mode: true,
            available_models: models.iter().map(|m| m.to_string()).collect(),
            agent_names: vec!["Ada".to_string(), "Ben".to_string()],
        }
    }

    #[test]
    fn csv_split_trims_and_drops_blanks() {
        assert_eq!(split_csv(" a , b ,, c "), vec!["a", "b", "c"]);
        assert!(split_csv("  ,  ,").is_empty());
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let got = dedupe_preserving_order(
            ["a", "b", "a", "c", "b"].iter().map(|s| s.to_string()).collect(),
        );
        assert_eq!(got, vec!["a", "b", "c"]);
    }

    #[test]
    fn model_chain_puts_primary_first_and_caps_at_five() {
        let cfg = config_with_models(&["m1", "m2", "m3", "m4", "m5", "m6"]);
        let chain = cfg.build_model_chain("m3");
        assert_eq!(chain, vec!["m3", "m1", "m2", "m4", "m5"]);
    }

    #[test]
    fn model_chain_deduplicates_primary() {
        let cfg = config_with_models(&["m1", "m2"]);
        assert_eq!(cfg.build_model_chain("m1"), vec!["m1", "m2"]);
    }

    #[test]
    fn player_names_cycle_with_unique_suffixes() {
        let cfg = config_with_models(&[]);
        assert_eq!(
            cfg.preferred_player_names(5),
            vec!["Ada", "Ben", "Ada-2", "Ben-2", "Ada-3"]
        );
    }

    #[test]
    fn blank_model_switch_is_rejected() {
        let mut cfg = config_with_models(&[]);
        assert!(!cfg.set_default_model("   "));
        assert_eq!(cfg.default_model, "m-default");
        assert!(cfg.set_default_model("m-next"));
        assert_eq!(cfg.default_model, "m-next");
    }
}
