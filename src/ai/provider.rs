use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{dedupe_preserving_order, split_csv};

pub const DEFAULT_PROVIDER_CHAIN: &str = "mistral,openrouter,together,groq";

const SYSTEM_PROMPT: &str = "You are a strategic Mafia game agent. Return only requested content.";

// ── Chat capability ───────────────────────────────────────────────────────────

/// Anything that can turn a prompt into raw model text. The decision
/// pipeline only talks through this seam, so tests can script replies and
/// the live path can swap provider stacks freely.
pub trait ChatBackend: Send + Sync {
    fn chat<'a>(
        &'a self,
        prompt: &'a str,
        model: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

// ── Wire types (OpenAI-compatible chat completions) ───────────────────────────

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f64,
    top_p: f64,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

// ── HTTP client builder ───────────────────────────────────────────────────────

pub fn build_http_client() -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();

    if let Ok(proxy_url) = std::env::var("HTTP_PROXY") {
        builder = builder.proxy(reqwest::Proxy::all(&proxy_url)?);
    }

    let timeout_ms = std::env::var("API_TIMEOUT_MS")
        .ok()
        .and_then(|ms| ms.parse::<u64>().ok())
        .unwrap_or(45_000);
    builder = builder
        .timeout(Duration::from_millis(timeout_ms))
        .connect_timeout(Duration::from_secs(10));

    builder.build().map_err(Into::into)
}

// ── Provider table ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Mistral,
    OpenRouter,
    Together,
    Groq,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mistral" => Some(ProviderKind::Mistral),
            "openrouter" => Some(ProviderKind::OpenRouter),
            "together" => Some(ProviderKind::Together),
            "groq" => Some(ProviderKind::Groq),
            _ => None,
        }
    }
}

struct ProviderConfig {
    name: &'static str,
    url: String,
    api_key: String,
    default_models: Vec<String>,
}

fn provider_config(kind: ProviderKind) -> ProviderConfig {
    match kind {
        ProviderKind::Mistral => ProviderConfig {
            name: "mistral",
            url: env_or("MISTRAL_BASE_URL", "https://api.mistral.ai/v1/chat/completions"),
            api_key: first_env(&["MISTRAL_API_KEY", "MISTRAL_KEY"]),
            default_models: csv_models(
                "MISTRAL_MODELS",
                &[
                    "mistral-small-latest",
                    "mistral-medium-latest",
                    "mistral-large-latest",
                ],
            ),
        },
        ProviderKind::OpenRouter => ProviderConfig {
            name: "openrouter",
            url: env_or(
                "OPENROUTER_BASE_URL",
                "https://openrouter.ai/api/v1/chat/completions",
            ),
            api_key: first_env(&["OPENROUTER_API_KEY", "OPENROUTER_KEY"]),
            default_models: csv_models_with(
                "OPENROUTER_MODELS",
                vec![
                    first_env(&["OPENROUTER_MODEL"]),
                    "mistralai/mistral-small-3.1-24b-instruct".to_string(),
                ],
            ),
        },
        ProviderKind::Together => ProviderConfig {
            name: "together",
            url: env_or(
                "TOGETHER_BASE_URL",
                "https://api.together.xyz/v1/chat/completions",
            ),
            api_key: first_env(&["TOGETHER_API_KEY", "TOGETHER_KEY"]),
            default_models: csv_models_with(
                "TOGETHER_MODELS",
                vec![
                    first_env(&["TOGETHER_MODEL"]),
                    "mistralai/Mistral-7B-Instruct-v0.3".to_string(),
                ],
            ),
        },
        ProviderKind::Groq => ProviderConfig {
            name: "groq",
            url: env_or("GROQ_BASE_URL", "https://api.groq.com/openai/v1/chat/completions"),
            api_key: first_env(&["GROQ_API_KEY", "GROQ_KEY"]),
            default_models: csv_models_with(
                "GROQ_MODELS",
                vec![
                    first_env(&["GROQ_MODEL"]),
                    "llama-3.3-70b-versatile".to_string(),
                    "llama-3.1-8b-instant".to_string(),
                ],
            ),
        },
    }
}

/// Union of every provider's candidate models, in default chain order.
/// Feeds the pipeline's available-model list when `MAFIA_MODELS` is unset.
pub fn default_available_models() -> Vec<String> {
    let mut all = Vec::new();
    for kind in [
        ProviderKind::Mistral,
        ProviderKind::OpenRouter,
        ProviderKind::Together,
        ProviderKind::Groq,
    ] {
        all.extend(provider_config(kind).default_models);
    }
    dedupe_preserving_order(all)
}

/// Provider order for live calls. `MAFIA_AI_PROVIDER` forces a single
/// provider; otherwise `MAFIA_PROVIDER_CHAIN` (or the default) is used.
pub fn resolve_provider_chain() -> Vec<String> {
    let forced = std::env::var("MAFIA_AI_PROVIDER")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if !forced.is_empty() && forced != "auto" {
        return vec![forced];
    }
    let raw = std::env::var("MAFIA_PROVIDER_CHAIN")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROVIDER_CHAIN.to_string());
    parse_chain(&raw)
}

fn parse_chain(raw: &str) -> Vec<String> {
    dedupe_preserving_order(
        raw.split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

// ── Provider chain ────────────────────────────────────────────────────────────

/// Live backend: walks the configured providers in order until one returns
/// usable text. Within a provider, the requested model is tried first, then
/// that provider's own candidate models.
pub struct ProviderChain {
    client: reqwest::Client,
    providers: Vec<String>,
}

impl ProviderChain {
    pub fn from_env(client: reqwest::Client) -> Self {
        Self {
            client,
            providers: resolve_provider_chain(),
        }
    }

    pub fn provider_names(&self) -> &[String] {
        &self.providers
    }

    pub async fn chat_once(&self, prompt: &str, model: &str) -> Result<String> {
        let mut last_err: Option<anyhow::Error> = None;
        for name in &self.providers {
            match chat_with_provider(&self.client, name, prompt, model).await {
                Ok(text) => return Ok(text),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("No AI provider available.")))
    }

    /// One-shot connectivity check used by the shell.
    pub async fn probe(&self, model: &str) -> Result<String> {
        let prompt = concat!(
            "Return exactly this JSON and nothing else: ",
            r#"{"ping":"pong"}"#
        );
        self.chat_once(prompt, model).await
    }
}

impl ChatBackend for ProviderChain {
    fn chat<'a>(
        &'a self,
        prompt: &'a str,
        model: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.chat_once(prompt, model))
    }
}

async fn chat_with_provider(
    client: &reqwest::Client,
    name: &str,
    prompt: &str,
    model: &str,
) -> Result<String> {
    let Some(kind) = ProviderKind::parse(name) else {
        bail!("Unsupported provider: {name}");
    };
    openai_compat_chat(client, &provider_config(kind), prompt, model).await
}

async fn openai_compat_chat(
    client: &reqwest::Client,
    cfg: &ProviderConfig,
    prompt: &str,
    model: &str,
) -> Result<String> {
    let candidates = merge_candidates(model, &cfg.default_models);
    let mut missing: Vec<&str> = Vec::new();
    if cfg.url.is_empty() {
        missing.push("base_url");
    }
    if cfg.api_key.is_empty() {
        missing.push("api_key");
    }
    if candidates.is_empty() {
        missing.push("model");
    }
    if !missing.is_empty() {
        bail!("{} not configured: missing {}", cfg.name, missing.join(", "));
    }

    let temperature = env_f64("MAFIA_PROVIDER_TEMPERATURE", 0.2);
    let top_p = env_f64("MAFIA_PROVIDER_TOP_P", 0.2);

    let mut last_err: Option<anyhow::Error> = None;
    for candidate in &candidates {
        let body = ApiRequest {
            model: candidate.clone(),
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ApiMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            temperature,
            top_p,
        };

        let resp = client
            .post(&cfg.url)
            .header("Authorization", format!("Bearer {}", cfg.api_key))
            .json(&body)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if status.is_success() {
            let content = serde_json::from_str::<ApiResponse>(&text)
                .ok()
                .and_then(|p| p.choices.into_iter().next())
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            if !content.is_empty() {
                return Ok(content);
            }
            last_err = Some(anyhow!(
                "{} returned empty content for model {}",
                cfg.name,
                candidate
            ));
            continue;
        }

        let msg = error_message_from_body(&text);
        last_err = Some(anyhow!(
            "{} error {} [{}]: {}",
            cfg.name,
            status.as_u16(),
            candidate,
            clip_chars(&msg, 220)
        ));
    }
    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed", cfg.name)))
}

/// Error detail from a provider reply: `error.message` when present, the
/// whole error object otherwise, else the raw body.
fn error_message_from_body(raw: &str) -> String {
    let Ok(obj) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };
    match obj.get("error") {
        Some(err) => err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string()),
        None => raw.to_string(),
    }
}

fn merge_candidates(requested: &str, defaults: &[String]) -> Vec<String> {
    let mut all: Vec<String> = Vec::with_capacity(defaults.len() + 1);
    let requested = requested.trim();
    if !requested.is_empty() {
        all.push(requested.to_string());
    }
    all.extend(defaults.iter().cloned());
    dedupe_preserving_order(all)
}

fn clip_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn first_env(keys: &[&str]) -> String {
    for key in keys {
        if let Ok(v) = std::env::var(key) {
            let v = v.trim();
            if !v.is_empty() {
                return v.to_string();
            }
        }
    }
    String::new()
}

fn env_or(key: &str, default: &str) -> String {
    let v = first_env(&[key]);
    if v.is_empty() { default.to_string() } else { v }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn csv_models(env_key: &str, defaults: &[&str]) -> Vec<String> {
    csv_models_with(env_key, defaults.iter().map(|s| s.to_string()).collect())
}

fn csv_models_with(env_key: &str, defaults: Vec<String>) -> Vec<String> {
    let raw = first_env(&[env_key]);
    if !raw.is_empty() {
        return split_csv(&raw);
    }
    defaults.into_iter().filter(|m| !m.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_the_completions_shape() {
        let body = ApiRequest {
            model: "mistral-small-latest".to_string(),
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ApiMessage {
                    role: "user",
                    content: "Hi".to_string(),
                },
            ],
            temperature: 0.2,
            top_p: 0.2,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "mistral-small-latest");
        assert_eq!(json["temperature"], 0.2);
        assert_eq!(json["top_p"], 0.2);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(
            json["messages"][0]["content"],
            "You are a strategic Mafia game agent. Return only requested content."
        );
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn response_content_is_the_first_choice() {
        let json = r#"{"choices":[{"message":{"content":"{\"vote\":\"p2\"}"}},{"message":{"content":"ignored"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(json).unwrap();
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap();
        assert_eq!(content, "{\"vote\":\"p2\"}");
    }

    #[test]
    fn error_body_prefers_the_error_message() {
        assert_eq!(
            error_message_from_body(r#"{"error":{"message":"Invalid API key"}}"#),
            "Invalid API key"
        );
        let whole = error_message_from_body(r#"{"error":{"code":429}}"#);
        assert!(whole.contains("429"));
        assert_eq!(error_message_from_body("plain failure"), "plain failure");
    }

    #[test]
    fn candidates_keep_requested_model_first() {
        let defaults = vec!["m1".to_string(), "m2".to_string()];
        assert_eq!(merge_candidates("m2", &defaults), vec!["m2", "m1"]);
        assert_eq!(merge_candidates("  ", &defaults), vec!["m1", "m2"]);
        assert_eq!(merge_candidates("mx", &defaults), vec!["mx", "m1", "m2"]);
    }

    #[test]
    fn chain_parsing_lowercases_and_dedupes() {
        assert_eq!(
            parse_chain("Mistral, groq,,mistral"),
            vec!["mistral", "groq"]
        );
        assert!(parse_chain("  ,").is_empty());
    }

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!(ProviderKind::parse("Groq"), Some(ProviderKind::Groq));
        assert_eq!(ProviderKind::parse("openrouter"), Some(ProviderKind::OpenRouter));
        assert_eq!(ProviderKind::parse("puter"), None);
    }

    #[test]
    fn clip_chars_is_char_safe() {
        assert_eq!(clip_chars("abcdef", 3), "abc");
        assert_eq!(clip_chars("héé", 2), "hé");
        assert_eq!(clip_chars("ab", 10), "ab");
    }
}
