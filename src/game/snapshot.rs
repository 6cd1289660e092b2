use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::ai::schema::safe_parse_json;

/// Everything the report needs, detached from live engine state so rendering
/// stays a pure function.
#[derive(Debug, Clone)]
pub struct SavePayload {
    pub session_id: u32,
    pub round: u32,
    pub phase: String,
    pub winner: String,
    pub abort_reason: String,
    pub players: Vec<PlayerReport>,
    pub transcript: Vec<String>,
    pub log: Vec<String>,
    pub night_actions: Vec<NightSummary>,
    pub diagnostics: Vec<AiDiagnostics>,
}

#[derive(Debug, Clone)]
pub struct PlayerReport {
    pub id: String,
    pub name: String,
    pub role: String,
    pub alive: bool,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct NightSummary {
    pub player_id: String,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct AiDiagnostics {
    pub player_id: String,
    pub display_name: String,
    pub raw_json: String,
    pub internal_analysis: String,
    pub internal_monologue: String,
    pub night_summary: String,
}

pub fn write_report(path: &Path, payload: &SavePayload) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create `{}`", parent.display()))?;
    }
    fs::write(path, render_report(payload))
        .with_context(|| format!("failed to write `{}`", path.display()))
}

pub fn render_report(payload: &SavePayload) -> String {
    let mut lines: Vec<String> = vec![
        format!("Session: {}", payload.session_id),
        format!("Winner: {}", nonempty_or(&payload.winner, "none")),
        format!("Abort reason: {}", nonempty_or(&payload.abort_reason, "none")),
        format!("Round: {}", payload.round),
        format!("Phase: {}", payload.phase),
        String::new(),
        "Players:".to_string(),
    ];
    for p in &payload.players {
        lines.push(format!(
            "- {} ({}) role={} alive={} model={}",
            p.name, p.id, p.role, p.alive, p.model
        ));
    }

    lines.push(String::new());
    lines.push("Night Actions:".to_string());
    if payload.night_actions.is_empty() {
        lines.push("- <none>".to_string());
    } else {
        for entry in &payload.night_actions {
            lines.push(format!("- {}: {}", entry.player_id, entry.summary));
        }
    }

    lines.push(String::new());
    lines.push("AI Internal Thoughts / Reasoning:".to_string());
    for d in &payload.diagnostics {
        lines.push(format!("- {} ({})", d.display_name, d.player_id));
        lines.push(format!("  night: {}", nonempty_or(&d.night_summary, "<none>")));
        lines.push(format!(
            "  monologue: {}",
            nonempty_or(&d.internal_monologue, "<none>")
        ));
        lines.push(format!("  raw: {}", nonempty_or(&d.raw_json, "<none>")));
        lines.push(format!(
            "  internal: {}",
            nonempty_or(&d.internal_analysis, "<none>")
        ));
    }

    lines.push(String::new());
    lines.push("Transcript:".to_string());
    lines.extend(payload.transcript.iter().map(|l| format!("- {l}")));

    lines.push(String::new());
    lines.push("Log:".to_string());
    lines.extend(payload.log.iter().map(|l| format!("- {l}")));

    lines.join("\n")
}

/// Pulls the private monologue out of a stored internal-analysis blob.
pub fn extract_monologue(analysis_raw: &str) -> String {
    safe_parse_json(analysis_raw)
        .as_ref()
        .and_then(|v| v.get("monologue"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn nonempty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}
