use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::{Value, json};

use crate::types::{AuditEventKind, Phase};

const DETAIL_LIMIT_CHARS: usize = 600;

/// Append-only JSONL trail beside the session report. One line per engine
/// event so a session can be replayed or diffed after the fact.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    path: PathBuf,
    run_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct AuditRecord<'a> {
    pub event: AuditEventKind,
    pub round: u32,
    pub phase: Phase,
    pub player: Option<&'a str>,
    pub detail: Option<&'a str>,
}

impl AuditLogger {
    pub fn new(save_dir: &Path, session_id: u32) -> Self {
        let path = save_dir.join(format!("session_{session_id}.jsonl"));
        let run_id = format!("mafia-{}", Local::now().format("%Y%m%d-%H%M%S"));
        Self { path, run_id }
    }

    pub fn write(&self, rec: AuditRecord<'_>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        writeln!(file, "{}", self.render_line(&rec))?;
        Ok(())
    }

    fn render_line(&self, rec: &AuditRecord<'_>) -> Value {
        json!({
            "ts": Local::now().to_rfc3339(),
            "run_id": self.run_id,
            "event": rec.event.as_str(),
            "round": rec.round,
            "phase": rec.phase.as_str(),
            "player": rec.player,
            "detail": rec.detail.map(|d| truncate_chars(d, DETAIL_LIMIT_CHARS)),
        })
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    if max_chars <= 14 {
        return s.chars().take(max_chars).collect();
    }
    let keep = max_chars - 13;
    let truncated: String = s.chars().take(keep).collect();
    format!("{truncated}…(truncated)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_detail_passes_through() {
        assert_eq!(truncate_chars("vote=Flynn", 600), "vote=Flynn");
        assert_eq!(truncate_chars("", 600), "");
    }

    #[test]
    fn long_detail_is_truncated_with_marker() {
        let long = "x".repeat(700);
        let out = truncate_chars(&long, 600);
        assert_eq!(out.chars().count(), 600);
        assert!(out.ends_with("…(truncated)"));
    }

    #[test]
    fn tiny_limits_skip_the_marker() {
        assert_eq!(truncate_chars("abcdefghijklmnop", 5), "abcde");
    }

    #[test]
    fn record_line_carries_event_fields() {
        let logger = AuditLogger::new(Path::new("saved_games"), 3);
        let line = logger.render_line(&AuditRecord {
            event: AuditEventKind::Elimination,
            round: 2,
            phase: Phase::Results,
            player: Some("player_4"),
            detail: Some("Vote"),
        });
        assert_eq!(line["event"], "elimination");
        assert_eq!(line["round"], 2);
        assert_eq!(line["phase"], "Results");
        assert_eq!(line["player"], "player_4");
        assert_eq!(line["detail"], "Vote");
        assert!(line["run_id"].as_str().unwrap().starts_with("mafia-"));
    }

    #[test]
    fn absent_fields_serialize_as_null() {
        let logger = AuditLogger::new(Path::new("saved_games"), 1);
        let line = logger.render_line(&AuditRecord {
            event: AuditEventKind::PhaseAdvance,
            round: 1,
            phase: Phase::Night,
            player: None,
            detail: None,
        });
        assert!(line["player"].is_null());
        assert!(line["detail"].is_null());
    }
}
