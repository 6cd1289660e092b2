use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use serde_json::json;
use tokio::sync::mpsc;

use crate::ai::config::AiConfig;
use crate::ai::director::AiDirector;
use crate::ai::provider::{ProviderChain, build_http_client};
use crate::game::engine::{EngineOptions, GameEngine};
use crate::types::Winner;

/// Headless engines never touch the filesystem; the winner is the only
/// output that matters.
fn headless_options(player_count: usize) -> EngineOptions {
    EngineOptions {
        master_mode: false,
        separate_human_player: false,
        save_to_file_mode: false,
        always_write_logs_to_file: false,
        player_count,
        ..EngineOptions::default()
    }
}

async fn play_one(config: AiConfig, client: reqwest::Client, player_count: usize) -> Winner {
    let backend = ProviderChain::from_env(client);
    let mut engine = GameEngine::new(
        headless_options(player_count),
        AiDirector::new(config, Box::new(backend)),
    );
    engine.setup_game(None, None).await;
    while engine.winner.is_none() {
        engine.next_phase().await;
    }
    engine.winner.unwrap_or(Winner::Aborted)
}

/// One unattended game configured entirely from `MAFIA_WORKER_*` variables.
pub async fn run_worker_game() -> Result<Winner> {
    let player_count = std::env::var("MAFIA_WORKER_PLAYER_COUNT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(6)
        .max(5);
    let mut config = AiConfig::from_env();
    config.use_llm = std::env::var("MAFIA_WORKER_USE_LLM")
        .map(|v| v == "1")
        .unwrap_or(false);
    if let Ok(model) = std::env::var("MAFIA_WORKER_DEFAULT_MODEL") {
        if !model.trim().is_empty() {
            config.set_default_model(model.trim());
        }
    }

    let client = build_http_client()?;
    Ok(play_one(config, client, player_count).await)
}

/// Worker-process entry point: play one game, emit a single JSON line.
pub async fn run_worker() -> Result<()> {
    let winner = run_worker_game().await?;
    println!("{}", json!({ "winner": winner.as_str() }));
    Ok(())
}

// ── Batch runner ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BatchSpec {
    pub games: usize,
    pub workers: usize,
    pub player_count: usize,
    pub config: AiConfig,
}

/// Runs `games` isolated sessions over a pool of `workers` tasks. Each task
/// claims games off a shared countdown until it is drained, so no game is
/// played twice and no worker idles while work remains.
pub async fn run_batch(batch: BatchSpec) -> Result<WinnerTally> {
    let games = batch.games.max(1);
    let workers = batch.workers.clamp(1, games);
    let client = build_http_client()?;
    let remaining = Arc::new(AtomicUsize::new(games));
    let (tx, mut rx) = mpsc::channel::<Winner>(games);

    for _ in 0..workers {
        let remaining = Arc::clone(&remaining);
        let tx = tx.clone();
        let client = client.clone();
        let config = batch.config.clone();
        let player_count = batch.player_count;
        tokio::spawn(async move {
            while claim_game(&remaining) {
                let winner = play_one(config.clone(), client.clone(), player_count).await;
                if tx.send(winner).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let mut tally = WinnerTally::default();
    while let Some(winner) = rx.recv().await {
        tally.record(winner);
    }
    Ok(tally)
}

fn claim_game(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Winner counts in first-seen order.
#[derive(Debug, Default)]
pub struct WinnerTally {
    counts: Vec<(Winner, usize)>,
}

impl WinnerTally {
    pub fn record(&mut self, winner: Winner) {
        match self.counts.iter_mut().find(|(w, _)| *w == winner) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((winner, 1)),
        }
    }

    pub fn render(&self) -> String {
        if self.counts.is_empty() {
            return "no games".to_string();
        }
        self.counts
            .iter()
            .map(|(w, n)| format!("{}:{n}", w.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
