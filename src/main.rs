mod ai;
mod game;
mod types;

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::style::Stylize;
use serde_json::Value;
use tokio::sync::mpsc;

use ai::config::AiConfig;
use ai::director::AiDirector;
use ai::provider::{ProviderChain, build_http_client};
use ai::schema::safe_parse_json;
use game::engine::{EngineOptions, GameEngine};
use game::worker::{self, BatchSpec, WinnerTally};
use types::Winner;

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    if std::env::args().nth(1).as_deref() == Some("worker") {
        return worker::run_worker().await;
    }

    let client = build_http_client()?;
    let config = AiConfig::from_env();
    let backend = ProviderChain::from_env(client.clone());
    let probe_chain = ProviderChain::from_env(client);
    let mut engine = GameEngine::new(
        EngineOptions::default(),
        AiDirector::new(config, Box::new(backend)),
    );
    engine.setup_game(None, None).await;

    print_header();
    print_help();
    print_state(&engine);
    print_players(&engine);
    print_tail("Transcript", &engine.state.transcript, 8);

    let mut lines = spawn_stdin_reader();
    prompt();
    while let Some(line) = lines.recv().await {
        if handle_command(&mut engine, &probe_chain, &line).await {
            break;
        }
        prompt();
    }
    println!("Bye.");
    Ok(())
}

/// Blocking stdin reads happen on a plain thread; the REPL consumes lines
/// through an async channel.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn prompt() {
    print!("\nmafia> ");
    let _ = io::stdout().flush();
}

// ── Command loop ──────────────────────────────────────────────────────────────

fn parse_command(input: &str) -> (String, String) {
    let mut parts = input.trim().split_whitespace();
    let cmd = parts.next().unwrap_or("").to_lowercase();
    let arg = parts.collect::<Vec<_>>().join(" ");
    (cmd, arg)
}

/// `multi <games> [workers]`.
fn parse_multi_arg(arg: &str) -> (usize, usize) {
    let mut segs = arg.split_whitespace();
    let games = segs
        .next()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);
    let workers = segs
        .next()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);
    (games, workers)
}

/// Returns true when the REPL should exit.
async fn handle_command(engine: &mut GameEngine, probe_chain: &ProviderChain, input: &str) -> bool {
    let (cmd, arg) = parse_command(input);
    match cmd.as_str() {
        "next" => {
            engine.next_phase().await;
            print_state(engine);
            print_tail("Transcript", &engine.state.transcript, 8);
        }
        "run" => run_auto(engine).await,
        "multi" => run_multi(engine, &arg).await,
        "playercount" => {
            if arg.is_empty() {
                println!("Usage: playercount <n>");
            } else {
                let count = arg.parse::<usize>().unwrap_or(0);
                if engine.set_player_count(count) {
                    println!(
                        "Player count set to {} (applies on new game).",
                        engine.player_count
                    );
                } else {
                    println!("{}", "Invalid count. Must be >=5.".dark_yellow());
                }
            }
        }
        "save" => {
            let mut segs = arg.split_whitespace();
            let mode = segs.next().unwrap_or("").to_lowercase();
            let dir = segs.collect::<Vec<_>>().join(" ");
            if mode != "on" && mode != "off" {
                println!("Usage: save on|off [dir]");
            } else {
                engine.set_save_mode(mode == "on", &dir);
                println!("Save mode {} -> {}", mode.to_uppercase(), engine.save_dir);
            }
        }
        "savenow" => {
            let tag = if arg.is_empty() { "manual" } else { arg.as_str() };
            match engine.save_game_to_file(tag) {
                Ok(path) => println!("Saved: {path}"),
                Err(err) => println!("{}", format!("Save failed: {err:#}").dark_yellow()),
            }
        }
        "players" => print_players(engine),
        "transcript" => {
            let n = arg.parse::<usize>().unwrap_or(20);
            print_tail("Transcript", &engine.state.transcript, n);
        }
        "log" => {
            let n = arg.parse::<usize>().unwrap_or(20);
            print_tail("Game Log", &engine.state.game_log, n);
        }
        "ai" => print_ai_debug(engine),
        "models" => {
            println!("Providers: {}", probe_chain.provider_names().join(" -> "));
            println!(
                "Available models: {}",
                engine.director.config.available_models.join(", ")
            );
            println!("Default model: {}", engine.director.config.default_model);
            let pairs: Vec<String> = engine
                .model_assignments()
                .into_iter()
                .map(|(id, model)| format!("{id}={model}"))
                .collect();
            println!("Assignments: {}", pairs.join(", "));
        }
        "model" => {
            if arg.is_empty() {
                println!("Usage: model <name>");
            } else if engine.set_default_model(&arg) {
                println!("Default model set to {arg}");
            } else {
                println!("{}", "Failed to set model.".dark_yellow());
            }
        }
        "playermodel" => {
            let mut segs = arg.split_whitespace();
            let player = segs.next().unwrap_or("").to_string();
            let model = segs.collect::<Vec<_>>().join(" ");
            if player.is_empty() || model.is_empty() {
                println!("Usage: playermodel <id|name> <model>");
            } else if engine.set_player_model(&player, &model) {
                println!("Set {player} model to {model}");
            } else {
                println!("{}", "Failed to set player model.".dark_yellow());
            }
        }
        "player" => {
            if arg.is_empty() {
                println!("Usage: player <id|name> | player off");
            } else if arg.eq_ignore_ascii_case("off") {
                engine.clear_human_player();
                println!("Human control disabled.");
            } else if engine.set_human_player(&arg) {
                println!("Human controls {arg}.");
            } else {
                println!("{}", format!("Player not found: {arg}").dark_yellow());
            }
        }
        "separatehuman" => {
            let mut segs = arg.split_whitespace();
            let flag = segs.next().unwrap_or("").to_lowercase();
            let name = segs.collect::<Vec<_>>().join(" ");
            if flag != "on" && flag != "off" {
                println!("Usage: separatehuman on|off [name]");
            } else {
                engine.set_separate_human_mode(flag == "on", &name);
                engine.setup_game(None, None).await;
                if flag == "on" {
                    println!("Separate human mode: ON ({})", engine.human_display_name);
                } else {
                    println!("Separate human mode: OFF");
                }
                print_players(engine);
            }
        }
        "say" => {
            if arg.is_empty() {
                println!("Usage: say <text>");
            } else {
                engine.submit_human_discussion(&arg);
                println!("Queued discussion message.");
            }
        }
        "vote" => {
            if arg.is_empty() {
                println!("Usage: vote <target>");
            } else {
                engine.submit_human_vote(&arg);
                println!("Queued vote.");
            }
        }
        "night" => {
            let mut segs = arg.split_whitespace();
            let action = segs.next().unwrap_or("DoNothing").to_string();
            let target = segs.next().unwrap_or("").to_string();
            let dialogue = segs.collect::<Vec<_>>().join(" ");
            engine.submit_human_night(&action, &target, &dialogue);
            println!(
                "Queued night action {}",
                format!("{action} {target}").trim_end()
            );
        }
        "master" => {
            if arg != "on" && arg != "off" {
                println!("Usage: master on|off");
            } else {
                engine.toggle_master_mode(arg == "on");
                println!("Master mode set to {arg}.");
            }
        }
        "llm" => {
            if arg != "on" && arg != "off" {
                println!("Usage: llm on|off");
            } else if arg == "on" {
                engine.director.config.use_llm = true;
                engine.apply_llm_display_names();
                println!("LLM mode enabled.");
                print_players(engine);
            } else {
                engine.director.config.use_llm = false;
                println!("LLM mode disabled.");
            }
        }
        "probe" => {
            let model = engine.director.config.default_model.clone();
            match probe_chain.probe(&model).await {
                Ok(reply) => {
                    let head: String = reply.chars().take(220).collect();
                    println!("LLM probe response: {head}");
                }
                Err(err) => println!("{}", format!("LLM probe failed: {err:#}").dark_yellow()),
            }
        }
        "state" => print_state(engine),
        "new" => {
            engine.setup_game(None, None).await;
            println!("New game started.");
            print_state(engine);
            print_players(engine);
        }
        "help" => print_help(),
        "quit" | "exit" => return true,
        "" => {}
        _ => println!("Unknown command. Type 'help'."),
    }
    false
}

async fn run_auto(engine: &mut GameEngine) {
    println!("Auto-running...");
    while engine.winner.is_none() {
        engine.next_phase().await;
        print_state(engine);
        print_tail("Transcript", &engine.state.transcript, 6);
        tokio::time::sleep(Duration::from_millis(600)).await;
    }
    if let Some(winner) = engine.winner {
        let line = format!("Game over. Winner: {}", winner.as_str());
        if winner == Winner::Aborted {
            println!("{}", line.red());
        } else {
            println!("{}", line.green().bold());
        }
    }
}

async fn run_multi(engine: &mut GameEngine, arg: &str) {
    let (games, workers) = parse_multi_arg(arg);
    if workers > 1 {
        let batch = BatchSpec {
            games,
            workers,
            player_count: engine.player_count,
            config: engine.director.config.clone(),
        };
        match worker::run_batch(batch).await {
            Ok(tally) => println!("Multi-game summary: {}", tally.render()),
            Err(err) => println!("{}", format!("Batch failed: {err:#}").dark_yellow()),
        }
        return;
    }

    let mut tally = WinnerTally::default();
    for i in 1..=games {
        engine.setup_game(None, None).await;
        while engine.winner.is_none() {
            engine.next_phase().await;
        }
        let winner = engine.winner.unwrap_or(Winner::Aborted);
        tally.record(winner);
        println!("Game {i}/{games} winner: {}", winner.as_str());
    }
    println!("Multi-game summary: {}", tally.render());
}

// ── Printing ──────────────────────────────────────────────────────────────────

fn print_header() {
    println!("{}", "======================================".cyan());
    println!("{}", " Text Mafia".cyan().bold());
    println!("{}", "======================================".cyan());
}

fn print_help() {
    println!("Commands:");
    println!("  next              Advance one phase");
    println!("  run               Auto-run until winner");
    println!("  multi <n> [w]     Run n games (w parallel workers) and report winners");
    println!("  playercount <n>   Set total players for next game (min 5)");
    println!("  save on|off [dir] Enable/disable save-to-file mode");
    println!("  savenow [tag]     Save current game snapshot immediately");
    println!("  players           Show player list");
    println!("  transcript [n]    Show last n transcript lines");
    println!("  log [n]           Show last n game-log lines");
    println!("  ai                Show per-player raw/internal AI data");
    println!("  models            List providers, models and assignments");
    println!("  model <name>      Set default model");
    println!("  playermodel <id|name> <model>  Set model for one player");
    println!("  player <id|name>  Human controls a player");
    println!("  player off        Disable human control");
    println!("  separatehuman on|off [name]  Toggle separate human seat");
    println!("  say <text>        Submit your discussion message");
    println!("  vote <target>     Submit your vote target");
    println!("  night <action> <target> [dialogue]  Submit night action");
    println!("  master on|off     Toggle master mode");
    println!("  llm on|off        Toggle live LLM mode");
    println!("  probe             Test live LLM response");
    println!("  state             Show phase and winner");
    println!("  new               Start a new game");
    println!("  help              Show this help");
    println!("  quit              Exit");
}

fn print_state(engine: &GameEngine) {
    println!("\nRound: {}", engine.round);
    println!("Phase: {}", engine.current_phase.as_str());
    println!(
        "Winner: {}",
        engine.winner.map(Winner::as_str).unwrap_or("None")
    );
    println!(
        "LLM mode: {}",
        if engine.director.config.use_llm {
            "ON"
        } else {
            "OFF (stub)"
        }
    );
    println!("Player count (next game): {}", engine.player_count);
    println!(
        "Save mode: {} ({})",
        if engine.save_to_file_mode { "ON" } else { "OFF" },
        engine.save_dir
    );
    if !engine.last_saved_path.is_empty() {
        println!("Last save: {}", engine.last_saved_path);
    }
}

fn print_players(engine: &GameEngine) {
    println!("\nPlayers:");
    for p in &engine.players {
        let role_text = if engine.master_mode {
            p.role.as_str()
        } else {
            "Hidden"
        };
        println!(
            "- {} ({}) | alive={} | role={} | model={}",
            p.display_name,
            p.id,
            p.is_alive,
            role_text,
            engine.get_player_model(&p.id)
        );
    }
}

fn print_tail(title: &str, lines: &[String], limit: usize) {
    println!("\n{title}:");
    let start = lines.len().saturating_sub(limit.max(1));
    if lines[start..].is_empty() {
        println!("- <empty>");
        return;
    }
    for line in &lines[start..] {
        println!("- {line}");
    }
}

fn print_ai_debug(engine: &GameEngine) {
    println!("\nAI Debug:");
    for p in &engine.players {
        let summary = engine.describe_ai_for_player(&p.id);
        let internal_raw = engine
            .state
            .last_internal_analysis_by_player
            .get(&p.id)
            .cloned()
            .unwrap_or_default();
        let internal = if internal_raw.is_empty() {
            "<none>".to_string()
        } else {
            match safe_parse_json(&internal_raw) {
                Some(o) => format!(
                    "most_suspicious={} confidence={}",
                    o.get("most_suspicious")
                        .and_then(Value::as_str)
                        .unwrap_or("n/a"),
                    o.get("confidence")
                        .filter(|v| !v.is_null())
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "n/a".to_string())
                ),
                None => "available".to_string(),
            }
        };
        println!("- {} ({})", p.display_name, p.id);
        println!("  ai: {summary}");
        println!("  internal: {internal}");
        println!("  night: <private_to_actor>");
    }
}
