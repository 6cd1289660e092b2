use std::collections::HashMap;

/// Per-session mutable record shared by the engine and the snapshot writer.
///
/// `votes` and `night_actions` are phase-scoped and cleared at their phase
/// boundaries; `transcript` and `game_log` only grow for the lifetime of a
/// game. The whole struct is reset in place when a new game starts.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Narrative lines fed back into prompts, tagged `[Day N]`/`[Night N]`.
    pub transcript: Vec<String>,
    /// Operational/debug lines, separate from the narrative.
    pub game_log: Vec<String>,
    /// voter id -> target id, cleared every voting phase.
    pub votes: HashMap<String, String>,
    /// actor id -> accepted raw decision JSON, cleared after night resolution.
    pub night_actions: HashMap<String, String>,
    /// actor id -> latest human-readable night summary, persists as memory.
    pub night_action_summary_by_player: HashMap<String, String>,
    pub last_raw_json_by_player: HashMap<String, String>,
    pub last_internal_analysis_by_player: HashMap<String, String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_transcript(&mut self, line: impl Into<String>) {
        let line = line.into();
        if line.is_empty() {
            return;
        }
        self.transcript.push(line);
    }

    pub fn clear_for_new_game(&mut self) {
        self.transcript.clear();
        self.game_log.clear();
        self.votes.clear();
        self.night_actions.clear();
        self.night_action_summary_by_player.clear();
        self.last_raw_json_by_player.clear();
        self.last_internal_analysis_by_player.clear();
    }
}
