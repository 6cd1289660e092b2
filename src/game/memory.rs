/// Transcript lines kept verbatim at the end of every prompt.
const RECENT_TAIL_LINES: usize = 80;
/// Older qualifying lines kept in the rolling summary.
const SUMMARY_KEEP_LINES: usize = 24;

const KEY_TERMS: [&str; 7] = [
    "voted",
    "eliminated",
    "wins",
    "suspect",
    "attacked",
    "saved",
    "night actions",
];

/// Memory blocks handed to the decision pipeline for one player.
#[derive(Debug, Clone, Default)]
pub struct CompressedMemory {
    pub summary: String,
    pub recent_transcript: String,
    pub day_memory: String,
    pub personal_night: String,
}

/// Compresses the transcript into prompt-sized blocks.
///
/// The rolling summary only grows or is replaced by a newer non-empty
/// filtration; once populated it never resets to empty for the rest of the
/// game, even when a later pass finds no qualifying lines.
#[derive(Debug, Default)]
pub struct MemoryCompactor {
    rolling_summary: String,
}

impl MemoryCompactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.rolling_summary.clear();
    }

    pub fn compress(
        &mut self,
        transcript: &[String],
        round: u32,
        personal_night: &str,
    ) -> CompressedMemory {
        let tail_start = transcript.len().saturating_sub(RECENT_TAIL_LINES);
        let recent = transcript[tail_start..].join("\n");
        let summary = self.fold_older(&transcript[..tail_start]);
        let day_tag = format!("[Day {round}]");
        let day_memory = transcript
            .iter()
            .filter(|line| line.contains(&day_tag))
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        CompressedMemory {
            summary,
            recent_transcript: recent,
            day_memory,
            personal_night: personal_night.to_string(),
        }
    }

    fn fold_older(&mut self, older: &[String]) -> String {
        if older.is_empty() {
            return self.rolling_summary.clone();
        }
        let events: Vec<&str> = older
            .iter()
            .map(String::as_str)
            .filter(|line| {
                let lower = line.to_lowercase();
                KEY_TERMS.iter().any(|term| lower.contains(term))
            })
            .collect();
        let keep_start = events.len().saturating_sub(SUMMARY_KEEP_LINES);
        let compact = events[keep_start..].join(" | ");
        if !compact.is_empty() {
            self.rolling_summary = compact;
        }
        self.rolling_summary.clone()
    }
}
