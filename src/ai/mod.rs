pub mod config;
pub mod dialogue;
pub mod director;
pub mod extract;
pub mod fallback;
pub mod prompt;
pub mod provider;
pub mod schema;

use crate::game::memory::CompressedMemory;
use crate::game::player::Player;

/// Read-only view of the table handed to the decision pipeline: the full
/// roster (dead seats included, prompts list both) plus the compressed
/// memory blocks computed for the acting player.
pub struct DecisionContext<'a> {
    pub players: &'a [Player],
    pub memory: CompressedMemory,
}

impl DecisionContext<'_> {
    pub fn alive(&self) -> Vec<&Player> {
        self.players.iter().filter(|p| p.is_alive).collect()
    }

    pub fn dead(&self) -> Vec<&Player> {
        self.players.iter().filter(|p| !p.is_alive).collect()
    }

    /// Display name for a player reference; unknown ids pass through and an
    /// empty reference reads as "someone".
    pub fn pretty_name<'b>(&'b self, id: &'b str) -> &'b str {
        if id.is_empty() {
            return "someone";
        }
        self.players
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.display_name.as_str())
            .unwrap_or(id)
    }
}

#[cfg(test)]
mod tests {
    use super::DecisionContext;
    use crate::game::memory::CompressedMemory;
    use crate::game::player::Player;
    use crate::types::Role;

    #[test]
    fn pretty_name_falls_back_sensibly() {
        let players = vec![Player::new("p1", "Alex", Role::Villager)];
        let ctx = DecisionContext {
            players: &players,
            memory: CompressedMemory::default(),
        };
        assert_eq!(ctx.pretty_name("p1"), "Alex");
        assert_eq!(ctx.pretty_name("p9"), "p9");
        assert_eq!(ctx.pretty_name(""), "someone");
    }

    #[test]
    fn alive_and_dead_partition_the_roster() {
        let mut players = vec![
            Player::new("p1", "Alex", Role::Villager),
            Player::new("p2", "Blair", Role::Mafia),
        ];
        players[1].is_alive = false;
        let ctx = DecisionContext {
            players: &players,
            memory: CompressedMemory::default(),
        };
        assert_eq!(ctx.alive().len(), 1);
        assert_eq!(ctx.dead()[0].id, "p2");
    }
}
